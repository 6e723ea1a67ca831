//! the `source` CLI: thin subcommands over the `source_vcs` library.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use source_vcs::branch::{self, CheckoutTarget, CreateOptions, DeleteOptions};
use source_vcs::commit_ops::{self, CommitRequest};
use source_vcs::config::UserConfig;
use source_vcs::error::{Error, Result};
use source_vcs::hash::ObjectId;
use source_vcs::index::{AddOptions, Index};
use source_vcs::object::{CommitPerson, Object};
use source_vcs::repo::Repository;
use source_vcs::workdir::{self, CheckoutOptions};

#[derive(Parser)]
#[command(name = "source", about = "a content-addressed version control engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// create the metadata directory; fail if one exists
    Init { dir: Option<PathBuf> },
    /// compute a blob hash; optionally persist it
    HashObject {
        file: PathBuf,
        #[arg(short = 'w')]
        write: bool,
    },
    /// print type, size, pretty content, or existence of an object
    CatFile {
        #[arg(short = 't')]
        kind: bool,
        #[arg(short = 's')]
        size: bool,
        #[arg(short = 'p')]
        pretty: bool,
        #[arg(short = 'e')]
        exists: bool,
        hex: String,
    },
    /// stage paths
    Add {
        paths: Vec<PathBuf>,
        #[arg(short = 'n')]
        dry_run: bool,
        #[arg(short = 'f')]
        force: bool,
    },
    /// show the working tree status
    Status {
        #[arg(short = 's')]
        short: bool,
    },
    /// create a commit
    Commit {
        #[arg(short = 'm')]
        message: Option<String>,
        #[arg(long)]
        amend: bool,
        #[arg(long)]
        allow_empty: bool,
    },
    /// list, create, or delete branches
    Branch {
        name: Option<String>,
        #[arg(short = 'd')]
        delete: Option<String>,
        #[arg(short = 'D')]
        force_delete: Option<String>,
    },
    /// switch the working tree and HEAD to a branch or commit
    Checkout {
        /// branch or commit to switch to; with --orphan, the name of the new unborn branch
        target: String,
        #[arg(short = 'b')]
        new_branch: Option<String>,
        #[arg(short = 'f')]
        force: bool,
        /// start a new unborn branch named `target` with no commits and an empty working tree
        #[arg(long)]
        orphan: bool,
    },
    /// list tree entries
    LsTree {
        hex: String,
        #[arg(short = 'r')]
        recursive: bool,
        #[arg(long = "name-only")]
        name_only: bool,
    },
    /// build and persist a tree from the current index
    WriteTree {
        #[arg(long)]
        prefix: Option<String>,
    },
    /// extract a tree into a directory
    CheckoutTree {
        hex: String,
        dir: PathBuf,
        #[arg(short = 'f')]
        force: bool,
    },
    /// remove the metadata directory, leaving working files untouched
    Destroy { dir: Option<PathBuf> },
    /// manage `.sourceignore`
    Ignore {
        #[arg(long)]
        create: bool,
        #[arg(short = 'a')]
        add: Option<String>,
        #[arg(short = 'l')]
        list: bool,
        #[arg(short = 'e')]
        check: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_ansi(std::env::var_os("NO_COLOR").is_none())
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli.command) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Init { dir } => cmd_init(dir),
        Command::HashObject { file, write } => cmd_hash_object(&file, write),
        Command::CatFile { kind, size, pretty, exists, hex } => cmd_cat_file(kind, size, pretty, exists, &hex),
        Command::Add { paths, dry_run, force } => cmd_add(paths, dry_run, force),
        Command::Status { short } => cmd_status(short),
        Command::Commit { message, amend, allow_empty } => cmd_commit(message, amend, allow_empty),
        Command::Branch { name, delete, force_delete } => cmd_branch(name, delete, force_delete),
        Command::Checkout { target, new_branch, force, orphan } => cmd_checkout(target, new_branch, force, orphan),
        Command::LsTree { hex, recursive, name_only } => cmd_ls_tree(&hex, recursive, name_only),
        Command::WriteTree { prefix } => cmd_write_tree(prefix),
        Command::CheckoutTree { hex, dir, force } => cmd_checkout_tree(&hex, &dir, force),
        Command::Destroy { dir } => cmd_destroy(dir),
        Command::Ignore { create, add, list, check } => cmd_ignore(create, add, list, check),
    }
}

fn cwd() -> Result<PathBuf> {
    std::env::current_dir().map_err(|e| Error::Io { path: PathBuf::from("."), source: e })
}

fn cmd_init(dir: Option<PathBuf>) -> Result<()> {
    let target = dir.unwrap_or(cwd()?);
    std::fs::create_dir_all(&target).map_err(|e| Error::Io { path: target.clone(), source: e })?;
    Repository::init(&target)?;
    println!("initialized repository in {}", target.display());
    Ok(())
}

fn cmd_hash_object(file: &Path, write: bool) -> Result<()> {
    let content = std::fs::read(file).map_err(|e| Error::Io { path: file.to_path_buf(), source: e })?;
    let object = Object::Blob(content);
    if write {
        let repo = Repository::discover(&cwd()?)?;
        let id = repo.store().write(&object)?;
        println!("{id}");
    } else {
        println!("{}", object.hash()?);
    }
    Ok(())
}

fn cmd_cat_file(kind: bool, size: bool, pretty: bool, exists: bool, hex: &str) -> Result<()> {
    let repo = Repository::discover(&cwd()?)?;
    let id = repo.store().resolve_prefix(hex)?;
    if exists {
        println!("{}", repo.store().has(&id));
        return Ok(());
    }
    let object = repo.store().read_required(&id)?;
    if kind {
        println!("{}", object.kind());
    } else if size {
        let content_len = match &object {
            Object::Blob(bytes) => bytes.len(),
            Object::Tree(tree) => tree.serialize().len(),
            Object::Commit(commit) => commit.serialize().len(),
            Object::Tag => 0,
        };
        println!("{content_len}");
    } else if pretty {
        match &object {
            Object::Blob(bytes) => print!("{}", String::from_utf8_lossy(bytes)),
            Object::Tree(tree) => {
                for entry in tree.entries() {
                    let entry_kind = if entry.mode.is_directory() { "tree" } else { "blob" };
                    println!("{} {entry_kind} {}\t{}", entry.mode, entry.hash, entry.name);
                }
            }
            Object::Commit(commit) => print!("{}", String::from_utf8_lossy(&commit.serialize())),
            Object::Tag => {}
        }
    }
    Ok(())
}

fn cmd_add(paths: Vec<PathBuf>, dry_run: bool, force: bool) -> Result<()> {
    let repo = Repository::discover(&cwd()?)?;
    let _lock = repo.lock_index()?;
    let mut index = repo.load_index()?;
    let ignore = repo.ignore_engine()?;
    let paths = if paths.is_empty() { vec![PathBuf::from(".")] } else { paths };

    let result = index.add(repo.workdir(), repo.store(), &ignore, &paths, &AddOptions { force, dry_run })?;
    if !dry_run {
        repo.save_index(&index)?;
    }
    for path in &result.added {
        println!("added: {path}");
    }
    for path in &result.modified {
        println!("modified: {path}");
    }
    for path in &result.ignored {
        println!("ignored: {path}");
    }
    for (path, reason) in &result.failed {
        eprintln!("failed: {path}: {reason}");
    }
    Ok(())
}

fn cmd_status(short: bool) -> Result<()> {
    let repo = Repository::discover(&cwd()?)?;
    let index = repo.load_index()?;
    let ignore = repo.ignore_engine()?;
    let head_tree = match repo.refs().head_commit()? {
        Some(id) => {
            let commit = repo.store().read_required(&id)?;
            let tree = repo.store().read_required(&commit.as_commit()?.tree)?;
            Some(tree.as_tree()?.clone())
        }
        None => None,
    };
    let status = index.status(repo.workdir(), repo.store(), &ignore, head_tree.as_ref(), false, None)?;

    for (path, kind) in &status.staged {
        println!("{}staged {:?} {path}", if short { "S " } else { "" }, kind);
    }
    for (path, kind) in &status.unstaged {
        println!("{}unstaged {:?} {path}", if short { "U " } else { "" }, kind);
    }
    for path in &status.untracked {
        println!("{}untracked {path}", if short { "? " } else { "" });
    }
    Ok(())
}

fn cmd_commit(message: Option<String>, amend: bool, allow_empty: bool) -> Result<()> {
    let repo = Repository::discover(&cwd()?)?;
    let _lock = repo.lock_index()?;
    let index = repo.load_index()?;

    let author = repo.config().user.as_ref().map(person_from_config).transpose()?;
    let outcome = commit_ops::commit(
        repo.refs(),
        repo.store(),
        &index,
        CommitRequest {
            message: message.unwrap_or_default(),
            author: author.clone(),
            committer: author,
            amend,
            allow_empty,
            parents: None,
            tree: None,
        },
    )?;
    println!("{}", outcome.hash);
    Ok(())
}

fn person_from_config(user: &UserConfig) -> Result<CommitPerson> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    CommitPerson::new(&user.name, &user.email, now, chrono::Local::now().offset().local_minus_utc())
}

fn cmd_branch(name: Option<String>, delete: Option<String>, force_delete: Option<String>) -> Result<()> {
    let repo = Repository::discover(&cwd()?)?;
    if let Some(name) = force_delete {
        branch::delete(repo.refs(), repo.store(), &name, &DeleteOptions { force: true })?;
        return Ok(());
    }
    if let Some(name) = delete {
        branch::delete(repo.refs(), repo.store(), &name, &DeleteOptions::default())?;
        return Ok(());
    }
    if let Some(name) = name {
        branch::create(repo.refs(), &name, &CreateOptions::default())?;
        return Ok(());
    }
    for info in branch::list(repo.refs(), repo.store())? {
        let marker = if info.is_current { "*" } else { " " };
        println!("{marker} {} {}", info.name, info.tip);
    }
    Ok(())
}

fn cmd_checkout(target: String, new_branch: Option<String>, force: bool, orphan: bool) -> Result<()> {
    let repo = Repository::discover(&cwd()?)?;
    let _lock = repo.lock_index()?;
    let mut index = repo.load_index()?;

    if orphan {
        branch::checkout_orphan(repo.workdir(), repo.refs(), repo.store(), &mut index, &target, force)?;
        repo.save_index(&index)?;
        return Ok(());
    }

    let (commit_id, branch_name, detach) = resolve_checkout_target(&repo, &target, &new_branch)?;
    branch::checkout(
        repo.workdir(),
        repo.refs(),
        repo.store(),
        &mut index,
        &CheckoutTarget {
            branch: branch_name,
            commit: commit_id,
            create: new_branch.is_some(),
            detach,
        },
        force,
    )?;
    repo.save_index(&index)?;
    Ok(())
}

fn resolve_checkout_target(
    repo: &Repository,
    target: &str,
    new_branch: &Option<String>,
) -> Result<(ObjectId, Option<String>, bool)> {
    let branch_ref = source_vcs::refs::RefStore::branch_ref(target);
    if repo.refs().exists(&branch_ref) {
        let commit = repo.refs().resolve(&branch_ref)?;
        return Ok((commit, new_branch.clone().or_else(|| Some(target.to_string())), false));
    }
    let commit = repo.store().resolve_prefix(target)?;
    Ok((commit, new_branch.clone(), new_branch.is_none()))
}

fn cmd_ls_tree(hex: &str, recursive: bool, name_only: bool) -> Result<()> {
    let repo = Repository::discover(&cwd()?)?;
    let id = repo.store().resolve_prefix(hex)?;
    print_tree(&repo, id, "", recursive, name_only)
}

fn print_tree(repo: &Repository, id: ObjectId, prefix: &str, recursive: bool, name_only: bool) -> Result<()> {
    let object = repo.store().read_required(&id)?;
    for entry in object.as_tree()?.entries() {
        let path = if prefix.is_empty() { entry.name.clone() } else { format!("{prefix}/{}", entry.name) };
        if name_only {
            println!("{path}");
        } else {
            let entry_kind = if entry.mode.is_directory() { "tree" } else { "blob" };
            println!("{} {entry_kind} {}\t{path}", entry.mode, entry.hash);
        }
        if recursive && entry.mode.is_directory() {
            print_tree(repo, entry.hash, &path, recursive, name_only)?;
        }
    }
    Ok(())
}

fn cmd_write_tree(prefix: Option<String>) -> Result<()> {
    let repo = Repository::discover(&cwd()?)?;
    let index = repo.load_index()?;

    let hash = match prefix {
        None => source_vcs::tree_builder::build(&index, repo.store())?,
        Some(prefix) => {
            let needle = format!("{prefix}/");
            let mut sub_index = Index::empty();
            for entry in index.entries() {
                if let Some(rest) = entry.path.strip_prefix(&needle) {
                    let mut rebased = entry.clone();
                    rebased.path = rest.to_string();
                    sub_index.insert(rebased);
                }
            }
            source_vcs::tree_builder::build(&sub_index, repo.store())?
        }
    };
    println!("{hash}");
    Ok(())
}

fn cmd_checkout_tree(hex: &str, dir: &Path, force: bool) -> Result<()> {
    let repo = Repository::discover(&cwd()?)?;
    let tree_id = repo.store().resolve_prefix(hex)?;
    std::fs::create_dir_all(dir).map_err(|e| Error::Io { path: dir.to_path_buf(), source: e })?;
    let mut index = Index::empty();
    workdir::update_to_commit(dir, repo.store(), &mut index, tree_id, &CheckoutOptions { force, cancel: None })?;
    Ok(())
}

fn cmd_ignore(create: bool, add: Option<String>, list: bool, check: Option<String>) -> Result<()> {
    let repo = Repository::discover(&cwd()?)?;
    let ignore_path = repo.workdir().join(".sourceignore");

    if create && !ignore_path.exists() {
        source_vcs::ioutil::atomic_write(&ignore_path, b"", 0o644)?;
    }
    if let Some(pattern) = add {
        let mut content = source_vcs::ioutil::read_or_empty(&ignore_path)?;
        if !content.is_empty() && content.last() != Some(&b'\n') {
            content.push(b'\n');
        }
        content.extend_from_slice(pattern.as_bytes());
        content.push(b'\n');
        source_vcs::ioutil::atomic_write(&ignore_path, &content, 0o644)?;
    }
    if list {
        let content = source_vcs::ioutil::read_or_empty(&ignore_path)?;
        print!("{}", String::from_utf8_lossy(&content));
    }
    if let Some(path) = check {
        let ignore = repo.ignore_engine()?;
        let is_dir = repo.workdir().join(&path).is_dir();
        println!("{}", ignore.is_ignored(&path, is_dir));
    }
    Ok(())
}

fn cmd_destroy(dir: Option<PathBuf>) -> Result<()> {
    let target = dir.unwrap_or(cwd()?);
    let meta_dir = target.join(source_vcs::repo::METADATA_DIR);
    if meta_dir.is_dir() {
        std::fs::remove_dir_all(&meta_dir).map_err(|e| Error::Io { path: meta_dir, source: e })?;
    }
    Ok(())
}
