//! end-to-end coverage over the public `Repository` facade: init, stage,
//! commit, branch, and checkout working together the way the CLI drives them.

use std::fs;

use source_vcs::branch::{self, CheckoutTarget, CreateOptions, DeleteOptions};
use source_vcs::commit_ops::{self, CommitRequest};
use source_vcs::error::Error;
use source_vcs::index::AddOptions;
use source_vcs::object::CommitPerson;
use source_vcs::repo::Repository;
use source_vcs::workdir::{self, CheckoutOptions};
use tempfile::tempdir;

fn person() -> CommitPerson {
    CommitPerson::new("Test User", "test@example.com", 1_700_000_000, 0).unwrap()
}

fn stage(repo: &Repository, paths: &[&str]) {
    let mut index = repo.load_index().unwrap();
    let ignore = repo.ignore_engine().unwrap();
    let paths: Vec<_> = paths.iter().map(std::path::PathBuf::from).collect();
    index
        .add(repo.workdir(), repo.store(), &ignore, &paths, &AddOptions::default())
        .unwrap();
    repo.save_index(&index).unwrap();
}

fn commit(repo: &Repository, message: &str) -> source_vcs::ObjectId {
    let index = repo.load_index().unwrap();
    let p = person();
    commit_ops::commit(
        repo.refs(),
        repo.store(),
        &index,
        CommitRequest {
            message: message.into(),
            author: Some(p.clone()),
            committer: Some(p),
            ..Default::default()
        },
    )
    .unwrap()
    .hash
}

#[test]
fn init_then_status_is_clean_with_no_commits() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    assert_eq!(repo.refs().head_commit().unwrap(), None);
    assert_eq!(repo.refs().current_branch().unwrap(), Some("main".to_string()));

    let index = repo.load_index().unwrap();
    let (clean, dirty) = workdir::is_clean(repo.workdir(), &index).unwrap();
    assert!(clean);
    assert!(dirty.is_empty());
}

#[test]
fn stage_and_commit_advances_head() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    fs::write(dir.path().join("README.md"), b"hello\n").unwrap();

    stage(&repo, &["README.md"]);
    let hash = commit(&repo, "initial commit\n");

    assert_eq!(repo.refs().head_commit().unwrap(), Some(hash));
    let stored = repo.store().read_required(&hash).unwrap();
    let commit_obj = stored.as_commit().unwrap();
    assert!(commit_obj.parents.is_empty());
    assert_eq!(commit_obj.message, "initial commit\n");
}

#[test]
fn second_commit_chains_and_tree_reflects_changes() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    fs::write(dir.path().join("a.txt"), b"one\n").unwrap();
    stage(&repo, &["a.txt"]);
    let first = commit(&repo, "add a\n");

    fs::write(dir.path().join("b.txt"), b"two\n").unwrap();
    stage(&repo, &["b.txt"]);
    let second = commit(&repo, "add b\n");

    let second_commit = repo.store().read_required(&second).unwrap();
    assert_eq!(second_commit.as_commit().unwrap().parents, vec![first]);

    let tree = repo
        .store()
        .read_required(&second_commit.as_commit().unwrap().tree)
        .unwrap();
    let names: Vec<_> = tree.as_tree().unwrap().entries().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["a.txt", "b.txt"]);
}

#[test]
fn branch_checkout_switches_working_tree_contents() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    fs::write(dir.path().join("shared.txt"), b"base\n").unwrap();
    stage(&repo, &["shared.txt"]);
    commit(&repo, "base commit\n");

    branch::create(repo.refs(), "feature", &CreateOptions::default()).unwrap();

    fs::write(dir.path().join("only-on-feature.txt"), b"feature work\n").unwrap();
    stage(&repo, &["only-on-feature.txt"]);
    let feature_commit = commit(&repo, "feature work\n");

    let mut index = repo.load_index().unwrap();
    let feature_tip = repo.refs().resolve(&source_vcs::refs::RefStore::branch_ref("feature")).unwrap();
    assert_eq!(feature_tip, feature_commit);

    branch::checkout(
        repo.workdir(),
        repo.refs(),
        repo.store(),
        &mut index,
        &CheckoutTarget {
            branch: Some("main".to_string()),
            commit: repo.refs().resolve(&source_vcs::refs::RefStore::branch_ref("main")).unwrap(),
            create: false,
            detach: false,
        },
        false,
    )
    .unwrap();

    assert!(!dir.path().join("only-on-feature.txt").exists());
    assert!(dir.path().join("shared.txt").exists());
    assert_eq!(repo.refs().current_branch().unwrap(), Some("main".to_string()));
}

#[test]
fn delete_unmerged_branch_requires_force() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    fs::write(dir.path().join("a.txt"), b"base\n").unwrap();
    stage(&repo, &["a.txt"]);
    commit(&repo, "base\n");

    branch::create(repo.refs(), "feature", &CreateOptions::default()).unwrap();
    fs::write(dir.path().join("b.txt"), b"feature\n").unwrap();
    stage(&repo, &["b.txt"]);

    // build the feature commit directly on its own branch ref rather than switching HEAD,
    // since checkout isn't under test here
    let index = repo.load_index().unwrap();
    let p = person();
    let main_tip = repo.refs().resolve(&source_vcs::refs::RefStore::branch_ref("main")).unwrap();
    let outcome = commit_ops::commit(
        repo.refs(),
        repo.store(),
        &index,
        CommitRequest {
            message: "feature\n".into(),
            author: Some(p.clone()),
            committer: Some(p),
            parents: Some(vec![main_tip]),
            ..Default::default()
        },
    )
    .unwrap();
    repo.refs().update(&source_vcs::refs::RefStore::branch_ref("feature"), outcome.hash).unwrap();

    let result = branch::delete(repo.refs(), repo.store(), "feature", &DeleteOptions::default());
    assert!(matches!(result, Err(Error::BranchNotMerged(_))));

    let forced = branch::delete(repo.refs(), repo.store(), "feature", &DeleteOptions { force: true });
    assert!(forced.is_ok());
}

#[test]
fn checkout_onto_dirty_tree_is_rejected_without_force() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    fs::write(dir.path().join("a.txt"), b"base\n").unwrap();
    stage(&repo, &["a.txt"]);
    let base = commit(&repo, "base\n");

    // dirty the working tree relative to the index without re-staging
    fs::write(dir.path().join("a.txt"), b"modified locally\n").unwrap();

    let mut index = repo.load_index().unwrap();
    let result = workdir::update_to_commit(
        repo.workdir(),
        repo.store(),
        &mut index,
        repo.store().read_required(&base).unwrap().as_commit().unwrap().tree,
        &CheckoutOptions { force: false, cancel: None },
    );
    assert!(matches!(result, Err(Error::DirtyWorkingTree(_))));
}

#[test]
fn discover_finds_repository_from_nested_directory() {
    let dir = tempdir().unwrap();
    Repository::init(dir.path()).unwrap();
    let nested = dir.path().join("src/inner");
    fs::create_dir_all(&nested).unwrap();

    let repo = Repository::discover(&nested).unwrap();
    assert_eq!(repo.workdir(), dir.path());
}

#[test]
fn status_reports_untracked_and_staged_paths() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    fs::write(dir.path().join("tracked.txt"), b"v1\n").unwrap();
    stage(&repo, &["tracked.txt"]);

    fs::write(dir.path().join("untracked.txt"), b"new\n").unwrap();

    let index = repo.load_index().unwrap();
    let ignore = repo.ignore_engine().unwrap();
    let status = index.status(repo.workdir(), repo.store(), &ignore, None, false, None).unwrap();

    assert!(status.staged.iter().any(|(p, _)| p == "tracked.txt"));
    assert!(status.untracked.iter().any(|p| p == "untracked.txt"));
}

#[test]
fn status_reports_nested_committed_path_as_clean() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    fs::create_dir_all(dir.path().join("src/inner")).unwrap();
    fs::write(dir.path().join("src/inner/mod.rs"), b"// hi\n").unwrap();
    stage(&repo, &["src/inner/mod.rs"]);
    commit(&repo, "add nested file");

    let index = repo.load_index().unwrap();
    let ignore = repo.ignore_engine().unwrap();
    let head = repo.refs().head_commit().unwrap().unwrap();
    let head_commit = repo.store().read_required(&head).unwrap();
    let head_tree = repo
        .store()
        .read_required(&head_commit.as_commit().unwrap().tree)
        .unwrap()
        .as_tree()
        .unwrap()
        .clone();

    let status = index
        .status(repo.workdir(), repo.store(), &ignore, Some(&head_tree), false, None)
        .unwrap();

    assert!(
        status.staged.is_empty(),
        "nested committed path must not be reported as staged: {:?}",
        status.staged
    );
}
