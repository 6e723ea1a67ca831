//! the staging area: a binary-packed, atomically-written list of
//! [`IndexEntry`] records bridging working-tree paths to object hashes.

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use bincode::{Decode, Encode};

use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::hash::{sha1_hex, ObjectId};
use crate::ignore::IgnoreEngine;
use crate::ioutil::atomic_write;
use crate::object::Object;
use crate::store::{PathState, Store};

const INDEX_SIGNATURE: &[u8; 4] = b"SIDX";
const INDEX_VERSION: u32 = 1;

#[derive(Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub ctime_sec: i64,
    pub ctime_nsec: u32,
    pub mtime_sec: i64,
    pub mtime_nsec: u32,
    pub device: u64,
    pub inode: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub hash: [u8; 20],
    pub flags: u16,
    pub path: String,
}

impl IndexEntry {
    pub fn object_id(&self) -> ObjectId {
        ObjectId::from_bytes(self.hash)
    }
}

#[derive(Encode, Decode, Debug, Default)]
struct IndexFile {
    entries: Vec<IndexEntry>,
}

/// the staging area for one repository
#[derive(Default)]
pub struct Index {
    entries: BTreeMap<String, IndexEntry>,
}

#[derive(Default)]
pub struct AddOptions {
    pub force: bool,
    pub dry_run: bool,
}

#[derive(Debug, Default)]
pub struct AddResult {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub ignored: Vec<String>,
    pub failed: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Default)]
pub struct StatusResult {
    pub staged: Vec<(String, ChangeKind)>,
    pub unstaged: Vec<(String, ChangeKind)>,
    pub untracked: Vec<String>,
    pub ignored: Vec<String>,
}

impl Index {
    pub fn empty() -> Self {
        Self::default()
    }

    /// empty `Index` if `path` is absent
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::empty()),
            Err(e) => return Err(Error::Io { path: path.to_path_buf(), source: e }),
        };
        if bytes.len() < 4 || &bytes[..4] != INDEX_SIGNATURE {
            return Err(Error::MalformedIndex("bad signature".into()));
        }
        let (file, _): (IndexFile, usize) =
            bincode::decode_from_slice(&bytes[4..], bincode::config::standard())?;
        let entries = file.entries.into_iter().map(|e| (e.path.clone(), e)).collect();
        Ok(Self { entries })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = IndexFile {
            entries: self.entries.values().cloned().collect(),
        };
        let mut bytes = INDEX_SIGNATURE.to_vec();
        bytes.extend_from_slice(&bincode::encode_to_vec(&file, bincode::config::standard())?);
        let _ = INDEX_VERSION;
        atomic_write(path, &bytes, 0o644)
    }

    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    pub fn get(&self, path: &str) -> Option<&IndexEntry> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn remove_path(&mut self, path: &str) -> Option<IndexEntry> {
        self.entries.remove(path)
    }

    pub fn insert(&mut self, entry: IndexEntry) {
        self.entries.insert(entry.path.clone(), entry);
    }

    /// stage `paths` (directories recurse; `"."` means the whole working tree)
    pub fn add(
        &mut self,
        workdir: &Path,
        store: &Store,
        ignore: &IgnoreEngine,
        paths: &[PathBuf],
        options: &AddOptions,
    ) -> Result<AddResult> {
        tracing::debug!(paths = ?paths, force = options.force, dry_run = options.dry_run, "staging paths");
        let mut result = AddResult::default();
        let mut files = Vec::new();
        for p in paths {
            self.expand(workdir, ignore, p, options.force, &mut files, &mut result.ignored)?;
        }
        files.sort();
        files.dedup();

        for rel in files {
            match self.stage_one(workdir, store, &rel, options.dry_run) {
                Ok(Some(true)) => result.added.push(rel),
                Ok(Some(false)) => result.modified.push(rel),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(path = %rel, error = %e, "failed to stage path");
                    result.failed.push((rel, e.to_string()));
                }
            }
        }
        tracing::debug!(added = result.added.len(), modified = result.modified.len(), failed = result.failed.len(), "staging complete");
        Ok(result)
    }

    fn expand(
        &self,
        workdir: &Path,
        ignore: &IgnoreEngine,
        path: &Path,
        force: bool,
        files: &mut Vec<String>,
        ignored: &mut Vec<String>,
    ) -> Result<()> {
        let target = if path == Path::new(".") {
            workdir.to_path_buf()
        } else {
            workdir.join(path)
        };
        self.walk(workdir, ignore, &target, force, files, ignored)
    }

    fn walk(
        &self,
        workdir: &Path,
        ignore: &IgnoreEngine,
        entry: &Path,
        force: bool,
        files: &mut Vec<String>,
        ignored: &mut Vec<String>,
    ) -> Result<()> {
        let rel = relative_path(workdir, entry);
        if ignore.is_metadata_path(&rel) {
            return Ok(());
        }
        let meta = match fs::symlink_metadata(entry) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::Io { path: entry.to_path_buf(), source: e }),
        };

        if meta.is_dir() {
            if !force && ignore.is_ignored(&rel, true) {
                if !rel.is_empty() {
                    ignored.push(rel);
                }
                return Ok(());
            }
            for child in fs::read_dir(entry).map_err(|e| Error::Io { path: entry.to_path_buf(), source: e })? {
                let child = child.map_err(|e| Error::Io { path: entry.to_path_buf(), source: e })?;
                self.walk(workdir, ignore, &child.path(), force, files, ignored)?;
            }
        } else {
            if !force && ignore.is_ignored(&rel, false) {
                ignored.push(rel);
                return Ok(());
            }
            files.push(rel);
        }
        Ok(())
    }

    /// `Some(true)` newly added, `Some(false)` modified-in-place, `None` if dry-run
    fn stage_one(&mut self, workdir: &Path, store: &Store, rel: &str, dry_run: bool) -> Result<Option<bool>> {
        let abs = workdir.join(rel);
        let content = fs::read(&abs).map_err(|e| Error::Io { path: abs.clone(), source: e })?;
        let meta = fs::symlink_metadata(&abs).map_err(|e| Error::Io { path: abs.clone(), source: e })?;

        let hash = ObjectId::from_hex(&sha1_hex(&frame_blob(&content)))?;
        if !dry_run {
            store.write(&Object::Blob(content))?;
        }

        let is_new = !self.entries.contains_key(rel);
        if !dry_run {
            self.entries.insert(rel.to_string(), entry_from_metadata(rel, &meta, hash));
        }
        Ok(Some(is_new))
    }

    pub fn remove(&mut self, workdir: &Path, paths: &[PathBuf], delete_from_disk: bool) -> Result<()> {
        for path in paths {
            let rel = relative_path(workdir, &workdir.join(path));
            self.entries.remove(&rel);
            if delete_from_disk {
                crate::ioutil::safe_remove(&workdir.join(&rel))?;
            }
        }
        Ok(())
    }

    /// change-detection heuristic against a single path's on-disk state
    pub fn detect_change(&self, workdir: &Path, rel: &str) -> Result<Option<ChangeKind>> {
        let Some(entry) = self.entries.get(rel) else {
            return Ok(None);
        };
        let abs = workdir.join(rel);
        let meta = match fs::symlink_metadata(&abs) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Some(ChangeKind::Deleted)),
            Err(e) => return Err(Error::Io { path: abs, source: e }),
        };

        if meta.size() != entry.size {
            return Ok(Some(ChangeKind::Modified));
        }
        if meta.mtime() != entry.mtime_sec {
            let content = fs::read(&abs).map_err(|e| Error::Io { path: abs.clone(), source: e })?;
            let hash = ObjectId::from_hex(&sha1_hex(&frame_blob(&content)))?;
            if hash != entry.object_id() {
                return Ok(Some(ChangeKind::Modified));
            }
        }
        Ok(None)
    }

    /// classify every known or discoverable path into staged/unstaged/untracked/ignored,
    /// comparing the index against `head_tree` flattened recursively through `store`
    pub fn status(
        &self,
        workdir: &Path,
        store: &Store,
        ignore: &IgnoreEngine,
        head_tree: Option<&crate::object::Tree>,
        include_ignored: bool,
        cancel: Option<&CancellationToken>,
    ) -> Result<StatusResult> {
        let mut result = StatusResult::default();
        let head_state: PathState = match head_tree {
            Some(tree) => store.flatten_tree(tree)?,
            None => PathState::new(),
        };

        for entry in self.entries.values() {
            if let Some(token) = cancel {
                token.check()?;
            }
            let staged_kind = match head_state.get(&entry.path) {
                None => Some(ChangeKind::Added),
                Some((hash, _mode)) if *hash != entry.object_id() => Some(ChangeKind::Modified),
                Some(_) => None,
            };
            if let Some(kind) = staged_kind {
                result.staged.push((entry.path.clone(), kind));
            }
            if let Some(kind) = self.detect_change(workdir, &entry.path)? {
                result.unstaged.push((entry.path.clone(), kind));
            }
        }

        for path in head_state.keys() {
            if self.entries.get(path).is_none() {
                result.staged.push((path.clone(), ChangeKind::Deleted));
            }
        }

        let mut seen: Vec<String> = self.entries.keys().cloned().collect();
        let mut ignored = Vec::new();
        let mut untracked = Vec::new();
        collect_untracked(workdir, workdir, ignore, &mut seen, &mut untracked, &mut ignored, cancel)?;
        result.untracked = untracked;
        if include_ignored {
            result.ignored = ignored;
        }
        tracing::debug!(
            staged = result.staged.len(),
            unstaged = result.unstaged.len(),
            untracked = result.untracked.len(),
            "status computed"
        );
        Ok(result)
    }
}

fn collect_untracked(
    root: &Path,
    dir: &Path,
    ignore: &IgnoreEngine,
    tracked: &mut Vec<String>,
    untracked: &mut Vec<String>,
    ignored: &mut Vec<String>,
    cancel: Option<&CancellationToken>,
) -> Result<()> {
    let read = match fs::read_dir(dir) {
        Ok(r) => r,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::Io { path: dir.to_path_buf(), source: e }),
    };
    for entry in read {
        if let Some(token) = cancel {
            token.check()?;
        }
        let entry = entry.map_err(|e| Error::Io { path: dir.to_path_buf(), source: e })?;
        let path = entry.path();
        let rel = relative_path(root, &path);
        if ignore.is_metadata_path(&rel) {
            continue;
        }
        let is_dir = path.is_dir();
        if is_dir {
            if ignore.is_ignored(&rel, true) {
                ignored.push(rel);
                continue;
            }
            collect_untracked(root, &path, ignore, tracked, untracked, ignored, cancel)?;
        } else {
            if tracked.iter().any(|t| t == &rel) {
                continue;
            }
            if ignore.is_ignored(&rel, false) {
                ignored.push(rel);
            } else {
                untracked.push(rel);
            }
        }
    }
    Ok(())
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn frame_blob(content: &[u8]) -> Vec<u8> {
    let mut out = format!("blob {}\0", content.len()).into_bytes();
    out.extend_from_slice(content);
    out
}

fn entry_from_metadata(rel: &str, meta: &std::fs::Metadata, hash: ObjectId) -> IndexEntry {
    let ctime = meta.ctime();
    let ctime_nsec = meta.ctime_nsec();
    let mtime = meta.mtime();
    let mtime_nsec = meta.mtime_nsec();
    IndexEntry {
        ctime_sec: ctime,
        ctime_nsec: ctime_nsec as u32,
        mtime_sec: mtime,
        mtime_nsec: mtime_nsec as u32,
        device: meta.dev(),
        inode: meta.ino(),
        mode: meta.mode(),
        uid: meta.uid(),
        gid: meta.gid(),
        size: meta.size(),
        hash: *hash.as_bytes(),
        flags: 0,
        path: rel.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ignore_engine(workdir: &Path) -> IgnoreEngine {
        IgnoreEngine::load(workdir).unwrap()
    }

    #[test]
    fn add_stages_a_file_and_writes_blob() {
        let dir = tempdir().unwrap();
        let workdir = dir.path();
        fs::write(workdir.join("hello.txt"), b"Hello, World!\n").unwrap();
        let store = Store::new(workdir.join(".source/objects"));
        store.initialize().unwrap();

        let mut index = Index::empty();
        let ignore = ignore_engine(workdir);
        let result = index
            .add(workdir, &store, &ignore, &[PathBuf::from("hello.txt")], &AddOptions::default())
            .unwrap();

        assert_eq!(result.added, vec!["hello.txt"]);
        let entry = index.get("hello.txt").unwrap();
        assert_eq!(entry.object_id().to_hex(), "8ab686eafeb1f44702738c8b0f24f2567c36da6d");
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let workdir = dir.path();
        fs::write(workdir.join("a.txt"), b"content").unwrap();
        let store = Store::new(workdir.join(".source/objects"));
        store.initialize().unwrap();

        let mut index = Index::empty();
        let ignore = ignore_engine(workdir);
        index
            .add(workdir, &store, &ignore, &[PathBuf::from("a.txt")], &AddOptions::default())
            .unwrap();

        let index_path = workdir.join(".source/index");
        index.save(&index_path).unwrap();
        let reloaded = Index::load(&index_path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("a.txt").unwrap().path, "a.txt");
    }

    #[test]
    fn load_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let index = Index::load(&dir.path().join("nope")).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn detect_change_reports_deleted() {
        let dir = tempdir().unwrap();
        let workdir = dir.path();
        fs::write(workdir.join("a.txt"), b"content").unwrap();
        let store = Store::new(workdir.join(".source/objects"));
        store.initialize().unwrap();
        let mut index = Index::empty();
        let ignore = ignore_engine(workdir);
        index
            .add(workdir, &store, &ignore, &[PathBuf::from("a.txt")], &AddOptions::default())
            .unwrap();

        fs::remove_file(workdir.join("a.txt")).unwrap();
        assert_eq!(index.detect_change(workdir, "a.txt").unwrap(), Some(ChangeKind::Deleted));
    }

    #[test]
    fn status_treats_unchanged_nested_path_as_clean() {
        let dir = tempdir().unwrap();
        let workdir = dir.path();
        fs::create_dir_all(workdir.join("dir")).unwrap();
        fs::write(workdir.join("dir/README.md"), b"hello\n").unwrap();
        let store = Store::new(workdir.join(".source/objects"));
        store.initialize().unwrap();

        let mut index = Index::empty();
        let ignore = ignore_engine(workdir);
        index
            .add(workdir, &store, &ignore, &[PathBuf::from("dir/README.md")], &AddOptions::default())
            .unwrap();

        let head_tree_hash = crate::tree_builder::build(&index, &store).unwrap();
        let head_tree = store.read_required(&head_tree_hash).unwrap().as_tree().unwrap().clone();

        let status = index.status(workdir, &store, &ignore, Some(&head_tree), false, None).unwrap();
        assert!(status.staged.is_empty(), "nested path identical to HEAD must not be reported staged");
    }

    #[test]
    fn status_reports_deleted_nested_path() {
        let dir = tempdir().unwrap();
        let workdir = dir.path();
        fs::create_dir_all(workdir.join("dir")).unwrap();
        fs::write(workdir.join("dir/README.md"), b"hello\n").unwrap();
        let store = Store::new(workdir.join(".source/objects"));
        store.initialize().unwrap();

        let mut index = Index::empty();
        let ignore = ignore_engine(workdir);
        index
            .add(workdir, &store, &ignore, &[PathBuf::from("dir/README.md")], &AddOptions::default())
            .unwrap();
        let head_tree_hash = crate::tree_builder::build(&index, &store).unwrap();
        let head_tree = store.read_required(&head_tree_hash).unwrap().as_tree().unwrap().clone();

        index.remove_path("dir/README.md");
        let status = index.status(workdir, &store, &ignore, Some(&head_tree), false, None).unwrap();
        assert_eq!(status.staged, vec![("dir/README.md".to_string(), ChangeKind::Deleted)]);
    }
}
