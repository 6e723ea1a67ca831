//! the working-directory manager: brings the working tree into exact
//! correspondence with a target commit, with rollback on any failure.

use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::index::{Index, IndexEntry};
use crate::object::FileMode;
use crate::store::{PathState, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    Create,
    Modify,
    Delete,
}

#[derive(Debug, Clone)]
pub struct FileOp {
    pub path: String,
    pub action: FileAction,
    pub hash: Option<ObjectId>,
    pub mode: Option<FileMode>,
}

struct Backup {
    path: String,
    existed: bool,
    bytes: Option<Vec<u8>>,
    mode: Option<u32>,
    was_symlink: bool,
    symlink_target: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ApplyReport {
    pub success: bool,
    pub files_changed: usize,
}

#[derive(Default)]
pub struct CheckoutOptions {
    pub force: bool,
    pub cancel: Option<CancellationToken>,
}

pub fn current_state(index: &Index) -> PathState {
    index
        .entries()
        .map(|e| (e.path.clone(), (e.object_id(), infer_mode(e.mode))))
        .collect()
}

fn infer_mode(stat_mode: u32) -> FileMode {
    const S_IFLNK: u32 = 0o120000;
    if stat_mode & 0o170000 == S_IFLNK {
        FileMode::Symlink
    } else if stat_mode & 0o111 != 0 {
        FileMode::Executable
    } else {
        FileMode::Regular
    }
}

/// diff `current` against `target`, producing an ordered plan: deletes for paths
/// dropped, creates for paths added, modifies for paths whose hash or mode changed
pub fn compute_plan(current: &PathState, target: &PathState) -> Vec<FileOp> {
    let mut plan = Vec::new();
    for path in current.keys() {
        if !target.contains_key(path) {
            plan.push(FileOp { path: path.clone(), action: FileAction::Delete, hash: None, mode: None });
        }
    }
    for (path, (hash, mode)) in target {
        match current.get(path) {
            None => plan.push(FileOp {
                path: path.clone(),
                action: FileAction::Create,
                hash: Some(*hash),
                mode: Some(*mode),
            }),
            Some((cur_hash, cur_mode)) if cur_hash != hash || cur_mode != mode => plan.push(FileOp {
                path: path.clone(),
                action: FileAction::Modify,
                hash: Some(*hash),
                mode: Some(*mode),
            }),
            Some(_) => {}
        }
    }
    plan
}

/// brings `workdir` into correspondence with `target_commit`'s tree
pub fn update_to_commit(
    workdir: &Path,
    store: &Store,
    index: &mut Index,
    target_tree_hash: ObjectId,
    options: &CheckoutOptions,
) -> Result<ApplyReport> {
    tracing::info!(tree = %target_tree_hash, force = options.force, "updating working tree to target commit");
    let target_tree = store.read_required(&target_tree_hash)?;
    let target = store.flatten_tree(target_tree.as_tree()?)?;
    let current = current_state(index);

    if !options.force {
        dirty_check(workdir, index, &current, &target)?;
    }

    let plan = compute_plan(&current, &target);
    let mut backups = Vec::new();
    for op in &plan {
        if matches!(op.action, FileAction::Modify | FileAction::Delete) {
            backups.push(capture_backup(workdir, &op.path)?);
        }
    }

    match apply_plan(workdir, store, &plan, options.cancel.as_ref()) {
        Ok(()) => {}
        Err(e) => {
            tracing::warn!(error = %e, "checkout failed, rolling back");
            rollback(workdir, &backups);
            return Err(e);
        }
    }

    let new_index = rebuild_index(workdir, store, &target);
    match new_index {
        Ok(entries) => {
            for entry in entries {
                index.insert(entry);
            }
            for path in current.keys() {
                if !target.contains_key(path) {
                    index.remove_path(path);
                }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "index rebuild failed after checkout, rolling back");
            rollback(workdir, &backups);
            return Err(e);
        }
    }

    tracing::debug!(files_changed = plan.len(), "working tree updated");
    Ok(ApplyReport { success: true, files_changed: plan.len() })
}

fn dirty_check(workdir: &Path, index: &Index, current: &PathState, target: &PathState) -> Result<()> {
    let mut conflicts = Vec::new();
    for path in current.keys() {
        let will_change = target.get(path) != current.get(path);
        if !will_change {
            continue;
        }
        if index.detect_change(workdir, path)?.is_some() {
            conflicts.push(path.clone());
        }
    }
    if !conflicts.is_empty() {
        return Err(Error::DirtyWorkingTree(conflicts));
    }
    Ok(())
}

fn capture_backup(workdir: &Path, rel: &str) -> Result<Backup> {
    let abs = workdir.join(rel);
    match fs::symlink_metadata(&abs) {
        Ok(meta) => {
            if meta.file_type().is_symlink() {
                let target = fs::read_link(&abs).map_err(|e| Error::Io { path: abs.clone(), source: e })?;
                Ok(Backup {
                    path: rel.to_string(),
                    existed: true,
                    bytes: None,
                    mode: None,
                    was_symlink: true,
                    symlink_target: Some(target),
                })
            } else {
                let bytes = fs::read(&abs).map_err(|e| Error::Io { path: abs.clone(), source: e })?;
                Ok(Backup {
                    path: rel.to_string(),
                    existed: true,
                    bytes: Some(bytes),
                    mode: Some(meta.mode()),
                    was_symlink: false,
                    symlink_target: None,
                })
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Backup {
            path: rel.to_string(),
            existed: false,
            bytes: None,
            mode: None,
            was_symlink: false,
            symlink_target: None,
        }),
        Err(e) => Err(Error::Io { path: abs, source: e }),
    }
}

fn apply_plan(workdir: &Path, store: &Store, plan: &[FileOp], cancel: Option<&CancellationToken>) -> Result<()> {
    for op in plan {
        if let Some(token) = cancel {
            token.check()?;
        }
        let abs = workdir.join(&op.path);
        match op.action {
            FileAction::Create | FileAction::Modify => {
                let hash = op.hash.expect("create/modify carries a hash");
                let mode = op.mode.expect("create/modify carries a mode");
                if let Some(parent) = abs.parent() {
                    crate::ioutil::ensure_dir(parent)?;
                }
                let blob = store.read_required(&hash)?;
                let content = blob.as_blob()?;
                if mode == FileMode::Symlink {
                    let target = String::from_utf8_lossy(content).to_string();
                    let _ = fs::remove_file(&abs);
                    #[cfg(unix)]
                    std::os::unix::fs::symlink(&target, &abs)
                        .map_err(|_| Error::SymlinkFailed(abs.clone()))?;
                } else {
                    crate::ioutil::atomic_write(
                        &abs,
                        content,
                        if mode == FileMode::Executable { 0o755 } else { 0o644 },
                    )?;
                }
            }
            FileAction::Delete => {
                crate::ioutil::safe_remove(&abs)?;
                cleanup_empty_parents(workdir, &abs);
            }
        }
    }
    Ok(())
}

fn cleanup_empty_parents(root: &Path, file_path: &Path) {
    let mut dir = file_path.parent().map(Path::to_path_buf);
    while let Some(d) = dir {
        if d == root || !d.starts_with(root) {
            break;
        }
        match fs::read_dir(&d) {
            Ok(mut entries) if entries.next().is_none() => {
                let _ = fs::remove_dir(&d);
                dir = d.parent().map(Path::to_path_buf);
            }
            _ => break,
        }
    }
}

fn rollback(workdir: &Path, backups: &[Backup]) {
    for backup in backups.iter().rev() {
        let abs = workdir.join(&backup.path);
        if backup.existed {
            if backup.was_symlink {
                let _ = fs::remove_file(&abs);
                if let Some(target) = &backup.symlink_target {
                    #[cfg(unix)]
                    let _ = std::os::unix::fs::symlink(target, &abs);
                }
            } else if let Some(bytes) = &backup.bytes {
                if let Some(parent) = abs.parent() {
                    let _ = fs::create_dir_all(parent);
                }
                let _ = fs::write(&abs, bytes);
                if let Some(mode) = backup.mode {
                    let _ = fs::set_permissions(&abs, fs::Permissions::from_mode(mode));
                }
            }
        } else {
            let _ = fs::remove_file(&abs);
        }
    }
}

fn rebuild_index(workdir: &Path, _store: &Store, target: &PathState) -> Result<Vec<IndexEntry>> {
    let mut entries = Vec::new();
    for (path, (hash, _mode)) in target {
        let abs = workdir.join(path);
        let meta = fs::symlink_metadata(&abs).map_err(|e| Error::Io { path: abs.clone(), source: e })?;
        entries.push(IndexEntry {
            ctime_sec: meta.ctime(),
            ctime_nsec: meta.ctime_nsec() as u32,
            mtime_sec: meta.mtime(),
            mtime_nsec: meta.mtime_nsec() as u32,
            device: meta.dev(),
            inode: meta.ino(),
            mode: meta.mode(),
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.size(),
            hash: *hash.as_bytes(),
            flags: 0,
            path: path.clone(),
        });
    }
    Ok(entries)
}

/// reports whether the working tree matches the index, plus the list of paths that differ
pub fn is_clean(workdir: &Path, index: &Index) -> Result<(bool, Vec<String>)> {
    let mut dirty = Vec::new();
    for entry in index.entries() {
        if index.detect_change(workdir, &entry.path)?.is_some() {
            dirty.push(entry.path.clone());
        }
    }
    Ok((dirty.is_empty(), dirty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Object;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, Store) {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path().join("objects"));
        store.initialize().unwrap();
        (dir, store)
    }

    fn write_blob(store: &Store, content: &[u8]) -> ObjectId {
        store.write(&Object::Blob(content.to_vec())).unwrap()
    }

    #[test]
    fn compute_plan_detects_create_modify_delete() {
        let mut current = PathState::new();
        current.insert("keep.txt".into(), (ObjectId::EMPTY_TREE, FileMode::Regular));
        current.insert("gone.txt".into(), (ObjectId::EMPTY_TREE, FileMode::Regular));

        let mut target = PathState::new();
        target.insert("keep.txt".into(), (ObjectId::EMPTY_TREE, FileMode::Regular));
        target.insert("new.txt".into(), (ObjectId::EMPTY_TREE, FileMode::Regular));

        let plan = compute_plan(&current, &target);
        assert_eq!(plan.len(), 2);
        assert!(plan.iter().any(|op| op.path == "gone.txt" && op.action == FileAction::Delete));
        assert!(plan.iter().any(|op| op.path == "new.txt" && op.action == FileAction::Create));
    }

    #[test]
    fn flatten_tree_recovers_nested_paths() {
        let (_dir, store) = store();
        let mut index = Index::empty();
        index.insert(IndexEntry {
            ctime_sec: 0,
            ctime_nsec: 0,
            mtime_sec: 0,
            mtime_nsec: 0,
            device: 0,
            inode: 0,
            mode: 0o100644,
            uid: 0,
            gid: 0,
            size: 1,
            hash: *write_blob(&store, b"r").as_bytes(),
            flags: 0,
            path: "dir/README.md".to_string(),
        });

        let tree_hash = crate::tree_builder::build(&index, &store).unwrap();
        let target = store.flatten_tree(store.read_required(&tree_hash).unwrap().as_tree().unwrap()).unwrap();
        assert_eq!(target.len(), 1);
        assert!(target.contains_key("dir/README.md"));
    }

    #[test]
    fn update_to_commit_creates_and_deletes_files() {
        let dir = tempdir().unwrap();
        let workdir = dir.path().join("wt");
        fs::create_dir_all(&workdir).unwrap();
        let store = Store::new(dir.path().join("objects"));
        store.initialize().unwrap();

        let mut index = Index::empty();
        index.insert(IndexEntry {
            ctime_sec: 0,
            ctime_nsec: 0,
            mtime_sec: 0,
            mtime_nsec: 0,
            device: 0,
            inode: 0,
            mode: 0o100644,
            uid: 0,
            gid: 0,
            size: 1,
            hash: *write_blob(&store, b"hello").as_bytes(),
            flags: 0,
            path: "a.txt".to_string(),
        });
        let tree_hash = crate::tree_builder::build(&index, &store).unwrap();

        let mut empty_index = Index::empty();
        let report = update_to_commit(
            &workdir,
            &store,
            &mut empty_index,
            tree_hash,
            &CheckoutOptions { force: true, cancel: None },
        )
        .unwrap();

        assert!(report.success);
        assert_eq!(fs::read(workdir.join("a.txt")).unwrap(), b"hello");
        assert_eq!(empty_index.get("a.txt").unwrap().path, "a.txt");
    }
}
