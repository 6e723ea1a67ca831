//! bottom-up tree construction from the index. Reads only the index;
//! never touches the working tree.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::hash::ObjectId;
use crate::index::Index;
use crate::object::{FileMode, Object, Tree, TreeEntry};
use crate::store::Store;

/// derive a file's mode from the low bits of its recorded stat mode plus the
/// symlink/executable bits the index captured
fn entry_mode(mode: u32) -> FileMode {
    const S_IFLNK: u32 = 0o120000;
    if mode & 0o170000 == S_IFLNK {
        FileMode::Symlink
    } else if mode & 0o111 != 0 {
        FileMode::Executable
    } else {
        FileMode::Regular
    }
}

fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[..i],
        None => "",
    }
}

fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

/// build the tree corresponding to `index` and persist every constituent Tree
/// object via `store`; returns the hash of the root.
pub fn build(index: &Index, store: &Store) -> Result<ObjectId> {
    let mut dirs: BTreeMap<String, Vec<(String, FileMode, ObjectId)>> = BTreeMap::new();
    dirs.entry(String::new()).or_default();

    for entry in index.entries() {
        let dir = parent_dir(&entry.path).to_string();
        let mut ancestor = dir.clone();
        loop {
            dirs.entry(ancestor.clone()).or_default();
            if ancestor.is_empty() {
                break;
            }
            ancestor = parent_dir(&ancestor).to_string();
        }
        dirs.get_mut(&dir)
            .unwrap()
            .push((file_name(&entry.path).to_string(), entry_mode(entry.mode), entry.object_id()));
    }

    let mut sorted_dirs: Vec<String> = dirs.keys().cloned().collect();
    sorted_dirs.sort_by_key(|d| std::cmp::Reverse(d.matches('/').count() + if d.is_empty() { 0 } else { 1 }));

    let mut subtree_hashes: BTreeMap<String, ObjectId> = BTreeMap::new();

    for dir in &sorted_dirs {
        let mut entries = Vec::new();
        for (name, mode, hash) in &dirs[dir] {
            entries.push(TreeEntry::new(*mode, name.clone(), *hash)?);
        }
        for (child, child_hash) in subtree_hashes.iter() {
            if parent_dir(child) == dir.as_str() && !child.is_empty() && child != dir {
                entries.push(TreeEntry::new(FileMode::Directory, file_name(child), *child_hash)?);
            }
        }
        let tree = Tree::new(entries)?;
        let hash = store.write(&Object::Tree(tree))?;
        subtree_hashes.insert(dir.clone(), hash);
    }

    Ok(*subtree_hashes.get("").expect("root always present"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexEntry;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, Store) {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path().join("objects"));
        store.initialize().unwrap();
        (dir, store)
    }

    fn entry(path: &str, content: &[u8]) -> IndexEntry {
        IndexEntry {
            ctime_sec: 0,
            ctime_nsec: 0,
            mtime_sec: 0,
            mtime_nsec: 0,
            device: 0,
            inode: 0,
            mode: 0o100644,
            uid: 0,
            gid: 0,
            size: content.len() as u64,
            hash: crate::hash::sha1_bytes(&framed(content)),
            flags: 0,
            path: path.to_string(),
        }
    }

    fn framed(content: &[u8]) -> Vec<u8> {
        let mut out = format!("blob {}\0", content.len()).into_bytes();
        out.extend_from_slice(content);
        out
    }

    #[test]
    fn empty_index_builds_empty_tree() {
        let (_dir, store) = store();
        let index = Index::empty();
        let hash = build(&index, &store).unwrap();
        assert_eq!(hash.to_hex(), "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
    }

    #[test]
    fn insertion_order_does_not_affect_resulting_hash() {
        let (_dir, store) = store();
        let mut index = Index::empty();
        index.insert(entry("a", b"one"));
        index.insert(entry("a.c", b"two"));
        index.insert(entry("a/nested", b"three"));

        let hash_forward = build(&index, &store).unwrap();

        let mut index_reversed = Index::empty();
        index_reversed.insert(entry("a/nested", b"three"));
        index_reversed.insert(entry("a.c", b"two"));
        index_reversed.insert(entry("a", b"one"));
        let hash_reverse = build(&index_reversed, &store).unwrap();

        assert_eq!(hash_forward, hash_reverse);

        let root = store.read_required(&hash_forward).unwrap();
        let tree = root.as_tree().unwrap();
        let names: Vec<_> = tree.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "a.c", "a"]);
    }

    #[test]
    fn nested_directories_persist_subtrees() {
        let (_dir, store) = store();
        let mut index = Index::empty();
        index.insert(entry("dir/sub/file.txt", b"deep"));
        let hash = build(&index, &store).unwrap();

        let root = store.read_required(&hash).unwrap().as_tree().unwrap().clone();
        let dir_entry = root.get("dir").unwrap();
        assert!(dir_entry.mode.is_directory());

        let dir_tree = store.read_required(&dir_entry.hash).unwrap().as_tree().unwrap().clone();
        let sub_entry = dir_tree.get("sub").unwrap();
        assert!(sub_entry.mode.is_directory());
    }
}
