use std::fmt;

use crate::error::{Error, Result};
use crate::hash::ObjectId;

/// the five entry modes the tree model recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Directory,
    Regular,
    Executable,
    Symlink,
    Gitlink,
}

impl FileMode {
    pub fn as_octal(&self) -> &'static str {
        match self {
            FileMode::Directory => "040000",
            FileMode::Regular => "100644",
            FileMode::Executable => "100755",
            FileMode::Symlink => "120000",
            FileMode::Gitlink => "160000",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "040000" => Ok(FileMode::Directory),
            "100644" => Ok(FileMode::Regular),
            "100755" => Ok(FileMode::Executable),
            "120000" => Ok(FileMode::Symlink),
            "160000" => Ok(FileMode::Gitlink),
            other => Err(Error::MalformedObject(format!("unrecognized mode {other}"))),
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, FileMode::Directory)
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_octal())
    }
}

/// one entry of a [`Tree`]: a name, its mode, and the hash of what it points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: FileMode,
    pub name: String,
    pub hash: ObjectId,
}

impl TreeEntry {
    pub fn new(mode: FileMode, name: impl Into<String>, hash: ObjectId) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::Validation {
                field: "tree_entry.name",
                reason: "name must not be empty".into(),
            });
        }
        if name.contains('/') || name.contains('\0') {
            return Err(Error::Validation {
                field: "tree_entry.name",
                reason: format!("name must not contain '/' or NUL: {name}"),
            });
        }
        Ok(Self { mode, name, hash })
    }

    /// the key entries are sorted and compared by: `name` for
    /// non-directory entries, `name + "/"` for directories
    fn sort_key(&self) -> String {
        if self.mode.is_directory() {
            format!("{}/", self.name)
        } else {
            self.name.clone()
        }
    }
}

/// an ordered, deduplicated-by-name sequence of [`TreeEntry`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    /// builds a `Tree`, re-sorting by the canonical key regardless of insertion
    /// order. A file and a directory MAY share a raw name (their sort keys still
    /// differ); two entries of the same kind sharing a name are rejected.
    pub fn new(mut entries: Vec<TreeEntry>) -> Result<Self> {
        entries.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        for window in entries.windows(2) {
            if window[0].sort_key() == window[1].sort_key() {
                return Err(Error::Validation {
                    field: "tree.entries",
                    reason: format!("duplicate entry name: {}", window[0].name),
                });
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// `"<mode> <name>\0<20-byte-raw-hash>"` per entry, concatenated in sorted order
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in &self.entries {
            out.extend_from_slice(entry.mode.as_octal().as_bytes());
            out.push(b' ');
            out.extend_from_slice(entry.name.as_bytes());
            out.push(0);
            out.extend_from_slice(entry.hash.as_bytes());
        }
        out
    }

    pub fn parse(content: &[u8]) -> Result<Tree> {
        let mut entries = Vec::new();
        let mut cursor = 0usize;
        while cursor < content.len() {
            let space = content[cursor..]
                .iter()
                .position(|&b| b == b' ')
                .map(|p| cursor + p)
                .ok_or_else(|| Error::MalformedObject("tree entry missing mode separator".into()))?;
            let mode_str = std::str::from_utf8(&content[cursor..space])
                .map_err(|_| Error::MalformedObject("tree entry mode is not utf8".into()))?;
            let mode = FileMode::parse(mode_str)?;

            let nul = content[space + 1..]
                .iter()
                .position(|&b| b == 0)
                .map(|p| space + 1 + p)
                .ok_or_else(|| Error::MalformedObject("tree entry missing name terminator".into()))?;
            let name = std::str::from_utf8(&content[space + 1..nul])
                .map_err(|_| Error::MalformedObject("tree entry name is not utf8".into()))?
                .to_string();

            let hash_start = nul + 1;
            let hash_end = hash_start + 20;
            if hash_end > content.len() {
                return Err(Error::MalformedObject("tree entry hash truncated".into()));
            }
            let mut raw = [0u8; 20];
            raw.copy_from_slice(&content[hash_start..hash_end]);

            entries.push(TreeEntry::new(mode, name, ObjectId::from_bytes(raw))?);
            cursor = hash_end;
        }
        Tree::new(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> ObjectId {
        ObjectId::from_bytes([byte; 20])
    }

    #[test]
    fn empty_tree_serializes_to_nothing() {
        let tree = Tree::empty();
        assert!(tree.serialize().is_empty());
    }

    #[test]
    fn sort_order_interleaves_file_and_directory_sharing_a_name() {
        let entries = vec![
            TreeEntry::new(FileMode::Directory, "a", id(3)).unwrap(),
            TreeEntry::new(FileMode::Regular, "a.c", id(2)).unwrap(),
            TreeEntry::new(FileMode::Regular, "a", id(1)).unwrap(),
        ];
        let tree = Tree::new(entries).unwrap();
        let names: Vec<_> = tree.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "a.c", "a"]);
        assert!(!tree.entries()[0].mode.is_directory());
        assert!(tree.entries()[2].mode.is_directory());
    }

    #[test]
    fn insertion_order_does_not_affect_hash() {
        let forward = Tree::new(vec![
            TreeEntry::new(FileMode::Regular, "a", id(1)).unwrap(),
            TreeEntry::new(FileMode::Regular, "a.c", id(2)).unwrap(),
        ])
        .unwrap();
        let reverse = Tree::new(vec![
            TreeEntry::new(FileMode::Regular, "a.c", id(2)).unwrap(),
            TreeEntry::new(FileMode::Regular, "a", id(1)).unwrap(),
        ])
        .unwrap();
        assert_eq!(forward.serialize(), reverse.serialize());
    }

    #[test]
    fn rejects_duplicate_names() {
        let entries = vec![
            TreeEntry::new(FileMode::Regular, "a", id(1)).unwrap(),
            TreeEntry::new(FileMode::Regular, "a", id(2)).unwrap(),
        ];
        assert!(Tree::new(entries).is_err());
    }

    #[test]
    fn entry_rejects_slash_in_name() {
        assert!(TreeEntry::new(FileMode::Regular, "a/b", id(1)).is_err());
    }

    #[test]
    fn roundtrip() {
        let tree = Tree::new(vec![
            TreeEntry::new(FileMode::Regular, "file.txt", id(9)).unwrap(),
            TreeEntry::new(FileMode::Directory, "subdir", id(8)).unwrap(),
        ])
        .unwrap();
        let bytes = tree.serialize();
        let parsed = Tree::parse(&bytes).unwrap();
        assert_eq!(tree, parsed);
    }
}
