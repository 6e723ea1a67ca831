use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;

use crate::error::Error;

/// a SHA-1 object identity, as used throughout the object store and refs
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    /// the hash of the empty tree: `sha1_hex(b"tree 0\0")`
    pub const EMPTY_TREE: ObjectId = ObjectId([
        0x4b, 0x82, 0x5d, 0xc6, 0x42, 0xcb, 0x6e, 0xb9, 0xa0, 0x60, 0xe5, 0x4b, 0xf8, 0xd6, 0x92,
        0x88, 0xfb, 0xee, 0x49, 0x04,
    ]);

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// parse a 40-char lowercase hex object id
    pub fn from_hex(s: &str) -> Result<Self, Error> {
        if s.len() != 40 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::Validation {
                field: "hash",
                reason: format!("not a 40-char hex object id: {s}"),
            });
        }
        let mut arr = [0u8; 20];
        hex::decode_to_slice(s, &mut arr).map_err(|e| Error::Validation {
            field: "hash",
            reason: e.to_string(),
        })?;
        Ok(Self(arr))
    }

    /// parse a unique prefix (>=4 hex chars) against a set of candidate ids
    pub fn resolve_prefix<'a>(
        prefix: &str,
        candidates: impl Iterator<Item = &'a ObjectId>,
    ) -> Result<ObjectId, Error> {
        if prefix.len() < 4 || !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::Validation {
                field: "hash",
                reason: format!("prefix too short or non-hex: {prefix}"),
            });
        }
        let mut matches = candidates.filter(|id| id.to_hex().starts_with(prefix));
        let first = matches.next().ok_or_else(|| Error::ObjectNotFound(prefix.to_string()))?;
        if matches.next().is_some() {
            return Err(Error::AmbiguousReference(prefix.to_string()));
        }
        Ok(*first)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// two-level shard components for the object store: (first 2 hex, remaining 38 hex)
    pub fn to_shard(&self) -> (String, String) {
        let hex = self.to_hex();
        (hex[..2].to_string(), hex[2..].to_string())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl Serialize for ObjectId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// sha1_hex: the sole hash primitive the object model depends on
pub fn sha1_hex(bytes: &[u8]) -> String {
    hex::encode(sha1_bytes(bytes))
}

/// raw 20-byte SHA-1 digest of `bytes`
pub fn sha1_bytes(bytes: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let id = ObjectId::from_hex("8ab686eafeb1f44702738c8b0f24f2567c36da6d").unwrap();
        assert_eq!(id.to_hex(), "8ab686eafeb1f44702738c8b0f24f2567c36da6d");
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(ObjectId::from_hex("abcd").is_err());
    }

    #[test]
    fn rejects_non_hex() {
        assert!(ObjectId::from_hex(&"z".repeat(40)).is_err());
    }

    #[test]
    fn shard_splits_2_38() {
        let id = ObjectId::from_hex("8ab686eafeb1f44702738c8b0f24f2567c36da6d").unwrap();
        let (dir, rest) = id.to_shard();
        assert_eq!(dir, "8a");
        assert_eq!(rest, "b686eafeb1f44702738c8b0f24f2567c36da6d");
    }

    #[test]
    fn empty_tree_hash_matches_git() {
        let bytes = b"tree 0\0";
        assert_eq!(sha1_hex(bytes), ObjectId::EMPTY_TREE.to_hex());
        assert_eq!(
            ObjectId::EMPTY_TREE.to_hex(),
            "4b825dc642cb6eb9a060e54bf8d69288fbee4904"
        );
    }

    #[test]
    fn hello_world_blob_hash() {
        let content = b"Hello, World!\n";
        let header = format!("blob {}\0", content.len());
        let mut framed = header.into_bytes();
        framed.extend_from_slice(content);
        assert_eq!(sha1_hex(&framed), "8ab686eafeb1f44702738c8b0f24f2567c36da6d");
    }

    #[test]
    fn resolve_prefix_requires_unique_match() {
        let a = ObjectId::from_hex("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        let b = ObjectId::from_hex("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaab").unwrap();
        let ids = vec![a, b];
        assert!(matches!(
            ObjectId::resolve_prefix("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", ids.iter()),
            Err(Error::AmbiguousReference(_))
        ));
        assert_eq!(
            ObjectId::resolve_prefix("aaaa", vec![a].iter()).unwrap(),
            a
        );
    }
}
