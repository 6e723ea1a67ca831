//! the content-addressed object model: a tagged union over
//! Blob/Tree/Commit/Tag, framed as `"<type> <size>\0<content>"` and identified
//! by the SHA-1 of that framed form.

pub mod blob;
pub mod commit;
pub mod tree;

pub use commit::{Commit, CommitPerson};
pub use tree::{FileMode, Tree, TreeEntry};

use crate::error::{Error, Result};
use crate::hash::sha1_hex;

/// the four object kinds named by the object model; `Tag` is recognized but not
/// constructible — parsing or serializing one always fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Blob(Vec<u8>),
    Tree(Tree),
    Commit(Commit),
    Tag,
}

impl Object {
    pub fn kind(&self) -> &'static str {
        match self {
            Object::Blob(_) => "blob",
            Object::Tree(_) => "tree",
            Object::Commit(_) => "commit",
            Object::Tag => "tag",
        }
    }

    /// the framed `"<type> <size>\0<content>"` byte form persisted (deflated) to disk
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let content = match self {
            Object::Blob(bytes) => bytes.clone(),
            Object::Tree(tree) => tree.serialize(),
            Object::Commit(commit) => commit.serialize(),
            Object::Tag => {
                return Err(Error::MalformedObject("tag objects are not supported".into()))
            }
        };
        Ok(frame(self.kind(), &content))
    }

    /// parse a framed byte buffer (as read back from the store, already inflated)
    pub fn parse(bytes: &[u8]) -> Result<Object> {
        let nul = bytes
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::MalformedObject("missing header terminator".into()))?;
        let header = std::str::from_utf8(&bytes[..nul])
            .map_err(|_| Error::MalformedObject("header is not valid ascii/utf8".into()))?;
        let mut parts = header.splitn(2, ' ');
        let kind = parts
            .next()
            .ok_or_else(|| Error::MalformedObject("missing object type".into()))?;
        let declared_size: usize = parts
            .next()
            .ok_or_else(|| Error::MalformedObject("missing object size".into()))?
            .parse()
            .map_err(|_| Error::MalformedObject("object size is not a decimal integer".into()))?;

        let content = &bytes[nul + 1..];
        if content.len() != declared_size {
            return Err(Error::SizeMismatch {
                hash: sha1_hex(bytes),
                declared: declared_size,
                actual: content.len(),
            });
        }

        match kind {
            "blob" => Ok(Object::Blob(content.to_vec())),
            "tree" => Ok(Object::Tree(Tree::parse(content)?)),
            "commit" => Ok(Object::Commit(Commit::parse(content)?)),
            "tag" => Err(Error::MalformedObject("tag objects are not supported".into())),
            other => Err(Error::UnknownObjectType(other.to_string())),
        }
    }

    /// `sha1_hex` of [`serialize`](Self::serialize)
    pub fn hash(&self) -> Result<String> {
        Ok(sha1_hex(&self.serialize()?))
    }

    pub fn as_blob(&self) -> Result<&[u8]> {
        match self {
            Object::Blob(bytes) => Ok(bytes),
            other => Err(Error::WrongKind(other.kind().to_string(), "blob")),
        }
    }

    pub fn as_tree(&self) -> Result<&Tree> {
        match self {
            Object::Tree(tree) => Ok(tree),
            other => Err(Error::WrongKind(other.kind().to_string(), "tree")),
        }
    }

    pub fn as_commit(&self) -> Result<&Commit> {
        match self {
            Object::Commit(commit) => Ok(commit),
            other => Err(Error::WrongKind(other.kind().to_string(), "commit")),
        }
    }
}

fn frame(kind: &str, content: &[u8]) -> Vec<u8> {
    let mut out = format!("{kind} {}\0", content.len()).into_bytes();
    out.extend_from_slice(content);
    out
}
