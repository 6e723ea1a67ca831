//! the content-addressed object store: two-level sharded, DEFLATE-compressed,
//! write-idempotent persistence for [`Object`](crate::object::Object) values.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::compress::{deflate, inflate};
use crate::error::{Error, IoResultExt, Result};
use crate::hash::ObjectId;
use crate::object::{FileMode, Object, Tree};

/// a target path's recorded blob + mode, as derived from a tree or an index
pub type PathState = BTreeMap<String, (ObjectId, FileMode)>;

pub struct Store {
    objects_dir: PathBuf,
}

impl Store {
    pub fn new(objects_dir: impl Into<PathBuf>) -> Self {
        Self {
            objects_dir: objects_dir.into(),
        }
    }

    pub fn initialize(&self) -> Result<()> {
        fs::create_dir_all(&self.objects_dir).with_path(&self.objects_dir)
    }

    fn path_for(&self, id: &ObjectId) -> PathBuf {
        let (dir, file) = id.to_shard();
        self.objects_dir.join(dir).join(file)
    }

    /// persist `object`; idempotent — writing the same content twice yields the
    /// same hash and leaves the on-disk file untouched on the second call
    pub fn write(&self, object: &Object) -> Result<ObjectId> {
        let framed = object.serialize()?;
        let id = ObjectId::from_hex(&object.hash()?)?;
        let path = self.path_for(&id);

        if path.exists() {
            tracing::debug!(hash = %id, kind = %object.kind(), "object already present");
            return Ok(id);
        }

        let parent = path.parent().expect("shard directory");
        fs::create_dir_all(parent).with_path(parent)?;

        let compressed = deflate(&framed)?;
        let tmp_path = parent.join(format!(".tmp-{}-{}", std::process::id(), id.to_hex()));
        fs::write(&tmp_path, &compressed).with_path(&tmp_path)?;

        let mut perms = fs::metadata(&tmp_path).with_path(&tmp_path)?.permissions();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            perms.set_mode(0o444);
        }
        fs::set_permissions(&tmp_path, perms).with_path(&tmp_path)?;

        fs::rename(&tmp_path, &path).with_path(&path)?;
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }

        tracing::debug!(hash = %id, kind = %object.kind(), "wrote object");
        Ok(id)
    }

    /// `None` if absent; error on any other failure, including corrupt framing
    pub fn read(&self, id: &ObjectId) -> Result<Option<Object>> {
        let path = self.path_for(id);
        let compressed = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io { path, source: e }),
        };
        let framed = inflate(&compressed).inspect_err(|e| tracing::warn!(hash = %id, error = %e, "corrupt object"))?;
        Ok(Some(Object::parse(&framed)?))
    }

    /// like [`read`](Self::read) but errors with `ObjectNotFound` instead of returning `None`
    pub fn read_required(&self, id: &ObjectId) -> Result<Object> {
        self.read(id)?.ok_or_else(|| {
            tracing::warn!(hash = %id, "object not found");
            Error::ObjectNotFound(id.to_hex())
        })
    }

    pub fn has(&self, id: &ObjectId) -> bool {
        self.path_for(id).exists()
    }

    /// resolve a hex prefix (>=4 chars) against every object currently on disk,
    /// requiring a unique match
    pub fn resolve_prefix(&self, prefix: &str) -> Result<ObjectId> {
        if prefix.len() >= 40 {
            return ObjectId::from_hex(prefix);
        }
        let ids = self.all_ids()?;
        ObjectId::resolve_prefix(prefix, ids.iter())
    }

    fn all_ids(&self) -> Result<Vec<ObjectId>> {
        let mut ids = Vec::new();
        if !self.objects_dir.is_dir() {
            return Ok(ids);
        }
        for shard in fs::read_dir(&self.objects_dir).with_path(&self.objects_dir)? {
            let shard = shard.with_path(&self.objects_dir)?;
            if !shard.file_type().with_path(shard.path())?.is_dir() {
                continue;
            }
            let shard_prefix = shard.file_name().to_string_lossy().to_string();
            for entry in fs::read_dir(shard.path()).with_path(shard.path())? {
                let entry = entry.with_path(shard.path())?;
                let name = entry.file_name().to_string_lossy().to_string();
                if let Ok(id) = ObjectId::from_hex(&format!("{shard_prefix}{name}")) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    /// recursively walk `tree`, producing `path -> (blob-hash, mode)` for every
    /// non-directory entry, descending into subtrees via the store
    pub fn flatten_tree(&self, tree: &Tree) -> Result<PathState> {
        let mut out = BTreeMap::new();
        self.flatten_into("", tree, &mut out)?;
        Ok(out)
    }

    fn flatten_into(&self, prefix: &str, tree: &Tree, out: &mut PathState) -> Result<()> {
        for entry in tree.entries() {
            let path = if prefix.is_empty() {
                entry.name.clone()
            } else {
                format!("{prefix}/{}", entry.name)
            };
            if entry.mode.is_directory() {
                let sub = self.read_required(&entry.hash)?;
                self.flatten_into(&path, sub.as_tree()?, out)?;
            } else {
                out.insert(path, (entry.hash, entry.mode));
            }
        }
        Ok(())
    }
}

trait DirEntryExt {
    fn with_path<P: Into<PathBuf>>(self, path: P) -> Result<fs::DirEntry>;
}

impl DirEntryExt for std::io::Result<fs::DirEntry> {
    fn with_path<P: Into<PathBuf>>(self, path: P) -> Result<fs::DirEntry> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}
