//! the reference subsystem: HEAD, branches, tags and remote-tracking
//! refs, stored as small text files under a repository's metadata directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, IoResultExt, Result};
use crate::hash::ObjectId;
use crate::ioutil::atomic_write;

const MAX_SYMBOLIC_HOPS: usize = 10;
const HEAD: &str = "HEAD";
const HEADS_PREFIX: &str = "refs/heads/";
const TAGS_PREFIX: &str = "refs/tags/";
const REMOTES_PREFIX: &str = "refs/remotes/";

/// what a ref file's content resolves to before following any `ref:` chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefTarget {
    Direct(ObjectId),
    Symbolic(String),
}

/// the ref subsystem, rooted at a repository's metadata directory
pub struct RefStore {
    root: PathBuf,
}

impl RefStore {
    pub fn new(meta_dir: impl Into<PathBuf>) -> Self {
        Self { root: meta_dir.into() }
    }

    pub fn initialize(&self) -> Result<()> {
        crate::ioutil::ensure_dir(&self.root.join("refs/heads"))?;
        crate::ioutil::ensure_dir(&self.root.join("refs/tags"))?;
        Ok(())
    }

    fn path_for(&self, ref_path: &str) -> PathBuf {
        self.root.join(ref_path)
    }

    /// raw file content, trimmed; `None` if the ref doesn't exist
    pub fn read(&self, ref_path: &str) -> Result<Option<RefTarget>> {
        let path = self.path_for(ref_path);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io { path, source: e }),
        };
        let trimmed = content.trim();
        if let Some(target) = trimmed.strip_prefix("ref: ") {
            Ok(Some(RefTarget::Symbolic(target.trim().to_string())))
        } else {
            Ok(Some(RefTarget::Direct(ObjectId::from_hex(trimmed).map_err(
                |_| Error::InvalidRef(format!("{ref_path} does not contain a valid hash or symbolic ref")),
            )?)))
        }
    }

    /// validate `hex`, create parent directories, atomic-write `"<hex>\n"`
    pub fn update(&self, ref_path: &str, id: ObjectId) -> Result<()> {
        tracing::debug!(ref_path, target = %id, "updating ref");
        let path = self.path_for(ref_path);
        atomic_write(&path, format!("{}\n", id.to_hex()).as_bytes(), 0o644)
    }

    /// write a symbolic ref, e.g. HEAD → `refs/heads/master`
    pub fn update_symbolic(&self, ref_path: &str, target: &str) -> Result<()> {
        tracing::debug!(ref_path, target, "updating symbolic ref");
        let path = self.path_for(ref_path);
        atomic_write(&path, format!("ref: {target}\n").as_bytes(), 0o644)
    }

    /// `false` if absent
    pub fn delete(&self, ref_path: &str) -> Result<bool> {
        let path = self.path_for(ref_path);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(ref_path, "ref deleted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io { path, source: e }),
        }
    }

    pub fn exists(&self, ref_path: &str) -> bool {
        self.path_for(ref_path).is_file()
    }

    /// follow `ref: ` chains up to [`MAX_SYMBOLIC_HOPS`] times to a direct object id
    pub fn resolve(&self, ref_path: &str) -> Result<ObjectId> {
        let mut current = ref_path.to_string();
        for _ in 0..MAX_SYMBOLIC_HOPS {
            match self.read(&current)?.ok_or_else(|| Error::RefNotFound(current.clone()))? {
                RefTarget::Direct(id) => return Ok(id),
                RefTarget::Symbolic(target) => current = target,
            }
        }
        tracing::warn!(ref_path, "symbolic ref cycle detected");
        Err(Error::RefCycle(ref_path.to_string()))
    }

    /// like [`resolve`](Self::resolve) but treats an unresolvable ref as "unborn" rather
    /// than an error, used for HEAD before the first commit
    pub fn resolve_optional(&self, ref_path: &str) -> Result<Option<ObjectId>> {
        match self.resolve(ref_path) {
            Ok(id) => Ok(Some(id)),
            Err(Error::RefNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// enumerate `refs/heads/`, skipping entries beginning with `.`
    pub fn list_branches(&self) -> Result<Vec<String>> {
        self.list_under("refs/heads")
    }

    pub fn list_tags(&self) -> Result<Vec<String>> {
        self.list_under("refs/tags")
    }

    fn list_under(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.root.join(prefix);
        let mut names = Vec::new();
        if dir.is_dir() {
            collect(&dir, &dir, &mut names)?;
        }
        names.retain(|n: &String| !n.split('/').any(|c| c.starts_with('.')));
        names.sort();
        Ok(names)
    }

    /// `None` if HEAD is detached or unborn with no symbolic target
    pub fn current_branch(&self) -> Result<Option<String>> {
        match self.read(HEAD)? {
            Some(RefTarget::Symbolic(target)) => Ok(target.strip_prefix(HEADS_PREFIX).map(|s| s.to_string())),
            _ => Ok(None),
        }
    }

    pub fn set_head_symbolic(&self, branch_name: &str) -> Result<()> {
        self.update_symbolic(HEAD, &format!("{HEADS_PREFIX}{branch_name}"))
    }

    pub fn set_head_detached(&self, id: ObjectId) -> Result<()> {
        let path = self.path_for(HEAD);
        atomic_write(&path, format!("{}\n", id.to_hex()).as_bytes(), 0o644)
    }

    pub fn head_commit(&self) -> Result<Option<ObjectId>> {
        self.resolve_optional(HEAD)
    }

    pub fn branch_ref(name: &str) -> String {
        format!("{HEADS_PREFIX}{name}")
    }

    pub fn tag_ref(name: &str) -> String {
        format!("{TAGS_PREFIX}{name}")
    }

    pub fn remote_ref(remote: &str, branch: &str) -> String {
        format!("{REMOTES_PREFIX}{remote}/{branch}")
    }
}

fn collect(base: &Path, dir: &Path, names: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir).with_path(dir)? {
        let entry = entry.with_path(dir)?;
        let path = entry.path();
        if path.is_dir() {
            collect(base, &path, names)?;
        } else if let Ok(rel) = path.strip_prefix(base) {
            names.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(())
}

/// validates a branch/tag leaf name; slashes are permitted to
/// express hierarchy (e.g. `feature/x`), but each rule below applies to the
/// name as a whole
pub fn validate_ref_name(name: &str) -> Result<()> {
    let fail = |reason: String| {
        Err(Error::Validation {
            field: "ref_name",
            reason,
        })
    };

    if name.is_empty() {
        return fail("ref name must not be empty".into());
    }
    const RESERVED: &[&str] = &["HEAD", "refs", "refs/heads", "refs/tags", "refs/remotes"];
    if RESERVED.contains(&name) {
        return fail(format!("{name} is a reserved ref name"));
    }
    if name.starts_with('.') || name.ends_with('.') {
        return fail(format!("ref name must not start or end with '.': {name}"));
    }
    if name.ends_with('/') {
        return fail(format!("ref name must not end with '/': {name}"));
    }
    if name.contains("..") {
        return fail(format!("ref name must not contain '..': {name}"));
    }
    if name.contains("//") {
        return fail(format!("ref name must not contain '//': {name}"));
    }
    if name.contains("@{") {
        return fail(format!("ref name must not contain '@{{': {name}"));
    }
    if name.ends_with(".lock") {
        return fail(format!("ref name must not end with '.lock': {name}"));
    }
    for c in name.chars() {
        if c.is_ascii_control() || " ~^:?*[\\".contains(c) {
            return fail(format!("ref name contains invalid character {c:?}: {name}"));
        }
    }
    for component in name.split('/') {
        if component.is_empty() || component == "." || component.starts_with('.') {
            return fail(format!("ref name component invalid: {component}"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, RefStore) {
        let dir = tempdir().unwrap();
        let store = RefStore::new(dir.path().join(".source"));
        store.initialize().unwrap();
        (dir, store)
    }

    fn id(byte: u8) -> ObjectId {
        ObjectId::from_bytes([byte; 20])
    }

    #[test]
    fn write_then_read_direct_ref() {
        let (_dir, store) = store();
        store.update(&RefStore::branch_ref("master"), id(1)).unwrap();
        assert_eq!(store.resolve(&RefStore::branch_ref("master")).unwrap(), id(1));
    }

    #[test]
    fn symbolic_ref_resolves_through_chain() {
        let (_dir, store) = store();
        store.update(&RefStore::branch_ref("master"), id(2)).unwrap();
        store.set_head_symbolic("master").unwrap();
        assert_eq!(store.resolve(HEAD).unwrap(), id(2));
        assert_eq!(store.current_branch().unwrap(), Some("master".to_string()));
    }

    #[test]
    fn detached_head_has_no_current_branch() {
        let (_dir, store) = store();
        store.set_head_detached(id(3)).unwrap();
        assert_eq!(store.resolve(HEAD).unwrap(), id(3));
        assert_eq!(store.current_branch().unwrap(), None);
    }

    #[test]
    fn cycle_detection() {
        let (_dir, store) = store();
        store.update_symbolic("refs/heads/a", "refs/heads/b").unwrap();
        store.update_symbolic("refs/heads/b", "refs/heads/a").unwrap();
        assert!(matches!(store.resolve("refs/heads/a"), Err(Error::RefCycle(_))));
    }

    #[test]
    fn list_branches_skips_dotfiles() {
        let (dir, store) = store();
        store.update(&RefStore::branch_ref("master"), id(1)).unwrap();
        store.update(&RefStore::branch_ref("feature"), id(2)).unwrap();
        fs::write(dir.path().join(".source/refs/heads/.lock"), b"x").unwrap();
        let branches = store.list_branches().unwrap();
        assert_eq!(branches, vec!["feature", "master"]);
    }

    #[test]
    fn delete_reports_absence() {
        let (_dir, store) = store();
        assert!(!store.delete(&RefStore::branch_ref("nope")).unwrap());
        store.update(&RefStore::branch_ref("master"), id(1)).unwrap();
        assert!(store.delete(&RefStore::branch_ref("master")).unwrap());
    }

    #[test]
    fn validation_accepts_good_rejects_bad_names() {
        for good in ["feature", "feature/x", "release-1.0"] {
            assert!(validate_ref_name(good).is_ok(), "{good} should be valid");
        }
        for bad in ["", ".hidden", "foo..bar", "foo/", "foo bar", "HEAD", "foo.lock"] {
            assert!(validate_ref_name(bad).is_err(), "{bad} should be invalid");
        }
    }
}
