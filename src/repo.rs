//! the repository facade: wires the object store, ref subsystem, index, and
//! ignore engine together under one metadata directory, and supports the
//! upward-discovery walk used by every CLI subcommand.

use std::path::{Path, PathBuf};

use crate::config::RepoConfig;
use crate::error::{Error, Result};
use crate::ignore::IgnoreEngine;
use crate::index::Index;
use crate::lock::{self, IndexLock};
use crate::refs::RefStore;
use crate::store::Store;

pub const METADATA_DIR: &str = ".source";

pub struct Repository {
    workdir: PathBuf,
    meta_dir: PathBuf,
    store: Store,
    refs: RefStore,
    config: RepoConfig,
}

impl Repository {
    /// create a brand new repository at `workdir`; errors if one already exists there
    pub fn init(workdir: &Path) -> Result<Self> {
        tracing::debug!(workdir = %workdir.display(), "initializing repository");
        let meta_dir = workdir.join(METADATA_DIR);
        if meta_dir.exists() {
            return Err(Error::AlreadyInitialized(workdir.to_path_buf()));
        }

        let store = Store::new(meta_dir.join("objects"));
        store.initialize()?;
        let refs = RefStore::new(meta_dir.clone());
        refs.initialize()?;

        let config = RepoConfig::default();
        config.save(&meta_dir.join("config.toml"))?;
        crate::ioutil::atomic_write(&meta_dir.join("description"), b"", 0o644)?;
        refs.set_head_symbolic(&config.default_branch)?;

        tracing::info!(workdir = %workdir.display(), "repository initialized");
        Ok(Self { workdir: workdir.to_path_buf(), meta_dir, store, refs, config })
    }

    /// open a repository whose metadata directory is exactly `workdir/.source`
    pub fn open(workdir: &Path) -> Result<Self> {
        let meta_dir = workdir.join(METADATA_DIR);
        if !meta_dir.is_dir() {
            return Err(Error::NotARepository(workdir.to_path_buf()));
        }
        let config = RepoConfig::load(&meta_dir.join("config.toml"))?;
        tracing::debug!(workdir = %workdir.display(), "opened repository");
        Ok(Self {
            workdir: workdir.to_path_buf(),
            store: Store::new(meta_dir.join("objects")),
            refs: RefStore::new(meta_dir.clone()),
            meta_dir,
            config,
        })
    }

    /// walk upward from `start` looking for a `.source` directory, as git does for `.git`
    pub fn discover(start: &Path) -> Result<Self> {
        let mut current = start.to_path_buf();
        loop {
            if current.join(METADATA_DIR).is_dir() {
                return Self::open(&current);
            }
            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => {
                    tracing::warn!(start = %start.display(), "no repository found above this path");
                    return Err(Error::NotARepository(start.to_path_buf()));
                }
            }
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn meta_dir(&self) -> &Path {
        &self.meta_dir
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn refs(&self) -> &RefStore {
        &self.refs
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RepoConfig {
        &mut self.config
    }

    pub fn save_config(&self) -> Result<()> {
        self.config.save(&self.meta_dir.join("config.toml"))
    }

    pub fn index_path(&self) -> PathBuf {
        self.meta_dir.join("index")
    }

    pub fn load_index(&self) -> Result<Index> {
        Index::load(&self.index_path())
    }

    pub fn save_index(&self, index: &Index) -> Result<()> {
        index.save(&self.index_path())
    }

    pub fn ignore_engine(&self) -> Result<IgnoreEngine> {
        IgnoreEngine::load(&self.workdir)
    }

    /// hold the index lock for the duration of a mutating operation
    pub fn lock_index(&self) -> Result<IndexLock> {
        lock::acquire(&self.meta_dir)
    }

    pub fn try_lock_index(&self) -> Result<Option<IndexLock>> {
        lock::try_acquire(&self.meta_dir)
    }
}
