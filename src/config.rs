//! repository configuration: a small TOML file
//! recording the default branch name, user identity defaults, and per-branch
//! upstream tracking metadata.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IoResultExt, Result};

pub const DEFAULT_BRANCH: &str = "main";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RepoConfig {
    #[serde(default = "default_branch_name")]
    pub default_branch: String,
    #[serde(default)]
    pub user: Option<UserConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<BranchConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    pub name: String,
    pub email: String,
}

/// per-branch config, currently just upstream tracking metadata
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
}

fn default_branch_name() -> String {
    DEFAULT_BRANCH.to_string()
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            default_branch: default_branch_name(),
            user: None,
            branches: Vec::new(),
        }
    }
}

impl RepoConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        crate::ioutil::atomic_write(path, content.as_bytes(), 0o644)
    }

    /// record (or clear) an upstream tracking ref for `branch`
    pub fn set_tracking(&mut self, branch: &str, track: Option<String>) {
        if let Some(entry) = self.branches.iter_mut().find(|b| b.name == branch) {
            entry.track = track;
        } else if track.is_some() {
            self.branches.push(BranchConfig { name: branch.to_string(), track });
        }
    }

    pub fn tracking_for(&self, branch: &str) -> Option<&str> {
        self.branches
            .iter()
            .find(|b| b.name == branch)
            .and_then(|b| b.track.as_deref())
    }

    pub fn forget_branch(&mut self, branch: &str) {
        self.branches.retain(|b| b.name != branch);
    }
}
