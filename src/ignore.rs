//! the `.sourceignore` pattern engine.
//!
//! precedence: patterns declared deeper in the tree override shallower ones; within
//! one file, the last matching pattern wins. The metadata directory is always ignored.

use std::fs;
use std::path::Path;

use crate::error::Result;

const IGNORE_FILE: &str = ".sourceignore";
const METADATA_DIR: &str = ".source";

#[derive(Debug, Clone)]
struct Pattern {
    /// depth (number of path separators) of the `.sourceignore` file that declared this
    depth: usize,
    /// working-tree-root-relative directory that declared this pattern (empty for the root)
    dir_prefix: String,
    negated: bool,
    dir_only: bool,
    anchored: bool,
    /// the pattern text with any leading `!` or `/` stripped
    glob: String,
}

impl Pattern {
    fn matches(&self, rel_path: &str, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }
        let scoped = if self.dir_prefix.is_empty() {
            rel_path
        } else {
            match rel_path.strip_prefix(&self.dir_prefix).and_then(|r| r.strip_prefix('/')) {
                Some(rest) => rest,
                None => return false,
            }
        };
        let candidate_segments: Vec<&str> = scoped.split('/').collect();
        if self.anchored || self.glob.contains('/') {
            glob_match(&self.glob, scoped)
        } else {
            candidate_segments
                .iter()
                .any(|segment| glob_match(&self.glob, segment))
        }
    }
}

/// translate a `*`/`**` glob into a regex-free matcher via simple segment matching
fn glob_match(pattern: &str, text: &str) -> bool {
    glob_match_segments(&split_glob(pattern), &text.split('/').collect::<Vec<_>>())
}

fn split_glob(pattern: &str) -> Vec<&str> {
    pattern.split('/').collect()
}

fn glob_match_segments(pattern: &[&str], text: &[&str]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some(&"**") => {
            if pattern.len() == 1 {
                return true;
            }
            (0..=text.len()).any(|i| glob_match_segments(&pattern[1..], &text[i..]))
        }
        Some(seg) => {
            !text.is_empty() && segment_match(seg, text[0]) && glob_match_segments(&pattern[1..], &text[1..])
        }
    }
}

/// `*` within one path segment, matching any run of characters (including none)
fn segment_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    segment_match_rec(&pattern, &text)
}

fn segment_match_rec(pattern: &[char], text: &[char]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some('*') => {
            (0..=text.len()).any(|i| segment_match_rec(&pattern[1..], &text[i..]))
        }
        Some(c) => !text.is_empty() && *c == text[0] && segment_match_rec(&pattern[1..], &text[1..]),
    }
}

/// all `.sourceignore` patterns collected under a working tree, flattened with
/// their declaring depth so deeper declarations can override shallower ones
pub struct IgnoreEngine {
    patterns: Vec<Pattern>,
}

impl IgnoreEngine {
    /// walk `workdir` collecting every `.sourceignore` file
    pub fn load(workdir: &Path) -> Result<Self> {
        let mut patterns = Vec::new();
        collect(workdir, workdir, "", 0, &mut patterns)?;
        Ok(Self { patterns })
    }

    pub fn is_metadata_path(&self, rel_path: &str) -> bool {
        rel_path == METADATA_DIR || rel_path.starts_with(&format!("{METADATA_DIR}/"))
    }

    /// `is_dir` tells the engine whether `rel_path` names a directory
    pub fn is_ignored(&self, rel_path: &str, is_dir: bool) -> bool {
        if self.is_metadata_path(rel_path) {
            return true;
        }
        let mut decision = false;
        let mut decision_depth = -1i64;
        for pattern in &self.patterns {
            if pattern.matches(rel_path, is_dir) {
                let depth = pattern.depth as i64;
                if depth >= decision_depth {
                    decision = !pattern.negated;
                    decision_depth = depth;
                }
            }
        }
        decision
    }

    pub fn filter(&self, paths: Vec<(String, bool)>) -> Vec<String> {
        paths
            .into_iter()
            .filter(|(p, is_dir)| !self.is_ignored(p, *is_dir))
            .map(|(p, _)| p)
            .collect()
    }
}

fn collect(root: &Path, dir: &Path, dir_prefix: &str, depth: usize, patterns: &mut Vec<Pattern>) -> Result<()> {
    let ignore_path = dir.join(IGNORE_FILE);
    if let Some(content) = crate::ioutil::read_strict(&ignore_path)? {
        let text = String::from_utf8_lossy(&content);
        for line in text.lines() {
            if let Some(pattern) = parse_line(line, dir_prefix, depth) {
                patterns.push(pattern);
            }
        }
    }

    let read = match fs::read_dir(dir) {
        Ok(r) => r,
        Err(_) => return Ok(()),
    };
    for entry in read.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let rel = path.strip_prefix(root).unwrap_or(&path).to_string_lossy().to_string();
            if rel == METADATA_DIR {
                continue;
            }
            collect(root, &path, &rel, depth + 1, patterns)?;
        }
    }
    Ok(())
}

fn parse_line(line: &str, dir_prefix: &str, depth: usize) -> Option<Pattern> {
    let line = line.trim_end();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let mut rest = line;
    let negated = if let Some(stripped) = rest.strip_prefix('!') {
        rest = stripped;
        true
    } else {
        false
    };
    let dir_only = rest.ends_with('/');
    if dir_only {
        rest = &rest[..rest.len() - 1];
    }
    let anchored = rest.starts_with('/');
    if anchored {
        rest = &rest[1..];
    }
    if rest.is_empty() {
        return None;
    }
    Some(Pattern {
        depth,
        dir_prefix: dir_prefix.to_string(),
        negated,
        dir_only,
        anchored,
        glob: rest.to_string(),
    })
}
