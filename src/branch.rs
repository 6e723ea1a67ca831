//! branch lifecycle: create/delete/rename/list/checkout, built on
//! top of the ref subsystem and the working-directory manager.

use std::collections::{HashSet, VecDeque};

use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::object::{Object, Tree};
use crate::refs::{validate_ref_name, RefStore};
use crate::store::Store;
use crate::workdir::{self, CheckoutOptions};

#[derive(Debug, Clone)]
pub struct BranchInfo {
    pub name: String,
    pub tip: ObjectId,
    pub is_current: bool,
    pub commit_count: usize,
    pub last_commit_message: String,
    pub last_commit_date: i64,
}

#[derive(Default)]
pub struct CreateOptions {
    pub start_point: Option<ObjectId>,
    pub force: bool,
}

#[derive(Default)]
pub struct DeleteOptions {
    pub force: bool,
}

#[derive(Default)]
pub struct RenameOptions {
    pub force: bool,
}

pub struct CheckoutTarget {
    pub branch: Option<String>,
    pub commit: ObjectId,
    pub create: bool,
    pub detach: bool,
}

/// create `name` pointing at `start_point`, or at HEAD's current commit if absent
pub fn create(refs: &RefStore, name: &str, options: &CreateOptions) -> Result<()> {
    tracing::debug!(branch = name, force = options.force, "creating branch");
    validate_ref_name(name)?;
    let ref_path = RefStore::branch_ref(name);
    if refs.exists(&ref_path) && !options.force {
        return Err(Error::BranchAlreadyExists(name.to_string()));
    }
    let target = match options.start_point {
        Some(id) => id,
        None => refs
            .head_commit()?
            .ok_or(Error::NoCommitsYet)?,
    };
    refs.update(&ref_path, target)?;
    tracing::info!(branch = name, tip = %target, "branch created");
    Ok(())
}

/// delete `name`; refuses the currently checked out branch, and refuses an
/// unmerged branch unless `force`
pub fn delete(refs: &RefStore, store: &Store, name: &str, options: &DeleteOptions) -> Result<ObjectId> {
    tracing::debug!(branch = name, force = options.force, "deleting branch");
    let ref_path = RefStore::branch_ref(name);
    let tip = refs.resolve(&ref_path).map_err(|_| Error::BranchNotFound(name.to_string()))?;

    if refs.current_branch()? == Some(name.to_string()) {
        return Err(Error::CannotDeleteCurrentBranch(name.to_string()));
    }

    if !options.force && !is_fully_merged(refs, store, name, tip)? {
        tracing::warn!(branch = name, "refusing to delete unmerged branch");
        return Err(Error::BranchNotMerged(name.to_string()));
    }

    refs.delete(&ref_path)?;
    tracing::info!(branch = name, tip = %tip, "branch deleted");
    Ok(tip)
}

/// `true` if `tip` is reachable from some other branch's tip
fn is_fully_merged(refs: &RefStore, store: &Store, name: &str, tip: ObjectId) -> Result<bool> {
    for other in refs.list_branches()? {
        if other == name {
            continue;
        }
        let other_tip = refs.resolve(&RefStore::branch_ref(&other))?;
        if other_tip == tip || ancestors(store, other_tip)?.contains(&tip) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn ancestors(store: &Store, tip: ObjectId) -> Result<HashSet<ObjectId>> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([tip]);
    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        let commit = store.read_required(&id)?;
        for parent in &commit.as_commit()?.parents {
            queue.push_back(*parent);
        }
    }
    Ok(seen)
}

pub fn rename(refs: &RefStore, old: &str, new: &str, options: &RenameOptions) -> Result<()> {
    tracing::debug!(from = old, to = new, "renaming branch");
    validate_ref_name(new)?;
    let old_ref = RefStore::branch_ref(old);
    let new_ref = RefStore::branch_ref(new);
    let tip = refs.resolve(&old_ref).map_err(|_| Error::BranchNotFound(old.to_string()))?;

    if refs.exists(&new_ref) && !options.force {
        return Err(Error::BranchAlreadyExists(new.to_string()));
    }

    refs.update(&new_ref, tip)?;
    refs.delete(&old_ref)?;

    if refs.current_branch()? == Some(old.to_string()) {
        refs.set_head_symbolic(new)?;
    }
    tracing::info!(from = old, to = new, "branch renamed");
    Ok(())
}

/// list every branch, current-first then alphabetically, with tip metadata
pub fn list(refs: &RefStore, store: &Store) -> Result<Vec<BranchInfo>> {
    let current = refs.current_branch()?;
    let mut infos = Vec::new();
    for name in refs.list_branches()? {
        let tip = refs.resolve(&RefStore::branch_ref(&name))?;
        let commit = store.read_required(&tip)?;
        let commit = commit.as_commit()?;
        infos.push(BranchInfo {
            is_current: current.as_deref() == Some(name.as_str()),
            commit_count: ancestors(store, tip)?.len(),
            last_commit_message: commit.message.clone(),
            last_commit_date: commit.committer.timestamp,
            tip,
            name,
        });
    }
    infos.sort_by(|a, b| match (a.is_current, b.is_current) {
        (true, false) => std::cmp::Ordering::Less,
        (false, true) => std::cmp::Ordering::Greater,
        _ => a.name.cmp(&b.name),
    });
    Ok(infos)
}

/// switch the working tree and HEAD to `target`, creating a branch first if requested
pub fn checkout(
    workdir_path: &std::path::Path,
    refs: &RefStore,
    store: &Store,
    index: &mut crate::index::Index,
    target: &CheckoutTarget,
    force: bool,
) -> Result<()> {
    tracing::debug!(
        branch = target.branch.as_deref(),
        commit = %target.commit,
        create = target.create,
        detach = target.detach,
        force,
        "checking out"
    );
    if target.create {
        let name = target.branch.as_deref().ok_or_else(|| Error::Validation {
            field: "checkout.branch",
            reason: "branch name required to create on checkout".into(),
        })?;
        create(
            refs,
            name,
            &CreateOptions { start_point: Some(target.commit), force: false },
        )?;
    }

    let tree_hash = {
        let commit = store.read_required(&target.commit)?;
        commit.as_commit()?.tree
    };

    workdir::update_to_commit(
        workdir_path,
        store,
        index,
        tree_hash,
        &CheckoutOptions { force, cancel: None },
    )?;

    if target.detach {
        refs.set_head_detached(target.commit)?;
    } else if let Some(name) = &target.branch {
        refs.set_head_symbolic(name)?;
    }
    tracing::info!(commit = %target.commit, "checkout complete");
    Ok(())
}

/// switch HEAD symbolically to a brand-new, commit-less branch named `name`:
/// the index is cleared and the working tree emptied, same as a fresh `init`
/// would leave it. Refuses a `name` that already exists as a branch.
pub fn checkout_orphan(
    workdir_path: &std::path::Path,
    refs: &RefStore,
    store: &Store,
    index: &mut crate::index::Index,
    name: &str,
    force: bool,
) -> Result<()> {
    tracing::debug!(branch = name, force, "checking out orphan branch");
    validate_ref_name(name)?;
    if refs.exists(&RefStore::branch_ref(name)) {
        return Err(Error::BranchAlreadyExists(name.to_string()));
    }

    let empty_tree_hash = store.write(&Object::Tree(Tree::empty()))?;
    workdir::update_to_commit(
        workdir_path,
        store,
        index,
        empty_tree_hash,
        &CheckoutOptions { force, cancel: None },
    )?;

    refs.set_head_symbolic(name)?;
    tracing::info!(branch = name, "orphan checkout complete");
    Ok(())
}
