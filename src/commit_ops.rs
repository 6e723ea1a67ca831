//! commit creation: determines parents and tree, guards against
//! empty commits, and advances the current branch (or a detached HEAD).

use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::index::Index;
use crate::object::{Commit, CommitPerson, Object};
use crate::refs::RefStore;
use crate::store::Store;
use crate::tree_builder;

#[derive(Default)]
pub struct CommitRequest {
    pub message: String,
    pub author: Option<CommitPerson>,
    pub committer: Option<CommitPerson>,
    pub amend: bool,
    pub allow_empty: bool,
    pub parents: Option<Vec<ObjectId>>,
    pub tree: Option<ObjectId>,
}

pub struct CommitOutcome {
    pub hash: ObjectId,
    pub tree: ObjectId,
}

/// build and persist a commit from `request`, advancing HEAD's branch (or, if
/// detached, HEAD itself) to it.
pub fn commit(refs: &RefStore, store: &Store, index: &Index, request: CommitRequest) -> Result<CommitOutcome> {
    tracing::debug!(amend = request.amend, allow_empty = request.allow_empty, "creating commit");
    if request.message.trim().is_empty() && !request.amend {
        return Err(Error::Validation {
            field: "commit.message",
            reason: "commit message must not be empty".into(),
        });
    }

    let current_head = refs.head_commit()?;
    let parents = determine_parents(&request, store, current_head)?;
    let tree = match request.tree {
        Some(hash) => hash,
        None => tree_builder::build(index, store)?,
    };

    if !request.allow_empty {
        check_not_empty(store, &parents, tree).inspect_err(|_| {
            tracing::warn!("refusing commit with unchanged tree");
        })?;
    }

    let default_person = || {
        CommitPerson::new(
            "unknown",
            "unknown@localhost",
            current_unix_timestamp(),
            local_tz_offset_seconds(),
        )
    };
    let author = match request.author {
        Some(p) => p,
        None => default_person()?,
    };
    let committer = match request.committer {
        Some(p) => p,
        None => author.clone(),
    };

    let message = if request.amend && request.message.trim().is_empty() {
        amended_message(store, current_head)?
    } else {
        request.message
    };

    let commit = Commit::new(tree, parents, author, committer, message);
    let hash = store.write(&Object::Commit(commit))?;

    advance_head(refs, hash)?;
    tracing::info!(hash = %hash, tree = %tree, "commit created");
    Ok(CommitOutcome { hash, tree })
}

fn determine_parents(
    request: &CommitRequest,
    store: &Store,
    current_head: Option<ObjectId>,
) -> Result<Vec<ObjectId>> {
    if let Some(parents) = &request.parents {
        return Ok(parents.clone());
    }
    if request.amend {
        let head = current_head.ok_or(Error::NoCommitsYet)?;
        let head_commit = store.read_required(&head)?;
        return Ok(head_commit.as_commit()?.parents.clone());
    }
    Ok(current_head.into_iter().collect())
}

fn check_not_empty(store: &Store, parents: &[ObjectId], tree: ObjectId) -> Result<()> {
    let Some(parent) = parents.first() else {
        return Ok(());
    };
    let parent_commit = store.read_required(parent)?;
    if parent_commit.as_commit()?.tree == tree {
        return Err(Error::NothingToCommit);
    }
    Ok(())
}

fn amended_message(store: &Store, current_head: Option<ObjectId>) -> Result<String> {
    let head = current_head.ok_or(Error::NoCommitsYet)?;
    let commit = store.read_required(&head)?;
    Ok(commit.as_commit()?.message.clone())
}

fn advance_head(refs: &RefStore, hash: ObjectId) -> Result<()> {
    match refs.current_branch()? {
        Some(branch) => refs.update(&RefStore::branch_ref(&branch), hash),
        None => refs.set_head_detached(hash),
    }
}

fn current_unix_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn local_tz_offset_seconds() -> i32 {
    chrono::Local::now().offset().local_minus_utc()
}
