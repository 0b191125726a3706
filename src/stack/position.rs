//! Ordering of branches inside a stack.
//!
//! A stack's `branch_ids` list is the only ordering record, so inserting or
//! removing shifts every member above the affected slot in one step and
//! positions stay `0..len` by construction. Both functions operate on
//! `Tables` so callers run them inside `Store::transaction`, alone or as part
//! of a larger unit such as a history import.

use crate::errors::{PreconditionError, Result};
use crate::store::{BranchRecord, BranchStatus, Store, Tables, TrackedBranch};
use chrono::Utc;
use uuid::Uuid;

/// Insert a new branch named `name` at `position`, shifting members at or above it up by one
pub fn insert_at(
    tables: &mut Tables,
    stack_id: Uuid,
    position: usize,
    name: &str,
) -> Result<TrackedBranch> {
    let stack = tables.stack(stack_id)?;
    let len = stack.branch_ids.len();
    if position > len {
        return Err(PreconditionError::InvalidPosition { position, len }.into());
    }

    let repository_name = stack.repository_name.clone();
    if tables.is_tracked(&repository_name, name) {
        return Err(PreconditionError::AlreadyTracked(name.to_string()).into());
    }

    let now = Utc::now();
    let id = Uuid::new_v4();
    tables.branches.insert(
        id,
        BranchRecord {
            id,
            name: name.to_string(),
            stack_id,
            status: BranchStatus::Active,
            latest_commit: None,
            created_at: now,
            updated_at: now,
        },
    );

    let stack = tables.stack_mut(stack_id)?;
    stack.branch_ids.insert(position, id);
    stack.updated_at = now;

    tracing::info!("Tracked '{}' at position {} of '{}'", name, position, stack.name);

    tables.tracked_branch(id)?.ok_or_else(|| {
        crate::errors::GrapheneError::store(format!("Branch '{name}' vanished after insert"))
    })
}

/// Remove the member at `position`, shifting members above it down by one.
///
/// The branch's commit records go with it, and a stack left empty is deleted.
pub fn remove_at(tables: &mut Tables, stack_id: Uuid, position: usize) -> Result<BranchRecord> {
    let stack = tables.stack_mut(stack_id)?;
    let len = stack.branch_ids.len();
    if position >= len {
        return Err(PreconditionError::InvalidPosition { position, len }.into());
    }

    let id = stack.branch_ids.remove(position);
    stack.updated_at = Utc::now();
    let now_empty = stack.branch_ids.is_empty();
    let stack_name = stack.name.clone();

    let removed = tables.branches.remove(&id).ok_or_else(|| {
        crate::errors::GrapheneError::store(format!(
            "Stack '{stack_name}' references missing branch {id}"
        ))
    })?;
    tables.commits.retain(|c| c.branch_id != id);

    tracing::info!("Untracked '{}' from '{}'", removed.name, stack_name);

    if now_empty {
        tables.delete_stack(stack_id)?;
    }

    Ok(removed)
}

/// Insert as its own transaction
pub fn insert(store: &mut Store, stack_id: Uuid, position: usize, name: &str) -> Result<TrackedBranch> {
    store.transaction(|tables| insert_at(tables, stack_id, position, name))
}

/// Remove as its own transaction
pub fn remove(store: &mut Store, stack_id: Uuid, position: usize) -> Result<BranchRecord> {
    store.transaction(|tables| remove_at(tables, stack_id, position))
}
