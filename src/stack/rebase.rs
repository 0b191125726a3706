use super::journal::{Journal, PendingOperation, RestackState};
use crate::errors::{Conflict, GrapheneError, PreconditionError, Result};
use crate::git::{StepOutcome, VcsGateway};
use crate::store::Store;
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What to restack
#[derive(Debug, Clone, Default)]
pub struct RestackRequest {
    pub stack_id: Uuid,
    /// Rebase the bottom branch onto this instead of the stack's base
    pub base_branch: Option<String>,
    /// Stop once this branch has been rebased
    pub stop_at: Option<String>,
}

impl RestackRequest {
    pub fn whole_stack(stack_id: Uuid) -> Self {
        Self {
            stack_id,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestackOutcome {
    /// Every requested branch was rebased and the original branch is checked out again
    Completed { rebased: Vec<String> },
    /// Stopped on a conflict; nothing above `conflict.branch` was touched
    Paused(Conflict),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContinueOutcome {
    /// No rebase is in progress
    NothingToContinue,
    /// The paused branch still has unresolved files
    StillConflicted(Conflict),
    /// A rebase not started by graphene finished
    BranchCompleted,
    /// The paused restack picked up at the next branch
    Resumed(RestackOutcome),
}

enum LoopResult {
    Finished(Vec<String>),
    Stopped(Conflict),
}

/// Drives a stack's branches through sequential rebases.
///
/// The orchestrator only reads the store. When a rebase stops on conflicts
/// the paused position goes to the journal so `continue_restack` can carry
/// on with the rest of the stack.
pub struct RebaseOrchestrator<'a> {
    store: &'a Store,
    gateway: &'a dyn VcsGateway,
    journal: &'a Journal,
}

impl<'a> RebaseOrchestrator<'a> {
    pub fn new(store: &'a Store, gateway: &'a dyn VcsGateway, journal: &'a Journal) -> Self {
        Self {
            store,
            gateway,
            journal,
        }
    }

    /// Rebase the bottom branch onto the base, then each branch onto the one below it
    pub fn restack(&self, request: RestackRequest) -> Result<RestackOutcome> {
        if self.gateway.has_uncommitted_changes()? {
            return Err(PreconditionError::UncommittedChanges.into());
        }

        if let Some(pending) = self.journal.load()? {
            return Err(PreconditionError::OperationInProgress(pending.describe().to_string()).into());
        }

        let tables = self.store.tables()?;
        let stack = tables.stack(request.stack_id)?;
        let branches: Vec<String> = tables
            .branches_in_stack(request.stack_id)?
            .into_iter()
            .map(|b| b.name)
            .collect();

        if branches.is_empty() {
            return Err(PreconditionError::EmptyStack(stack.base_branch.clone()).into());
        }

        let original_tips = branches
            .iter()
            .map(|name| Ok(self.gateway.latest_commit(name)?.sha))
            .collect::<Result<Vec<_>>>()?;

        let state = RestackState {
            stack_id: stack.id,
            stack_name: stack.name.clone(),
            original_branch: self.gateway.current_branch()?,
            base_branch: request
                .base_branch
                .unwrap_or_else(|| stack.base_branch.clone()),
            branches,
            original_tips,
            paused_at: 0,
            stop_at: request.stop_at,
            started_at: Utc::now(),
        };

        info!(
            "Restacking '{}' ({} branches) onto '{}'",
            state.stack_name,
            state.branches.len(),
            state.base_branch
        );
        self.run_from(state, 0)
    }

    /// Resume after the user resolved a paused rebase
    pub fn continue_restack(&self) -> Result<ContinueOutcome> {
        let pending = match self.journal.load()? {
            Some(PendingOperation::Restack(state)) => Some(state),
            Some(PendingOperation::Fold(_)) => {
                return Err(GrapheneError::validation(
                    "A fold is paused, not a restack",
                ))
            }
            None => None,
        };

        if !self.gateway.is_rebase_in_progress()? {
            if pending.is_some() {
                debug!("No rebase in progress, dropping stale restack record");
                self.journal.clear()?;
            }
            return Ok(ContinueOutcome::NothingToContinue);
        }

        match self.gateway.continue_rebase()? {
            StepOutcome::Conflicted(files) => {
                let branch = match pending.as_ref().and_then(|s| s.paused_branch()) {
                    Some(name) => name.to_string(),
                    None => self.gateway.current_branch()?,
                };
                Ok(ContinueOutcome::StillConflicted(Conflict { branch, files }))
            }
            StepOutcome::Clean => match pending {
                Some(state) => {
                    let next = state.resume_index();
                    info!(
                        "Rebase of '{}' completed, resuming restack",
                        state.paused_branch().unwrap_or_default()
                    );
                    let mut completed = Vec::new();
                    if let Some(paused) = state.paused_branch() {
                        completed.push(paused.to_string());
                    }
                    let outcome = self.run_from(state, next)?;
                    Ok(ContinueOutcome::Resumed(match outcome {
                        RestackOutcome::Completed { rebased } => {
                            completed.extend(rebased);
                            RestackOutcome::Completed { rebased: completed }
                        }
                        paused => paused,
                    }))
                }
                None => Ok(ContinueOutcome::BranchCompleted),
            },
        }
    }

    /// Abandon a paused restack and return to the branch it started from
    pub fn abort(&self) -> Result<Option<String>> {
        let pending = match self.journal.load()? {
            Some(PendingOperation::Restack(state)) => Some(state),
            Some(PendingOperation::Fold(_)) => {
                return Err(GrapheneError::validation("A fold is paused, not a restack"))
            }
            None => None,
        };

        if self.gateway.is_rebase_in_progress()? {
            self.gateway.abort_rebase()?;
        }

        let restored = match pending {
            Some(state) => {
                self.gateway.checkout(&state.original_branch)?;
                Some(state.original_branch)
            }
            None => None,
        };

        self.journal.clear()?;
        Ok(restored)
    }

    fn run_from(&self, mut state: RestackState, start: usize) -> Result<RestackOutcome> {
        match self.rebase_range(&mut state, start) {
            Ok(LoopResult::Finished(rebased)) => {
                self.gateway.checkout(&state.original_branch)?;
                self.journal.clear()?;
                info!("Restacked {} branch(es) of '{}'", rebased.len(), state.stack_name);
                Ok(RestackOutcome::Completed { rebased })
            }
            Ok(LoopResult::Stopped(conflict)) => {
                self.journal.save(&PendingOperation::Restack(state))?;
                Ok(RestackOutcome::Paused(conflict))
            }
            Err(e) => {
                self.recover(&state);
                Err(e)
            }
        }
    }

    fn rebase_range(&self, state: &mut RestackState, start: usize) -> Result<LoopResult> {
        let mut rebased = Vec::new();

        for i in start..state.branches.len() {
            let branch = state.branches[i].clone();
            let onto = if i == 0 {
                state.base_branch.clone()
            } else {
                state.branches[i - 1].clone()
            };

            let upstream = state.upstream_for(i).map(str::to_string);

            debug!("Rebasing '{}' onto '{}'", branch, onto);
            match self.gateway.rebase(&branch, &onto, upstream.as_deref())? {
                StepOutcome::Clean => rebased.push(branch.clone()),
                StepOutcome::Conflicted(files) => {
                    state.paused_at = i;
                    warn!("Rebase of '{}' stopped on {} file(s)", branch, files.len());
                    return Ok(LoopResult::Stopped(Conflict { branch, files }));
                }
            }

            if state.stop_at.as_deref() == Some(branch.as_str()) {
                debug!("Reached '{}', stopping", branch);
                break;
            }
        }

        Ok(LoopResult::Finished(rebased))
    }

    /// Best-effort return to the original branch after an unexpected failure
    fn recover(&self, state: &RestackState) {
        match self.gateway.is_rebase_in_progress() {
            Ok(false) => {
                if let Err(e) = self.gateway.checkout(&state.original_branch) {
                    warn!("Could not return to '{}': {}", state.original_branch, e);
                }
                if let Err(e) = self.journal.clear() {
                    warn!("Could not clear paused restack: {}", e);
                }
            }
            Ok(true) => debug!("Rebase still in progress, leaving the working tree alone"),
            Err(e) => warn!("Could not check rebase state: {}", e),
        }
    }
}
