use super::journal::{FoldState, Journal, PendingOperation};
use super::position;
use super::rebase::{RebaseOrchestrator, RestackOutcome, RestackRequest};
use crate::config::Settings;
use crate::errors::{Conflict, GrapheneError, PreconditionError, Result};
use crate::git::{StepOutcome, VcsGateway};
use crate::store::{BranchRecord, BranchStatus, StackRecord, StackSummary, Store, TrackedBranch};
use chrono::Utc;
use tracing::{debug, info, warn};

/// The stack containing the checked-out branch
#[derive(Debug, Clone)]
pub struct CurrentStack {
    pub stack: StackRecord,
    pub branch: TrackedBranch,
}

/// Tracked branches of one stack, bottom first
#[derive(Debug, Clone)]
pub struct BranchGroup {
    pub stack: StackSummary,
    pub branches: Vec<TrackedBranch>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FoldOutcome {
    /// `branch` was merged into `into` and removed from its stack
    Folded { branch: String, into: String },
    /// The merge into the branch below stopped on conflicts
    Paused(Conflict),
}

/// Branch membership and navigation for the repository's stacks
pub struct StackManager<'a> {
    store: &'a mut Store,
    gateway: &'a dyn VcsGateway,
    journal: &'a Journal,
    settings: &'a Settings,
    repository_name: String,
}

impl<'a> StackManager<'a> {
    pub fn new(
        store: &'a mut Store,
        gateway: &'a dyn VcsGateway,
        journal: &'a Journal,
        settings: &'a Settings,
    ) -> Result<Self> {
        let repository_name = gateway.repository_name()?;
        Ok(Self {
            store,
            gateway,
            journal,
            settings,
            repository_name,
        })
    }

    pub fn repository_name(&self) -> &str {
        &self.repository_name
    }

    pub fn current_branch(&self) -> Result<String> {
        self.gateway.current_branch()
    }

    /// Stack of the checked-out branch; `NotInStack` when it is untracked
    pub fn current_stack(&self) -> Result<CurrentStack> {
        let current = self.gateway.current_branch()?;
        let tables = self.store.tables()?;
        let branch = tables
            .find_tracked(&self.repository_name, &current)?
            .ok_or(PreconditionError::NotInStack(current))?;
        let stack = tables.stack(branch.stack_id)?.clone();
        Ok(CurrentStack { stack, branch })
    }

    /// Replace the repository's configured base branches
    pub fn configure_repository(&mut self, base_branches: Vec<String>) -> Result<()> {
        if base_branches.is_empty() {
            return Err(GrapheneError::validation("Select at least one base branch"));
        }
        for branch in &base_branches {
            if !self.gateway.branch_exists(branch)? {
                return Err(PreconditionError::BranchNotFound(branch.clone()).into());
            }
        }

        let name = self.repository_name.clone();
        self.store.transaction(|tables| {
            tables.upsert_repository(&name, base_branches);
            Ok(())
        })?;
        info!("Configured repository '{}'", self.repository_name);
        Ok(())
    }

    /// Configured base branches, or the gateway's default when unconfigured
    pub fn list_base_branches(&self) -> Result<Vec<String>> {
        match self.store.tables()?.repository(&self.repository_name) {
            Some(repo) if !repo.base_branches.is_empty() => Ok(repo.base_branches.clone()),
            _ => Ok(vec![self.gateway.default_base_branch()?]),
        }
    }

    /// Local branches offered when configuring base branches, with the
    /// configured candidates that exist pre-selected
    pub fn base_branch_candidates(&self) -> Result<Vec<(String, bool)>> {
        let configured = self
            .store
            .tables()?
            .repository(&self.repository_name)
            .map(|r| r.base_branches.clone())
            .unwrap_or_default();

        Ok(self
            .gateway
            .list_branches()?
            .into_iter()
            .map(|b| {
                let selected = if configured.is_empty() {
                    self.settings.stack.base_candidates.contains(&b)
                } else {
                    configured.contains(&b)
                };
                (b, selected)
            })
            .collect())
    }

    /// Create `name` at HEAD and track it directly above the current branch.
    ///
    /// From an untracked branch this starts a new stack based on it.
    pub fn create_branch_in_stack(&mut self, name: &str) -> Result<TrackedBranch> {
        let current = self.gateway.current_branch()?;
        let tables = self.store.tables()?;
        if tables.is_tracked(&self.repository_name, name) {
            return Err(PreconditionError::AlreadyTracked(name.to_string()).into());
        }
        if self.gateway.branch_exists(name)? {
            return Err(GrapheneError::validation(format!(
                "Branch '{name}' already exists; use track to add it"
            )));
        }
        let parent = tables.find_tracked(&self.repository_name, &current)?;

        self.gateway.create_branch(name)?;
        let commit = self.gateway.latest_commit(name)?;

        let repository_name = self.repository_name.clone();
        let stack_name = self.settings.stack_name_for(name);
        let result = self.store.transaction(|tables| {
            let (stack_id, at) = match &parent {
                Some(parent) => (parent.stack_id, parent.position + 1),
                None => (
                    tables.create_stack(&repository_name, &stack_name, &current, None)?,
                    0,
                ),
            };
            let branch = position::insert_at(tables, stack_id, at, name)?;
            tables.set_latest_commit(branch.id, &commit.sha)?;
            tables.add_commit(branch.id, &commit.sha, &commit.message, &commit.author)?;
            tables
                .tracked_branch(branch.id)?
                .ok_or_else(|| GrapheneError::store(format!("Branch '{name}' vanished")))
        });

        if result.is_err() {
            warn!("Branch '{}' was created in git but could not be tracked", name);
        }
        result
    }

    /// Add an existing branch to the top of the current stack
    pub fn track_branch(&mut self, name: &str) -> Result<TrackedBranch> {
        if !self.gateway.branch_exists(name)? {
            return Err(PreconditionError::BranchNotFound(name.to_string()).into());
        }
        if self.store.tables()?.is_tracked(&self.repository_name, name) {
            return Err(PreconditionError::AlreadyTracked(name.to_string()).into());
        }

        let current = self.current_stack()?;
        let stack_id = current.stack.id;
        let top = current.stack.branch_ids.len();
        self.store
            .transaction(|tables| position::insert_at(tables, stack_id, top, name))
    }

    /// Remove a branch from its stack; the git branch is left alone
    pub fn untrack_branch(&mut self, name: &str) -> Result<BranchRecord> {
        let branch = self
            .store
            .tables()?
            .find_tracked(&self.repository_name, name)?
            .ok_or_else(|| PreconditionError::NotTracked(name.to_string()))?;

        self.store
            .transaction(|tables| position::remove_at(tables, branch.stack_id, branch.position))
    }

    /// Restack the current stack up to and including the checked-out branch
    pub fn restack_current(&self) -> Result<RestackOutcome> {
        let current = self.current_stack()?;
        let orchestrator = RebaseOrchestrator::new(&*self.store, self.gateway, self.journal);
        orchestrator.restack(RestackRequest {
            stack_id: current.stack.id,
            base_branch: None,
            stop_at: Some(current.branch.name),
        })
    }

    /// Restack a whole stack regardless of the checked-out branch
    pub fn restack_stack(&self, stack_name: &str) -> Result<RestackOutcome> {
        let stack_id = self
            .store
            .tables()?
            .stack_by_name(&self.repository_name, stack_name)
            .map(|s| s.id)
            .ok_or_else(|| PreconditionError::StackNotFound(stack_name.to_string()))?;
        RebaseOrchestrator::new(&*self.store, self.gateway, self.journal)
            .restack(RestackRequest::whole_stack(stack_id))
    }

    /// Merge the current branch into the one below and untrack it
    pub fn fold(&mut self) -> Result<FoldOutcome> {
        if self.gateway.has_uncommitted_changes()? {
            return Err(PreconditionError::UncommittedChanges.into());
        }
        if let Some(pending) = self.journal.load()? {
            return Err(PreconditionError::OperationInProgress(pending.describe().to_string()).into());
        }

        let current = self.current_stack()?;
        let into = self
            .downstream_of(&current)?
            .ok_or_else(|| PreconditionError::NoDownstreamBranch(current.branch.name.clone()))?;
        let branch = current.branch.name;

        debug!("Folding '{}' into '{}'", branch, into);
        self.gateway.checkout(&into)?;

        match self.gateway.merge_branch(&branch)? {
            StepOutcome::Clean => self.finish_fold(&branch, &into),
            StepOutcome::Conflicted(files) => {
                self.journal.save(&PendingOperation::Fold(FoldState {
                    stack_id: current.stack.id,
                    branch,
                    into: into.clone(),
                    started_at: Utc::now(),
                }))?;
                warn!("Fold into '{}' stopped on {} file(s)", into, files.len());
                Ok(FoldOutcome::Paused(Conflict { branch: into, files }))
            }
        }
    }

    /// Commit a resolved fold merge and untrack the folded branch
    pub fn continue_fold(&mut self) -> Result<FoldOutcome> {
        let state = match self.journal.load()? {
            Some(PendingOperation::Fold(state)) => state,
            _ => return Err(GrapheneError::validation("No fold in progress")),
        };

        if self.gateway.is_merge_in_progress()? {
            if let StepOutcome::Conflicted(files) = self.gateway.continue_merge()? {
                return Ok(FoldOutcome::Paused(Conflict {
                    branch: state.into,
                    files,
                }));
            }
        } else {
            debug!("No merge in progress, checking '{}' reached '{}'", state.branch, state.into);
        }

        if !self.gateway.is_ancestor(&state.branch, &state.into)? {
            self.journal.clear()?;
            return Err(PreconditionError::FoldNotMerged {
                branch: state.branch,
                into: state.into,
            }
            .into());
        }

        self.finish_fold(&state.branch, &state.into)
    }

    /// Abandon a paused fold and return to the folded branch
    pub fn abort_fold(&mut self) -> Result<String> {
        let state = match self.journal.load()? {
            Some(PendingOperation::Fold(state)) => state,
            _ => return Err(GrapheneError::validation("No fold in progress")),
        };

        if self.gateway.is_merge_in_progress()? {
            self.gateway.abort_merge()?;
        }
        self.gateway.checkout(&state.branch)?;
        self.journal.clear()?;
        Ok(state.branch)
    }

    fn finish_fold(&mut self, branch: &str, into: &str) -> Result<FoldOutcome> {
        let commit = self.gateway.latest_commit(into)?;
        let folded = self
            .store
            .tables()?
            .find_tracked(&self.repository_name, branch)?
            .ok_or_else(|| PreconditionError::NotTracked(branch.to_string()))?;
        let target = self.store.tables()?.find_tracked(&self.repository_name, into)?;

        self.store.transaction(|tables| {
            position::remove_at(tables, folded.stack_id, folded.position)?;
            if let Some(target) = &target {
                tables.set_latest_commit(target.id, &commit.sha)?;
            }
            Ok(())
        })?;
        self.journal.clear()?;

        info!("Folded '{}' into '{}'", branch, into);
        Ok(FoldOutcome::Folded {
            branch: branch.to_string(),
            into: into.to_string(),
        })
    }

    pub fn rename_current_stack(&mut self, new_name: &str) -> Result<String> {
        let current = self.current_stack()?;
        let old_name = current.stack.name;
        let stack_id = current.stack.id;
        self.store
            .transaction(|tables| tables.rename_stack(stack_id, new_name))?;
        info!("Renamed stack '{}' to '{}'", old_name, new_name);
        Ok(old_name)
    }

    /// Branch directly above the current one
    pub fn upstream_branch(&self) -> Result<Option<String>> {
        let current = self.current_stack()?;
        let members = self.store.tables()?.branches_in_stack(current.stack.id)?;
        Ok(members
            .get(current.branch.position + 1)
            .map(|b| b.name.clone()))
    }

    /// Branch directly below the current one
    pub fn downstream_branch(&self) -> Result<Option<String>> {
        let current = self.current_stack()?;
        self.downstream_of(&current)
    }

    fn downstream_of(&self, current: &CurrentStack) -> Result<Option<String>> {
        let Some(below) = current.branch.position.checked_sub(1) else {
            return Ok(None);
        };
        let members = self.store.tables()?.branches_in_stack(current.stack.id)?;
        Ok(members.get(below).map(|b| b.name.clone()))
    }

    /// Check out the branch above; `None` at the top of the stack
    pub fn up(&self) -> Result<Option<String>> {
        let current = self.gateway.current_branch()?;
        if self.list_base_branches()?.contains(&current) {
            return Err(GrapheneError::validation(format!(
                "'{current}' is a base branch"
            )));
        }

        let target = self.upstream_branch()?;
        if let Some(name) = &target {
            self.gateway.checkout(name)?;
        }
        Ok(target)
    }

    /// Check out the branch below, or the stack's base from the bottom branch
    pub fn down(&self) -> Result<String> {
        let current = self.current_stack()?;
        let target = self
            .downstream_of(&current)?
            .unwrap_or(current.stack.base_branch);
        self.gateway.checkout(&target)?;
        Ok(target)
    }

    pub fn list_stacks(&self) -> Result<Vec<StackSummary>> {
        Ok(self.store.tables()?.stack_summaries(&self.repository_name))
    }

    /// Every tracked branch of the repository, grouped by stack
    pub fn list_branches(&self) -> Result<Vec<BranchGroup>> {
        let tables = self.store.tables()?;
        tables
            .stack_summaries(&self.repository_name)
            .into_iter()
            .map(|stack| {
                let branches = tables.branches_in_stack(stack.id)?;
                Ok(BranchGroup { stack, branches })
            })
            .collect()
    }

    /// Delete stacks by name with all of their branch records
    pub fn delete_stacks(&mut self, names: &[String]) -> Result<usize> {
        let tables = self.store.tables()?;
        let ids = names
            .iter()
            .map(|name| {
                tables
                    .stack_by_name(&self.repository_name, name)
                    .map(|s| s.id)
                    .ok_or_else(|| PreconditionError::StackNotFound(name.clone()).into())
            })
            .collect::<Result<Vec<_>>>()?;

        self.store.transaction(|tables| {
            for id in &ids {
                tables.delete_stack(*id)?;
            }
            Ok(ids.len())
        })
    }

    pub fn parent_branch(&self, name: &str) -> Result<Option<String>> {
        let tables = self.store.tables()?;
        let Some(branch) = tables.find_tracked(&self.repository_name, name)? else {
            return Ok(None);
        };
        match branch.parent_id {
            Some(parent_id) => Ok(tables.tracked_branch(parent_id)?.map(|p| p.name)),
            None => Ok(None),
        }
    }

    pub fn stack_for_branch(&self, name: &str) -> Result<Option<String>> {
        let tables = self.store.tables()?;
        match tables.find_tracked(&self.repository_name, name)? {
            Some(branch) => Ok(Some(tables.stack(branch.stack_id)?.name.clone())),
            None => Ok(None),
        }
    }

    pub fn set_branch_status(&mut self, name: &str, status: BranchStatus) -> Result<()> {
        let branch = self
            .store
            .tables()?
            .find_tracked(&self.repository_name, name)?
            .ok_or_else(|| PreconditionError::NotTracked(name.to_string()))?;
        self.store
            .transaction(|tables| tables.set_branch_status(branch.id, status))?;
        info!("Marked '{}' as {}", name, status);
        Ok(())
    }
}
