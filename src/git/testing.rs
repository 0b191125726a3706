//! In-memory `VcsGateway` for unit tests.

use super::gateway::{CommitInfo, StepOutcome, VcsGateway};
use crate::errors::{GrapheneError, PreconditionError, Result};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Default)]
struct FakeState {
    repository_name: String,
    current: String,
    branches: Vec<String>,
    dirty: bool,
    history: Vec<String>,
    rebase_open: bool,
    merge_open: bool,
    open_conflicts: Vec<String>,
    rebase_conflicts: HashMap<String, Vec<String>>,
    merge_conflicts: HashMap<String, Vec<String>>,
    continue_conflicts: VecDeque<Vec<String>>,
    failing_rebases: HashSet<String>,
    rebase_upstreams: Vec<Option<String>>,
    /// `(source, into)` pairs whose merge has been committed
    merged: HashSet<(String, String)>,
    open_merge: Option<(String, String)>,
    calls: Vec<String>,
}

/// Records every mutating call and replays scripted conflicts
pub struct FakeGateway {
    state: RefCell<FakeState>,
}

impl FakeGateway {
    /// A repository `acme/widgets` with `branches` and the first one checked out
    pub fn new(branches: &[&str]) -> Self {
        let branches: Vec<String> = branches.iter().map(|b| b.to_string()).collect();
        Self {
            state: RefCell::new(FakeState {
                repository_name: "acme/widgets".to_string(),
                current: branches.first().cloned().unwrap_or_else(|| "main".to_string()),
                branches,
                ..Default::default()
            }),
        }
    }

    pub fn on_branch(self, name: &str) -> Self {
        self.state.borrow_mut().current = name.to_string();
        self
    }

    pub fn with_history(self, lines: &[&str]) -> Self {
        self.state.borrow_mut().history = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.state.borrow_mut().dirty = dirty;
    }

    /// Rebasing `branch` stops on `files`
    pub fn conflict_on_rebase(&self, branch: &str, files: &[&str]) {
        self.state
            .borrow_mut()
            .rebase_conflicts
            .insert(branch.to_string(), files.iter().map(|f| f.to_string()).collect());
    }

    /// Merging `branch` stops on `files`
    pub fn conflict_on_merge(&self, branch: &str, files: &[&str]) {
        self.state
            .borrow_mut()
            .merge_conflicts
            .insert(branch.to_string(), files.iter().map(|f| f.to_string()).collect());
    }

    /// The next continue stops again on `files`
    pub fn conflict_on_continue(&self, files: &[&str]) {
        self.state
            .borrow_mut()
            .continue_conflicts
            .push_back(files.iter().map(|f| f.to_string()).collect());
    }

    /// Rebasing `branch` fails without leaving a rebase open
    pub fn fail_rebase(&self, branch: &str) {
        self.state.borrow_mut().failing_rebases.insert(branch.to_string());
    }

    /// Pretend the user started a rebase by hand
    pub fn open_rebase(&self, files: &[&str]) {
        let mut state = self.state.borrow_mut();
        state.rebase_open = true;
        state.open_conflicts = files.iter().map(|f| f.to_string()).collect();
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// Only the `rebase ...` calls, in order
    pub fn rebase_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with("rebase "))
            .collect()
    }

    /// The `upstream` passed to each rebase, in order
    pub fn rebase_upstreams(&self) -> Vec<Option<String>> {
        self.state.borrow().rebase_upstreams.clone()
    }

    /// Tip sha reported for `branch`
    pub fn tip_of(branch: &str) -> String {
        let hex: String = branch.bytes().map(|b| format!("{b:02x}")).collect();
        format!("{hex:0>40}")
    }

    fn record(&self, call: String) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl VcsGateway for FakeGateway {
    fn repository_name(&self) -> Result<String> {
        Ok(self.state.borrow().repository_name.clone())
    }

    fn current_branch(&self) -> Result<String> {
        Ok(self.state.borrow().current.clone())
    }

    fn default_base_branch(&self) -> Result<String> {
        let state = self.state.borrow();
        if state.branches.iter().any(|b| b == "master") && !state.branches.iter().any(|b| b == "main") {
            return Ok("master".to_string());
        }
        Ok("main".to_string())
    }

    fn list_branches(&self) -> Result<Vec<String>> {
        let mut branches = self.state.borrow().branches.clone();
        branches.sort();
        Ok(branches)
    }

    fn branch_exists(&self, name: &str) -> Result<bool> {
        Ok(self.state.borrow().branches.iter().any(|b| b == name))
    }

    fn create_branch(&self, name: &str) -> Result<()> {
        self.record(format!("create {name}"));
        let mut state = self.state.borrow_mut();
        if state.branches.iter().any(|b| b == name) {
            return Err(GrapheneError::gateway("branch", format!("'{name}' already exists")));
        }
        state.branches.push(name.to_string());
        state.current = name.to_string();
        Ok(())
    }

    fn checkout(&self, name: &str) -> Result<()> {
        self.record(format!("checkout {name}"));
        let mut state = self.state.borrow_mut();
        if !state.branches.iter().any(|b| b == name) {
            return Err(PreconditionError::BranchNotFound(name.to_string()).into());
        }
        state.current = name.to_string();
        Ok(())
    }

    fn has_uncommitted_changes(&self) -> Result<bool> {
        Ok(self.state.borrow().dirty)
    }

    fn rebase(&self, source: &str, onto: &str, upstream: Option<&str>) -> Result<StepOutcome> {
        self.record(format!("rebase {source} onto {onto}"));
        let mut state = self.state.borrow_mut();
        state.rebase_upstreams.push(upstream.map(str::to_string));
        if state.failing_rebases.contains(source) {
            return Err(GrapheneError::gateway("rebase", format!("fatal: cannot rebase {source}")));
        }
        state.current = source.to_string();
        if let Some(files) = state.rebase_conflicts.remove(source) {
            state.rebase_open = true;
            state.open_conflicts = files.clone();
            return Ok(StepOutcome::Conflicted(files));
        }
        Ok(StepOutcome::Clean)
    }

    fn continue_rebase(&self) -> Result<StepOutcome> {
        self.record("rebase --continue".to_string());
        let mut state = self.state.borrow_mut();
        if !state.rebase_open {
            return Err(GrapheneError::gateway("rebase --continue", "No rebase in progress?"));
        }
        if let Some(files) = state.continue_conflicts.pop_front() {
            state.open_conflicts = files.clone();
            return Ok(StepOutcome::Conflicted(files));
        }
        state.rebase_open = false;
        state.open_conflicts.clear();
        Ok(StepOutcome::Clean)
    }

    fn abort_rebase(&self) -> Result<()> {
        self.record("rebase --abort".to_string());
        let mut state = self.state.borrow_mut();
        state.rebase_open = false;
        state.open_conflicts.clear();
        Ok(())
    }

    fn is_rebase_in_progress(&self) -> Result<bool> {
        Ok(self.state.borrow().rebase_open)
    }

    fn conflicted_files(&self) -> Result<Vec<String>> {
        Ok(self.state.borrow().open_conflicts.clone())
    }

    fn merge_branch(&self, source: &str) -> Result<StepOutcome> {
        let into = self.current_branch()?;
        self.record(format!("merge {source} into {into}"));
        let mut state = self.state.borrow_mut();
        if let Some(files) = state.merge_conflicts.remove(source) {
            state.merge_open = true;
            state.open_merge = Some((source.to_string(), into));
            state.open_conflicts = files.clone();
            return Ok(StepOutcome::Conflicted(files));
        }
        state.merged.insert((source.to_string(), into));
        Ok(StepOutcome::Clean)
    }

    fn continue_merge(&self) -> Result<StepOutcome> {
        self.record("merge --continue".to_string());
        let mut state = self.state.borrow_mut();
        if let Some(files) = state.continue_conflicts.pop_front() {
            state.open_conflicts = files.clone();
            return Ok(StepOutcome::Conflicted(files));
        }
        state.merge_open = false;
        state.open_conflicts.clear();
        if let Some(pair) = state.open_merge.take() {
            state.merged.insert(pair);
        }
        Ok(StepOutcome::Clean)
    }

    fn abort_merge(&self) -> Result<()> {
        self.record("merge --abort".to_string());
        let mut state = self.state.borrow_mut();
        state.merge_open = false;
        state.open_merge = None;
        state.open_conflicts.clear();
        Ok(())
    }

    fn is_merge_in_progress(&self) -> Result<bool> {
        Ok(self.state.borrow().merge_open)
    }

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        let state = self.state.borrow();
        Ok(ancestor == descendant
            || state
                .merged
                .contains(&(ancestor.to_string(), descendant.to_string())))
    }

    fn commit_history(&self) -> Result<Vec<String>> {
        Ok(self.state.borrow().history.clone())
    }

    fn latest_commit(&self, branch: &str) -> Result<CommitInfo> {
        if !self.branch_exists(branch)? {
            return Err(PreconditionError::BranchNotFound(branch.to_string()).into());
        }
        Ok(CommitInfo {
            sha: Self::tip_of(branch),
            message: format!("Work on {branch}"),
            author: "Test".to_string(),
        })
    }
}
