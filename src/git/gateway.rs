use crate::errors::Result;

/// Result of a rebase or merge step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Clean,
    /// Stopped with these unmerged paths; the operation is still in progress
    Conflicted(Vec<String>),
}

/// Tip commit of a branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub author: String,
}

/// The version-control operations stack management is built on.
///
/// Every call blocks until git is done. A step that stops on conflicts
/// returns `StepOutcome::Conflicted`; any other failure is an error.
pub trait VcsGateway {
    /// `owner/name` parsed from the remote URL
    fn repository_name(&self) -> Result<String>;

    fn current_branch(&self) -> Result<String>;

    /// Best guess at the trunk when the repository has no configured base branches
    fn default_base_branch(&self) -> Result<String>;

    fn list_branches(&self) -> Result<Vec<String>>;

    fn branch_exists(&self, name: &str) -> Result<bool>;

    /// Create `name` at HEAD and check it out
    fn create_branch(&self, name: &str) -> Result<()>;

    fn checkout(&self, name: &str) -> Result<()>;

    /// Staged or unstaged changes to tracked files
    fn has_uncommitted_changes(&self) -> Result<bool>;

    /// Rebase `source` onto `onto`, leaving `source` checked out.
    ///
    /// With `upstream`, only the commits of `source` not reachable from it are
    /// replayed (`git rebase --onto <onto> <upstream> <source>`).
    fn rebase(&self, source: &str, onto: &str, upstream: Option<&str>) -> Result<StepOutcome>;

    fn continue_rebase(&self) -> Result<StepOutcome>;

    fn abort_rebase(&self) -> Result<()>;

    fn is_rebase_in_progress(&self) -> Result<bool>;

    fn conflicted_files(&self) -> Result<Vec<String>>;

    /// Merge `source` into the checked-out branch
    fn merge_branch(&self, source: &str) -> Result<StepOutcome>;

    /// Commit a merge whose conflicts have been resolved and staged
    fn continue_merge(&self) -> Result<StepOutcome>;

    fn abort_merge(&self) -> Result<()>;

    fn is_merge_in_progress(&self) -> Result<bool>;

    /// Whether the tip of `ancestor` is reachable from the tip of `descendant`
    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool>;

    /// History of HEAD, newest first, as `<hash>` or `<hash> (<branch>, <branch>)` lines
    fn commit_history(&self) -> Result<Vec<String>>;

    fn latest_commit(&self, branch: &str) -> Result<CommitInfo>;
}
