use std::fmt;

/// Graphene Error Types
#[derive(Debug, thiserror::Error)]
pub enum GrapheneError {
    /// Git-related errors
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Stack store errors (corrupt document, broken references)
    #[error("Store error: {0}")]
    Store(String),

    /// The store document was opened but not migrated to the current schema
    #[error("Store schema is at version {found}, expected {expected}. Run the migration first.")]
    NotMigrated { found: u32, expected: u32 },

    /// The operation cannot start in the current repository state
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    /// A rebase or merge stopped on conflicting files
    #[error(transparent)]
    Conflict(#[from] Conflict),

    /// Commit history cannot be represented as a linear stack
    #[error(transparent)]
    Topology(#[from] TopologyError),

    /// A git invocation failed for a reason other than a conflict
    #[error("git {operation} failed: {message}")]
    Gateway { operation: String, message: String },

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreconditionError {
    #[error("You have uncommitted changes. Commit or stash them first.")]
    UncommittedChanges,

    #[error("Branch '{0}' is not part of a stack")]
    NotInStack(String),

    #[error("Branch '{0}' is already tracked in a stack")]
    AlreadyTracked(String),

    #[error("Branch '{0}' is not tracked in any stack")]
    NotTracked(String),

    #[error("Branch '{0}' does not exist")]
    BranchNotFound(String),

    #[error("No base branch found in history (looked for: {0})")]
    BaseBranchNotFound(String),

    #[error("No branches found between the current branch and base '{0}'")]
    EmptyStack(String),

    #[error("Branch '{0}' has no branch below it to fold into")]
    NoDownstreamBranch(String),

    #[error("Stack '{0}' not found")]
    StackNotFound(String),

    #[error("Position {position} is out of range for a stack of {len} branches")]
    InvalidPosition { position: usize, len: usize },

    #[error("A {0} is already paused. Run 'gr continue' or 'gr abort' first.")]
    OperationInProgress(String),

    #[error("Could not determine the repository name from remote '{0}'")]
    RepositoryUnresolved(String),

    #[error("'{branch}' was never merged into '{into}'; the fold was abandoned")]
    FoldNotMerged { branch: String, into: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    #[error("Multiple branches point at commit {commit}: {branches:?}")]
    MultipleBranches {
        commit: String,
        branches: Vec<String>,
    },

    #[error("Branch '{0}' appears more than once in history")]
    DuplicateBranch(String),
}

/// The branch that stopped on conflicts and the unmerged files it left behind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub branch: String,
    pub files: Vec<String>,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Conflicts in branch '{}'", self.branch)?;
        if !self.files.is_empty() {
            write!(f, ": {}", self.files.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for Conflict {}

impl GrapheneError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        GrapheneError::Config(msg.into())
    }

    pub fn store<S: Into<String>>(msg: S) -> Self {
        GrapheneError::Store(msg.into())
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        GrapheneError::Validation(msg.into())
    }

    pub fn gateway<O: Into<String>, M: Into<String>>(operation: O, message: M) -> Self {
        GrapheneError::Gateway {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            GrapheneError::Precondition(PreconditionError::NotInStack(_)) => 2,
            GrapheneError::Precondition(
                PreconditionError::AlreadyTracked(_) | PreconditionError::NotTracked(_),
            ) => 3,
            GrapheneError::Precondition(PreconditionError::UncommittedChanges) => 4,
            GrapheneError::Conflict(_) => 5,
            GrapheneError::Topology(_) => 6,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, GrapheneError>;
