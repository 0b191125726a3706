use crate::errors::{GrapheneError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const JOURNAL_FILE: &str = "GRAPHENE_PENDING";

/// A restack stopped on a conflict
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RestackState {
    pub stack_id: Uuid,
    pub stack_name: String,
    /// Branch checked out before the restack started
    pub original_branch: String,
    pub base_branch: String,
    /// Stack members at the time the restack started, bottom first
    pub branches: Vec<String>,
    /// Tip of each member before anything was rebased, parallel to `branches`
    #[serde(default)]
    pub original_tips: Vec<String>,
    /// Index into `branches` of the branch whose rebase is paused
    pub paused_at: usize,
    /// Stop after rebasing this branch
    pub stop_at: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl RestackState {
    pub fn paused_branch(&self) -> Option<&str> {
        self.branches.get(self.paused_at).map(String::as_str)
    }

    /// Old tip of the branch below `index`; its commits are not replayed again
    pub fn upstream_for(&self, index: usize) -> Option<&str> {
        let below = index.checked_sub(1)?;
        self.original_tips.get(below).map(String::as_str)
    }

    /// Where the loop picks up once the paused branch is done
    pub fn resume_index(&self) -> usize {
        match (self.paused_branch(), self.stop_at.as_deref()) {
            (Some(paused), Some(stop)) if paused == stop => self.branches.len(),
            _ => self.paused_at + 1,
        }
    }
}

/// A fold stopped on a merge conflict
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FoldState {
    pub stack_id: Uuid,
    /// Branch being folded away
    pub branch: String,
    /// Branch receiving the merge
    pub into: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingOperation {
    Restack(RestackState),
    Fold(FoldState),
}

impl PendingOperation {
    pub fn describe(&self) -> &'static str {
        match self {
            PendingOperation::Restack(_) => "restack",
            PendingOperation::Fold(_) => "fold",
        }
    }
}

/// Paused-operation record kept in the repository's git directory
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn in_git_dir(git_dir: &Path) -> Self {
        Self {
            path: git_dir.join(JOURNAL_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, operation: &PendingOperation) -> Result<()> {
        crate::utils::atomic_file::write_json(&self.path, operation)?;
        tracing::debug!("Saved paused {} to {:?}", operation.describe(), self.path);
        Ok(())
    }

    pub fn load(&self) -> Result<Option<PendingOperation>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let json = std::fs::read_to_string(&self.path)
            .map_err(|e| GrapheneError::config(format!("Failed to read paused operation: {e}")))?;

        let operation: PendingOperation = serde_json::from_str(&json)
            .map_err(|e| GrapheneError::config(format!("Failed to parse paused operation: {e}")))?;

        tracing::debug!("Loaded paused {} from {:?}", operation.describe(), self.path);
        Ok(Some(operation))
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).map_err(|e| {
                GrapheneError::config(format!("Failed to delete paused operation: {e}"))
            })?;
            tracing::debug!("Cleared paused operation");
        }
        Ok(())
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}
