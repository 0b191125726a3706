//! Rebuild a stack definition from the current branch's commit history.

use super::position;
use crate::config::Settings;
use crate::errors::{PreconditionError, Result, TopologyError};
use crate::git::VcsGateway;
use crate::store::{Store, TrackedBranch};
use tracing::{debug, info};
use uuid::Uuid;

/// Local branch names decorating one history line.
///
/// Lines look like `<hash>` or `<hash> (HEAD -> feat-c, feat-x, tag: v1)`.
/// Only the first parenthesized group is read; `HEAD` markers and tags are
/// not branch names.
pub fn parse_decorations(line: &str) -> Vec<String> {
    let Some(open) = line.find('(') else {
        return Vec::new();
    };
    let Some(len) = line[open + 1..].find(')') else {
        return Vec::new();
    };

    line[open + 1..open + 1 + len]
        .split(',')
        .map(str::trim)
        .map(|d| d.strip_prefix("HEAD -> ").unwrap_or(d))
        .filter(|d| !d.is_empty() && *d != "HEAD" && !d.starts_with("tag:"))
        .map(str::to_string)
        .collect()
}

/// Branch names found between the tip and the first base branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryScan {
    pub base_branch: String,
    /// Newest first
    pub branches: Vec<String>,
}

/// Walk `history` (newest first) until a base branch decorates a commit
pub fn scan_history(history: &[String], base_branches: &[String]) -> Result<HistoryScan> {
    let mut collected: Vec<String> = Vec::new();

    for line in history {
        let names = parse_decorations(line);
        if names.is_empty() {
            continue;
        }

        if names.len() > 1 {
            return Err(TopologyError::MultipleBranches {
                commit: line.split_whitespace().next().unwrap_or_default().to_string(),
                branches: names,
            }
            .into());
        }

        let name = names.into_iter().next().unwrap_or_default();
        if collected.contains(&name) {
            return Err(TopologyError::DuplicateBranch(name).into());
        }

        if base_branches.contains(&name) {
            debug!("Reached base branch '{}' after {} branch(es)", name, collected.len());
            if collected.is_empty() {
                return Err(PreconditionError::EmptyStack(name).into());
            }
            return Ok(HistoryScan {
                base_branch: name,
                branches: collected,
            });
        }

        collected.push(name);
    }

    Err(PreconditionError::BaseBranchNotFound(base_branches.join(", ")).into())
}

/// Result of a successful import
#[derive(Debug, Clone)]
pub struct ImportedStack {
    pub stack_id: Uuid,
    pub stack_name: String,
    pub base_branch: String,
    /// Bottom first
    pub branches: Vec<TrackedBranch>,
}

pub struct HistoryImporter<'a> {
    store: &'a mut Store,
    gateway: &'a dyn VcsGateway,
    settings: &'a Settings,
}

impl<'a> HistoryImporter<'a> {
    pub fn new(store: &'a mut Store, gateway: &'a dyn VcsGateway, settings: &'a Settings) -> Self {
        Self {
            store,
            gateway,
            settings,
        }
    }

    /// Base branches configured for the repository, or the gateway default
    pub fn base_branches(&self, repository_name: &str) -> Result<Vec<String>> {
        match self.store.tables()?.repository(repository_name) {
            Some(repo) if !repo.base_branches.is_empty() => Ok(repo.base_branches.clone()),
            _ => Ok(vec![self.gateway.default_base_branch()?]),
        }
    }

    /// Create a stack named after `name` from the branches below HEAD.
    ///
    /// Nothing is written unless the whole stack can be recorded.
    pub fn import_stack(&mut self, name: &str, repository_name: &str) -> Result<ImportedStack> {
        let base_branches = self.base_branches(repository_name)?;
        let history = self.gateway.commit_history()?;
        debug!("Scanning {} commit(s) for stack branches", history.len());

        let scan = scan_history(&history, &base_branches)?;

        let tables = self.store.tables()?;
        if let Some(tracked) = scan
            .branches
            .iter()
            .find(|b| tables.is_tracked(repository_name, b))
        {
            return Err(PreconditionError::AlreadyTracked(tracked.clone()).into());
        }

        let stack_name = self.settings.stack_name_for(name);
        let ordered: Vec<String> = scan.branches.into_iter().rev().collect();
        let base_branch = scan.base_branch;

        let (stack_id, branches) = self.store.transaction(|tables| {
            let stack_id = tables.create_stack(repository_name, &stack_name, &base_branch, None)?;
            let branches = ordered
                .iter()
                .enumerate()
                .map(|(i, branch)| position::insert_at(tables, stack_id, i, branch))
                .collect::<Result<Vec<_>>>()?;
            Ok((stack_id, branches))
        })?;

        info!(
            "Imported stack '{}' with {} branch(es) on '{}'",
            stack_name,
            branches.len(),
            base_branch
        );

        Ok(ImportedStack {
            stack_id,
            stack_name,
            base_branch,
            branches,
        })
    }
}
