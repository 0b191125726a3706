use crate::errors::{GrapheneError, PreconditionError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle status of a tracked branch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchStatus {
    #[default]
    Active,
    Merged,
    Abandoned,
}

impl fmt::Display for BranchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BranchStatus::Active => "active",
            BranchStatus::Merged => "merged",
            BranchStatus::Abandoned => "abandoned",
        };
        f.write_str(s)
    }
}

impl FromStr for BranchStatus {
    type Err = GrapheneError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(BranchStatus::Active),
            "merged" => Ok(BranchStatus::Merged),
            "abandoned" => Ok(BranchStatus::Abandoned),
            other => Err(GrapheneError::validation(format!(
                "Unknown branch status '{other}' (expected active, merged or abandoned)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    /// `owner/name` derived from the remote URL
    pub name: String,
    pub base_branches: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackRecord {
    pub id: Uuid,
    pub name: String,
    pub repository_name: String,
    pub base_branch: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Member branches, bottom first. The only record of ordering.
    #[serde(default)]
    pub branch_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRecord {
    pub id: Uuid,
    pub name: String,
    pub stack_id: Uuid,
    #[serde(default)]
    pub status: BranchStatus,
    #[serde(default)]
    pub latest_commit: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub id: Uuid,
    pub branch_id: Uuid,
    pub sha: String,
    pub message: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

/// A stack member with its position and parent derived from the stack's ordering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedBranch {
    pub id: Uuid,
    pub name: String,
    pub stack_id: Uuid,
    pub position: usize,
    pub parent_id: Option<Uuid>,
    pub status: BranchStatus,
    pub latest_commit: Option<String>,
}

/// Summary row for listing stacks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSummary {
    pub id: Uuid,
    pub name: String,
    pub base_branch: String,
    pub branch_count: usize,
}

/// All persisted rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tables {
    pub repositories: BTreeMap<String, RepositoryRecord>,
    pub stacks: BTreeMap<Uuid, StackRecord>,
    pub branches: BTreeMap<Uuid, BranchRecord>,
    pub commits: Vec<CommitRecord>,
}

impl Tables {
    pub fn repository(&self, name: &str) -> Option<&RepositoryRecord> {
        self.repositories.get(name)
    }

    /// Insert or replace the repository's base branches
    pub fn upsert_repository(&mut self, name: &str, base_branches: Vec<String>) {
        let mut seen = HashSet::new();
        let base_branches = base_branches
            .into_iter()
            .filter(|b| seen.insert(b.clone()))
            .collect();

        self.repositories.insert(
            name.to_string(),
            RepositoryRecord {
                name: name.to_string(),
                base_branches,
            },
        );
    }

    /// Make sure a repository row exists without touching its base branches
    pub fn ensure_repository(&mut self, name: &str) {
        if !self.repositories.contains_key(name) {
            self.upsert_repository(name, Vec::new());
        }
    }

    /// Delete a repository and every stack that belongs to it
    pub fn delete_repository(&mut self, name: &str) -> bool {
        let stack_ids: Vec<Uuid> = self
            .stacks
            .values()
            .filter(|s| s.repository_name == name)
            .map(|s| s.id)
            .collect();

        for id in stack_ids {
            self.remove_stack_rows(id);
        }

        self.repositories.remove(name).is_some()
    }

    /// Create an empty stack; members are added through the position functions
    pub fn create_stack(
        &mut self,
        repository_name: &str,
        name: &str,
        base_branch: &str,
        description: Option<String>,
    ) -> Result<Uuid> {
        if self.stack_by_name(repository_name, name).is_some() {
            return Err(GrapheneError::validation(format!(
                "Stack '{name}' already exists"
            )));
        }

        self.ensure_repository(repository_name);

        let now = Utc::now();
        let id = Uuid::new_v4();
        self.stacks.insert(
            id,
            StackRecord {
                id,
                name: name.to_string(),
                repository_name: repository_name.to_string(),
                base_branch: base_branch.to_string(),
                description,
                branch_ids: Vec::new(),
                created_at: now,
                updated_at: now,
            },
        );

        tracing::info!("Created stack '{}' on base '{}'", name, base_branch);
        Ok(id)
    }

    pub fn stack(&self, id: Uuid) -> Result<&StackRecord> {
        self.stacks
            .get(&id)
            .ok_or_else(|| PreconditionError::StackNotFound(id.to_string()).into())
    }

    pub fn stack_mut(&mut self, id: Uuid) -> Result<&mut StackRecord> {
        self.stacks
            .get_mut(&id)
            .ok_or_else(|| PreconditionError::StackNotFound(id.to_string()).into())
    }

    pub fn stack_by_name(&self, repository_name: &str, name: &str) -> Option<&StackRecord> {
        self.stacks
            .values()
            .find(|s| s.repository_name == repository_name && s.name == name)
    }

    /// Stacks of a repository, oldest first
    pub fn stacks_for_repository(&self, repository_name: &str) -> Vec<&StackRecord> {
        let mut stacks: Vec<&StackRecord> = self
            .stacks
            .values()
            .filter(|s| s.repository_name == repository_name)
            .collect();
        stacks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        stacks
    }

    pub fn stack_summaries(&self, repository_name: &str) -> Vec<StackSummary> {
        self.stacks_for_repository(repository_name)
            .into_iter()
            .map(|s| StackSummary {
                id: s.id,
                name: s.name.clone(),
                base_branch: s.base_branch.clone(),
                branch_count: s.branch_ids.len(),
            })
            .collect()
    }

    /// Delete a stack with its branches and their commits
    pub fn delete_stack(&mut self, id: Uuid) -> Result<StackRecord> {
        self.stack(id)?;
        let stack = self.remove_stack_rows(id);
        stack.ok_or_else(|| PreconditionError::StackNotFound(id.to_string()).into())
    }

    fn remove_stack_rows(&mut self, id: Uuid) -> Option<StackRecord> {
        let stack = self.stacks.remove(&id)?;
        for branch_id in &stack.branch_ids {
            self.branches.remove(branch_id);
        }
        self.commits.retain(|c| !stack.branch_ids.contains(&c.branch_id));
        tracing::info!("Deleted stack '{}'", stack.name);
        Some(stack)
    }

    pub fn rename_stack(&mut self, id: Uuid, new_name: &str) -> Result<()> {
        let repository_name = self.stack(id)?.repository_name.clone();
        if let Some(existing) = self.stack_by_name(&repository_name, new_name) {
            if existing.id != id {
                return Err(GrapheneError::validation(format!(
                    "Stack '{new_name}' already exists"
                )));
            }
        }

        let stack = self.stack_mut(id)?;
        stack.name = new_name.to_string();
        stack.updated_at = Utc::now();
        Ok(())
    }

    /// Members of a stack, bottom first
    pub fn branches_in_stack(&self, stack_id: Uuid) -> Result<Vec<TrackedBranch>> {
        let stack = self.stack(stack_id)?;
        stack
            .branch_ids
            .iter()
            .enumerate()
            .map(|(position, id)| self.tracked_at(stack, position, *id))
            .collect()
    }

    fn tracked_at(&self, stack: &StackRecord, position: usize, id: Uuid) -> Result<TrackedBranch> {
        let record = self.branches.get(&id).ok_or_else(|| {
            GrapheneError::store(format!(
                "Stack '{}' references missing branch {id}",
                stack.name
            ))
        })?;

        Ok(TrackedBranch {
            id,
            name: record.name.clone(),
            stack_id: stack.id,
            position,
            parent_id: position.checked_sub(1).map(|p| stack.branch_ids[p]),
            status: record.status,
            latest_commit: record.latest_commit.clone(),
        })
    }

    pub fn tracked_branch(&self, id: Uuid) -> Result<Option<TrackedBranch>> {
        let Some(record) = self.branches.get(&id) else {
            return Ok(None);
        };
        let stack = self.stack(record.stack_id)?;
        let position = stack
            .branch_ids
            .iter()
            .position(|b| *b == id)
            .ok_or_else(|| {
                GrapheneError::store(format!(
                    "Branch '{}' is not listed in stack '{}'",
                    record.name, stack.name
                ))
            })?;
        self.tracked_at(stack, position, id).map(Some)
    }

    /// Find the stack member named `name` in a repository
    pub fn find_tracked(&self, repository_name: &str, name: &str) -> Result<Option<TrackedBranch>> {
        for stack in self.stacks_for_repository(repository_name) {
            for (position, id) in stack.branch_ids.iter().enumerate() {
                if self.branches.get(id).is_some_and(|b| b.name == name) {
                    return self.tracked_at(stack, position, *id).map(Some);
                }
            }
        }
        Ok(None)
    }

    pub fn is_tracked(&self, repository_name: &str, name: &str) -> bool {
        self.stacks_for_repository(repository_name)
            .iter()
            .flat_map(|s| s.branch_ids.iter())
            .any(|id| self.branches.get(id).is_some_and(|b| b.name == name))
    }

    fn branch_mut(&mut self, id: Uuid) -> Result<&mut BranchRecord> {
        self.branches
            .get_mut(&id)
            .ok_or_else(|| GrapheneError::store(format!("Branch {id} not found")))
    }

    pub fn set_branch_status(&mut self, id: Uuid, status: BranchStatus) -> Result<()> {
        let branch = self.branch_mut(id)?;
        branch.status = status;
        branch.updated_at = Utc::now();
        Ok(())
    }

    pub fn set_latest_commit(&mut self, id: Uuid, sha: &str) -> Result<()> {
        let branch = self.branch_mut(id)?;
        branch.latest_commit = Some(sha.to_string());
        branch.updated_at = Utc::now();
        Ok(())
    }

    /// Append a commit record to a branch
    pub fn add_commit(&mut self, branch_id: Uuid, sha: &str, message: &str, author: &str) -> Result<()> {
        self.branch_mut(branch_id)?;
        self.commits.push(CommitRecord {
            id: Uuid::new_v4(),
            branch_id,
            sha: sha.to_string(),
            message: message.to_string(),
            author: author.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    pub fn commits_for_branch(&self, branch_id: Uuid) -> Vec<&CommitRecord> {
        self.commits.iter().filter(|c| c.branch_id == branch_id).collect()
    }

    /// Check referential integrity and the one-stack-per-branch-name rule
    pub fn validate(&self) -> Result<()> {
        let mut listed: HashSet<Uuid> = HashSet::new();
        let mut names: HashSet<(&str, &str)> = HashSet::new();

        for stack in self.stacks.values() {
            if !self.repositories.contains_key(&stack.repository_name) {
                return Err(GrapheneError::store(format!(
                    "Stack '{}' belongs to unknown repository '{}'",
                    stack.name, stack.repository_name
                )));
            }

            for id in &stack.branch_ids {
                let branch = self.branches.get(id).ok_or_else(|| {
                    GrapheneError::store(format!(
                        "Stack '{}' references missing branch {id}",
                        stack.name
                    ))
                })?;

                if branch.stack_id != stack.id {
                    return Err(GrapheneError::store(format!(
                        "Branch '{}' is listed in stack '{}' but belongs to {}",
                        branch.name, stack.name, branch.stack_id
                    )));
                }

                if !listed.insert(*id) {
                    return Err(GrapheneError::store(format!(
                        "Branch '{}' is listed more than once",
                        branch.name
                    )));
                }

                if !names.insert((stack.repository_name.as_str(), branch.name.as_str())) {
                    return Err(GrapheneError::store(format!(
                        "Branch '{}' is tracked by more than one stack in '{}'",
                        branch.name, stack.repository_name
                    )));
                }
            }
        }

        if let Some(orphan) = self.branches.values().find(|b| !listed.contains(&b.id)) {
            return Err(GrapheneError::store(format!(
                "Branch '{}' is not listed in any stack",
                orphan.name
            )));
        }

        if let Some(commit) = self
            .commits
            .iter()
            .find(|c| !self.branches.contains_key(&c.branch_id))
        {
            return Err(GrapheneError::store(format!(
                "Commit {} references missing branch {}",
                commit.sha, commit.branch_id
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branch(tables: &mut Tables, stack_id: Uuid, name: &str) -> Uuid {
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
        tables.stacks.get_mut(&stack_id).unwrap().branch_ids.push(id);
        id
    }

    #[test]
    fn test_branch_status_parse_and_display() {
        assert_eq!("Merged".parse::<BranchStatus>().unwrap(), BranchStatus::Merged);
        assert_eq!(BranchStatus::Abandoned.to_string(), "abandoned");
        assert!("closed".parse::<BranchStatus>().is_err());
    }

    #[test]
    fn test_positions_and_parents_are_derived_from_order() {
        let mut tables = Tables::default();
        let stack_id = tables
            .create_stack("acme/widgets", "stack/a", "main", None)
            .unwrap();
        let a = branch(&mut tables, stack_id, "a");
        let b = branch(&mut tables, stack_id, "b");
        let c = branch(&mut tables, stack_id, "c");

        let members = tables.branches_in_stack(stack_id).unwrap();
        let summary: Vec<(&str, usize, Option<Uuid>)> = members
            .iter()
            .map(|m| (m.name.as_str(), m.position, m.parent_id))
            .collect();
        assert_eq!(
            summary,
            vec![("a", 0, None), ("b", 1, Some(a)), ("c", 2, Some(b))]
        );

        let found = tables.find_tracked("acme/widgets", "c").unwrap().unwrap();
        assert_eq!(found.id, c);
        assert_eq!(found.position, 2);
        assert!(tables.find_tracked("acme/other", "c").unwrap().is_none());
        assert!(tables.validate().is_ok());
    }

    #[test]
    fn test_delete_stack_cascades_to_branches_and_commits() {
        let mut tables = Tables::default();
        let keep = tables
            .create_stack("acme/widgets", "stack/keep", "main", None)
            .unwrap();
        let doomed = tables
            .create_stack("acme/widgets", "stack/doomed", "main", None)
            .unwrap();
        let kept_branch = branch(&mut tables, keep, "keep-1");
        let doomed_branch = branch(&mut tables, doomed, "doomed-1");
        tables.add_commit(kept_branch, "aaa", "keep", "me").unwrap();
        tables.add_commit(doomed_branch, "bbb", "doomed", "me").unwrap();

        let removed = tables.delete_stack(doomed).unwrap();
        assert_eq!(removed.name, "stack/doomed");
        assert!(!tables.branches.contains_key(&doomed_branch));
        assert_eq!(tables.commits.len(), 1);
        assert_eq!(tables.commits[0].sha, "aaa");
        assert!(tables.validate().is_ok());
    }

    #[test]
    fn test_delete_repository_cascades_to_stacks() {
        let mut tables = Tables::default();
        tables.upsert_repository("acme/widgets", vec!["main".into()]);
        let stack_id = tables
            .create_stack("acme/widgets", "stack/a", "main", None)
            .unwrap();
        branch(&mut tables, stack_id, "a");
        tables
            .create_stack("acme/other", "stack/b", "main", None)
            .unwrap();

        assert!(tables.delete_repository("acme/widgets"));
        assert_eq!(tables.stacks.len(), 1);
        assert!(tables.branches.is_empty());
        assert!(tables.validate().is_ok());
    }

    #[test]
    fn test_upsert_repository_dedupes_base_branches() {
        let mut tables = Tables::default();
        tables.upsert_repository("acme/widgets", vec!["main".into(), "main".into(), "develop".into()]);
        assert_eq!(
            tables.repository("acme/widgets").unwrap().base_branches,
            vec!["main", "develop"]
        );

        tables.ensure_repository("acme/widgets");
        assert_eq!(
            tables.repository("acme/widgets").unwrap().base_branches.len(),
            2
        );
    }

    #[test]
    fn test_rename_stack_rejects_existing_name() {
        let mut tables = Tables::default();
        let a = tables.create_stack("acme/widgets", "stack/a", "main", None).unwrap();
        tables.create_stack("acme/widgets", "stack/b", "main", None).unwrap();

        assert!(tables.rename_stack(a, "stack/b").is_err());
        tables.rename_stack(a, "stack/renamed").unwrap();
        assert_eq!(tables.stack(a).unwrap().name, "stack/renamed");
    }

    #[test]
    fn test_validate_detects_duplicate_names_and_orphans() {
        let mut tables = Tables::default();
        let s1 = tables.create_stack("acme/widgets", "stack/1", "main", None).unwrap();
        let s2 = tables.create_stack("acme/widgets", "stack/2", "main", None).unwrap();
        branch(&mut tables, s1, "dup");
        branch(&mut tables, s2, "dup");
        assert!(tables.validate().is_err());

        let mut tables = Tables::default();
        let s1 = tables.create_stack("acme/widgets", "stack/1", "main", None).unwrap();
        let id = branch(&mut tables, s1, "lonely");
        tables.stacks.get_mut(&s1).unwrap().branch_ids.clear();
        assert!(tables.branches.contains_key(&id));
        assert!(tables.validate().is_err());
    }
}
