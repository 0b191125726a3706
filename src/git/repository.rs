use super::gateway::{CommitInfo, StepOutcome, VcsGateway};
use crate::errors::{GrapheneError, PreconditionError, Result};
use git2::{BranchType, Repository, RepositoryState, Sort, StatusOptions};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Captured result of a `git` subprocess
struct GitOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl GitOutput {
    fn message(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// `VcsGateway` over a local repository.
///
/// State queries go through git2. Rebase, merge and their continuation run
/// the `git` binary, since libgit2 cannot drive them with conflict stops.
pub struct GitRepository {
    repo: Repository,
    path: PathBuf,
    remote: String,
}

impl GitRepository {
    /// Open the repository containing `path`
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path)
            .map_err(|e| GrapheneError::config(format!("Not a git repository: {e}")))?;

        let workdir = repo
            .workdir()
            .ok_or_else(|| GrapheneError::config("Repository has no working directory"))?
            .to_path_buf();

        Ok(Self {
            repo,
            path: workdir,
            remote: "origin".to_string(),
        })
    }

    /// Use `remote` instead of `origin` to name the repository
    pub fn with_remote(mut self, remote: &str) -> Self {
        self.remote = remote.to_string();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The repository's git directory (`.git`, or the worktree's private directory)
    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    pub fn get_remote_url(&self, name: &str) -> Result<String> {
        let remote = self.repo.find_remote(name)?;
        let url = remote.url().ok_or_else(|| {
            GrapheneError::Git(git2::Error::from_str("Remote URL is not valid UTF-8"))
        })?;
        Ok(url.to_string())
    }

    fn run_git(&self, operation: &str, args: &[&str]) -> Result<GitOutput> {
        debug!("git {}", args.join(" "));
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.path)
            .env("GIT_EDITOR", "true")
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(|e| GrapheneError::gateway(operation, format!("could not run git: {e}")))?;

        Ok(GitOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn state(&self) -> RepositoryState {
        self.repo.state()
    }

    /// Turn a failed rebase/merge into a conflict if git left the operation open
    fn classify(
        &self,
        operation: &str,
        output: GitOutput,
        still_open: impl Fn(&Self) -> bool,
    ) -> Result<StepOutcome> {
        if output.success {
            return Ok(StepOutcome::Clean);
        }

        if still_open(self) {
            let files = self.conflicted_files()?;
            debug!("git {} stopped with {} conflicted file(s)", operation, files.len());
            return Ok(StepOutcome::Conflicted(files));
        }

        Err(GrapheneError::gateway(operation, output.message()))
    }

    fn rebase_open(&self) -> bool {
        matches!(
            self.state(),
            RepositoryState::Rebase
                | RepositoryState::RebaseInteractive
                | RepositoryState::RebaseMerge
                | RepositoryState::ApplyMailboxOrRebase
        )
    }

    fn merge_open(&self) -> bool {
        self.state() == RepositoryState::Merge
    }

    fn branch_tip(&self, name: &str) -> Result<git2::Oid> {
        let commit = self
            .repo
            .find_branch(name, BranchType::Local)
            .map_err(|_| PreconditionError::BranchNotFound(name.to_string()))?
            .get()
            .peel_to_commit()?;
        Ok(commit.id())
    }

    fn local_branch_tips(&self) -> Result<HashMap<git2::Oid, Vec<String>>> {
        let mut tips: HashMap<git2::Oid, Vec<String>> = HashMap::new();
        for branch in self.repo.branches(Some(BranchType::Local))? {
            let (branch, _) = branch?;
            let (Some(name), Some(target)) = (branch.name()?, branch.get().target()) else {
                continue;
            };
            tips.entry(target).or_default().push(name.to_string());
        }
        for names in tips.values_mut() {
            names.sort();
        }
        Ok(tips)
    }
}

impl VcsGateway for GitRepository {
    fn repository_name(&self) -> Result<String> {
        let url = self
            .get_remote_url(&self.remote)
            .map_err(|_| PreconditionError::RepositoryUnresolved(self.remote.clone()))?;
        super::parse_repository_name(&url)
            .ok_or_else(|| PreconditionError::RepositoryUnresolved(self.remote.clone()).into())
    }

    fn current_branch(&self) -> Result<String> {
        let head = self.repo.head()?;
        if head.is_branch() {
            if let Some(name) = head.shorthand() {
                return Ok(name.to_string());
            }
        }

        let commit = head.peel_to_commit()?;
        Ok(format!("HEAD@{}", commit.id()))
    }

    fn default_base_branch(&self) -> Result<String> {
        for candidate in ["main", "master"] {
            if self.branch_exists(candidate)? {
                return Ok(candidate.to_string());
            }
        }
        Ok("main".to_string())
    }

    fn list_branches(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for branch in self.repo.branches(Some(BranchType::Local))? {
            let (branch, _) = branch?;
            if let Some(name) = branch.name()? {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn branch_exists(&self, name: &str) -> Result<bool> {
        Ok(self.repo.find_branch(name, BranchType::Local).is_ok())
    }

    fn create_branch(&self, name: &str) -> Result<()> {
        let head = self.repo.head()?.peel_to_commit()?;
        self.repo.branch(name, &head, false).map_err(|e| {
            GrapheneError::gateway("branch", format!("could not create '{name}': {e}"))
        })?;
        self.repo.set_head(&format!("refs/heads/{name}"))?;

        tracing::info!("Created branch '{}'", name);
        Ok(())
    }

    fn checkout(&self, name: &str) -> Result<()> {
        let branch = self
            .repo
            .find_branch(name, BranchType::Local)
            .map_err(|_| PreconditionError::BranchNotFound(name.to_string()))?;

        let tree = branch.get().peel_to_tree()?;
        // git subprocesses may have rewritten the index since libgit2 cached it
        self.repo.index()?.read(true)?;
        self.repo
            .checkout_tree(tree.as_object(), None)
            .map_err(|e| GrapheneError::gateway("checkout", format!("'{name}': {e}")))?;
        self.repo.set_head(&format!("refs/heads/{name}"))?;

        debug!("Switched to branch '{}'", name);
        Ok(())
    }

    fn has_uncommitted_changes(&self) -> Result<bool> {
        let mut options = StatusOptions::new();
        options.include_untracked(false).include_ignored(false);
        let statuses = self.repo.statuses(Some(&mut options))?;

        Ok(statuses.iter().any(|entry| {
            entry.status().intersects(
                git2::Status::INDEX_NEW
                    | git2::Status::INDEX_MODIFIED
                    | git2::Status::INDEX_DELETED
                    | git2::Status::INDEX_RENAMED
                    | git2::Status::INDEX_TYPECHANGE
                    | git2::Status::WT_MODIFIED
                    | git2::Status::WT_DELETED
                    | git2::Status::WT_RENAMED
                    | git2::Status::WT_TYPECHANGE
                    | git2::Status::CONFLICTED,
            )
        }))
    }

    fn rebase(&self, source: &str, onto: &str, upstream: Option<&str>) -> Result<StepOutcome> {
        let output = match upstream {
            Some(upstream) => {
                self.run_git("rebase", &["rebase", "--onto", onto, upstream, source])?
            }
            None => self.run_git("rebase", &["rebase", onto, source])?,
        };
        self.classify("rebase", output, Self::rebase_open)
    }

    fn continue_rebase(&self) -> Result<StepOutcome> {
        let unresolved = self.conflicted_files()?;
        if !unresolved.is_empty() {
            return Ok(StepOutcome::Conflicted(unresolved));
        }

        let output = self.run_git("rebase --continue", &["rebase", "--continue"])?;
        self.classify("rebase --continue", output, Self::rebase_open)
    }

    fn abort_rebase(&self) -> Result<()> {
        let output = self.run_git("rebase --abort", &["rebase", "--abort"])?;
        if !output.success {
            return Err(GrapheneError::gateway("rebase --abort", output.message()));
        }
        Ok(())
    }

    fn is_rebase_in_progress(&self) -> Result<bool> {
        Ok(self.rebase_open())
    }

    fn conflicted_files(&self) -> Result<Vec<String>> {
        let mut index = self.repo.index()?;
        index.read(true)?;

        let mut files = Vec::new();
        for conflict in index.conflicts()? {
            let conflict = conflict?;
            let entry = conflict.our.or(conflict.their).or(conflict.ancestor);
            if let Some(entry) = entry {
                files.push(String::from_utf8_lossy(&entry.path).into_owned());
            }
        }
        files.sort();
        files.dedup();
        Ok(files)
    }

    fn merge_branch(&self, source: &str) -> Result<StepOutcome> {
        let output = self.run_git("merge", &["merge", "--no-edit", source])?;
        self.classify("merge", output, Self::merge_open)
    }

    fn continue_merge(&self) -> Result<StepOutcome> {
        let unresolved = self.conflicted_files()?;
        if !unresolved.is_empty() {
            return Ok(StepOutcome::Conflicted(unresolved));
        }

        let output = self.run_git("commit", &["commit", "--no-edit"])?;
        if !output.success {
            return Err(GrapheneError::gateway("commit", output.message()));
        }
        Ok(StepOutcome::Clean)
    }

    fn abort_merge(&self) -> Result<()> {
        let output = self.run_git("merge --abort", &["merge", "--abort"])?;
        if !output.success {
            return Err(GrapheneError::gateway("merge --abort", output.message()));
        }
        Ok(())
    }

    fn is_merge_in_progress(&self) -> Result<bool> {
        Ok(self.merge_open())
    }

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        let ancestor = self.branch_tip(ancestor)?;
        let descendant = self.branch_tip(descendant)?;
        Ok(ancestor == descendant || self.repo.graph_descendant_of(descendant, ancestor)?)
    }

    fn commit_history(&self) -> Result<Vec<String>> {
        let tips = self.local_branch_tips()?;

        let mut revwalk = self.repo.revwalk()?;
        revwalk.push_head()?;
        revwalk.simplify_first_parent()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL)?;

        let mut lines = Vec::new();
        for oid in revwalk {
            let oid = oid?;
            let hash = oid.to_string();
            let short = &hash[..hash.len().min(7)];
            match tips.get(&oid) {
                Some(names) => lines.push(format!("{short} ({})", names.join(", "))),
                None => lines.push(short.to_string()),
            }
        }
        Ok(lines)
    }

    fn latest_commit(&self, branch: &str) -> Result<CommitInfo> {
        let commit = self
            .repo
            .find_branch(branch, BranchType::Local)
            .map_err(|_| PreconditionError::BranchNotFound(branch.to_string()))?
            .get()
            .peel_to_commit()?;
        let author = commit.author().name().unwrap_or_default().to_string();

        Ok(CommitInfo {
            sha: commit.id().to_string(),
            message: commit.summary().unwrap_or_default().to_string(),
            author,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    fn git(repo_path: &Path, args: &[&str]) {
        let output = Command::new("git")
            .args(args)
            .current_dir(repo_path)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn create_test_repo() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let repo_path = temp_dir.path().to_path_buf();

        git(&repo_path, &["init", "-q"]);
        git(&repo_path, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(&repo_path, &["config", "user.name", "Test"]);
        git(&repo_path, &["config", "user.email", "test@test.com"]);
        git(&repo_path, &["config", "commit.gpgsign", "false"]);
        git(
            &repo_path,
            &["remote", "add", "origin", "git@github.com:acme/widgets.git"],
        );

        create_commit(&repo_path, "Initial commit", "README.md", "# Test\n");
        (temp_dir, repo_path)
    }

    fn create_commit(repo_path: &Path, message: &str, filename: &str, content: &str) {
        std::fs::write(repo_path.join(filename), content).unwrap();
        git(repo_path, &["add", filename]);
        git(repo_path, &["commit", "-q", "-m", message]);
    }

    #[test]
    fn test_repository_name_and_branches() {
        let (_dir, path) = create_test_repo();
        let repo = GitRepository::open(&path).unwrap();

        assert_eq!(repo.repository_name().unwrap(), "acme/widgets");
        assert_eq!(repo.current_branch().unwrap(), "main");
        assert_eq!(repo.default_base_branch().unwrap(), "main");
        assert!(repo.git_dir().ends_with(".git"));

        repo.create_branch("feat-a").unwrap();
        assert_eq!(repo.current_branch().unwrap(), "feat-a");
        assert_eq!(repo.list_branches().unwrap(), vec!["feat-a", "main"]);

        repo.checkout("main").unwrap();
        assert_eq!(repo.current_branch().unwrap(), "main");
        assert!(repo.checkout("missing").is_err());
    }

    #[test]
    fn test_unknown_remote_is_unresolved() {
        let (_dir, path) = create_test_repo();
        let repo = GitRepository::open(&path).unwrap().with_remote("upstream");
        assert!(matches!(
            repo.repository_name(),
            Err(GrapheneError::Precondition(PreconditionError::RepositoryUnresolved(ref remote))) if remote == "upstream"
        ));
        assert_eq!(
            PreconditionError::RepositoryUnresolved("upstream".into()).to_string(),
            "Could not determine the repository name from remote 'upstream'"
        );
    }

    #[test]
    fn test_uncommitted_changes_ignore_untracked_files() {
        let (_dir, path) = create_test_repo();
        let repo = GitRepository::open(&path).unwrap();

        std::fs::write(path.join("scratch.txt"), "notes").unwrap();
        assert!(!repo.has_uncommitted_changes().unwrap());

        std::fs::write(path.join("README.md"), "# Changed\n").unwrap();
        assert!(repo.has_uncommitted_changes().unwrap());
    }

    #[test]
    fn test_commit_history_decorates_local_branches() {
        let (_dir, path) = create_test_repo();
        git(&path, &["checkout", "-q", "-b", "feat-a"]);
        create_commit(&path, "a", "a.txt", "a\n");
        git(&path, &["checkout", "-q", "-b", "feat-b"]);
        create_commit(&path, "b", "b.txt", "b\n");
        create_commit(&path, "b2", "b2.txt", "b2\n");

        let repo = GitRepository::open(&path).unwrap();
        let history = repo.commit_history().unwrap();

        assert_eq!(history.len(), 4);
        assert!(history[0].ends_with("(feat-b)"));
        assert!(!history[1].contains('('));
        assert!(history[2].ends_with("(feat-a)"));
        assert!(history[3].ends_with("(main)"));
    }

    #[test]
    fn test_rebase_conflict_is_reported_and_abortable() {
        let (_dir, path) = create_test_repo();
        git(&path, &["checkout", "-q", "-b", "feature"]);
        create_commit(&path, "feature edit", "README.md", "# Feature\n");
        git(&path, &["checkout", "-q", "main"]);
        create_commit(&path, "main edit", "README.md", "# Main\n");

        let repo = GitRepository::open(&path).unwrap();
        let outcome = repo.rebase("feature", "main", None).unwrap();
        assert_eq!(outcome, StepOutcome::Conflicted(vec!["README.md".to_string()]));
        assert!(repo.is_rebase_in_progress().unwrap());

        assert_eq!(
            repo.continue_rebase().unwrap(),
            StepOutcome::Conflicted(vec!["README.md".to_string()])
        );

        repo.abort_rebase().unwrap();
        assert!(!repo.is_rebase_in_progress().unwrap());

        // Same handle that read the conflicted index
        repo.checkout("main").unwrap();
        assert_eq!(repo.current_branch().unwrap(), "main");
        assert_eq!(std::fs::read_to_string(path.join("README.md")).unwrap(), "# Main\n");
    }

    #[test]
    fn test_rebase_with_upstream_skips_commits_below_it() {
        let (_dir, path) = create_test_repo();
        git(&path, &["checkout", "-q", "-b", "lower"]);
        create_commit(&path, "lower edit", "README.md", "# Lower\n");
        let repo = GitRepository::open(&path).unwrap();
        let old_lower = repo.latest_commit("lower").unwrap().sha;
        git(&path, &["checkout", "-q", "-b", "upper"]);
        create_commit(&path, "upper work", "upper.txt", "u\n");

        // Rewrite lower so its old commit no longer matches by patch
        git(&path, &["checkout", "-q", "lower"]);
        git(&path, &["reset", "-q", "--hard", "main"]);
        create_commit(&path, "lower rewritten", "README.md", "# Rewritten\n");

        let outcome = repo.rebase("upper", "lower", Some(&old_lower)).unwrap();

        assert_eq!(outcome, StepOutcome::Clean);
        assert_eq!(repo.current_branch().unwrap(), "upper");
        assert_eq!(
            std::fs::read_to_string(path.join("README.md")).unwrap(),
            "# Rewritten\n"
        );
        assert!(path.join("upper.txt").exists());
    }

    #[test]
    fn test_rebase_of_missing_branch_is_gateway_error() {
        let (_dir, path) = create_test_repo();
        let repo = GitRepository::open(&path).unwrap();
        assert!(matches!(
            repo.rebase("nope", "main", None),
            Err(GrapheneError::Gateway { .. })
        ));
    }

    #[test]
    fn test_merge_clean_and_latest_commit() {
        let (_dir, path) = create_test_repo();
        git(&path, &["checkout", "-q", "-b", "feature"]);
        create_commit(&path, "Add feature", "feature.txt", "f\n");
        git(&path, &["checkout", "-q", "main"]);

        let repo = GitRepository::open(&path).unwrap();
        assert_eq!(repo.merge_branch("feature").unwrap(), StepOutcome::Clean);
        assert!(!repo.is_merge_in_progress().unwrap());

        assert!(repo.is_ancestor("feature", "main").unwrap());
        assert!(repo.is_ancestor("main", "main").unwrap());

        let info = repo.latest_commit("feature").unwrap();
        assert_eq!(info.message, "Add feature");
        assert_eq!(info.author, "Test");
        assert_eq!(info.sha.len(), 40);
    }
}
