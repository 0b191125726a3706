#![allow(dead_code)]

use graphene_cli::config::Settings;
use graphene_cli::git::GitRepository;
use graphene_cli::stack::Journal;
use graphene_cli::store::Store;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// A throwaway repository on `main` with an `origin` naming it `acme/widgets`,
/// plus a separate directory for the store document
pub struct TestRepo {
    _dir: TempDir,
    _store_dir: TempDir,
    pub path: PathBuf,
    pub store_path: PathBuf,
    pub settings: Settings,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store_dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        git(&path, &["init", "-q"]);
        git(&path, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(&path, &["config", "user.name", "Test"]);
        git(&path, &["config", "user.email", "test@test.com"]);
        git(&path, &["config", "commit.gpgsign", "false"]);
        git(&path, &["config", "core.autocrlf", "false"]);
        git(
            &path,
            &["remote", "add", "origin", "git@github.com:acme/widgets.git"],
        );

        let repo = Self {
            store_path: store_dir.path().join("graphene.json"),
            _dir: dir,
            _store_dir: store_dir,
            path,
            settings: Settings::default(),
        };
        repo.commit("Initial commit", "README.md", "# Widgets\n");
        repo.commit("Add shared file", "shared.txt", "base\n");
        repo
    }

    pub fn git(&self, args: &[&str]) {
        git(&self.path, args);
    }

    /// Run git and report whether it exited successfully
    pub fn git_ok(&self, args: &[&str]) -> bool {
        Command::new("git")
            .args(args)
            .current_dir(&self.path)
            .output()
            .unwrap()
            .status
            .success()
    }

    pub fn commit(&self, message: &str, filename: &str, content: &str) {
        std::fs::write(self.path.join(filename), content).unwrap();
        self.git(&["add", filename]);
        self.git(&["commit", "-q", "-m", message]);
    }

    /// Create `branch` from HEAD with one commit adding `filename`
    pub fn branch_with_commit(&self, branch: &str, filename: &str, content: &str) {
        self.git(&["checkout", "-q", "-b", branch]);
        self.commit(&format!("Work on {branch}"), filename, content);
    }

    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> bool {
        self.git_ok(&["merge-base", "--is-ancestor", ancestor, descendant])
    }

    pub fn rev_parse(&self, rev: &str) -> String {
        let output = Command::new("git")
            .args(["rev-parse", rev])
            .current_dir(&self.path)
            .output()
            .unwrap();
        assert!(output.status.success(), "rev-parse {rev} failed");
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    pub fn gateway(&self) -> GitRepository {
        GitRepository::open(&self.path).unwrap()
    }

    pub fn journal(&self) -> Journal {
        Journal::in_git_dir(self.gateway().git_dir())
    }

    pub fn store(&self) -> Store {
        let mut store = Store::open(&self.store_path).unwrap();
        store.migrate().unwrap();
        store
    }

    pub fn read(&self, filename: &str) -> String {
        std::fs::read_to_string(self.path.join(filename)).unwrap()
    }
}

pub fn git(repo_path: &Path, args: &[&str]) {
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
