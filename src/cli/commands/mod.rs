pub mod branch;
pub mod config;
pub mod repo;
pub mod restack;
pub mod stack;

use crate::config::{get_config_dir, load_settings, store_path, Settings};
use crate::errors::Result;
use crate::git::{get_current_repository, GitRepository};
use crate::stack::{Journal, StackManager};
use crate::store::Store;
use crate::utils::file_locking::FileLock;
use std::time::Duration;
use tracing::debug;

/// Everything a command needs, opened once per invocation.
///
/// Holding the context holds the repository lock, so two `gr` processes
/// never touch the store or the working tree at the same time.
pub struct Context {
    pub repo: GitRepository,
    pub settings: Settings,
    pub store: Store,
    pub journal: Journal,
    _lock: FileLock,
}

impl Context {
    pub fn open() -> Result<Self> {
        let config_dir = get_config_dir()?;
        let settings = load_settings(&config_dir)?;

        let repo = get_current_repository()?.with_remote(&settings.git.remote);
        let lock = FileLock::acquire_with_timeout(
            &repo.git_dir().join("graphene"),
            Duration::from_secs(settings.git.lock_timeout_secs),
        )?;

        let mut store = Store::open(&store_path(&config_dir, &settings))?;
        let applied = store.migrate()?;
        if applied > 0 {
            debug!("Applied {} store migration(s)", applied);
        }

        let journal = Journal::in_git_dir(repo.git_dir());

        Ok(Self {
            repo,
            settings,
            store,
            journal,
            _lock: lock,
        })
    }

    pub fn manager(&mut self) -> Result<StackManager<'_>> {
        StackManager::new(&mut self.store, &self.repo, &self.journal, &self.settings)
    }
}
