use crate::errors::{GrapheneError, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Atomic file operations so a crash never leaves a half-written document
pub mod atomic_file {
    use super::*;

    /// Serialize `data` as pretty JSON and write it with a temp file + rename under a lock
    pub fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
        let content = serde_json::to_string_pretty(data)
            .map_err(|e| GrapheneError::config(format!("Failed to serialize data: {e}")))?;
        write_string(path, &content)
    }

    /// Write string content atomically while holding the file's lock
    pub fn write_string(path: &Path, content: &str) -> Result<()> {
        // The lock file lives beside the target, so its directory must exist first
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    GrapheneError::config(format!("Failed to create {}: {e}", parent.display()))
                })?;
            }
        }

        let _lock = crate::utils::file_locking::FileLock::acquire(path)?;
        write_string_unlocked(path, content)
    }

    fn write_string_unlocked(path: &Path, content: &str) -> Result<()> {
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, content)
            .map_err(|e| GrapheneError::config(format!("Failed to write temporary file: {e}")))?;

        if let Err(e) = fs::rename(&temp_path, path) {
            let _ = fs::remove_file(&temp_path);
            return Err(GrapheneError::config(format!(
                "Failed to finalize file write: {e}"
            )));
        }
        Ok(())
    }
}

/// Lock files guarding shared on-disk state
pub mod file_locking {
    use super::*;
    use std::fs::{File, OpenOptions};
    use std::io::Write;
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    /// A lock held for as long as this value lives; the lock file is removed on drop
    #[derive(Debug)]
    pub struct FileLock {
        _file: File,
        lock_path: PathBuf,
    }

    impl FileLock {
        const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
        const RETRY_INTERVAL: Duration = Duration::from_millis(50);

        /// Acquire the lock for `file_path` (stored as `<file_path>.lock`), waiting up to `timeout`
        pub fn acquire_with_timeout(file_path: &Path, timeout: Duration) -> Result<Self> {
            let lock_path = file_path.with_extension("lock");
            let start_time = Instant::now();

            loop {
                match Self::try_acquire(&lock_path) {
                    Ok(lock) => return Ok(lock),
                    Err(e) => {
                        if start_time.elapsed() >= timeout {
                            return Err(GrapheneError::config(format!(
                                "Timeout waiting for lock on {} after {}ms: {e}",
                                file_path.display(),
                                timeout.as_millis()
                            )));
                        }
                        std::thread::sleep(Self::RETRY_INTERVAL);
                    }
                }
            }
        }

        /// Try to create the lock file once, without waiting
        pub fn try_acquire(lock_path: &Path) -> Result<Self> {
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(lock_path)
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::AlreadyExists => GrapheneError::config(format!(
                        "Lock file {} already exists, another graphene process may be running",
                        lock_path.display()
                    )),
                    _ => GrapheneError::config(format!(
                        "Failed to acquire lock {}: {e}",
                        lock_path.display()
                    )),
                })?;

            let _ = writeln!(file, "{}", std::process::id());
            tracing::debug!("Acquired lock {}", lock_path.display());

            Ok(Self {
                _file: file,
                lock_path: lock_path.to_path_buf(),
            })
        }

        pub fn acquire(file_path: &Path) -> Result<Self> {
            Self::acquire_with_timeout(file_path, Self::DEFAULT_TIMEOUT)
        }

        pub fn path(&self) -> &Path {
            &self.lock_path
        }
    }

    impl Drop for FileLock {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::file_locking::FileLock;
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_write_json_replaces_file_and_leaves_no_temp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("doc.json");
        let started = std::time::Instant::now();

        atomic_file::write_json(&path, &serde_json::json!({"a": 1})).unwrap();
        atomic_file::write_json(&path, &serde_json::json!({"a": 2})).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["a"], 2);
        assert!(!path.with_extension("tmp").exists());
        assert!(!path.with_extension("lock").exists());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_lock_is_exclusive_until_dropped() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("repo");

        let lock = FileLock::acquire(&target).unwrap();
        assert!(lock.path().exists());

        let second = FileLock::acquire_with_timeout(&target, Duration::from_millis(100));
        assert!(second.is_err());

        drop(lock);
        assert!(FileLock::acquire_with_timeout(&target, Duration::from_millis(100)).is_ok());
    }
}
