pub mod gateway;
pub mod repository;

#[cfg(test)]
pub mod testing;

pub use gateway::{CommitInfo, StepOutcome, VcsGateway};
pub use repository::GitRepository;

use crate::errors::{GrapheneError, Result};
use std::path::{Path, PathBuf};

/// Find the root of the Git repository
pub fn find_repository_root(start_path: &Path) -> Result<PathBuf> {
    let repo = git2::Repository::discover(start_path).map_err(|_| {
        GrapheneError::config(format!(
            "Not in a git repository: {}",
            start_path.display()
        ))
    })?;

    let workdir = repo
        .workdir()
        .ok_or_else(|| GrapheneError::config("Repository has no working directory (bare repo?)"))?;

    Ok(workdir.to_path_buf())
}

/// Open the repository containing the current working directory
pub fn get_current_repository() -> Result<GitRepository> {
    let current_dir = std::env::current_dir()
        .map_err(|e| GrapheneError::config(format!("Could not get current directory: {e}")))?;

    let repo_root = find_repository_root(&current_dir)?;
    GitRepository::open(&repo_root)
}

/// Extract `owner/name` from a remote URL.
///
/// Handles scheme URLs (`https://host/owner/name.git`, `ssh://git@host/owner/name`),
/// scp-style remotes (`git@host:owner/name.git`) and plain paths.
pub fn parse_repository_name(remote_url: &str) -> Option<String> {
    let trimmed = remote_url.trim();

    let path = match url::Url::parse(trimmed) {
        Ok(url) if url.has_host() || url.scheme() == "file" => url.path().to_string(),
        _ => match trimmed.split_once(':') {
            Some((host, rest)) if !host.contains('/') && host.len() > 1 => rest.to_string(),
            _ => trimmed.to_string(),
        },
    };

    let path = path.trim_end_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);

    let mut segments = path.rsplit('/').filter(|s| !s.is_empty());
    let name = segments.next()?;
    let owner = segments.next()?;
    Some(format!("{owner}/{name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_repository_name_formats() {
        let cases = [
            ("git@github.com:acme/widgets.git", "acme/widgets"),
            ("git@github.com:acme/widgets", "acme/widgets"),
            ("https://github.com/acme/widgets.git", "acme/widgets"),
            ("https://github.com/acme/widgets/", "acme/widgets"),
            ("ssh://git@gitlab.example.com:2222/team/api.git", "team/api"),
            ("file:///srv/git/acme/widgets.git", "acme/widgets"),
            ("/srv/git/acme/widgets.git", "acme/widgets"),
        ];

        for (url, expected) in cases {
            assert_eq!(
                parse_repository_name(url).as_deref(),
                Some(expected),
                "parsing {url}"
            );
        }
    }

    #[test]
    fn test_parse_repository_name_rejects_single_segment() {
        assert_eq!(parse_repository_name("widgets.git"), None);
        assert_eq!(parse_repository_name("https://github.com/"), None);
    }

    #[test]
    fn test_find_repository_root_outside_repo() {
        let tmp = TempDir::new().unwrap();
        assert!(find_repository_root(tmp.path()).is_err());
    }
}
