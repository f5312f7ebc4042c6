//! Git working-tree discovery for building review snapshots

use std::path::{Path, PathBuf};

use git2::{Repository, Status, StatusOptions};

use crate::{Error, Result};

/// A git repository wrapper providing council-specific operations
pub struct GitRepo {
    repo: Repository,
    root: PathBuf,
}

impl std::fmt::Debug for GitRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepo")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl GitRepo {
    /// Open a git repository at the given path
    ///
    /// This will search upward from the given path to find the repository root.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let repo = Repository::discover(path).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                Error::Config(format!(
                    "Not a git repository: {}. Pass explicit paths or run inside a git repository.",
                    path.display()
                ))
            } else {
                Error::Other(format!("Git error: {}", e))
            }
        })?;

        let root = repo
            .workdir()
            .ok_or_else(|| Error::Config("Bare repositories are not supported".to_string()))?
            .to_path_buf();

        Ok(Self { repo, root })
    }

    /// Get the repository root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check if the given path is inside a git repository
    pub fn is_git_repo(path: impl AsRef<Path>) -> bool {
        Repository::discover(path.as_ref()).is_ok()
    }

    /// Files modified, added or untracked in the working tree, relative to the root
    ///
    /// Deleted files are left out since there is nothing to review.
    pub fn changed_files(&self) -> Result<Vec<String>> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);

        let statuses = self
            .repo
            .statuses(Some(&mut opts))
            .map_err(|e| Error::Other(format!("Failed to read git status: {}", e)))?;

        let interesting = Status::WT_NEW
            | Status::WT_MODIFIED
            | Status::WT_RENAMED
            | Status::INDEX_NEW
            | Status::INDEX_MODIFIED
            | Status::INDEX_RENAMED;

        let mut files: Vec<String> = statuses
            .iter()
            .filter(|entry| entry.status().intersects(interesting))
            .filter(|entry| !entry.status().intersects(Status::WT_DELETED))
            .filter_map(|entry| entry.path().map(|p| p.to_string()))
            .collect();
        files.sort();
        files.dedup();
        Ok(files)
    }
}
