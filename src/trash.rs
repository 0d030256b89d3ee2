use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::token::{new_token, TokenError};

/// What deleting an entry actually does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DeletePolicy {
    /// Rename into the trash directory as `<token>_<name>`.
    Quarantine,
    /// Remove from disk.
    Permanent,
}

#[derive(Error, Debug)]
pub enum TrashError {
    #[error("'{0}' has no file name")]
    NoName(PathBuf),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("could not remove '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of a best-effort batch; one failure never stops the rest.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl BatchReport {
    pub fn fail(&mut self, path: PathBuf, reason: impl ToString) {
        let reason = reason.to_string();
        warn!("Delete failed for {}: {}", path.display(), reason);
        self.failed.push((path, reason));
    }
}

#[derive(Debug, Clone)]
pub struct Remover {
    policy: DeletePolicy,
    trash_dir: PathBuf,
}

impl Remover {
    pub fn new(policy: DeletePolicy, trash_dir: PathBuf) -> Self {
        Self { policy, trash_dir }
    }

    pub fn policy(&self) -> DeletePolicy {
        self.policy
    }

    /// Moves `path` into the trash directory and returns its new location.
    pub async fn move_to_trash(&self, path: &Path) -> Result<PathBuf, TrashError> {
        let name = path
            .file_name()
            .ok_or_else(|| TrashError::NoName(path.to_path_buf()))?;
        let mut trashed = OsString::from(new_token()?);
        trashed.push("_");
        trashed.push(name);
        let dest = self.trash_dir.join(trashed);

        fs::rename(path, &dest).await.map_err(|source| TrashError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Moved {} to {}", path.display(), dest.display());
        Ok(dest)
    }

    /// Deletes `path` permanently. Symlinks are unlinked, never followed.
    pub async fn delete_permanently(&self, path: &Path) -> Result<(), TrashError> {
        let io_err = |source: std::io::Error| TrashError::Io {
            path: path.to_path_buf(),
            source,
        };
        let metadata = fs::symlink_metadata(path).await.map_err(io_err)?;
        if metadata.is_dir() {
            fs::remove_dir_all(path).await.map_err(io_err)?;
        } else {
            fs::remove_file(path).await.map_err(io_err)?;
        }
        info!("Deleted {}", path.display());
        Ok(())
    }

    pub async fn remove(&self, path: &Path) -> Result<(), TrashError> {
        match self.policy {
            DeletePolicy::Quarantine => self.move_to_trash(path).await.map(|_| ()),
            DeletePolicy::Permanent => self.delete_permanently(path).await,
        }
    }

    /// Removes every path it can, recording failures in `report`.
    pub async fn remove_batch(&self, paths: Vec<PathBuf>, report: &mut BatchReport) {
        for path in paths {
            match self.remove(&path).await {
                Ok(()) => report.removed.push(path),
                Err(e) => report.fail(path, e),
            }
        }
    }
}
