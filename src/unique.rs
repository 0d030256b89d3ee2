use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use thiserror::Error;

const BACKUP_SUFFIX: &str = "_bak";
const MAX_ATTEMPTS: usize = 32;

#[derive(Error, Debug)]
pub enum AllocError {
    #[error("no free name for '{candidate}' after {attempts} attempts")]
    Exhausted { candidate: PathBuf, attempts: usize },
    #[error("could not check '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Returns `candidate`, or the first `name_bak.ext`, `name_bak_bak.ext`, ...
/// variant that does not exist yet.
///
/// Nothing is reserved: another writer may claim the name before the caller
/// uses it.
pub fn allocate(candidate: &Path) -> Result<PathBuf, AllocError> {
    let mut path = candidate.to_path_buf();
    for _ in 0..MAX_ATTEMPTS {
        let taken = path.try_exists().map_err(|source| AllocError::Io {
            path: path.clone(),
            source,
        })?;
        if !taken {
            return Ok(path);
        }
        path = with_backup_suffix(&path);
    }
    Err(AllocError::Exhausted {
        candidate: candidate.to_path_buf(),
        attempts: MAX_ATTEMPTS,
    })
}

fn with_backup_suffix(path: &Path) -> PathBuf {
    let mut name = OsString::new();
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => {
            name.push(stem);
            name.push(BACKUP_SUFFIX);
            name.push(".");
            name.push(ext);
        }
        _ => {
            name.push(path.file_name().unwrap_or_default());
            name.push(BACKUP_SUFFIX);
        }
    }
    path.with_file_name(name)
}
