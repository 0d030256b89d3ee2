use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use clap::Parser;
use thiserror::Error;

use crate::{classify::Classifier, trash::DeletePolicy};

// --- Command line ---
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// The root directory to serve files from
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub root_dir: PathBuf,

    /// Where the archive, trash and log directories are kept (must be outside the root)
    #[arg(short, long, value_name = "DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// The network address to bind to
    #[arg(short, long, value_name = "ADDR", default_value = "127.0.0.1:8080")]
    pub bind_addr: SocketAddr,

    /// JSON file mapping extensions to type names, icons and preview rules
    #[arg(short, long, value_name = "FILE")]
    pub types: Option<PathBuf>,

    /// What deleting does
    #[arg(long, value_enum, default_value_t = DeletePolicy::Quarantine)]
    pub delete_policy: DeletePolicy,

    /// Bearer token required for deletes; deletes are open when unset
    #[arg(long, env = "NETDISK_ADMIN_TOKEN", hide_env_values = true)]
    pub admin_token: Option<String>,

    /// Archiver executable, invoked as `<prog> -r -q -y <out> <members..>`
    #[arg(long, value_name = "PROG", default_value = "zip")]
    pub zip_program: String,

    /// Frontend assets served under /static
    #[arg(long, value_name = "DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// Largest accepted request body, in bytes
    #[arg(long, value_name = "BYTES", default_value_t = 1 << 30)]
    pub max_upload_bytes: usize,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to resolve root directory '{path}': {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("root path '{0}' is not a directory")]
    NotADirectory(PathBuf),
    #[error("failed to prepare directory '{path}': {source}")]
    Dir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("'{0}' must not be inside the root directory")]
    InsideRoot(PathBuf),
    #[error("failed to read types file '{path}': {source}")]
    TypesRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid types file '{path}': {source}")]
    TypesParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Startup configuration. Built once, then only read.
#[derive(Debug, Clone)]
pub struct Settings {
    pub root_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub trash_dir: PathBuf,
    pub log_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub types: Option<PathBuf>,
    pub delete_policy: DeletePolicy,
    pub admin_token: Option<String>,
    pub zip_program: String,
    pub static_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Settings {
    /// Canonicalizes the root and creates the managed directories next to it.
    pub fn prepare(args: Args) -> Result<Self, ConfigError> {
        let root_dir = args
            .root_dir
            .canonicalize()
            .map_err(|source| ConfigError::Root {
                path: args.root_dir.clone(),
                source,
            })?;
        if !root_dir.is_dir() {
            return Err(ConfigError::NotADirectory(root_dir));
        }

        let archive_dir = managed_dir(&args.data_dir.join("archive"), &root_dir)?;
        let trash_dir = managed_dir(&args.data_dir.join("trash"), &root_dir)?;
        let log_dir = managed_dir(&args.data_dir.join("log"), &root_dir)?;

        Ok(Settings {
            root_dir,
            archive_dir,
            trash_dir,
            log_dir,
            bind_addr: args.bind_addr,
            types: args.types,
            delete_policy: args.delete_policy,
            admin_token: args.admin_token.filter(|t| !t.is_empty()),
            zip_program: args.zip_program,
            static_dir: args.static_dir,
            max_upload_bytes: args.max_upload_bytes,
        })
    }

    /// Loads the classification descriptor, or an empty classifier when none
    /// was configured.
    pub fn load_classifier(&self) -> Result<Classifier, ConfigError> {
        let Some(path) = &self.types else {
            return Ok(Classifier::default());
        };
        let json = fs::read_to_string(path).map_err(|source| ConfigError::TypesRead {
            path: path.clone(),
            source,
        })?;
        Classifier::from_json(&json).map_err(|source| ConfigError::TypesParse {
            path: path.clone(),
            source,
        })
    }
}

fn managed_dir(dir: &Path, root: &Path) -> Result<PathBuf, ConfigError> {
    let dir_err = |source: std::io::Error| ConfigError::Dir {
        path: dir.to_path_buf(),
        source,
    };
    fs::create_dir_all(dir).map_err(dir_err)?;
    let canonical = dir.canonicalize().map_err(dir_err)?;
    if canonical.starts_with(root) {
        return Err(ConfigError::InsideRoot(canonical));
    }
    Ok(canonical)
}
