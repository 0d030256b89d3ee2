use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::{
    paths::{decode, PathResolver},
    token::{new_token, TokenError},
};

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("the archive name cannot be empty")]
    EmptyLabel,
    #[error("invalid archive name '{0}'")]
    InvalidLabel(String),
    #[error("invalid selection list: {0}")]
    Selection(#[from] serde_json::Error),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("archiver exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
    #[error("archive output missing at {0}")]
    Missing(PathBuf),
    #[error("could not write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not write empty archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// One bundling request, fully resolved and ready to run.
#[derive(Debug, Clone)]
pub struct ArchiveJob {
    /// Existing members, deduplicated, in selection order.
    pub members: Vec<PathBuf>,
    /// Deepest directory holding every member (the shared parent when they
    /// are siblings); the archiver runs from here.
    pub common_dir: Option<PathBuf>,
    /// Label the client asked for; also the download name.
    pub output_name: String,
    pub output_path: PathBuf,
}

impl ArchiveJob {
    /// Arguments naming each member for the archiver, as `./relative` paths
    /// under the common directory so no name can look like an option and no
    /// host path ends up in the archive.
    fn member_args(&self) -> Vec<PathBuf> {
        let Some(dir) = &self.common_dir else {
            return Vec::new();
        };
        self.members
            .iter()
            .filter_map(|member| match member.strip_prefix(dir) {
                Ok(rel) => Some(Path::new(".").join(rel)),
                Err(_) => {
                    warn!(
                        "Dropping archive member {} outside {}",
                        member.display(),
                        dir.display()
                    );
                    None
                }
            })
            .collect()
    }
}

/// Bundles selections with an external zip tool into the archive directory.
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    archive_dir: PathBuf,
    program: String,
}

impl ArchiveBuilder {
    pub fn new(archive_dir: PathBuf, program: impl Into<String>) -> Self {
        Self {
            archive_dir,
            program: program.into(),
        }
    }

    /// Validates the label and resolves the selection. Entries that fail to
    /// resolve or do not exist are dropped.
    pub fn plan(
        &self,
        resolver: &PathResolver,
        selected: &[String],
        label: &str,
    ) -> Result<ArchiveJob, ArchiveError> {
        validate_label(label)?;

        let mut seen = HashSet::new();
        let mut members = Vec::new();
        for raw in selected {
            let local = resolver.resolve(&decode(raw));
            let member = match resolver.confine(&local) {
                Ok(p) => p,
                Err(e) => {
                    warn!("Skipping archive member {}: {}", raw, e);
                    continue;
                }
            };
            if member == resolver.root() {
                warn!("Skipping archive member {}: refusing to bundle the root", raw);
                continue;
            }
            if std::fs::symlink_metadata(&member).is_err() {
                debug!("Skipping missing archive member {}", member.display());
                continue;
            }
            if seen.insert(member.clone()) {
                members.push(member);
            }
        }

        let common_dir = common_parent(&members);
        let token = new_token()?;
        let output_path = self.archive_dir.join(format!("{token}_{label}"));

        Ok(ArchiveJob {
            members,
            common_dir,
            output_name: label.to_string(),
            output_path,
        })
    }

    /// Runs the archiver and returns the path of the produced file.
    pub async fn execute(&self, job: &ArchiveJob) -> Result<PathBuf, ArchiveError> {
        let Some(dir) = &job.common_dir else {
            info!("No archive members survived, writing empty archive");
            write_empty_zip(&job.output_path)?;
            return Ok(job.output_path.clone());
        };

        info!(
            "Archiving {} member(s) from {} into {}",
            job.members.len(),
            dir.display(),
            job.output_path.display()
        );
        let output = Command::new(&self.program)
            .current_dir(dir)
            .args(["-r", "-q", "-y"])
            .arg(&job.output_path)
            .args(job.member_args())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ArchiveError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ArchiveError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        // zip appends ".zip" to output names without an extension
        if job.output_path.exists() {
            return Ok(job.output_path.clone());
        }
        let mut appended = job.output_path.clone().into_os_string();
        appended.push(".zip");
        let appended = PathBuf::from(appended);
        if appended.exists() {
            Ok(appended)
        } else {
            Err(ArchiveError::Missing(job.output_path.clone()))
        }
    }

    pub async fn archive(
        &self,
        resolver: &PathResolver,
        selected: &[String],
        label: &str,
    ) -> Result<(ArchiveJob, PathBuf), ArchiveError> {
        let job = self.plan(resolver, selected, label)?;
        let produced = self.execute(&job).await?;
        Ok((job, produced))
    }
}

/// Longest directory prefix shared by the parents of `members`.
fn common_parent(members: &[PathBuf]) -> Option<PathBuf> {
    let mut common = members.first()?.parent()?.to_path_buf();
    for member in &members[1..] {
        while !member.starts_with(&common) {
            if !common.pop() {
                return None;
            }
        }
    }
    Some(common)
}

/// Decodes the client's JSON array of selected paths.
pub fn parse_selection(json: &str) -> Result<Vec<String>, ArchiveError> {
    Ok(serde_json::from_str(json)?)
}

fn validate_label(label: &str) -> Result<(), ArchiveError> {
    if label.trim().is_empty() {
        return Err(ArchiveError::EmptyLabel);
    }
    if label == "." || label == ".." || label.contains(&['/', '\\', '\0'][..]) {
        return Err(ArchiveError::InvalidLabel(label.to_string()));
    }
    Ok(())
}

fn write_empty_zip(path: &Path) -> Result<(), ArchiveError> {
    let file = std::fs::File::create(path).map_err(|source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    zip::ZipWriter::new(file).finish()?;
    Ok(())
}
