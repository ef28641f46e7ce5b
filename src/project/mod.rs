//! Acquisition of the tested project directory.

pub mod github;

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use tempfile::TempDir;

/// Where the failing project's test reports come from.
#[derive(Debug, Clone)]
pub enum ProjectSource {
    /// A directory that already holds the reports
    LocalDir(PathBuf),
    /// A GitHub Actions workflow-run URL whose artifacts hold them
    GithubRun(String),
}

/// A resolved project directory, holding any temp extraction dir alive for
/// as long as the reports are in use.
pub struct ProjectDir {
    path: PathBuf,
    _temp: Option<TempDir>,
}

impl ProjectDir {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProjectSource {
    /// Materialize the project directory this source points at.
    pub fn resolve(&self) -> Result<ProjectDir> {
        match self {
            ProjectSource::LocalDir(path) => {
                if !path.is_dir() {
                    bail!("Project directory does not exist: {}", path.display());
                }
                Ok(ProjectDir {
                    path: path.clone(),
                    _temp: None,
                })
            }
            ProjectSource::GithubRun(url) => {
                let (temp, path) = github::download_artifacts(url)?;
                Ok(ProjectDir {
                    path,
                    _temp: Some(temp),
                })
            }
        }
    }

    /// Human-readable description for the report header.
    pub fn describe(&self) -> String {
        match self {
            ProjectSource::LocalDir(path) => path.display().to_string(),
            ProjectSource::GithubRun(url) => url.clone(),
        }
    }
}
