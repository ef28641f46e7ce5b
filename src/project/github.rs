//! GitHub Actions artifact download.
//!
//! A workflow-run URL is resolved through the REST API into its artifact
//! list; each artifact zip is downloaded with the caller's token and
//! extracted into a fresh temp directory that then serves as the tested
//! project directory.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::Deserialize;
use tempfile::TempDir;
use uuid::Uuid;

const GITHUB_API: &str = "https://api.github.com";

/// Coordinates of one workflow run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowRun {
    pub owner: String,
    pub repo: String,
    pub run_id: u64,
}

/// Parse a browser URL like
/// `https://github.com/acme/widgets/actions/runs/123456789`.
pub fn parse_run_url(url: &str) -> Result<WorkflowRun> {
    let pattern = Regex::new(r"github\.com/([^/]+)/([^/]+)/actions/runs/(\d+)")
        .expect("valid run-url pattern");
    let captures = pattern
        .captures(url)
        .with_context(|| format!("Not a GitHub workflow run URL: {url}"))?;

    Ok(WorkflowRun {
        owner: captures[1].to_string(),
        repo: captures[2].to_string(),
        run_id: captures[3].parse().context("Run id out of range")?,
    })
}

#[derive(Deserialize)]
struct ArtifactList {
    artifacts: Vec<Artifact>,
}

#[derive(Deserialize)]
struct Artifact {
    name: String,
    archive_download_url: String,
    #[serde(default)]
    expired: bool,
}

/// Download and extract every artifact of a workflow run. Returns the
/// extraction directory; the `TempDir` guard must outlive its use.
pub fn download_artifacts(url: &str) -> Result<(TempDir, PathBuf)> {
    let run = parse_run_url(url)?;
    let token = std::env::var("GITHUB_TOKEN")
        .ok()
        .filter(|token| !token.is_empty());
    let Some(token) = token else {
        bail!("GITHUB_TOKEN is required to download workflow artifacts");
    };

    tracing::info!(owner = %run.owner, repo = %run.repo, run_id = run.run_id, "Listing workflow artifacts");
    let client = reqwest::blocking::Client::new();
    let list: ArtifactList = client
        .get(format!(
            "{GITHUB_API}/repos/{}/{}/actions/runs/{}/artifacts",
            run.owner, run.repo, run.run_id
        ))
        .header("User-Agent", "culprit")
        .header("Accept", "application/vnd.github+json")
        .bearer_auth(&token)
        .send()
        .context("Failed to reach the GitHub API")?
        .error_for_status()
        .context("GitHub API rejected the artifact listing")?
        .json()
        .context("Unexpected artifact listing payload")?;

    if list.artifacts.is_empty() {
        bail!("Workflow run {} has no artifacts", run.run_id);
    }

    let temp = tempfile::Builder::new()
        .prefix(&format!("culprit-artifacts-{}", Uuid::new_v4()))
        .tempdir()
        .context("Failed to create artifact directory")?;
    let root = temp.path().to_path_buf();

    for artifact in &list.artifacts {
        if artifact.expired {
            tracing::warn!(artifact = %artifact.name, "Skipping expired artifact");
            continue;
        }
        extract_artifact(&client, &token, artifact, &root)?;
    }

    tracing::info!(dir = %root.display(), "Artifacts downloaded and extracted");
    Ok((temp, root))
}

fn extract_artifact(
    client: &reqwest::blocking::Client,
    token: &str,
    artifact: &Artifact,
    root: &Path,
) -> Result<()> {
    tracing::info!(artifact = %artifact.name, "Downloading artifact");
    let bytes = client
        .get(&artifact.archive_download_url)
        .header("User-Agent", "culprit")
        .bearer_auth(token)
        .send()
        .with_context(|| format!("Failed to download artifact {}", artifact.name))?
        .error_for_status()
        .with_context(|| format!("GitHub refused artifact {}", artifact.name))?
        .bytes()
        .with_context(|| format!("Failed to read artifact {}", artifact.name))?;

    let dest = root.join(&artifact.name);
    fs::create_dir_all(&dest)
        .with_context(|| format!("Failed to create {}", dest.display()))?;

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec()))
        .with_context(|| format!("Artifact {} is not a zip archive", artifact.name))?;
    archive
        .extract(&dest)
        .with_context(|| format!("Failed to extract artifact {}", artifact.name))?;

    Ok(())
}
