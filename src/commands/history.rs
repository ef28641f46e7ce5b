//! The `history` commands: inspect or reset the persisted failure history.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use crate::fs::{HistoryStore, JsonHistoryStore};
use crate::models::FailureStatus;

pub fn show(history_file: &Path) -> Result<()> {
    let history = JsonHistoryStore::new(history_file).load()?;

    match history.last_run {
        Some(last_run) => println!("Last run: {last_run}"),
        None => {
            println!("No failure history at {}", history_file.display());
            return Ok(());
        }
    }
    if let Some(commit) = &history.last_tested_commit {
        println!("Last tested upstream commit: {commit}");
    }
    println!("Tested commits: {}", history.tested_commits.len());
    println!("Tracked failures: {}\n", history.failures.len());

    for failure in &history.failures {
        let status = match failure.status {
            FailureStatus::New => "NEW".red().bold(),
            FailureStatus::Existing => "EXISTING".yellow().bold(),
            FailureStatus::Resolved => "RESOLVED".green().bold(),
        };
        println!(
            "{status} {}#{}",
            failure.test_class_name, failure.test_method_name
        );
        println!("  first seen {}, last seen {}", failure.first_seen, failure.last_seen);
        if let Some(commit) = &failure.upstream_commit {
            match &failure.upstream_pull_request {
                Some(pr) => println!("  attributed to {commit} (PR #{pr})"),
                None => println!("  attributed to {commit}"),
            }
        }
    }
    Ok(())
}

pub fn clear(history_file: &Path) -> Result<()> {
    if history_file.exists() {
        fs::remove_file(history_file)
            .with_context(|| format!("Failed to delete {}", history_file.display()))?;
        println!("Deleted failure history at {}", history_file.display());
    } else {
        println!("No failure history at {}", history_file.display());
    }
    Ok(())
}
