use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

use culprit::commands::{analyze, history};
use culprit::config::{AppConfig, BisectStrategy};
use culprit::project::ProjectSource;

#[derive(Parser)]
#[command(name = "culprit")]
#[command(about = "CI test-failure triage and upstream commit bisection", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a CI run's test failures and bisect the new ones
    Analyze {
        /// Directory holding the CI test reports
        #[arg(long, conflicts_with = "github_run")]
        project_dir: Option<PathBuf>,

        /// GitHub Actions workflow-run URL to download report artifacts
        /// from (requires GITHUB_TOKEN)
        #[arg(long)]
        github_run: Option<String>,

        /// Upstream dependency repository to bisect
        #[arg(long)]
        upstream_repo: String,

        /// Repository of the test suite the failures come from
        #[arg(long)]
        suite_repo: String,

        /// How many days of upstream history to search
        #[arg(long, default_value_t = 5)]
        lookback_days: i64,

        /// Reference instant (RFC 3339) the lookback is measured from,
        /// defaults to now
        #[arg(long)]
        from: Option<String>,

        /// Failure history file (defaults to the user data directory)
        #[arg(long)]
        history_file: Option<PathBuf>,

        /// Also write the report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Bisection strategy: binary or linear
        #[arg(long, default_value = "binary")]
        strategy: String,

        /// Directory the working clones are kept in
        #[arg(long)]
        workspace: Option<PathBuf>,

        /// Upper bound in seconds for a single build or test command
        #[arg(long)]
        command_timeout: Option<u64>,

        /// Builder image for native-image test runs
        #[arg(long)]
        native_builder_image: Option<String>,
    },

    /// Inspect or reset the persisted failure history
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum HistoryCommands {
    /// List tracked failures and tested commits
    Show {
        /// Failure history file (defaults to the user data directory)
        #[arg(long)]
        history_file: Option<PathBuf>,
    },

    /// Delete the failure history
    Clear {
        /// Failure history file (defaults to the user data directory)
        #[arg(long)]
        history_file: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            project_dir,
            github_run,
            upstream_repo,
            suite_repo,
            lookback_days,
            from,
            history_file,
            output,
            strategy,
            workspace,
            command_timeout,
            native_builder_image,
        } => {
            let source = match (project_dir, github_run) {
                (Some(dir), None) => ProjectSource::LocalDir(dir),
                (None, Some(url)) => ProjectSource::GithubRun(url),
                _ => bail!("Exactly one of --project-dir or --github-run is required"),
            };

            let from = match from {
                Some(value) => DateTime::parse_from_rfc3339(&value)
                    .with_context(|| format!("Invalid --from instant: {value}"))?
                    .with_timezone(&Utc),
                None => Utc::now(),
            };

            let config = AppConfig {
                lookback_days,
                from,
                history_file: history_file.unwrap_or_else(AppConfig::default_history_path),
                output_file: output,
                bisect_strategy: strategy.parse::<BisectStrategy>()?,
                upstream_repo_url: upstream_repo,
                test_suite_repo_url: suite_repo,
                workspace_dir: workspace,
                command_timeout: command_timeout.map(Duration::from_secs),
                native_builder_image,
            };

            analyze::execute(config, source)
        }
        Commands::History { command } => match command {
            HistoryCommands::Show { history_file } => history::show(
                &history_file.unwrap_or_else(AppConfig::default_history_path),
            ),
            HistoryCommands::Clear { history_file } => history::clear(
                &history_file.unwrap_or_else(AppConfig::default_history_path),
            ),
        },
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
    }
}
