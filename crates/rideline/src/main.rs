// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rideline - driver-side job lifecycle client.
//!
//! This is the binary entry point. Every command runs against the SQLite
//! store named by `[storage].database_path`.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod jobs;
mod profile;
mod watch;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rideline_config::RidelineConfig;
use rideline_core::RidelineError;

use crate::jobs::Op;

/// Rideline - driver-side job lifecycle client.
#[derive(Parser, Debug)]
#[command(name = "rideline", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Driver and job the operation applies to.
#[derive(Args, Debug)]
struct OpArgs {
    /// Signed-in driver id.
    #[arg(long)]
    driver: String,
    job_id: String,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Create pending jobs.
    Seed {
        #[arg(long, default_value_t = 1)]
        count: usize,
        #[arg(long, default_value = "requester")]
        requester: String,
        /// Pre-assign the jobs to this driver.
        #[arg(long)]
        driver: Option<String>,
        /// Minutes from now until the first job; later jobs follow at 15 minute steps.
        #[arg(long, default_value_t = 30)]
        start_in: i64,
    },
    /// Follow a driver's view and lifecycle events until interrupted.
    Watch {
        #[arg(long)]
        driver: String,
    },
    /// Take a pooled job as the active job.
    Accept(OpArgs),
    /// Pass on a pooled job.
    Reject(OpArgs),
    /// Begin the active job.
    Start(OpArgs),
    /// Finish the active job.
    Complete(OpArgs),
    /// Cancel a job as its driver or, with --requester, as its requester.
    Cancel {
        #[arg(long, required_unless_present = "requester", conflicts_with = "requester")]
        driver: Option<String>,
        #[arg(long)]
        requester: Option<String>,
        job_id: String,
    },
    /// Show or update a driver's profile.
    Profile {
        #[arg(long)]
        driver: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        vehicle_model: Option<String>,
        #[arg(long)]
        license_plate: Option<String>,
    },
    /// Print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => rideline_config::load_and_validate_path(path),
        None => rideline_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            rideline_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.agent.log_level);

    if let Err(e) = run(cli.command, &config).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: &RidelineConfig) -> Result<(), RidelineError> {
    match command {
        Commands::Seed {
            count,
            requester,
            driver,
            start_in,
        } => jobs::run_seed(config, count, &requester, driver.as_deref(), start_in).await,
        Commands::Watch { driver } => watch::run_watch(config, &driver).await,
        Commands::Accept(args) => jobs::run_operation(config, Op::Accept, &args.driver, &args.job_id).await,
        Commands::Reject(args) => jobs::run_operation(config, Op::Reject, &args.driver, &args.job_id).await,
        Commands::Start(args) => jobs::run_operation(config, Op::Start, &args.driver, &args.job_id).await,
        Commands::Complete(args) => {
            jobs::run_operation(config, Op::Complete, &args.driver, &args.job_id).await
        }
        Commands::Cancel {
            driver,
            requester,
            job_id,
        } => match (driver, requester) {
            (_, Some(requester)) => jobs::run_requester_cancel(config, &requester, &job_id).await,
            (Some(driver), None) => jobs::run_operation(config, Op::Cancel, &driver, &job_id).await,
            (None, None) => Err(RidelineError::Config(
                "cancel needs --driver or --requester".into(),
            )),
        },
        Commands::Profile {
            driver,
            name,
            vehicle_model,
            license_plate,
        } => {
            let patch = rideline_core::ProfilePatch {
                display_name: name,
                vehicle_model,
                license_plate,
            };
            profile::run_profile(config, &driver, &patch).await
        }
        Commands::Config => {
            let rendered = toml::to_string_pretty(config)
                .map_err(|e| RidelineError::Internal(format!("failed to render config: {e}")))?;
            print!("{rendered}");
            Ok(())
        }
    }
}

/// `RUST_LOG` wins; otherwise `[agent].log_level` is either a bare level for
/// the rideline crates or a full filter directive.
fn filter_directives(log_level: &str) -> String {
    if log_level.contains('=') || log_level.contains(',') {
        log_level.to_string()
    } else {
        format!("rideline={log_level},warn")
    }
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(log_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bare_level_is_scoped_to_rideline_crates() {
        assert_eq!(filter_directives("debug"), "rideline=debug,warn");
        assert_eq!(
            filter_directives("rideline_engine=trace,info"),
            "rideline_engine=trace,info"
        );
    }

    #[test]
    fn cancel_accepts_requester_without_driver() {
        let cli = Cli::try_parse_from(["rideline", "cancel", "--requester", "r-1", "job-1"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Cancel { driver: None, requester: Some(_), .. }
        ));
        assert!(Cli::try_parse_from(["rideline", "cancel", "job-1"]).is_err());
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["rideline", "config", "--config", "/tmp/r.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/r.toml")));
    }

    #[test]
    fn default_config_renders_as_toml() {
        let rendered = toml::to_string_pretty(&RidelineConfig::default()).unwrap();
        assert!(rendered.contains("[assignment]"));
        assert!(rendered.contains("mode = \"pull\""));
    }
}
