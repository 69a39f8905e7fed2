// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! tenantsync CLI - drives the data pools from the command line.
//!
//! # Examples
//!
//! ```bash
//! # Walk through fetching, mutating and switching accounts
//! tenantsync demo
//!
//! # Same, with one account failing and slow responses
//! tenantsync demo --fail-account 1002 --latency-ms 400
//!
//! # Against the real API
//! TENANTSYNC_TOKEN=... tenantsync watch --backend http
//!
//! # Poll the global pools and print every update
//! tenantsync watch --ticks 5
//!
//! # Settings
//! tenantsync config show --format json --pretty
//! tenantsync config fan-out 4
//! ```

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tenantsync_store::{LogLevel, SettingsStore};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use commands::{config, demo, watch};

// ============================================================================
// CLI Definition
// ============================================================================

/// tenantsync CLI - stale-while-revalidate pools over many accounts.
#[derive(Parser)]
#[command(name = "tenantsync")]
#[command(about = "Multi-account data pool driver")]
#[command(long_about = r#"
tenantsync keeps per-view data pools fresh across every account a user
belongs to. This driver runs the pools against a seeded in-memory backend,
or against the workspace API with --backend http.

Examples:
  tenantsync demo                    # Guided walkthrough
  tenantsync demo --fail-account 1002
  tenantsync watch --ticks 5         # Poll global pools
  tenantsync config show             # Current settings
  tenantsync watch --backend http --token <TOKEN>
"#)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (text or json).
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Verbose output (show debug info).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Quiet mode (no logging).
    #[arg(long, short, global = true)]
    pub quiet: bool,

    /// Where the pools get their data.
    #[arg(long, default_value = "memory", global = true)]
    pub backend: BackendKind,

    /// OAuth bearer token for the HTTP backend.
    #[arg(long, env = "TENANTSYNC_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Fetch, mutate and switch accounts against the demo backend.
    #[command(visible_alias = "d")]
    Demo(demo::DemoArgs),

    /// Poll global pools and print updates as they land.
    #[command(visible_alias = "w")]
    Watch(watch::WatchArgs),

    /// Manage settings.
    Config(config::ConfigArgs),
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text with colors.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Backend options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum BackendKind {
    /// Seeded in-memory accounts.
    #[default]
    Memory,
    /// The workspace API at the configured base URL.
    Http,
}

/// CLI exit codes.
#[repr(i32)]
pub enum ExitCode {
    /// Success.
    Success = 0,
    /// General error.
    Error = 1,
}

// ============================================================================
// Logging Setup
// ============================================================================

fn setup_logging(verbose: bool, quiet: bool, level: LogLevel) {
    if quiet {
        return;
    }

    let filter = if verbose {
        EnvFilter::new("tenantsync=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("tenantsync={level}")))
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let store = SettingsStore::load_default().await?;
    let settings = store.get().await;

    setup_logging(cli.verbose, cli.quiet, settings.log_level);

    let result = match &cli.command {
        Commands::Demo(args) => demo::run(args, &settings, &cli).await,
        Commands::Watch(args) => watch::run(args, &settings, &cli).await,
        Commands::Config(args) => config::run(args, &store, &cli).await,
    };

    if let Err(e) = result {
        if !cli.quiet {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(ExitCode::Error as i32);
    }

    std::process::exit(ExitCode::Success as i32);
}
