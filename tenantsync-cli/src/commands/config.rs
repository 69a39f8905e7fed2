//! Config command - manage settings.

use anyhow::Result;
use clap::{Args, Subcommand};
use tenantsync_store::{LogLevel, Settings, SettingsStore, default_config_dir};
use tracing::info;

use crate::output::JsonFormatter;
use crate::{Cli, OutputFormat};

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands.
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current settings.
    Show,

    /// Show configuration paths.
    Path,

    /// Limit how many accounts are queried at once (0 = unbounded).
    FanOut {
        /// Maximum concurrent accounts.
        limit: usize,
    },

    /// Set the default log level.
    LogLevel {
        /// error, warn, info, debug, or trace.
        level: String,
    },

    /// Reset to defaults.
    Reset,
}

/// Runs the config command.
pub async fn run(args: &ConfigArgs, store: &SettingsStore, cli: &Cli) -> Result<()> {
    match &args.action {
        ConfigAction::Show => show_config(store, cli).await,
        ConfigAction::Path => show_paths(store, cli),
        ConfigAction::FanOut { limit } => set_fan_out(store, *limit).await,
        ConfigAction::LogLevel { level } => set_log_level(store, level).await,
        ConfigAction::Reset => reset_config(store).await,
    }
}

async fn show_config(store: &SettingsStore, cli: &Cli) -> Result<()> {
    let settings = store.get().await;

    match cli.format {
        OutputFormat::Text => print!("{}", render_settings(&settings)),
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format(&settings)?);
        }
    }

    Ok(())
}

fn render_settings(settings: &Settings) -> String {
    let fan_out = settings
        .fan_out_limit
        .map_or_else(|| "unbounded".to_string(), |n| n.to_string());

    let mut out = String::new();
    out.push_str("tenantsync Configuration\n");
    out.push_str(&"─".repeat(40));
    out.push_str("\n\n");
    out.push_str(&format!("Log level:       {}\n", settings.log_level));
    out.push_str(&format!("Fan-out limit:   {fan_out}\n"));
    out.push_str(&format!("API base:        {}\n", settings.api_base));
    out.push_str(&format!("Auth URL:        {}\n", settings.auth_url));
    out.push_str(&format!("Request timeout: {}s\n", settings.request_timeout_secs));
    out.push_str(&format!("Max attempts:    {}\n", settings.max_retries));
    out.push_str("\nPool presets (fresh/stale/poll seconds):\n");
    for (name, preset) in [
        ("global", settings.presets.global),
        ("account", settings.presets.account),
        ("project", settings.presets.project),
        ("tool", settings.presets.tool),
    ] {
        out.push_str(&format!(
            "  {name:<8} {}/{}/{}\n",
            preset.fresh_ttl_secs, preset.stale_ttl_secs, preset.poll_secs
        ));
    }
    out
}

fn show_paths(store: &SettingsStore, cli: &Cli) -> Result<()> {
    let config_dir = default_config_dir();

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration Paths");
            println!("{}", "─".repeat(40));
            println!();
            println!("Config dir:    {}", config_dir.display());
            println!("Settings file: {}", store.path().display());
        }
        OutputFormat::Json => {
            let paths = serde_json::json!({
                "config_dir": config_dir.display().to_string(),
                "settings_file": store.path().display().to_string(),
            });
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format(&paths)?);
        }
    }

    Ok(())
}

async fn set_fan_out(store: &SettingsStore, limit: usize) -> Result<()> {
    let limit = (limit > 0).then_some(limit);
    store.update(|s| s.fan_out_limit = limit).await;
    store.save().await?;

    info!(limit = ?limit, "Fan-out limit updated");
    match limit {
        Some(n) => println!("Fan-out limit set to {n}"),
        None => println!("Fan-out is now unbounded"),
    }

    Ok(())
}

async fn set_log_level(store: &SettingsStore, level: &str) -> Result<()> {
    let level = parse_log_level(level)?;
    store.update(|s| s.log_level = level).await;
    store.save().await?;

    info!(level = %level, "Log level updated");
    println!("Log level set to: {level}");

    Ok(())
}

fn parse_log_level(level: &str) -> Result<LogLevel> {
    Ok(match level.to_lowercase().as_str() {
        "error" => LogLevel::Error,
        "warn" | "warning" => LogLevel::Warn,
        "info" => LogLevel::Info,
        "debug" => LogLevel::Debug,
        "trace" => LogLevel::Trace,
        _ => anyhow::bail!("Unknown log level: {level}. Use: error, warn, info, debug, trace"),
    })
}

async fn reset_config(store: &SettingsStore) -> Result<()> {
    let path = store.path();

    if tokio::fs::try_exists(path).await? {
        tokio::fs::remove_file(path).await?;
        store.reset().await;
        info!(path = %path.display(), "Settings reset");
        println!("Configuration reset to defaults");
    } else {
        println!("No configuration file to reset");
    }

    Ok(())
}
