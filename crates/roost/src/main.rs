//! Roost - distributed cache for stateful session instances
//!
//! Main entry point for the Roost CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{config, soak};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Roost - distributed cache for stateful session instances
#[derive(Parser)]
#[command(name = "roost")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file loaded on top of the discovered ones
    #[arg(long, global = true, env = "ROOST_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Configuration management
    Config(config::ConfigArgs),

    /// Exercise a local cache with concurrent check-out/check-in workers
    Soak(soak::SoakArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = roost_config::load_config_with_options(None, None, cli.config.as_deref())?;
    let logging = loaded.config.logging();

    // Console (human-readable) + rotating JSON file
    let filter = match (&logging.level, cli.verbose) {
        (_, true) => "roost=debug,roost_session=debug,roost_cluster=debug,roost_config=debug,info"
            .to_string(),
        (Some(directive), false) => directive.clone(),
        (None, false) => "roost=info,roost_session=info,roost_cluster=info,warn".to_string(),
    };

    let log_dir = logging
        .directory
        .or_else(|| roost_config::config_dir().map(|d| d.join("logs")))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "roost.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "roost=trace,roost_session=trace,roost_cluster=trace,roost_config=trace,info",
                )),
        )
        .init();

    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }

    let ctx = commands::Context {
        loaded,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Config(args) => config::run(args, &ctx).await,
        Commands::Soak(args) => soak::run(args, &ctx).await,
    }
}
