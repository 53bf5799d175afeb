//! bffgate - Backend-for-Frontend OIDC authentication gateway
//!
//! Main entry point for the bffgate CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

mod commands;

use commands::{config, start};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// bffgate - Backend-for-Frontend OIDC authentication gateway
#[derive(Parser)]
#[command(name = "bffgate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log to the console as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Also write a daily-rotating JSON log file
    #[arg(long, global = true)]
    pub log_file: bool,

    /// Directory for the log file (implies --log-file)
    #[arg(long, global = true, env = "BFFGATE_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the gateway
    Start(start::StartArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "bffgate=debug,bffgate_server=debug,bffgate_oauth=debug,bffgate_session=debug,bffgate_config=debug,tower_http=debug,info"
    } else {
        "bffgate=info,bffgate_server=info,bffgate_oauth=info,bffgate_session=info,bffgate_config=info,warn"
    };
    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let (file_layer, _guard) = match commands::log_dir(cli.log_file, cli.log_dir.as_deref()) {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(&dir, "bffgate.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new(
                    "bffgate=trace,bffgate_server=trace,bffgate_oauth=trace,bffgate_session=trace,bffgate_config=trace,info",
                ));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let (plain, json) = if cli.log_json {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_filter(console_filter),
            ),
        )
    } else {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_filter(console_filter),
            ),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(plain)
        .with(json)
        .with(file_layer)
        .init();

    let ctx = commands::Context {
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Start(args) => start::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
