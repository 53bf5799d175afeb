//! Config command - configuration management.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use bffgate_config::LoadedConfig;
use bffgate_server::ServerConfig;

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Path to config file (overrides default discovery)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Load and validate the configuration without starting
    Check,

    /// Print the resolved configuration with secrets redacted
    Show,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    let loaded = bffgate_config::load_config(args.config.as_deref())?;

    match args.command {
        ConfigCommand::Check => cmd_check(&loaded, ctx),
        ConfigCommand::Show => cmd_show(&loaded),
    }
}

fn print_source(loaded: &LoadedConfig) {
    match loaded.source {
        Some(ref path) => println!("Config file: {}", path.display()),
        None => println!("Config file: none (using defaults)"),
    }
}

fn cmd_check(loaded: &LoadedConfig, ctx: &Context) -> Result<()> {
    for warning in &loaded.warnings {
        eprintln!("warning: {}", warning);
    }

    if ctx.verbose {
        print_source(loaded);
        for name in &loaded.env_overrides {
            println!("Override from environment: {}", name);
        }
    }

    loaded.config.validate()?;
    // Catches what only the server layer parses (header names, URLs).
    ServerConfig::from_gateway(&loaded.config)?;

    println!("Configuration OK");
    Ok(())
}

fn cmd_show(loaded: &LoadedConfig) -> Result<()> {
    println!("# bffgate configuration");
    match loaded.source {
        Some(ref path) => println!("# source: {}", path.display()),
        None => println!("# source: defaults"),
    }
    if !loaded.env_overrides.is_empty() {
        println!("# environment overrides: {}", loaded.env_overrides.join(", "));
    }
    println!();
    print!("{}", loaded.config.redacted().to_toml()?);
    Ok(())
}
