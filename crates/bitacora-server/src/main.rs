//! Bitácora server
//!
//! HTTP server and command-line interface for the Bitácora logbook.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bitacora_core::config::env_port;
use bitacora_core::{create_backup, ConfigStore, DataPaths};

mod api;

#[derive(Parser)]
#[command(name = "bitacora")]
#[command(about = "Bitácora - personal vessel logbook with Signal K sync")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Data directory (default: ~/.bitacora)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web server (default)
    Serve {
        /// Port to listen on (overrides BITACORA_PORT and the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Write a backup archive to the configured destination
    Backup,
    /// Show configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show the effective configuration (token masked)
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let paths = DataPaths::resolve(cli.data_dir);

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => serve(paths, port).await,
        Commands::Backup => backup(&paths),
        Commands::Config { command } => match command {
            Some(ConfigCommands::Show) | None => show_config(&paths),
        },
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "bitacora_core={},bitacora_server={},tower_http={}",
            level,
            level,
            if verbose { "debug" } else { "warn" }
        ))
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

async fn serve(paths: DataPaths, port: Option<u16>) -> Result<()> {
    let state = api::AppState::open(paths)?;
    let config = state.config.load().context("Failed to load configuration")?;

    let port = port.or_else(env_port).unwrap_or(config.port);
    api::serve(state, port).await
}

fn backup(paths: &DataPaths) -> Result<()> {
    let config = ConfigStore::file(paths)
        .load()
        .context("Failed to load configuration")?;
    let archive = create_backup(&config, paths)?;
    println!("{}", archive.display());
    Ok(())
}

fn show_config(paths: &DataPaths) -> Result<()> {
    let config = ConfigStore::file(paths)
        .load()
        .context("Failed to load configuration")?;

    println!("{}", serde_json::to_string_pretty(&config.redacted())?);
    println!();
    println!("Data directory: {}", paths.data_dir().display());
    Ok(())
}
