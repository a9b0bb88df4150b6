//! Appshelf - manage lua descriptors, GreenLuma AppList slots and Steam games.
//!
//! This is the command-line entry point, which:
//! - Parses the subcommand and global flags
//! - Loads settings from TOML
//! - Runs the command against the library

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use appshelf_engine::cli::{self, Command};
use appshelf_engine::config::Settings;
use appshelf_engine::storage::ShelfStorage;

/// Appshelf - game library manager
#[derive(Parser, Debug)]
#[command(name = "appshelf")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to settings file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Run in verbose mode (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Load settings from the given path or default locations.
fn load_settings(path: Option<PathBuf>, storage: &ShelfStorage) -> Result<Settings> {
    let settings_path = path.unwrap_or_else(|| {
        let local = PathBuf::from("appshelf.toml");
        if local.exists() {
            return local;
        }
        storage.settings_path()
    });

    info!("Loading settings from {}", settings_path.display());
    Ok(Settings::load_or_default(&settings_path)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();

    let storage = ShelfStorage::new().context("Failed to prepare appshelf directories")?;
    let settings = load_settings(args.config, &storage).context("Failed to load settings")?;

    cli::execute(args.command, settings, storage)
        .await
        .context("Command failed")?;
    Ok(())
}
