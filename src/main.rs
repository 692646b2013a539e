//! `classwatch` binary: load settings, set up logging, dispatch the command.

use std::path::Path;

use anyhow::{Result, anyhow, bail};
use clap::Parser;

use classwatch::cli::commands::{init, watch};
use classwatch::cli::{Cli, Commands};
use classwatch::{Settings, logging};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Init must work even when an existing settings file is broken.
        Commands::Init { force } => {
            logging::init();
            init::run_init(force);
        }
        Commands::Config => {
            let settings = load_settings(cli.config.as_deref())?;
            logging::init_with_config(&settings.logging);
            init::run_config(&settings);
        }
        Commands::Watch(args) => {
            let settings = load_settings(cli.config.as_deref())?;
            logging::init_with_config(&settings.logging);
            watch::run_watch(args, settings).await?;
        }
    }

    Ok(())
}

fn load_settings(config: Option<&Path>) -> Result<Settings> {
    let loaded = match config {
        Some(path) => {
            if !path.is_file() {
                bail!("Config file not found: {}", path.display());
            }
            Settings::load_from(path)
        }
        None => Settings::load(),
    };
    loaded.map_err(|e| anyhow!("Failed to load settings: {e}"))
}
