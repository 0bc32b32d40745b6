//! lodstream CLI
//!
//! Inspects tileset documents and replays synthetic camera flights against
//! the lodstream engine.

mod commands;
mod error;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use lodstream::config::{config_file_path, ConfigFile};
use lodstream::logging::{init_logging, WorkerGuard};

use commands::config::ConfigCommands;
use commands::fly::FlyArgs;
use commands::inspect::InspectArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "lodstream", version, about = "Level-of-detail streaming for 3D tilesets")]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load a tileset document and print its hierarchy summary and warnings
    Inspect(InspectArgs),

    /// Descend a camera onto a tileset and print engine stats per step
    Fly(FlyArgs),

    /// View or modify configuration settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.unwrap_or_else(config_file_path);
    match cli.command {
        Commands::Config { command } => commands::config::run(command, &config_path),
        Commands::Inspect(args) => {
            let (_config, _guard) = setup(&config_path, cli.log_level)?;
            runtime()?.block_on(commands::inspect::run(args))
        }
        Commands::Fly(args) => {
            let (config, _guard) = setup(&config_path, cli.log_level)?;
            runtime()?.block_on(commands::fly::run(args, &config))
        }
    }
}

/// Loads configuration and installs logging.
fn setup(
    path: &Path,
    log_level: Option<String>,
) -> Result<(ConfigFile, Option<WorkerGuard>), CliError> {
    let config = ConfigFile::load_or_default(path)?;

    let mut logging = config.logging.clone();
    if let Some(level) = log_level {
        logging.level = level;
    }
    let guard = init_logging(&logging)?;
    Ok((config, guard))
}

fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)
}
