//! `config`: read and edit the INI configuration file.
//!
//! Every subcommand works on the file selected by the global `--config`
//! option, falling back to the platform default location.

use std::path::Path;

use clap::Subcommand;
use console::style;
use lodstream::config::{ConfigFile, ConfigKey};

use crate::error::CliError;

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print one value, e.g. `config get memory.budget_mb`
    Get {
        /// Key as section.name
        key: String,
    },

    /// Change one value and write the file back
    Set {
        /// Key as section.name
        key: String,

        /// New value
        value: String,
    },

    /// Print every known key with its effective value
    List,

    /// Print the configuration file location
    Path,
}

pub fn run(command: ConfigCommands, path: &Path) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => {
            let key = parse_key(&key)?;
            let config = ConfigFile::load_or_default(path)?;
            println!("{}", display_value(&key.get(&config)));
        }
        ConfigCommands::Set { key, value } => {
            let key = parse_key(&key)?;
            let config = ConfigFile::update(path, key, &value)?;
            println!("{} = {}", key, display_value(&key.get(&config)));
        }
        ConfigCommands::List => list(&ConfigFile::load_or_default(path)?, path),
        ConfigCommands::Path => println!("{}", path.display()),
    }
    Ok(())
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        let known: Vec<String> = ConfigKey::all().iter().map(ConfigKey::name).collect();
        CliError::Config(format!(
            "unknown key '{}' (known keys: {})",
            key,
            known.join(", ")
        ))
    })
}

fn display_value(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}

fn list(config: &ConfigFile, path: &Path) {
    let source = if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not created yet, showing defaults)", path.display())
    };
    println!("{}", style(source).dim());

    let mut section = "";
    for key in ConfigKey::all() {
        if key.section() != section {
            section = key.section();
            println!();
            println!("{}", style(format!("[{}]", section)).bold());
        }
        println!("  {} = {}", key.key_name(), display_value(&key.get(config)));
    }
}
