//! Configuration view and validation, `issue-assistant config`.

use std::path::Path;

use anyhow::{Result, bail};
use issue_assistant::config::{DEFAULT_CONFIG_FILE, Settings};

use super::super::ConfigCommands;

fn config_source(config: Option<&Path>) -> String {
    match config {
        Some(path) => path.display().to_string(),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => DEFAULT_CONFIG_FILE.to_string(),
        None => "(none, using defaults and environment)".to_string(),
    }
}

pub fn cmd_config(config: Option<&Path>, command: Option<ConfigCommands>) -> Result<()> {
    let settings = Settings::resolve(config)?;

    match command {
        None | Some(ConfigCommands::Show) => {
            println!("# Config file: {}", config_source(config));
            println!("# Status: {}", settings.config_status().label());
            println!();
            print!("{}", settings.redacted().to_toml()?);
        }
        Some(ConfigCommands::Validate) => {
            let missing = settings.validate();
            if !missing.is_empty() {
                for entry in &missing {
                    eprintln!("  missing: {}", entry);
                }
                bail!("Configuration is incomplete ({} problem(s))", missing.len());
            }
            println!("Configuration is valid.");
            if let Some(repo) = &settings.github.repo {
                println!("  repository: {}", repo);
            }
            println!("  port:       {}", settings.server.port);
        }
    }
    Ok(())
}
