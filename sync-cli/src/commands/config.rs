//! Show the effective configuration.

use anyhow::Result;
use std::path::Path;

use crate::config::{default_config_path, CliConfig};

/// Run the config command.
pub fn run(config: &CliConfig, source: Option<&Path>) -> Result<()> {
    match source {
        Some(path) => println!("# Loaded from {}", path.display()),
        None => match default_config_path() {
            Some(path) => println!("# Defaults ({} not found)", path.display()),
            None => println!("# Defaults"),
        },
    }
    print!("{}", config.to_toml()?);
    Ok(())
}
