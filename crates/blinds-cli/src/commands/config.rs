//! Config command implementation.

use anyhow::{Context, Result, bail};

use blinds_types::DeviceId;

use crate::cli::ConfigAction;
use crate::config::{Config, looks_like_address};

pub fn cmd_config(action: ConfigAction, mut config: Config) -> Result<()> {
    match action {
        ConfigAction::Path => {
            println!("{}", Config::path().display());
        }
        ConfigAction::Show => {
            let content = toml::to_string_pretty(&config).context("Failed to serialize config")?;
            print!("{}", content);
        }
        ConfigAction::Alias { name, device } => {
            if looks_like_address(&name) {
                bail!("Alias name '{}' looks like a device address", name);
            }
            let address: DeviceId = device
                .parse()
                .with_context(|| format!("Invalid device address '{}'", device))?;

            let previous = config.aliases.insert(name.clone(), address.to_string());
            config.save()?;

            match previous {
                Some(_) => println!("Updated alias '{}' -> {}", name, address),
                None => println!("Added alias '{}' -> {}", name, address),
            }
        }
    }
    Ok(())
}
