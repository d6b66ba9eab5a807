//! `permanence config`: show, validate and init.

use std::path::Path;

use anyhow::{Context, Result, bail};
use permanence::config::{PortalConfig, default_config_path};

use super::load_config;
use crate::ConfigCommands;

const MASK: &str = "********";

/// Copy of the effective configuration that is safe to print.
fn masked(config: &PortalConfig) -> PortalConfig {
    let mut shown = config.clone();
    if shown.email.api_key.is_some() {
        shown.email.api_key = Some(MASK.to_string());
    }
    shown.admin.tokens = shown.admin.tokens.iter().map(|_| MASK.to_string()).collect();
    shown
}

pub fn cmd_config(explicit_path: Option<&Path>, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = explicit_path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_config_path);

    match command {
        None | Some(ConfigCommands::Show) => {
            let config = &load_config(explicit_path)?;
            if config_path.exists() {
                println!("# Config file: {}", config_path.display());
            } else {
                println!("# No config file at {}, using defaults", config_path.display());
            }
            println!("# Effective values (file + environment)");
            println!();
            let rendered = toml::to_string_pretty(&masked(config))
                .context("Failed to render configuration")?;
            print!("{}", rendered);
            if config.email.api_key.is_none() {
                println!();
                println!("# EMAIL_API_KEY not set: emails will be logged, not sent.");
            }
        }
        Some(ConfigCommands::Validate) => {
            let config = load_config(explicit_path)?;
            let errors = config.validate();
            if errors.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration errors:");
                for error in &errors {
                    println!("  - {}", error);
                }
                bail!("Configuration has {} error(s)", errors.len());
            }
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                bail!(
                    "{} already exists. Remove it first to regenerate.",
                    config_path.display()
                );
            }
            PortalConfig::default().save(&config_path)?;
            println!("Created {}", config_path.display());
        }
    }

    Ok(())
}
