//! Config command implementation.

use super::start::load_config;
use crate::core::config::ConfigOverrides;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::Path;

/// Configuration operations.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate a configuration file.
    Validate,
    /// Print the effective configuration with defaults.
    Show {
        /// Output format (toml, json).
        #[arg(long, default_value = "toml")]
        format: String,
    },
}

/// Run the config command.
pub fn run_config(config_path: Option<&Path>, args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Validate => {
            let path = config_path.context("--config is required for validate")?;
            validate_config(path)
        }
        ConfigCommand::Show { format } => {
            println!("{}", render_config(config_path, &format)?);
            Ok(())
        }
    }
}

fn validate_config(path: &Path) -> Result<()> {
    let config = load_config(Some(path), &ConfigOverrides::default())?;
    println!("✓ {} is valid", path.display());
    if config.tls.port.is_none() {
        println!("  ⚠ LDAPS disabled ([tls] port not set)");
    } else if config.tls.keystore_path.is_none() {
        println!("  ⚠ No keystore configured, a self-signed certificate will be generated");
    }
    if config.admin.password.is_none() {
        println!("  ⚠ Administrator keeps the default password");
    }
    Ok(())
}

fn render_config(path: Option<&Path>, format: &str) -> Result<String> {
    let mut config = load_config(path, &ConfigOverrides::default())?;
    for secret in [&mut config.admin.password, &mut config.tls.keystore_password] {
        if secret.is_some() {
            *secret = Some("****".to_string());
        }
    }
    match format {
        "json" => Ok(serde_json::to_string_pretty(&config)?),
        "toml" => config.to_toml(),
        other => anyhow::bail!("unknown format: {}", other),
    }
}
