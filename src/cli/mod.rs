//! Command-line interface.

pub mod commands;

use clap::{Parser, Subcommand};

/// ldap-server - embeddable LDAP directory server.
#[derive(Parser, Debug)]
#[command(name = "ldap-server")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the directory server.
    Start(commands::StartArgs),
    /// Configuration operations.
    Config(commands::ConfigArgs),
    /// Inspect LDIF files.
    Inspect(commands::InspectArgs),
}
