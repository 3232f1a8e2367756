//! ldap-server - unified CLI entrypoint.
//!
//! Usage:
//!   ldap-server start [--config FILE] [OPTIONS] [LDIF...]
//!   ldap-server config validate --config FILE
//!   ldap-server config show --config FILE [--format json]
//!   ldap-server inspect ldif FILE...

use anyhow::Result;
use clap::Parser;
use ldap_server::cli::commands::{run_config, run_inspect, run_start};
use ldap_server::cli::{Cli, Commands};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.map(PathBuf::from);

    match cli.command {
        Commands::Start(args) => run_start(config_path.as_deref(), cli.log_level, args).await,
        Commands::Config(args) => run_config(config_path.as_deref(), args),
        Commands::Inspect(args) => run_inspect(args),
    }
}
