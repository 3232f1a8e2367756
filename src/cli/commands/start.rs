//! Start command implementation.

use crate::core::config::{Config, ConfigOverrides};
use crate::core::runtime::ServerSession;
use crate::directory::memory::InMemoryDirectory;
use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Start the directory server.
#[derive(Args, Debug, Default)]
pub struct StartArgs {
    /// Bind address.
    #[arg(short = 'b', long = "bind")]
    pub bind: Option<String>,

    /// Plain LDAP port.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Enable LDAPS on this port.
    #[arg(long, visible_alias = "sp")]
    pub ssl_port: Option<u16>,

    /// Require client certificates.
    #[arg(long, visible_alias = "snc")]
    pub ssl_need_client_auth: bool,

    /// Request client certificates.
    #[arg(long, visible_alias = "swc")]
    pub ssl_want_client_auth: bool,

    /// Enabled TLS protocol (repeatable).
    #[arg(long = "ssl-enabled-protocol", visible_alias = "sep")]
    pub ssl_enabled_protocols: Vec<String>,

    /// Enabled cipher suite (repeatable).
    #[arg(long = "ssl-enabled-ciphersuite", visible_alias = "scs")]
    pub ssl_enabled_cipher_suites: Vec<String>,

    /// PEM keystore with certificate chain and private key.
    #[arg(long = "ssl-keystore-file", visible_alias = "skf")]
    pub ssl_keystore_file: Option<PathBuf>,

    /// Keystore password.
    #[arg(long, visible_alias = "skp")]
    pub ssl_keystore_password: Option<String>,

    /// Administrator password.
    #[arg(long)]
    pub admin_password: Option<String>,

    /// Allow anonymous binds.
    #[arg(short, long)]
    pub allow_anonymous: bool,

    /// LDIF files to import instead of the built-in data.
    pub ldif_files: Vec<PathBuf>,
}

impl StartArgs {
    /// Config overrides described by these flags.
    pub fn overrides(&self, log_level: Option<String>) -> ConfigOverrides {
        ConfigOverrides {
            log_level,
            bind_address: self.bind.clone(),
            port: self.port,
            allow_anonymous: self.allow_anonymous,
            tls_port: self.ssl_port,
            keystore_path: self.ssl_keystore_file.clone(),
            keystore_password: self.ssl_keystore_password.clone(),
            enabled_protocols: self.ssl_enabled_protocols.clone(),
            enabled_cipher_suites: self.ssl_enabled_cipher_suites.clone(),
            need_client_auth: self.ssl_need_client_auth,
            want_client_auth: self.ssl_want_client_auth,
            admin_password: self.admin_password.clone(),
            ldif_files: self.ldif_files.clone(),
        }
    }
}

/// Initialize tracing subscriber if the telemetry feature is enabled.
#[cfg(feature = "telemetry")]
fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

#[cfg(not(feature = "telemetry"))]
fn init_tracing(_level: &str) {}

/// Load the config file (or defaults) and apply overrides.
pub fn load_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_overrides(overrides);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Run the start command. Serves until Ctrl-C.
pub async fn run_start(
    config_path: Option<&Path>,
    log_level: Option<String>,
    args: StartArgs,
) -> Result<()> {
    let config = load_config(config_path, &args.overrides(log_level))?;
    init_tracing(&config.telemetry.log_level);

    let engine = Arc::new(InMemoryDirectory::new());
    let mut session =
        ServerSession::start(config, engine).context("failed to start directory server")?;

    for url in session.urls() {
        println!("Listening on {}", url);
    }
    println!("Administrator: {}", session.admin_dn());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown requested");

    session.stop().context("shutdown incomplete")?;
    Ok(())
}
