//! Configuration parsing and validation.
//!
//! Server configuration is loaded from TOML files with CLI overrides. Every
//! field has a default, so an empty file (or no file at all) describes a plain
//! LDAP listener on `0.0.0.0:10389` serving the built-in example data.

use crate::net::tls::TlsVersion;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Wildcard bind address used when none is configured.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// Default plain LDAP port.
pub const DEFAULT_PORT: u16 = 10389;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Plain listener and directory access settings.
    #[serde(default)]
    pub server: ServerSection,

    /// LDAPS listener and TLS material.
    #[serde(default)]
    pub tls: TlsSection,

    /// Administrator account settings.
    #[serde(default)]
    pub admin: AdminSection,

    /// Change sources imported at startup.
    #[serde(default)]
    pub import: ImportSection,

    /// Logging configuration.
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

/// Plain listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Address shared by the plain and TLS listeners.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Plain LDAP port. Port 0 lets the OS pick one.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Allow anonymous simple binds.
    #[serde(default)]
    pub allow_anonymous: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            allow_anonymous: false,
        }
    }
}

/// TLS configuration, used by the LDAPS listener and by StartTLS.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct TlsSection {
    /// LDAPS port. No LDAPS listener is started when unset.
    #[serde(default)]
    pub port: Option<u16>,

    /// PEM keystore holding the certificate chain and private key.
    #[serde(default)]
    pub keystore_path: Option<PathBuf>,

    /// Password for an encrypted private key in the keystore.
    #[serde(default)]
    pub keystore_password: Option<String>,

    /// PEM bundle of CAs trusted for client certificates.
    #[serde(default)]
    pub truststore_path: Option<PathBuf>,

    /// Enabled protocol versions, e.g. `TLSv1.3`. Empty means engine defaults.
    #[serde(default)]
    pub enabled_protocols: Vec<String>,

    /// Enabled cipher suites by IANA name. Empty means engine defaults.
    #[serde(default)]
    pub enabled_cipher_suites: Vec<String>,

    /// Require client certificates on LDAPS.
    #[serde(default)]
    pub need_client_auth: bool,

    /// Request (but do not require) client certificates on LDAPS.
    #[serde(default)]
    pub want_client_auth: bool,
}

impl std::fmt::Debug for TlsSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsSection")
            .field("port", &self.port)
            .field("keystore_path", &self.keystore_path)
            .field(
                "keystore_password",
                &self.keystore_password.as_ref().map(|_| "***"),
            )
            .field("truststore_path", &self.truststore_path)
            .field("enabled_protocols", &self.enabled_protocols)
            .field("enabled_cipher_suites", &self.enabled_cipher_suites)
            .field("need_client_auth", &self.need_client_auth)
            .field("want_client_auth", &self.want_client_auth)
            .finish()
    }
}

/// Administrator account configuration.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AdminSection {
    /// Replaces the administrator password after import.
    #[serde(default)]
    pub password: Option<String>,
}

impl std::fmt::Debug for AdminSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSection")
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Startup import configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportSection {
    /// LDIF files imported in order. The built-in dataset is used when empty.
    #[serde(default)]
    pub ldif_files: Vec<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySection {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// Default value functions

fn default_bind_address() -> String {
    DEFAULT_BIND_ADDRESS.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to render config")
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if let Some(ref bind) = overrides.bind_address {
            self.server.bind_address = bind.clone();
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if overrides.allow_anonymous {
            self.server.allow_anonymous = true;
        }
        if let Some(port) = overrides.tls_port {
            self.tls.port = Some(port);
        }
        if let Some(ref path) = overrides.keystore_path {
            self.tls.keystore_path = Some(path.clone());
        }
        if let Some(ref password) = overrides.keystore_password {
            self.tls.keystore_password = Some(password.clone());
        }
        if !overrides.enabled_protocols.is_empty() {
            self.tls.enabled_protocols = overrides.enabled_protocols.clone();
        }
        if !overrides.enabled_cipher_suites.is_empty() {
            self.tls.enabled_cipher_suites = overrides.enabled_cipher_suites.clone();
        }
        if overrides.need_client_auth {
            self.tls.need_client_auth = true;
        }
        if overrides.want_client_auth {
            self.tls.want_client_auth = true;
        }
        if let Some(ref password) = overrides.admin_password {
            self.admin.password = Some(password.clone());
        }
        if !overrides.ldif_files.is_empty() {
            self.import.ldif_files = overrides.ldif_files.clone();
        }
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_server()?;
        self.validate_tls()?;
        self.validate_admin()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<()> {
        if self.server.bind_address.trim().is_empty() {
            anyhow::bail!("server.bind_address must not be empty");
        }
        Ok(())
    }

    fn validate_tls(&self) -> Result<()> {
        if let Some(tls_port) = self.tls.port {
            if tls_port != 0 && tls_port == self.server.port {
                anyhow::bail!(
                    "tls.port ({}) must differ from server.port ({})",
                    tls_port,
                    self.server.port
                );
            }
        }

        for protocol in &self.tls.enabled_protocols {
            if TlsVersion::parse(protocol).is_none() {
                anyhow::bail!(
                    "tls.enabled_protocols contains unsupported protocol '{}' (supported: {:?})",
                    protocol,
                    TlsVersion::NAMES
                );
            }
        }

        if self.tls.keystore_password.is_some() && self.tls.keystore_path.is_none() {
            anyhow::bail!("tls.keystore_password is set without tls.keystore_path");
        }

        Ok(())
    }

    fn validate_admin(&self) -> Result<()> {
        if matches!(self.admin.password.as_deref(), Some("")) {
            anyhow::bail!("admin.password must not be empty");
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.telemetry.log_level
            );
        }
        Ok(())
    }
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override log level.
    pub log_level: Option<String>,
    /// Override bind address.
    pub bind_address: Option<String>,
    /// Override plain port.
    pub port: Option<u16>,
    /// Enable anonymous binds.
    pub allow_anonymous: bool,
    /// Enable the LDAPS listener on this port.
    pub tls_port: Option<u16>,
    /// Override keystore path.
    pub keystore_path: Option<PathBuf>,
    /// Override keystore password.
    pub keystore_password: Option<String>,
    /// Replace enabled TLS protocols.
    pub enabled_protocols: Vec<String>,
    /// Replace enabled cipher suites.
    pub enabled_cipher_suites: Vec<String>,
    /// Require client certificates.
    pub need_client_auth: bool,
    /// Request client certificates.
    pub want_client_auth: bool,
    /// Override administrator password.
    pub admin_password: Option<String>,
    /// Replace the LDIF files to import.
    pub ldif_files: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.server.port, 10389);
        assert!(!config.server.allow_anonymous);
        assert!(config.tls.port.is_none());
        assert!(config.import.ldif_files.is_empty());
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn parse_full_config() {
        let config = Config::from_toml(
            r#"
[server]
bind_address = "127.0.0.1"
port = 389
allow_anonymous = true

[tls]
port = 636
keystore_path = "server.pem"
keystore_password = "changeit"
enabled_protocols = ["TLSv1.3"]
enabled_cipher_suites = ["TLS_AES_128_GCM_SHA256"]
need_client_auth = true

[admin]
password = "s3cret"

[import]
ldif_files = ["a.ldif", "b.ldif"]
"#,
        )
        .unwrap();

        assert_eq!(config.server.port, 389);
        assert_eq!(config.tls.port, Some(636));
        assert_eq!(config.tls.enabled_protocols, vec!["TLSv1.3"]);
        assert!(config.tls.need_client_auth);
        assert!(!config.tls.want_client_auth);
        assert_eq!(config.admin.password.as_deref(), Some("s3cret"));
        assert_eq!(config.import.ldif_files.len(), 2);
    }

    #[test]
    fn reject_same_plain_and_tls_port() {
        let result = Config::from_toml("[server]\nport = 10389\n[tls]\nport = 10389\n");
        assert!(result.unwrap_err().to_string().contains("tls.port"));
    }

    #[test]
    fn ephemeral_ports_may_coincide() {
        let config = Config::from_toml("[server]\nport = 0\n[tls]\nport = 0\n").unwrap();
        assert_eq!(config.tls.port, Some(0));
    }

    #[test]
    fn reject_unknown_protocol() {
        let result = Config::from_toml("[tls]\nenabled_protocols = [\"SSLv3\"]\n");
        assert!(result.unwrap_err().to_string().contains("SSLv3"));
    }

    #[test]
    fn reject_empty_admin_password() {
        let result = Config::from_toml("[admin]\npassword = \"\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn reject_password_without_keystore() {
        let result = Config::from_toml("[tls]\nkeystore_password = \"x\"\n");
        assert!(result.unwrap_err().to_string().contains("keystore_path"));
    }

    #[test]
    fn reject_invalid_log_level() {
        let result = Config::from_toml("[telemetry]\nlog_level = \"loud\"\n");
        assert!(result.unwrap_err().to_string().contains("log_level"));
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut config = Config::default();
        config.apply_overrides(&ConfigOverrides {
            bind_address: Some("::1".to_string()),
            port: Some(1389),
            tls_port: Some(1636),
            enabled_protocols: vec!["TLSv1.2".to_string()],
            want_client_auth: true,
            admin_password: Some("override".to_string()),
            ldif_files: vec![PathBuf::from("users.ldif")],
            ..Default::default()
        });

        assert_eq!(config.server.bind_address, "::1");
        assert_eq!(config.server.port, 1389);
        assert_eq!(config.tls.port, Some(1636));
        assert_eq!(config.tls.enabled_protocols, vec!["TLSv1.2"]);
        assert!(config.tls.want_client_auth);
        assert_eq!(config.admin.password.as_deref(), Some("override"));
        assert_eq!(config.import.ldif_files, vec![PathBuf::from("users.ldif")]);
        config.validate().unwrap();
    }

    #[test]
    fn debug_output_masks_secrets() {
        let mut config = Config::default();
        config.admin.password = Some("hunter2".to_string());
        config.tls.keystore_path = Some(PathBuf::from("k.pem"));
        config.tls.keystore_password = Some("hunter3".to_string());
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("hunter3"));
    }

    #[test]
    fn toml_round_trip_keeps_sections() {
        let mut config = Config::default();
        config.tls.port = Some(10636);
        let rendered = config.to_toml().unwrap();
        let parsed = Config::from_toml(&rendered).unwrap();
        assert_eq!(parsed.tls.port, Some(10636));
    }
}
