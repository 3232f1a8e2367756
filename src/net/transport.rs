//! Transport descriptors.
//!
//! [`build_transports`] turns the configuration into one plain transport and,
//! when a TLS port is configured, one LDAPS transport on the same address.
//! [`register_extensions`] installs the StartTLS handler so plain
//! connections can upgrade in place whether or not an LDAPS port exists.
//! [`resolve_transports`] prepares both for a server start so that LDAPS and
//! StartTLS present the same certificate when none is configured.

use super::start_tls::StartTlsHandler;
use super::tls::{server_name, TlsIdentity, TlsSettings};
use crate::core::config::Config;
use crate::core::error::{DirectoryError, DirectoryResult};
use crate::directory::engine::DirectoryEngine;
use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;

/// Name of the plain transport.
pub const PLAIN_TRANSPORT: &str = "ldap";

/// Name of the TLS transport.
pub const TLS_TRANSPORT: &str = "ldaps";

/// Everything needed to bind one listener.
#[derive(Clone, PartialEq, Eq)]
pub struct TransportSpec {
    /// Transport name, used in logs and errors.
    pub name: String,
    /// Host or IP address to bind.
    pub bind_address: String,
    /// Port to bind. 0 lets the OS pick.
    pub port: u16,
    /// Whether connections are TLS from the first byte.
    pub tls: bool,
    /// PEM keystore path.
    pub keystore_path: Option<PathBuf>,
    /// Password for an encrypted keystore key.
    pub keystore_password: Option<String>,
    /// PEM bundle of trusted client CAs.
    pub truststore_path: Option<PathBuf>,
    /// Enabled protocol names. `None` leaves engine defaults.
    pub enabled_protocols: Option<BTreeSet<String>>,
    /// Enabled cipher suite names. `None` leaves engine defaults.
    pub enabled_cipher_suites: Option<BTreeSet<String>>,
    /// Require client certificates.
    pub need_client_auth: bool,
    /// Request client certificates.
    pub want_client_auth: bool,
    /// Self-signed identity to serve when no keystore is set.
    pub generated_identity: Option<Arc<TlsIdentity>>,
}

impl TransportSpec {
    /// A plain transport.
    pub fn plain(bind_address: impl Into<String>, port: u16) -> Self {
        Self {
            name: PLAIN_TRANSPORT.to_string(),
            bind_address: bind_address.into(),
            port,
            tls: false,
            keystore_path: None,
            keystore_password: None,
            truststore_path: None,
            enabled_protocols: None,
            enabled_cipher_suites: None,
            need_client_auth: false,
            want_client_auth: false,
            generated_identity: None,
        }
    }

    /// URL scheme for this transport.
    pub fn scheme(&self) -> &'static str {
        if self.tls {
            "ldaps"
        } else {
            "ldap"
        }
    }

    /// Client-facing URL for the configured port.
    pub fn url(&self) -> String {
        self.url_with_port(self.port)
    }

    /// Client-facing URL for `port`. Wildcard addresses are reported as
    /// loopback, IPv6 hosts are bracketed.
    pub fn url_with_port(&self, port: u16) -> String {
        format!("{}://{}:{}", self.scheme(), display_host(&self.bind_address), port)
    }

    /// Resolve the bind address.
    pub fn socket_addr(&self) -> DirectoryResult<SocketAddr> {
        let host = self.bind_address.trim();
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.port));
        }
        (host, self.port)
            .to_socket_addrs()
            .map_err(|e| {
                DirectoryError::transport(&self.name, format!("cannot resolve '{}': {}", host, e))
            })?
            .next()
            .ok_or_else(|| {
                DirectoryError::transport(&self.name, format!("'{}' has no addresses", host))
            })
    }
}

impl std::fmt::Debug for TransportSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSpec")
            .field("name", &self.name)
            .field("bind_address", &self.bind_address)
            .field("port", &self.port)
            .field("tls", &self.tls)
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
            .field("generated_identity", &self.generated_identity.is_some())
            .finish()
    }
}

fn display_host(bind_address: &str) -> String {
    match bind_address.trim() {
        "" | "0.0.0.0" => "127.0.0.1".to_string(),
        "::" | "[::]" => "[::1]".to_string(),
        host if host.starts_with('[') => host.to_string(),
        host if host.contains(':') => format!("[{}]", host),
        host => host.to_string(),
    }
}

fn non_empty_set(values: &[String]) -> Option<BTreeSet<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().cloned().collect())
    }
}

/// Build transport specs from configuration: plain first, then LDAPS when a
/// TLS port is set.
pub fn build_transports(config: &Config) -> Vec<TransportSpec> {
    let mut transports = vec![TransportSpec::plain(
        config.server.bind_address.clone(),
        config.server.port,
    )];

    if let Some(port) = config.tls.port {
        transports.push(TransportSpec {
            name: TLS_TRANSPORT.to_string(),
            bind_address: config.server.bind_address.clone(),
            port,
            tls: true,
            keystore_path: config.tls.keystore_path.clone(),
            keystore_password: config.tls.keystore_password.clone(),
            truststore_path: config.tls.truststore_path.clone(),
            enabled_protocols: non_empty_set(&config.tls.enabled_protocols),
            enabled_cipher_suites: non_empty_set(&config.tls.enabled_cipher_suites),
            need_client_auth: config.tls.need_client_auth,
            want_client_auth: config.tls.want_client_auth,
            generated_identity: None,
        });
    }

    transports
}

/// TLS settings used by StartTLS: the keystore, protocols and ciphers of the
/// configuration, without client authentication.
pub fn start_tls_settings(config: &Config) -> DirectoryResult<TlsSettings> {
    let spec = TransportSpec {
        name: "starttls".to_string(),
        bind_address: config.server.bind_address.clone(),
        port: config.server.port,
        tls: true,
        keystore_path: config.tls.keystore_path.clone(),
        keystore_password: config.tls.keystore_password.clone(),
        truststore_path: None,
        enabled_protocols: non_empty_set(&config.tls.enabled_protocols),
        enabled_cipher_suites: non_empty_set(&config.tls.enabled_cipher_suites),
        need_client_auth: false,
        want_client_auth: false,
        generated_identity: None,
    };
    TlsSettings::from_spec(&spec)
}

/// Generate the self-signed identity for a configuration without a keystore.
pub fn generated_identity(config: &Config) -> DirectoryResult<Option<Arc<TlsIdentity>>> {
    if config.tls.keystore_path.is_some() {
        return Ok(None);
    }
    let identity = TlsIdentity::self_signed(&server_name(&config.server.bind_address))?;
    Ok(Some(Arc::new(identity)))
}

/// Transports and StartTLS settings for one server start. Without a
/// keystore a single generated identity is attached to both.
pub fn resolve_transports(
    config: &Config,
) -> DirectoryResult<(Vec<TransportSpec>, TlsSettings)> {
    let identity = generated_identity(config)?;

    let mut specs = build_transports(config);
    for spec in specs.iter_mut().filter(|spec| spec.tls) {
        spec.generated_identity = identity.clone();
    }

    let mut start_tls = start_tls_settings(config)?;
    start_tls.generated = identity;
    Ok((specs, start_tls))
}

/// Register protocol extensions on the engine.
pub fn register_extensions(
    engine: &dyn DirectoryEngine,
    start_tls: TlsSettings,
) -> DirectoryResult<()> {
    let handler = StartTlsHandler::new(start_tls);
    engine.register_extended_operation(Arc::new(handler))?;
    tracing::debug!("registered StartTLS extended operation");
    Ok(())
}
