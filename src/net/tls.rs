//! TLS configuration for LDAPS listeners and StartTLS.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TLS Configuration                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │   TlsSettings      - Keystore, protocols, ciphers, auth     │
//! │   TlsIdentity      - Loaded certificate chain + key         │
//! │   TrustStore       - CAs for client certificate checks      │
//! │   server_config    - Builds rustls ServerConfig             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The keystore is a PEM bundle holding the certificate chain and one private
//! key (PKCS#8, PKCS#1 or SEC1). An `ENCRYPTED PRIVATE KEY` block is
//! decrypted with the keystore password. Without a keystore a self-signed
//! certificate is generated for the bind host, once per server, and shared
//! by every listener through [`TlsSettings::generated`].

use super::transport::TransportSpec;
use crate::core::error::{DirectoryError, DirectoryResult};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{
    CertificateDer, PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer, PrivateSec1KeyDer,
};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig, SupportedProtocolVersion};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

/// TLS protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    /// Accepted protocol names.
    pub const NAMES: [&'static str; 2] = ["TLSv1.2", "TLSv1.3"];

    /// Parse a protocol name such as `TLSv1.3`.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.eq_ignore_ascii_case("TLSv1.2") {
            Some(Self::Tls12)
        } else if name.eq_ignore_ascii_case("TLSv1.3") {
            Some(Self::Tls13)
        } else {
            None
        }
    }

    /// Protocol name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tls12 => "TLSv1.2",
            Self::Tls13 => "TLSv1.3",
        }
    }

    fn protocol(&self) -> &'static SupportedProtocolVersion {
        match self {
            Self::Tls12 => &rustls::version::TLS12,
            Self::Tls13 => &rustls::version::TLS13,
        }
    }
}

/// Client certificate policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAuth {
    /// Do not request client certificates.
    None,
    /// Request a certificate, accept clients without one.
    Optional,
    /// Reject clients without a valid certificate.
    Required,
}

/// Resolved TLS settings for one listener.
#[derive(Clone)]
pub struct TlsSettings {
    /// PEM keystore path. A self-signed identity is used when unset.
    pub keystore_path: Option<PathBuf>,
    /// Password for an encrypted keystore key.
    pub keystore_password: Option<String>,
    /// PEM bundle of client CAs. The keystore chain is trusted when unset.
    pub truststore_path: Option<PathBuf>,
    /// Enabled protocol versions. Empty means all supported.
    pub protocols: Vec<TlsVersion>,
    /// Enabled cipher suites by IANA name. Empty means provider defaults.
    pub cipher_suites: Vec<String>,
    /// Client certificate policy.
    pub client_auth: ClientAuth,
    /// Host name placed in a generated certificate.
    pub server_name: String,
    /// Generated identity used when no keystore is set.
    pub generated: Option<Arc<TlsIdentity>>,
}

impl TlsSettings {
    /// Settings for a transport spec. Unknown protocol names are rejected.
    pub fn from_spec(spec: &TransportSpec) -> DirectoryResult<Self> {
        let mut protocols = Vec::new();
        for name in spec.enabled_protocols.iter().flatten() {
            let version = TlsVersion::parse(name).ok_or_else(|| {
                DirectoryError::tls(format!("unsupported protocol '{}'", name))
            })?;
            protocols.push(version);
        }

        let client_auth = if spec.need_client_auth {
            ClientAuth::Required
        } else if spec.want_client_auth {
            ClientAuth::Optional
        } else {
            ClientAuth::None
        };

        Ok(Self {
            keystore_path: spec.keystore_path.clone(),
            keystore_password: spec.keystore_password.clone(),
            truststore_path: spec.truststore_path.clone(),
            protocols,
            cipher_suites: spec.enabled_cipher_suites.iter().flatten().cloned().collect(),
            client_auth,
            server_name: server_name(&spec.bind_address),
            generated: spec.generated_identity.clone(),
        })
    }

    /// Load the configured identity. Without a keystore the shared generated
    /// identity is used, or a fresh self-signed one when none was attached.
    pub fn identity(&self) -> DirectoryResult<Arc<TlsIdentity>> {
        match (&self.keystore_path, &self.generated) {
            (Some(path), _) => {
                TlsIdentity::load(path, self.keystore_password.as_deref()).map(Arc::new)
            }
            (None, Some(shared)) => Ok(shared.clone()),
            (None, None) => TlsIdentity::self_signed(&self.server_name).map(Arc::new),
        }
    }
}

/// Host name for a generated certificate on `bind_address`.
pub fn server_name(bind_address: &str) -> String {
    match bind_address.trim() {
        "" | "0.0.0.0" | "::" | "[::]" => "localhost".to_string(),
        host => host.trim_start_matches('[').trim_end_matches(']').to_string(),
    }
}

impl std::fmt::Debug for TlsSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsSettings")
            .field("keystore_path", &self.keystore_path)
            .field(
                "keystore_password",
                &self.keystore_password.as_ref().map(|_| "***"),
            )
            .field("truststore_path", &self.truststore_path)
            .field("protocols", &self.protocols)
            .field("cipher_suites", &self.cipher_suites)
            .field("client_auth", &self.client_auth)
            .field("server_name", &self.server_name)
            .field("generated", &self.generated.is_some())
            .finish()
    }
}

/// Loaded certificate chain and private key.
#[derive(PartialEq, Eq)]
pub struct TlsIdentity {
    /// Certificate chain, leaf first.
    pub cert_chain: Vec<CertificateDer<'static>>,
    /// Private key.
    pub key: PrivateKeyDer<'static>,
}

impl TlsIdentity {
    /// Load an identity from a PEM keystore.
    pub fn load(path: &Path, password: Option<&str>) -> DirectoryResult<Self> {
        let data = std::fs::read(path).map_err(|e| {
            DirectoryError::tls(format!("cannot read keystore {}: {}", path.display(), e))
        })?;
        let blocks = pem::parse_many(&data).map_err(|e| {
            DirectoryError::tls(format!("keystore {} is not PEM: {}", path.display(), e))
        })?;

        let mut cert_chain = Vec::new();
        let mut key = None;
        for block in blocks {
            let tag = block.tag().to_string();
            match tag.as_str() {
                "CERTIFICATE" => cert_chain.push(CertificateDer::from(block.into_contents())),
                "PRIVATE KEY" => {
                    key = Some(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
                        block.into_contents(),
                    )))
                }
                "RSA PRIVATE KEY" => {
                    key = Some(PrivateKeyDer::Pkcs1(PrivatePkcs1KeyDer::from(
                        block.into_contents(),
                    )))
                }
                "EC PRIVATE KEY" => {
                    key = Some(PrivateKeyDer::Sec1(PrivateSec1KeyDer::from(
                        block.into_contents(),
                    )))
                }
                "ENCRYPTED PRIVATE KEY" => {
                    key = Some(decrypt_key(path, block.contents(), password)?);
                }
                other => {
                    tracing::debug!(keystore = %path.display(), tag = other, "ignoring PEM block");
                }
            }
        }

        if cert_chain.is_empty() {
            return Err(DirectoryError::tls(format!(
                "keystore {} contains no certificate",
                path.display()
            )));
        }
        let key = key.ok_or_else(|| {
            DirectoryError::tls(format!("keystore {} contains no private key", path.display()))
        })?;

        Ok(Self { cert_chain, key })
    }

    /// Generate a self-signed identity for `host`.
    pub fn self_signed(host: &str) -> DirectoryResult<Self> {
        let mut names = vec![host.to_string()];
        if host != "localhost" {
            names.push("localhost".to_string());
        }
        let certified = rcgen::generate_simple_self_signed(names).map_err(|e| {
            DirectoryError::tls(format!("cannot generate self-signed certificate: {}", e))
        })?;
        tracing::info!(host, "using generated self-signed certificate");
        Ok(Self {
            cert_chain: vec![certified.cert.der().clone()],
            key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
                certified.key_pair.serialize_der(),
            )),
        })
    }

    /// Trust store made of this identity's own chain.
    pub fn trust_store(&self) -> DirectoryResult<TrustStore> {
        TrustStore::from_certs(self.cert_chain.iter().cloned())
    }
}

impl std::fmt::Debug for TlsIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsIdentity")
            .field("certificates", &self.cert_chain.len())
            .finish_non_exhaustive()
    }
}

fn decrypt_key(
    path: &Path,
    der: &[u8],
    password: Option<&str>,
) -> DirectoryResult<PrivateKeyDer<'static>> {
    let password = password.ok_or_else(|| {
        DirectoryError::tls(format!(
            "keystore {} holds an encrypted key but no password is configured",
            path.display()
        ))
    })?;
    let info = pkcs8::EncryptedPrivateKeyInfo::try_from(der)
        .map_err(|e| DirectoryError::tls(format!("invalid encrypted key: {}", e)))?;
    let document = info.decrypt(password).map_err(|e| {
        DirectoryError::tls(format!(
            "cannot decrypt key in keystore {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        document.as_bytes().to_vec(),
    )))
}

/// CA certificates trusted for client authentication.
#[derive(Debug, Clone)]
pub struct TrustStore {
    roots: RootCertStore,
}

impl TrustStore {
    /// Load a PEM CA bundle.
    pub fn load(path: &Path) -> DirectoryResult<Self> {
        let data = std::fs::read(path).map_err(|e| {
            DirectoryError::tls(format!("cannot read truststore {}: {}", path.display(), e))
        })?;
        let blocks = pem::parse_many(&data).map_err(|e| {
            DirectoryError::tls(format!("truststore {} is not PEM: {}", path.display(), e))
        })?;
        Self::from_certs(
            blocks
                .into_iter()
                .filter(|b| b.tag() == "CERTIFICATE")
                .map(|b| CertificateDer::from(b.into_contents())),
        )
    }

    /// Build from DER certificates.
    pub fn from_certs(
        certs: impl IntoIterator<Item = CertificateDer<'static>>,
    ) -> DirectoryResult<Self> {
        let mut roots = RootCertStore::empty();
        for cert in certs {
            roots
                .add(cert)
                .map_err(|e| DirectoryError::tls(format!("untrusted CA certificate: {}", e)))?;
        }
        if roots.is_empty() {
            return Err(DirectoryError::tls("truststore contains no certificate"));
        }
        Ok(Self { roots })
    }

    /// Number of trusted certificates.
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

/// IANA name of a cipher suite. rustls names TLS 1.3 suites `TLS13_*`.
fn iana_name(suite: rustls::CipherSuite) -> String {
    let name = format!("{:?}", suite);
    match name.strip_prefix("TLS13_") {
        Some(rest) => format!("TLS_{}", rest),
        None => name,
    }
}

fn crypto_provider(settings: &TlsSettings) -> DirectoryResult<CryptoProvider> {
    let mut provider = rustls::crypto::ring::default_provider();
    if settings.cipher_suites.is_empty() {
        return Ok(provider);
    }

    provider.cipher_suites.retain(|suite| {
        let name = iana_name(suite.suite());
        settings
            .cipher_suites
            .iter()
            .any(|wanted| wanted.trim().eq_ignore_ascii_case(&name))
    });
    if provider.cipher_suites.is_empty() {
        return Err(DirectoryError::tls(format!(
            "none of the enabled cipher suites are supported: {}",
            settings.cipher_suites.join(", ")
        )));
    }
    Ok(provider)
}

/// Build a rustls server configuration.
pub fn server_config(settings: &TlsSettings) -> DirectoryResult<ServerConfig> {
    let provider = Arc::new(crypto_provider(settings)?);

    let versions: Vec<&'static SupportedProtocolVersion> = if settings.protocols.is_empty() {
        rustls::ALL_VERSIONS.to_vec()
    } else {
        settings.protocols.iter().map(TlsVersion::protocol).collect()
    };

    let builder = ServerConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&versions)
        .map_err(|e| DirectoryError::tls(format!("invalid protocol selection: {}", e)))?;

    let identity = settings.identity()?;

    let builder = match settings.client_auth {
        ClientAuth::None => builder.with_no_client_auth(),
        policy => {
            let trust = match &settings.truststore_path {
                Some(path) => TrustStore::load(path)?,
                None => identity.trust_store()?,
            };
            let verifier =
                WebPkiClientVerifier::builder_with_provider(Arc::new(trust.roots), provider);
            let verifier = if policy == ClientAuth::Optional {
                verifier.allow_unauthenticated()
            } else {
                verifier
            };
            let verifier = verifier
                .build()
                .map_err(|e| DirectoryError::tls(format!("invalid client verifier: {}", e)))?;
            builder.with_client_cert_verifier(verifier)
        }
    };

    builder
        .with_single_cert(identity.cert_chain.clone(), identity.key.clone_key())
        .map_err(|e| DirectoryError::tls(format!("invalid certificate or key: {}", e)))
}

/// Build a TLS acceptor.
pub fn acceptor(settings: &TlsSettings) -> DirectoryResult<TlsAcceptor> {
    Ok(TlsAcceptor::from(Arc::new(server_config(settings)?)))
}
