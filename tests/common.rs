//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use ldap_server::config::Config;
use ldap_server::importer::ChangeSource;
use ldap_server::memory::InMemoryDirectory;
use ldap_server::net::tcp::{ClientConnection, ConnectionHandler};
use ldap_server::runtime::ServerSession;
use ldap_server::error::ServerResult;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair,
};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

/// Example hierarchy listed parent first.
pub const ORDERED_LDIF: &str = "\
version: 1

dn: dc=example,dc=com
objectClass: top
objectClass: domain
dc: example

dn: ou=People,dc=example,dc=com
objectClass: organizationalUnit
ou: People

dn: uid=alice,ou=People,dc=example,dc=com
objectClass: inetOrgPerson
uid: alice
cn: Alice
sn: Liddell
userPassword: wonderland
";

/// Write an LDIF file into `dir`.
pub fn write_ldif(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("Failed to write LDIF");
    path
}

/// Configuration listening on an ephemeral loopback port.
pub fn local_config() -> Config {
    let mut config = Config::default();
    config.server.bind_address = "127.0.0.1".to_string();
    config.server.port = 0;
    config
}

/// Same as [`local_config`] with LDAPS on an ephemeral port.
pub fn local_tls_config(pki: &TestPki) -> Config {
    let mut config = local_config();
    config.tls.port = Some(0);
    config.tls.keystore_path = Some(pki.keystore.clone());
    config
}

/// Start a server with [`ChannelReportHandler`] and inline LDIF.
pub fn start_server(config: Config, ldif: &str) -> ServerResult<(ServerSession, Arc<InMemoryDirectory>)> {
    let engine = Arc::new(InMemoryDirectory::new().with_connection_handler(Arc::new(ChannelReportHandler)));
    let session = ServerSession::start_with_sources(
        config,
        engine.clone(),
        vec![ChangeSource::inline("test.ldif", ldif)],
    )?;
    Ok((session, engine))
}

/// Answers one request byte. `S` runs StartTLS first; any other byte is
/// answered directly. The reply names the channel and the client identity.
pub struct ChannelReportHandler;

impl ConnectionHandler for ChannelReportHandler {
    fn handle(&self, mut connection: ClientConnection) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            let mut request = [0u8; 1];
            if connection.stream_mut().read_exact(&mut request).await.is_err() {
                return;
            }
            if request[0] == b'S' && !connection.is_secure() {
                connection = match connection.start_tls().await {
                    Ok(upgraded) => upgraded,
                    Err(_) => return,
                };
            }
            let reply = format!(
                "{} {}\n",
                if connection.is_secure() { "secure" } else { "plain" },
                if connection.has_client_certificate() { "cert" } else { "anonymous" },
            );
            let stream = connection.stream_mut();
            let _ = stream.write_all(reply.as_bytes()).await;
            let _ = stream.shutdown().await;
        })
    }
}

/// Test CA with server and client certificates written to a temp dir.
pub struct TestPki {
    pub dir: TempDir,
    pub keystore: PathBuf,
    pub truststore: PathBuf,
    ca_der: CertificateDer<'static>,
    client_der: CertificateDer<'static>,
    client_key_der: Vec<u8>,
}

impl TestPki {
    pub fn generate() -> Self {
        let ca_key = KeyPair::generate().expect("ca key");
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).expect("ca params");
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "ldap-server test CA");
        let ca = ca_params.self_signed(&ca_key).expect("ca cert");

        let (server, server_key) = leaf(
            &ca,
            &ca_key,
            vec!["localhost".to_string(), "127.0.0.1".to_string()],
            ExtendedKeyUsagePurpose::ServerAuth,
        );
        let (client, client_key) = leaf(
            &ca,
            &ca_key,
            vec!["client.test".to_string()],
            ExtendedKeyUsagePurpose::ClientAuth,
        );

        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let keystore = dir.path().join("keystore.pem");
        std::fs::write(
            &keystore,
            format!("{}{}{}", server.pem(), ca.pem(), server_key.serialize_pem()),
        )
        .expect("Failed to write keystore");
        let truststore = dir.path().join("truststore.pem");
        std::fs::write(&truststore, ca.pem()).expect("Failed to write truststore");

        Self {
            dir,
            keystore,
            truststore,
            ca_der: ca.der().clone(),
            client_der: client.der().clone(),
            client_key_der: client_key.serialize_der(),
        }
    }

    /// TLS connector trusting the test CA, optionally presenting the
    /// client certificate.
    pub fn connector(&self, with_client_cert: bool) -> TlsConnector {
        let mut roots = RootCertStore::empty();
        roots.add(self.ca_der.clone()).expect("trust test CA");

        let builder =
            ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
                .with_safe_default_protocol_versions()
                .expect("protocol versions")
                .with_root_certificates(roots);
        let config = if with_client_cert {
            builder
                .with_client_auth_cert(
                    vec![self.client_der.clone()],
                    PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.client_key_der.clone())),
                )
                .expect("client cert")
        } else {
            builder.with_no_client_auth()
        };
        TlsConnector::from(Arc::new(config))
    }
}

fn leaf(
    ca: &Certificate,
    ca_key: &KeyPair,
    names: Vec<String>,
    usage: ExtendedKeyUsagePurpose,
) -> (Certificate, KeyPair) {
    let key = KeyPair::generate().expect("leaf key");
    let mut params = CertificateParams::new(names).expect("leaf params");
    params.extended_key_usages = vec![usage];
    let cert = params.signed_by(&key, ca, ca_key).expect("leaf cert");
    (cert, key)
}

fn localhost() -> ServerName<'static> {
    ServerName::try_from("localhost").expect("server name")
}

/// Send `P` over plain TCP and return the reply.
pub async fn ask_plain(addr: SocketAddr) -> std::io::Result<String> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(b"P").await?;
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await?;
    Ok(reply)
}

/// Connect with TLS, send `P` and return the reply.
pub async fn ask_tls(addr: SocketAddr, connector: &TlsConnector) -> std::io::Result<String> {
    let tcp = TcpStream::connect(addr).await?;
    let mut stream = connector.connect(localhost(), tcp).await?;
    stream.write_all(b"P").await?;
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await?;
    Ok(reply)
}

/// Send `S` in plaintext, upgrade to TLS and return the reply.
pub async fn ask_start_tls(
    addr: SocketAddr,
    connector: &TlsConnector,
) -> std::io::Result<String> {
    let mut tcp = TcpStream::connect(addr).await?;
    tcp.write_all(b"S").await?;
    let mut stream = connector.connect(localhost(), tcp).await?;
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await?;
    Ok(reply)
}

/// Accepts any server certificate. Used to inspect generated certificates.
#[derive(Debug)]
struct AnyServerCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// TLS connector that trusts whatever certificate the server presents.
pub fn trusting_connector() -> TlsConnector {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .expect("protocol versions")
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AnyServerCert(provider)))
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

/// Complete a TLS handshake, directly or after `S` when `start_tls` is set,
/// and return the leaf certificate the server presented.
pub async fn served_certificate(
    addr: SocketAddr,
    start_tls: bool,
) -> std::io::Result<CertificateDer<'static>> {
    let mut tcp = TcpStream::connect(addr).await?;
    tcp.write_all(if start_tls { b"S" } else { b"P" }).await?;
    let mut stream = trusting_connector().connect(localhost(), tcp).await?;
    let leaf = stream
        .get_ref()
        .1
        .peer_certificates()
        .and_then(|chain| chain.first())
        .cloned()
        .ok_or_else(|| std::io::Error::other("no server certificate"))?;
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await?;
    Ok(leaf)
}
