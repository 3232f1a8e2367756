//! Networking integration tests.
//!
//! Tests for transport specs, TLS material and the extended operation registry.

mod common;

use common::TestPki;
use ldap_server::config::Config;
use ldap_server::error::DirectoryError;
use ldap_server::net::extended::ExtendedOperations;
use ldap_server::net::start_tls::{StartTlsHandler, START_TLS_OID};
use ldap_server::net::tls::{server_config, ClientAuth, TlsIdentity, TlsSettings, TlsVersion, TrustStore};
use ldap_server::net::transport::{
    build_transports, start_tls_settings, TransportSpec, PLAIN_TRANSPORT, TLS_TRANSPORT,
};
use std::sync::Arc;

// ============================================================================
// Transport Spec Tests
// ============================================================================

#[test]
fn one_transport_without_tls_port() {
    let transports = build_transports(&Config::default());
    assert_eq!(transports.len(), 1);
    assert_eq!(transports[0].name, PLAIN_TRANSPORT);
    assert_eq!(transports[0].url(), "ldap://127.0.0.1:10389");
}

#[test]
fn tls_transport_carries_configuration() {
    let mut config = Config::default();
    config.server.bind_address = "192.168.1.10".to_string();
    config.tls.port = Some(10636);
    config.tls.keystore_path = Some("/etc/ldap/keystore.pem".into());
    config.tls.keystore_password = Some("changeit".to_string());
    config.tls.enabled_protocols = vec!["TLSv1.2".to_string(), "TLSv1.3".to_string()];
    config.tls.enabled_cipher_suites = vec!["TLS_AES_256_GCM_SHA384".to_string()];
    config.tls.need_client_auth = true;

    let transports = build_transports(&config);
    assert_eq!(transports.len(), 2);
    let (plain, tls) = (&transports[0], &transports[1]);
    assert_eq!(plain.bind_address, tls.bind_address);
    assert!(!plain.tls);

    assert_eq!(tls.name, TLS_TRANSPORT);
    assert!(tls.tls);
    assert_eq!(tls.port, 10636);
    assert_eq!(tls.keystore_password.as_deref(), Some("changeit"));
    assert_eq!(tls.enabled_protocols.as_ref().unwrap().len(), 2);
    assert!(tls
        .enabled_cipher_suites
        .as_ref()
        .unwrap()
        .contains("TLS_AES_256_GCM_SHA384"));
    assert!(tls.need_client_auth);
    assert!(!tls.want_client_auth);
    assert_eq!(tls.url(), "ldaps://192.168.1.10:10636");
}

#[test]
fn urls_for_ipv6_hosts() {
    assert_eq!(TransportSpec::plain("::", 389).url(), "ldap://[::1]:389");
    assert_eq!(TransportSpec::plain("fe80::1", 389).url(), "ldap://[fe80::1]:389");
}

#[test]
fn spec_debug_hides_password() {
    let mut spec = TransportSpec::plain("127.0.0.1", 10636);
    spec.keystore_password = Some("changeit".to_string());
    assert!(!format!("{:?}", spec).contains("changeit"));
}

// ============================================================================
// TLS Settings Tests
// ============================================================================

#[test]
fn need_client_auth_wins_over_want() {
    let mut spec = TransportSpec::plain("127.0.0.1", 0);
    spec.tls = true;
    spec.need_client_auth = true;
    spec.want_client_auth = true;
    assert_eq!(TlsSettings::from_spec(&spec).unwrap().client_auth, ClientAuth::Required);

    spec.need_client_auth = false;
    assert_eq!(TlsSettings::from_spec(&spec).unwrap().client_auth, ClientAuth::Optional);
}

#[test]
fn unknown_protocol_is_rejected() {
    let mut spec = TransportSpec::plain("127.0.0.1", 0);
    spec.enabled_protocols = Some(["SSLv3".to_string()].into_iter().collect());
    assert!(matches!(
        TlsSettings::from_spec(&spec),
        Err(DirectoryError::Tls { .. })
    ));
}

#[test]
fn protocol_names_are_case_insensitive() {
    assert_eq!(TlsVersion::parse("tlsv1.3"), Some(TlsVersion::Tls13));
    assert_eq!(TlsVersion::parse("TLSv1.2"), Some(TlsVersion::Tls12));
    assert_eq!(TlsVersion::parse("TLSv1.1"), None);
}

#[test]
fn start_tls_never_asks_for_client_certificates() {
    let mut config = Config::default();
    config.tls.need_client_auth = true;
    let settings = start_tls_settings(&config).unwrap();
    assert_eq!(settings.client_auth, ClientAuth::None);
}

// ============================================================================
// TLS Material Tests
// ============================================================================

#[test]
fn keystore_loads_chain_and_key() {
    let pki = TestPki::generate();
    let identity = TlsIdentity::load(&pki.keystore, None).unwrap();
    assert_eq!(identity.cert_chain.len(), 2);
}

#[test]
fn truststore_loads_ca() {
    let pki = TestPki::generate();
    let trust = TrustStore::load(&pki.truststore).unwrap();
    assert_eq!(trust.len(), 1);
}

#[test]
fn keystore_without_key_is_rejected() {
    let pki = TestPki::generate();
    // The truststore holds only a certificate.
    assert!(matches!(
        TlsIdentity::load(&pki.truststore, None),
        Err(DirectoryError::Tls { .. })
    ));
}

#[test]
fn server_config_with_required_client_auth() {
    let pki = TestPki::generate();
    let mut spec = TransportSpec::plain("127.0.0.1", 0);
    spec.tls = true;
    spec.keystore_path = Some(pki.keystore.clone());
    spec.truststore_path = Some(pki.truststore.clone());
    spec.need_client_auth = true;
    spec.enabled_protocols = Some(["TLSv1.3".to_string()].into_iter().collect());

    let settings = TlsSettings::from_spec(&spec).unwrap();
    server_config(&settings).unwrap();
}

#[test]
fn unmatched_cipher_suites_are_rejected() {
    let mut spec = TransportSpec::plain("127.0.0.1", 0);
    spec.tls = true;
    spec.enabled_cipher_suites = Some(["TLS_NULL_WITH_NULL_NULL".to_string()].into_iter().collect());
    let settings = TlsSettings::from_spec(&spec).unwrap();
    assert!(server_config(&settings).is_err());
}

// ============================================================================
// Extended Operation Tests
// ============================================================================

#[test]
fn start_tls_registers_under_its_oid() {
    let mut registry = ExtendedOperations::new();
    let settings = start_tls_settings(&Config::default()).unwrap();
    registry.register(Arc::new(StartTlsHandler::new(settings)));

    assert_eq!(registry.oids(), vec![START_TLS_OID.to_string()]);
    assert!(registry.get(START_TLS_OID).is_some());
    registry.prepare_all().unwrap();
}
