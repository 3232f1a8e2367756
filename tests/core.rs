//! Core infrastructure tests.

mod common;

use ldap_server::core::config::{Config, ConfigOverrides};
use ldap_server::core::error::{DirectoryError, LdifError, ServerError, ShutdownFailure};
use std::io::Write;
use tempfile::NamedTempFile;

// ============================================================================
// Config tests
// ============================================================================

#[test]
fn parse_full_config() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(
        br#"
[server]
bind_address = "127.0.0.1"
port = 1389
allow_anonymous = true

[tls]
port = 1636
keystore_path = "/etc/ldap/keystore.pem"
keystore_password = "changeit"
enabled_protocols = ["TLSv1.3"]
want_client_auth = true

[admin]
password = "n3w"

[import]
ldif_files = ["users.ldif", "groups.ldif"]

[telemetry]
log_level = "debug"
"#,
    )
    .unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.server.port, 1389);
    assert!(config.server.allow_anonymous);
    assert_eq!(config.tls.port, Some(1636));
    assert_eq!(config.tls.enabled_protocols, vec!["TLSv1.3"]);
    assert!(config.tls.want_client_auth);
    assert_eq!(config.admin.password.as_deref(), Some("n3w"));
    assert_eq!(config.import.ldif_files.len(), 2);
    assert_eq!(config.telemetry.log_level, "debug");
}

#[test]
fn empty_config_uses_defaults() {
    let config = Config::from_toml("").unwrap();
    assert_eq!(config.server.bind_address, "0.0.0.0");
    assert_eq!(config.server.port, 10389);
    assert!(!config.server.allow_anonymous);
    assert!(config.tls.port.is_none());
    assert!(config.import.ldif_files.is_empty());
}

#[test]
fn validate_rejects_port_collision() {
    let err = Config::from_toml("[server]\nport = 1389\n[tls]\nport = 1389\n").unwrap_err();
    assert!(format!("{:#}", err).contains("must differ"));
}

#[test]
fn validate_rejects_unknown_protocol() {
    assert!(Config::from_toml("[tls]\nenabled_protocols = [\"SSLv3\"]\n").is_err());
}

#[test]
fn validate_rejects_empty_admin_password() {
    assert!(Config::from_toml("[admin]\npassword = \"\"\n").is_err());
}

#[test]
fn overrides_replace_file_values() {
    let mut config = Config::from_toml("[server]\nport = 1389\n").unwrap();
    config.apply_overrides(&ConfigOverrides {
        port: Some(2389),
        tls_port: Some(2636),
        enabled_cipher_suites: vec!["TLS_AES_128_GCM_SHA256".to_string()],
        admin_password: Some("override".to_string()),
        ..Default::default()
    });
    assert_eq!(config.server.port, 2389);
    assert_eq!(config.tls.port, Some(2636));
    assert_eq!(config.tls.enabled_cipher_suites.len(), 1);
    assert_eq!(config.admin.password.as_deref(), Some("override"));
    config.validate().unwrap();
}

#[test]
fn config_round_trips_through_toml() {
    let mut config = Config::default();
    config.tls.port = Some(10636);
    let rendered = config.to_toml().unwrap();
    let parsed = Config::from_toml(&rendered).unwrap();
    assert_eq!(parsed.tls.port, Some(10636));
}

#[test]
fn debug_hides_passwords() {
    let config = Config::from_toml(
        "[admin]\npassword = \"hunter2\"\n[tls]\nkeystore_path = \"k.pem\"\nkeystore_password = \"changeit\"\n",
    )
    .unwrap();
    let rendered = format!("{:?}", config);
    assert!(!rendered.contains("hunter2"));
    assert!(!rendered.contains("changeit"));
}

// ============================================================================
// Error tests
// ============================================================================

#[test]
fn import_error_names_source_position_and_dn() {
    let err = ServerError::Import {
        source_name: "users.ldif".to_string(),
        position: 7,
        dn: Some("uid=x,dc=example".to_string()),
        cause: Box::new(ServerError::EntryNotFound {
            dn: "uid=x,dc=example".to_string(),
        }),
    };
    let message = err.to_string();
    assert!(message.contains("users.ldif"));
    assert!(message.contains("record 7"));
    assert!(message.contains("uid=x,dc=example"));
    assert!(matches!(err.root_cause(), ServerError::EntryNotFound { .. }));
}

#[test]
fn shutdown_error_lists_components() {
    let err = ServerError::Shutdown {
        failures: vec![
            ShutdownFailure {
                component: "ldaps".to_string(),
                source: DirectoryError::transport("ldaps", "stuck"),
            },
            ShutdownFailure {
                component: "directory".to_string(),
                source: DirectoryError::NotStarted,
            },
        ],
    };
    let message = err.to_string();
    assert!(message.contains("ldaps"));
    assert!(message.contains("directory"));
}

#[test]
fn ldif_errors_carry_line() {
    let err = LdifError::syntax(12, "missing ':'");
    assert_eq!(err.to_string(), "line 12: missing ':'");
}

#[test]
fn not_found_classification() {
    assert!(DirectoryError::NoSuchObject {
        dn: "cn=x".to_string()
    }
    .is_not_found());
    assert!(!DirectoryError::NotStarted.is_not_found());
}
