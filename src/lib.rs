//! Embeddable LDAP directory server bootstrap.
//!
//! Starts a directory engine, provisions partitions on demand while
//! importing LDIF changesets, and exposes the directory over plain LDAP
//! (with StartTLS) and optionally LDAPS.
//!
//! # Startup
//!
//! ```text
//! config ──► engine.start ──► import LDIF ──► admin password ──► bind transports ──► running
//!                               │
//!                               └─ partition provisioner (one partition per orphaned subtree)
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::runtime`] - Server session lifecycle
//! - [`core::error`] - Error types
//!
//! ## Directory
//! - [`directory::dn`] - Distinguished names
//! - [`directory::entry`] - Entries, attributes and modifications
//! - [`directory::partition`] - Partition descriptors
//! - [`directory::engine`] - Engine contract and admin session
//! - [`directory::memory`] - In-memory engine
//!
//! ## LDIF
//! - [`ldif::record`] - Change record model
//! - [`ldif::reader`] - Streaming parser
//!
//! ## Provisioning
//! - [`provision::provisioner`] - Partition provisioner
//! - [`provision::importer`] - Changeset importer
//!
//! ## Networking
//! - [`net::transport`] - Transport descriptors
//! - [`net::tls`] - TLS identity and server configuration
//! - [`net::tcp`] - Listeners and client connections
//! - [`net::extended`] - Extended operation registry
//! - [`net::start_tls`] - StartTLS handler
//!
//! ## Operations
//! - [`ops::observability`] - Request counting
//!
//! ## CLI
//! - [`cli::commands`] - CLI command implementations

// Core infrastructure
pub mod core;

// Directory model and engine
pub mod directory;

// LDIF parsing
pub mod ldif;

// Partition provisioning and import
pub mod provision;

// Networking
pub mod net;

// Operations and observability
pub mod ops;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, error, runtime};
pub use directory::{engine, memory};
pub use net::{start_tls, tls, transport};
pub use ops::observability;
pub use provision::{importer, provisioner};
