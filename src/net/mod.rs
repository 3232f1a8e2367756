//! Networking layer.
//!
//! - [`transport`] - Transport descriptors built from configuration
//! - [`tcp`] - Listeners, client connections and the accept loop
//! - [`tls`] - TLS identity, trust and rustls configuration
//! - [`extended`] - Extended operation registry
//! - [`start_tls`] - StartTLS upgrade handler

pub mod extended;
pub mod start_tls;
pub mod tcp;
pub mod tls;
pub mod transport;
