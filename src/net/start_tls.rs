//! StartTLS extended operation (RFC 4511 section 4.14).

use super::extended::ExtendedOperationHandler;
use super::tcp::ClientConnection;
use super::tls::{acceptor, TlsSettings};
use crate::core::error::DirectoryResult;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use tokio_rustls::TlsAcceptor;

/// OID of the StartTLS request.
pub const START_TLS_OID: &str = "1.3.6.1.4.1.1466.20037";

/// Upgrades a plain connection to TLS in place.
pub struct StartTlsHandler {
    settings: TlsSettings,
    acceptor: Mutex<Option<TlsAcceptor>>,
}

impl StartTlsHandler {
    /// Create a handler. TLS material is loaded on [`prepare`](ExtendedOperationHandler::prepare).
    pub fn new(settings: TlsSettings) -> Self {
        Self {
            settings,
            acceptor: Mutex::new(None),
        }
    }

    /// Settings the acceptor is built from.
    pub fn settings(&self) -> &TlsSettings {
        &self.settings
    }

    fn acceptor(&self) -> DirectoryResult<TlsAcceptor> {
        let mut cached = self.acceptor.lock();
        if let Some(existing) = cached.as_ref() {
            return Ok(existing.clone());
        }
        let built = acceptor(&self.settings)?;
        *cached = Some(built.clone());
        Ok(built)
    }
}

impl ExtendedOperationHandler for StartTlsHandler {
    fn oid(&self) -> &str {
        START_TLS_OID
    }

    fn prepare(&self) -> DirectoryResult<()> {
        self.acceptor().map(|_| ())
    }

    fn handle(
        &self,
        connection: ClientConnection,
    ) -> Pin<Box<dyn Future<Output = DirectoryResult<ClientConnection>> + Send>> {
        let acceptor = self.acceptor();
        Box::pin(async move {
            let upgraded = connection.upgrade(acceptor?).await?;
            tracing::debug!(conn = %upgraded.id, remote = %upgraded.remote_addr, "StartTLS complete");
            Ok(upgraded)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::transport::TransportSpec;
    use std::path::PathBuf;

    fn settings() -> TlsSettings {
        let mut spec = TransportSpec::plain("127.0.0.1", 0);
        spec.tls = true;
        TlsSettings::from_spec(&spec).unwrap()
    }

    #[test]
    fn prepare_caches_acceptor() {
        let handler = StartTlsHandler::new(settings());
        assert_eq!(handler.oid(), START_TLS_OID);
        handler.prepare().unwrap();
        assert!(handler.acceptor.lock().is_some());
        handler.prepare().unwrap();
    }

    #[test]
    fn prepare_reports_bad_keystore() {
        let mut settings = settings();
        settings.keystore_path = Some(PathBuf::from("/nonexistent/keystore.pem"));
        let handler = StartTlsHandler::new(settings);
        assert!(handler.prepare().is_err());
        assert!(handler.acceptor.lock().is_none());
    }
}
