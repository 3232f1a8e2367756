//! Extended operation registry.
//!
//! Handlers are registered on the engine before transports bind; each plain
//! listener takes a snapshot of the registry and hands it to every accepted
//! connection.

use super::tcp::ClientConnection;
use crate::core::error::DirectoryResult;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Handler for one extended operation, identified by OID.
pub trait ExtendedOperationHandler: Send + Sync {
    /// Request OID served by this handler.
    fn oid(&self) -> &str;

    /// Load resources before the first request. Called when a plain
    /// transport binds, so configuration errors surface at startup.
    fn prepare(&self) -> DirectoryResult<()> {
        Ok(())
    }

    /// Run the operation. The connection is returned for further use, or
    /// closed when the operation fails.
    fn handle(
        &self,
        connection: ClientConnection,
    ) -> Pin<Box<dyn Future<Output = DirectoryResult<ClientConnection>> + Send>>;
}

/// Registered extended operations keyed by OID.
#[derive(Clone, Default)]
pub struct ExtendedOperations {
    handlers: BTreeMap<String, Arc<dyn ExtendedOperationHandler>>,
}

impl ExtendedOperations {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, returning the one it replaces.
    pub fn register(
        &mut self,
        handler: Arc<dyn ExtendedOperationHandler>,
    ) -> Option<Arc<dyn ExtendedOperationHandler>> {
        self.handlers.insert(handler.oid().to_string(), handler)
    }

    /// Handler for `oid`.
    pub fn get(&self, oid: &str) -> Option<Arc<dyn ExtendedOperationHandler>> {
        self.handlers.get(oid).cloned()
    }

    /// Registered OIDs in order.
    pub fn oids(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    /// Prepare every handler, stopping at the first failure.
    pub fn prepare_all(&self) -> DirectoryResult<()> {
        for handler in self.handlers.values() {
            handler.prepare()?;
        }
        Ok(())
    }

    /// Number of handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for ExtendedOperations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}
