//! Directory engine capabilities.
//!
//! The provisioning and lifecycle layers depend only on [`DirectoryEngine`].
//! Entry storage, schema checks and the protocol stack live behind it;
//! [`crate::directory::memory::InMemoryDirectory`] is the bundled
//! implementation.

use super::dn::{Dn, Rdn};
use super::entry::{Entry, Modification};
use super::partition::Partition;
use crate::core::error::DirectoryResult;
use crate::net::extended::ExtendedOperationHandler;
use crate::net::transport::TransportSpec;
use std::cell::Cell;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;

/// DN of the built-in administrator.
pub const ADMIN_DN: &str = "uid=admin,ou=system";

/// Password of the built-in administrator before any override.
pub const DEFAULT_ADMIN_PASSWORD: &str = "secret";

/// Suffix of the system partition.
pub const SYSTEM_SUFFIX: &str = "ou=system";

/// The administrator DN.
pub fn admin_dn() -> Dn {
    system_dn().child(Rdn::new("uid", "admin"))
}

/// The system partition suffix.
pub fn system_dn() -> Dn {
    Dn::from_rdns(vec![Rdn::new("ou", "system")])
}

/// Search scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Only the base entry.
    Base,
    /// Immediate children of the base.
    OneLevel,
    /// The base and everything below it.
    Subtree,
}

impl SearchScope {
    /// Whether `dn` falls in scope of `base`.
    pub fn includes(&self, base: &Dn, dn: &Dn) -> bool {
        match self {
            SearchScope::Base => dn == base,
            SearchScope::OneLevel => dn.parent().as_ref() == Some(base),
            SearchScope::Subtree => dn.is_within(base),
        }
    }
}

/// A transport bound by an engine.
pub trait BoundTransport: Send {
    /// Spec the transport was bound from.
    fn spec(&self) -> &TransportSpec;

    /// Actual local address, with the OS-assigned port when 0 was requested.
    fn local_addr(&self) -> SocketAddr;

    /// Stop accepting connections. Stopping twice is a no-op.
    fn stop(&mut self) -> DirectoryResult<()>;
}

/// Operations the server bootstrap needs from a directory engine.
///
/// `exists`, `add_entry` and `modify` run with administrator rights; callers
/// reach them through an [`AdminSession`].
pub trait DirectoryEngine: Send + Sync {
    /// Start the engine. Mounts the system partition.
    fn start(&self) -> DirectoryResult<()>;

    /// Shut the engine down.
    fn shutdown(&self) -> DirectoryResult<()>;

    /// Whether the engine is running.
    fn is_started(&self) -> bool;

    /// Allow or refuse anonymous binds.
    fn set_allow_anonymous(&self, allow: bool);

    /// Whether an entry exists at `dn`.
    fn exists(&self, dn: &Dn) -> DirectoryResult<bool>;

    /// Add a schema-checked entry.
    fn add_entry(&self, entry: Entry) -> DirectoryResult<()>;

    /// Modify an existing entry.
    fn modify(&self, dn: &Dn, modifications: &[Modification]) -> DirectoryResult<()>;

    /// Mount a partition.
    fn register_partition(&self, partition: Partition) -> DirectoryResult<()>;

    /// Mounted partitions.
    fn partitions(&self) -> Vec<Partition>;

    /// Register an extended operation for plain transports bound afterwards.
    fn register_extended_operation(
        &self,
        handler: Arc<dyn ExtendedOperationHandler>,
    ) -> DirectoryResult<()>;

    /// Bind a transport. TLS material is loaded here.
    fn bind_transport(&self, spec: &TransportSpec) -> DirectoryResult<Box<dyn BoundTransport>>;

    /// Read one entry.
    fn lookup(&self, dn: &Dn) -> DirectoryResult<Option<Entry>>;

    /// Entries under `base` in `scope`.
    fn search(&self, base: &Dn, scope: SearchScope) -> DirectoryResult<Vec<Entry>>;

    /// Simple bind.
    fn authenticate(&self, dn: &Dn, password: &[u8]) -> DirectoryResult<()>;
}

/// Administrative identity used for provisioning and import.
///
/// The session is `Send` but not `Sync`: it is used from one thread at a time.
pub struct AdminSession {
    engine: Arc<dyn DirectoryEngine>,
    principal: Dn,
    _not_sync: PhantomData<Cell<()>>,
}

impl AdminSession {
    /// Open an administrator session on `engine`.
    pub fn new(engine: Arc<dyn DirectoryEngine>) -> Self {
        Self {
            engine,
            principal: admin_dn(),
            _not_sync: PhantomData,
        }
    }

    /// The administrator DN.
    pub fn principal(&self) -> &Dn {
        &self.principal
    }

    /// Whether an entry exists at `dn`.
    pub fn exists(&self, dn: &Dn) -> DirectoryResult<bool> {
        self.engine.exists(dn)
    }

    /// Add an entry.
    pub fn add(&self, entry: Entry) -> DirectoryResult<()> {
        self.engine.add_entry(entry)
    }

    /// Modify an entry.
    pub fn modify(&self, dn: &Dn, modifications: &[Modification]) -> DirectoryResult<()> {
        self.engine.modify(dn, modifications)
    }

    /// Mount a partition.
    pub fn register_partition(&self, partition: Partition) -> DirectoryResult<()> {
        self.engine.register_partition(partition)
    }

    /// Underlying engine.
    pub fn engine(&self) -> &Arc<dyn DirectoryEngine> {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_dns() {
        assert_eq!(admin_dn().to_string(), ADMIN_DN);
        assert_eq!(system_dn().to_string(), SYSTEM_SUFFIX);
        assert_eq!(admin_dn().parent(), Some(system_dn()));
    }

    #[test]
    fn scope_matching() {
        let base = Dn::parse("dc=x").unwrap();
        let child = Dn::parse("ou=a,dc=x").unwrap();
        let grandchild = Dn::parse("cn=b,ou=a,dc=x").unwrap();

        assert!(SearchScope::Base.includes(&base, &base));
        assert!(!SearchScope::Base.includes(&base, &child));
        assert!(SearchScope::OneLevel.includes(&base, &child));
        assert!(!SearchScope::OneLevel.includes(&base, &grandchild));
        assert!(SearchScope::Subtree.includes(&base, &grandchild));
        assert!(SearchScope::Subtree.includes(&base, &base));
    }
}
