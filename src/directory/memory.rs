//! In-memory directory engine.
//!
//! Entries live in per-partition ordered maps guarded by one `RwLock`. The
//! engine enforces the structural rules a real backend would: every entry
//! belongs to the partition with the longest matching suffix, has a parent
//! (unless it is the partition's context entry) and an `objectClass`.

use super::dn::Dn;
use super::engine::{
    admin_dn, system_dn, BoundTransport, DirectoryEngine, SearchScope, DEFAULT_ADMIN_PASSWORD,
};
use super::entry::{Attributes, Entry, Modification};
use super::partition::Partition;
use crate::core::error::{DirectoryError, DirectoryResult};
use crate::net::extended::{ExtendedOperationHandler, ExtendedOperations};
use crate::net::tcp::{CloseConnectionHandler, ConnectionHandler, ListenerMode, TransportListener};
use crate::net::tls::{self, TlsSettings};
use crate::net::transport::TransportSpec;
use crate::ops::observability::RequestObserver;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Entries of one partition.
#[derive(Debug)]
struct PartitionStore {
    partition: Partition,
    entries: BTreeMap<Dn, Entry>,
}

/// In-memory [`DirectoryEngine`].
pub struct InMemoryDirectory {
    /// Partitions keyed by lowercase id.
    partitions: RwLock<BTreeMap<String, PartitionStore>>,
    started: AtomicBool,
    allow_anonymous: AtomicBool,
    extended: RwLock<ExtendedOperations>,
    handler: Arc<dyn ConnectionHandler>,
    observer: Option<Arc<dyn RequestObserver>>,
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDirectory {
    /// Create a stopped engine whose transports close every connection.
    pub fn new() -> Self {
        Self {
            partitions: RwLock::new(BTreeMap::new()),
            started: AtomicBool::new(false),
            allow_anonymous: AtomicBool::new(false),
            extended: RwLock::new(ExtendedOperations::new()),
            handler: Arc::new(CloseConnectionHandler),
            observer: None,
        }
    }

    /// Serve accepted connections with `handler`.
    pub fn with_connection_handler(mut self, handler: Arc<dyn ConnectionHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Report lookups and searches to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn RequestObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Whether anonymous binds are allowed.
    pub fn allows_anonymous(&self) -> bool {
        self.allow_anonymous.load(Ordering::Relaxed)
    }

    /// Number of entries across all partitions.
    pub fn entry_count(&self) -> usize {
        self.partitions
            .read()
            .values()
            .map(|store| store.entries.len())
            .sum()
    }

    fn ensure_started(&self) -> DirectoryResult<()> {
        if self.started.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(DirectoryError::NotStarted)
        }
    }

    fn system_partition() -> DirectoryResult<PartitionStore> {
        let suffix = system_dn();
        let admin = admin_dn();
        let mut entries = BTreeMap::new();
        entries.insert(
            suffix.clone(),
            Entry::new(
                suffix.clone(),
                Attributes::new()
                    .with("objectClass", "top")
                    .with("objectClass", "organizationalUnit")
                    .with("ou", "system"),
            ),
        );
        entries.insert(
            admin.clone(),
            Entry::new(
                admin,
                Attributes::new()
                    .with("objectClass", "top")
                    .with("objectClass", "person")
                    .with("objectClass", "organizationalPerson")
                    .with("objectClass", "inetOrgPerson")
                    .with("uid", "admin")
                    .with("cn", "system administrator")
                    .with("sn", "administrator")
                    .with("displayName", "Directory Superuser")
                    .with("userPassword", DEFAULT_ADMIN_PASSWORD),
            ),
        );
        let partition = Partition::for_suffix(&suffix)
            .ok_or_else(|| DirectoryError::NoSuchPartition {
                dn: suffix.to_string(),
            })?;
        Ok(PartitionStore { partition, entries })
    }

    fn check_schema(entry: &Entry) -> DirectoryResult<()> {
        let has_object_class = entry
            .get("objectClass")
            .is_some_and(|oc| !oc.values().is_empty());
        if !has_object_class {
            return Err(DirectoryError::SchemaViolation {
                dn: entry.dn().to_string(),
                reason: "objectClass is required".to_string(),
            });
        }
        if let Some(rdn) = entry.dn().rdn() {
            let present = entry
                .get(rdn.attribute())
                .is_some_and(|a| a.string_values().any(|v| v.eq_ignore_ascii_case(rdn.value())));
            if !present {
                return Err(DirectoryError::SchemaViolation {
                    dn: entry.dn().to_string(),
                    reason: format!("naming attribute {} is missing", rdn.attribute()),
                });
            }
        }
        Ok(())
    }
}

/// Id of the partition with the longest suffix covering `dn`.
fn covering_partition(partitions: &BTreeMap<String, PartitionStore>, dn: &Dn) -> Option<String> {
    partitions
        .iter()
        .filter(|(_, store)| store.partition.covers(dn))
        .max_by_key(|(_, store)| store.partition.suffix.len())
        .map(|(key, _)| key.clone())
}

impl DirectoryEngine for InMemoryDirectory {
    fn start(&self) -> DirectoryResult<()> {
        let mut partitions = self.partitions.write();
        if self.started.load(Ordering::Acquire) {
            return Err(DirectoryError::AlreadyStarted);
        }
        partitions.clear();
        let system = Self::system_partition()?;
        partitions.insert(system.partition.id.to_ascii_lowercase(), system);
        self.started.store(true, Ordering::Release);
        tracing::info!(partition = "system", suffix = %system_dn(), "directory engine started");
        Ok(())
    }

    fn shutdown(&self) -> DirectoryResult<()> {
        let mut partitions = self.partitions.write();
        if !self.started.swap(false, Ordering::AcqRel) {
            return Err(DirectoryError::NotStarted);
        }
        let entries: usize = partitions.values().map(|s| s.entries.len()).sum();
        partitions.clear();
        tracing::info!(entries, "directory engine stopped");
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    fn set_allow_anonymous(&self, allow: bool) {
        self.allow_anonymous.store(allow, Ordering::Relaxed);
    }

    fn exists(&self, dn: &Dn) -> DirectoryResult<bool> {
        self.ensure_started()?;
        let partitions = self.partitions.read();
        Ok(covering_partition(&partitions, dn)
            .and_then(|id| partitions.get(&id))
            .is_some_and(|store| store.entries.contains_key(dn)))
    }

    fn add_entry(&self, mut entry: Entry) -> DirectoryResult<()> {
        self.ensure_started()?;

        // The naming attribute value is implied by the DN.
        if let Some(rdn) = entry.dn().rdn().cloned() {
            let present = entry.get(rdn.attribute()).is_some_and(|a| {
                a.string_values()
                    .any(|v| v.eq_ignore_ascii_case(rdn.value()))
            });
            if !present {
                entry
                    .attributes_mut()
                    .add(rdn.attribute(), rdn.value().as_bytes().to_vec());
            }
        }
        Self::check_schema(&entry)?;

        let mut partitions = self.partitions.write();
        let dn = entry.dn().clone();
        let id = covering_partition(&partitions, &dn).ok_or_else(|| {
            DirectoryError::NoSuchPartition {
                dn: dn.to_string(),
            }
        })?;
        let store = partitions
            .get_mut(&id)
            .ok_or_else(|| DirectoryError::NoSuchPartition {
                dn: dn.to_string(),
            })?;

        if store.entries.contains_key(&dn) {
            return Err(DirectoryError::EntryAlreadyExists { dn: dn.to_string() });
        }
        if dn != store.partition.suffix {
            let parent_present = dn
                .parent()
                .is_some_and(|parent| store.entries.contains_key(&parent));
            if !parent_present {
                return Err(DirectoryError::ParentNotFound { dn: dn.to_string() });
            }
        }

        store.entries.insert(dn, entry);
        Ok(())
    }

    fn modify(&self, dn: &Dn, modifications: &[Modification]) -> DirectoryResult<()> {
        self.ensure_started()?;
        let mut partitions = self.partitions.write();
        let entry = covering_partition(&partitions, dn)
            .and_then(|id| partitions.get_mut(&id))
            .and_then(|store| store.entries.get_mut(dn))
            .ok_or_else(|| DirectoryError::NoSuchObject { dn: dn.to_string() })?;

        let mut updated = entry.clone();
        updated.apply(modifications)?;
        Self::check_schema(&updated)?;
        *entry = updated;
        Ok(())
    }

    fn register_partition(&self, partition: Partition) -> DirectoryResult<()> {
        self.ensure_started()?;
        let rejected = |reason: &str| DirectoryError::PartitionRejected {
            id: partition.id.clone(),
            suffix: partition.suffix.to_string(),
            reason: reason.to_string(),
        };

        if partition.id.trim().is_empty() {
            return Err(rejected("partition id is empty"));
        }
        if partition.suffix.is_root() {
            return Err(rejected("the root DN cannot be a partition suffix"));
        }

        let mut partitions = self.partitions.write();
        let key = partition.id.to_ascii_lowercase();
        if partitions.contains_key(&key) {
            return Err(rejected("a partition with this id already exists"));
        }
        if partitions
            .values()
            .any(|store| store.partition.suffix == partition.suffix)
        {
            return Err(rejected("a partition is already mounted at this suffix"));
        }
        let occupied = covering_partition(&partitions, &partition.suffix)
            .and_then(|id| partitions.get(&id))
            .is_some_and(|store| store.entries.contains_key(&partition.suffix));
        if occupied {
            return Err(rejected("an entry already exists at this suffix"));
        }

        tracing::debug!(id = %partition.id, suffix = %partition.suffix, "partition mounted");
        partitions.insert(
            key,
            PartitionStore {
                partition,
                entries: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn partitions(&self) -> Vec<Partition> {
        self.partitions
            .read()
            .values()
            .map(|store| store.partition.clone())
            .collect()
    }

    fn register_extended_operation(
        &self,
        handler: Arc<dyn ExtendedOperationHandler>,
    ) -> DirectoryResult<()> {
        let oid = handler.oid().to_string();
        if self.extended.write().register(handler).is_some() {
            tracing::warn!(oid = %oid, "replaced extended operation handler");
        }
        Ok(())
    }

    fn bind_transport(&self, spec: &TransportSpec) -> DirectoryResult<Box<dyn BoundTransport>> {
        self.ensure_started()?;
        let mode = if spec.tls {
            ListenerMode::Tls(tls::acceptor(&TlsSettings::from_spec(spec)?)?)
        } else {
            let extended = self.extended.read().clone();
            extended.prepare_all()?;
            ListenerMode::Plain(Arc::new(extended))
        };
        let listener = TransportListener::bind(spec, mode, self.handler.clone())?;
        Ok(Box::new(listener))
    }

    fn lookup(&self, dn: &Dn) -> DirectoryResult<Option<Entry>> {
        self.ensure_started()?;
        if let Some(observer) = &self.observer {
            observer.on_lookup();
        }
        let partitions = self.partitions.read();
        Ok(covering_partition(&partitions, dn)
            .and_then(|id| partitions.get(&id))
            .and_then(|store| store.entries.get(dn))
            .cloned())
    }

    fn search(&self, base: &Dn, scope: SearchScope) -> DirectoryResult<Vec<Entry>> {
        self.ensure_started()?;
        if let Some(observer) = &self.observer {
            observer.on_search();
        }
        let partitions = self.partitions.read();

        if !base.is_root() {
            let base_exists = covering_partition(&partitions, base)
                .and_then(|id| partitions.get(&id))
                .is_some_and(|store| store.entries.contains_key(base));
            if !base_exists {
                return Err(DirectoryError::NoSuchObject {
                    dn: base.to_string(),
                });
            }
        }

        let mut results: Vec<Entry> = partitions
            .values()
            .flat_map(|store| store.entries.values())
            .filter(|entry| scope.includes(base, entry.dn()))
            .cloned()
            .collect();
        results.sort_by(|a, b| {
            a.dn()
                .len()
                .cmp(&b.dn().len())
                .then_with(|| a.dn().cmp(b.dn()))
        });
        Ok(results)
    }

    fn authenticate(&self, dn: &Dn, password: &[u8]) -> DirectoryResult<()> {
        self.ensure_started()?;
        let denied = || DirectoryError::InvalidCredentials { dn: dn.to_string() };

        if dn.is_root() && password.is_empty() {
            return if self.allows_anonymous() {
                Ok(())
            } else {
                Err(denied())
            };
        }
        if password.is_empty() {
            return Err(denied());
        }

        let partitions = self.partitions.read();
        let matches = covering_partition(&partitions, dn)
            .and_then(|id| partitions.get(&id))
            .and_then(|store| store.entries.get(dn))
            .and_then(|entry| entry.get("userPassword"))
            .is_some_and(|attr| attr.contains(password));
        if matches {
            Ok(())
        } else {
            Err(denied())
        }
    }
}

impl std::fmt::Debug for InMemoryDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDirectory")
            .field("started", &self.is_started())
            .field("partitions", &self.partitions().len())
            .field("extended", &*self.extended.read())
            .finish_non_exhaustive()
    }
}
