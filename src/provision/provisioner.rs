//! Partition provisioning.
//!
//! Before a record is applied its DN must fall into a mounted partition. If
//! the parent entry is absent and no partition covers the DN yet, a new
//! partition is mounted with the record's own DN as suffix. Records listed
//! out of hierarchical order therefore produce one partition per orphaned
//! subtree; that ordering sensitivity is kept as is.

use crate::core::error::{DirectoryError, ServerError, ServerResult};
use crate::directory::dn::Dn;
use crate::directory::engine::AdminSession;
use crate::directory::partition::Partition;

/// Creates partitions on demand for incoming DNs.
pub struct PartitionProvisioner<'a> {
    session: &'a AdminSession,
}

impl<'a> PartitionProvisioner<'a> {
    /// Provision through `session`.
    pub fn new(session: &'a AdminSession) -> Self {
        Self { session }
    }

    /// Make sure a partition covers `dn`, creating one rooted at `dn` when
    /// the parent entry does not exist. Returns the created partition.
    pub fn ensure_partition_for(&self, dn: &Dn) -> ServerResult<Option<Partition>> {
        let Some(parent) = dn.parent() else {
            return Err(ServerError::Provisioning {
                dn: dn.to_string(),
                source: DirectoryError::InvalidDn {
                    input: dn.to_string(),
                    reason: "the root DN cannot be a partition suffix".to_string(),
                },
            });
        };

        if self.parent_exists(&parent)? {
            return Ok(None);
        }
        if let Some(existing) = self.covering_partition(dn) {
            tracing::trace!(dn = %dn, partition = %existing.id, "already covered");
            return Ok(None);
        }

        let partition = Partition::for_suffix(dn).ok_or_else(|| ServerError::Provisioning {
            dn: dn.to_string(),
            source: DirectoryError::InvalidDn {
                input: dn.to_string(),
                reason: "DN has no leading RDN".to_string(),
            },
        })?;

        self.session
            .register_partition(partition.clone())
            .map_err(|source| ServerError::Provisioning {
                dn: dn.to_string(),
                source,
            })?;

        tracing::info!(id = %partition.id, suffix = %partition.suffix, "created partition");
        Ok(Some(partition))
    }

    fn parent_exists(&self, parent: &Dn) -> ServerResult<bool> {
        if parent.is_root() {
            return Ok(false);
        }
        match self.session.exists(parent) {
            Ok(exists) => Ok(exists),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(ServerError::Directory(e)),
        }
    }

    fn covering_partition(&self, dn: &Dn) -> Option<Partition> {
        self.session
            .engine()
            .partitions()
            .into_iter()
            .filter(|p| p.covers(dn))
            .max_by_key(|p| p.suffix.len())
    }
}
