//! Changeset import.
//!
//! Records are applied strictly in stream order through the admin session.
//! The first failure aborts the import; records before it stay applied.

use super::provisioner::PartitionProvisioner;
use crate::core::error::{LdifError, ServerError, ServerResult};
use crate::directory::engine::{admin_dn, AdminSession};
use crate::directory::entry::{Entry, Modification};
use crate::directory::partition::Partition;
use crate::ldif::reader::LdifReader;
use crate::ldif::record::{Change, ChangeKind, ChangeRecord};
use std::fmt;
use std::path::PathBuf;

/// Built-in dataset imported when no source is configured.
pub const DEFAULT_LDIF: &str = include_str!("../../data/ldap-example.ldif");

/// Name reported for the built-in dataset.
pub const DEFAULT_SOURCE_NAME: &str = "ldap-example.ldif";

/// Where change records come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSource {
    /// The built-in dataset.
    Default,
    /// An LDIF file.
    File(PathBuf),
    /// LDIF text held in memory.
    Inline {
        /// Name used in logs and errors.
        name: String,
        /// LDIF content.
        content: String,
    },
}

impl ChangeSource {
    /// Inline LDIF.
    pub fn inline(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Inline {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Name used in logs and errors.
    pub fn name(&self) -> String {
        match self {
            Self::Default => DEFAULT_SOURCE_NAME.to_string(),
            Self::File(path) => path.display().to_string(),
            Self::Inline { name, .. } => name.clone(),
        }
    }

    /// Open the source as a lazy record stream.
    pub fn records(
        &self,
    ) -> ServerResult<Box<dyn Iterator<Item = Result<ChangeRecord, LdifError>> + '_>> {
        match self {
            Self::Default => Ok(Box::new(LdifReader::from_text(DEFAULT_LDIF))),
            Self::File(path) => {
                let reader = LdifReader::open(path).map_err(|source| ServerError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                Ok(Box::new(reader))
            }
            Self::Inline { content, .. } => Ok(Box::new(LdifReader::from_text(content))),
        }
    }
}

impl fmt::Display for ChangeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Outcome of importing one source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportStats {
    /// Source name.
    pub source: String,
    /// Records applied.
    pub records: usize,
    /// Entries added.
    pub added: usize,
    /// Entries modified.
    pub modified: usize,
    /// Partitions created while importing.
    pub partitions: Vec<Partition>,
}

/// Outcome of importing every configured source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Per-source results in import order.
    pub sources: Vec<ImportStats>,
}

impl ImportSummary {
    /// Records applied across all sources.
    pub fn records(&self) -> usize {
        self.sources.iter().map(|s| s.records).sum()
    }

    /// Partitions created across all sources.
    pub fn partitions(&self) -> Vec<Partition> {
        self.sources
            .iter()
            .flat_map(|s| s.partitions.iter().cloned())
            .collect()
    }
}

/// Applies change records through an admin session.
pub struct ChangesetImporter<'a> {
    session: &'a AdminSession,
    provisioner: PartitionProvisioner<'a>,
}

impl<'a> ChangesetImporter<'a> {
    /// Import through `session`.
    pub fn new(session: &'a AdminSession) -> Self {
        Self {
            session,
            provisioner: PartitionProvisioner::new(session),
        }
    }

    /// Apply one record: provision its partition, then add or modify.
    /// Returns the partition created for it, if any.
    pub fn apply(&self, record: &ChangeRecord) -> ServerResult<Option<Partition>> {
        let partition = self.provisioner.ensure_partition_for(&record.dn)?;

        match &record.change {
            Change::None(attributes) | Change::Add(attributes) => {
                self.session
                    .add(Entry::new(record.dn.clone(), attributes.clone()))?;
            }
            Change::Modify(modifications) => {
                self.session
                    .modify(&record.dn, modifications)
                    .map_err(|e| {
                        if e.is_not_found() {
                            ServerError::EntryNotFound {
                                dn: record.dn.to_string(),
                            }
                        } else {
                            ServerError::Directory(e)
                        }
                    })?;
            }
            Change::Unsupported(kind) => {
                return Err(ServerError::UnsupportedChangeType { kind: kind.clone() });
            }
        }

        Ok(partition)
    }

    /// Import a record stream. Stops at the first failure, which is reported
    /// with its 1-based position in the stream.
    pub fn import<I>(&self, source: &str, records: I) -> ServerResult<ImportStats>
    where
        I: IntoIterator<Item = Result<ChangeRecord, LdifError>>,
    {
        let mut stats = ImportStats {
            source: source.to_string(),
            ..Default::default()
        };

        for (index, item) in records.into_iter().enumerate() {
            let position = index + 1;
            let record = item.map_err(|e| ServerError::Import {
                source_name: source.to_string(),
                position,
                dn: None,
                cause: Box::new(ServerError::Ldif(e)),
            })?;

            tracing::debug!(source, position, dn = %record.dn, kind = %record.kind(), "applying change record");

            let created = self.apply(&record).map_err(|cause| ServerError::Import {
                source_name: source.to_string(),
                position,
                dn: Some(record.dn.to_string()),
                cause: Box::new(cause),
            })?;

            stats.records += 1;
            match record.kind() {
                ChangeKind::None | ChangeKind::Add => stats.added += 1,
                ChangeKind::Modify => stats.modified += 1,
                ChangeKind::Unsupported => {}
            }
            stats.partitions.extend(created);
        }

        tracing::info!(
            source,
            records = stats.records,
            partitions = stats.partitions.len(),
            "imported change records"
        );
        Ok(stats)
    }

    /// Import already-parsed records.
    pub fn import_records(
        &self,
        source: &str,
        records: Vec<ChangeRecord>,
    ) -> ServerResult<ImportStats> {
        self.import(source, records.into_iter().map(Ok))
    }

    /// Import sources in order; the built-in dataset when `sources` is empty.
    pub fn import_sources(&self, sources: &[ChangeSource]) -> ServerResult<ImportSummary> {
        let defaults = [ChangeSource::Default];
        let sources = if sources.is_empty() {
            &defaults[..]
        } else {
            sources
        };

        let mut summary = ImportSummary::default();
        for source in sources {
            let name = source.name();
            tracing::info!(source = %name, "importing");
            let stats = self.import(&name, source.records()?)?;
            summary.sources.push(stats);
        }
        Ok(summary)
    }

    /// Replace the administrator password.
    pub fn override_admin_password(&self, password: &str) -> ServerResult<()> {
        let dn = admin_dn();
        self.session
            .modify(&dn, &[Modification::replace("userPassword", password)])
            .map_err(|e| {
                if e.is_not_found() {
                    ServerError::EntryNotFound { dn: dn.to_string() }
                } else {
                    ServerError::Directory(e)
                }
            })?;
        tracing::info!(dn = %dn, "administrator password overridden");
        Ok(())
    }
}
