//! Directory provisioning.
//!
//! - [`provisioner`] - On-demand partition creation
//! - [`importer`] - Ordered changeset import

pub mod importer;
pub mod provisioner;

pub use importer::{ChangeSource, ChangesetImporter, ImportStats, ImportSummary};
pub use provisioner::PartitionProvisioner;
