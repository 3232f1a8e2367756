//! Directory model and engine.
//!
//! - [`dn`] - Distinguished names
//! - [`entry`] - Entries, attributes and modifications
//! - [`partition`] - Naming contexts
//! - [`engine`] - Engine capabilities and the admin session
//! - [`memory`] - In-memory engine

pub mod dn;
pub mod engine;
pub mod entry;
pub mod memory;
pub mod partition;

pub use dn::{Dn, Rdn};
pub use engine::{AdminSession, BoundTransport, DirectoryEngine, SearchScope};
pub use entry::{Attribute, Attributes, Entry, ModOp, Modification};
pub use memory::InMemoryDirectory;
pub use partition::Partition;
