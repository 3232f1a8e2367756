//! LDIF change records.
//!
//! - [`record`] - The parsed change record model
//! - [`reader`] - Streaming LDIF parser

pub mod reader;
pub mod record;

pub use reader::LdifReader;
pub use record::{Change, ChangeKind, ChangeRecord};
