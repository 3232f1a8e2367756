//! Partitions (naming contexts).

use super::dn::Dn;
use std::fmt;

/// A storage root mounted at a suffix DN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Partition identifier, unique per engine.
    pub id: String,
    /// Suffix DN covered by this partition.
    pub suffix: Dn,
}

impl Partition {
    /// Create a partition.
    pub fn new(id: impl Into<String>, suffix: Dn) -> Self {
        Self {
            id: id.into(),
            suffix,
        }
    }

    /// Partition rooted at `suffix` with an id taken from its leftmost RDN
    /// value. The root DN has no such value.
    pub fn for_suffix(suffix: &Dn) -> Option<Self> {
        let id = suffix.name()?;
        Some(Self::new(id, suffix.clone()))
    }

    /// Whether `dn` lies at or below the suffix.
    pub fn covers(&self, dn: &Dn) -> bool {
        dn.is_within(&self.suffix)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.suffix)
    }
}
