//! Change records.

use crate::directory::dn::Dn;
use crate::directory::entry::{Attributes, Entry, Modification};
use std::fmt;

/// The mutation carried by a change record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// A content record without `changetype`; creates the entry.
    None(Attributes),
    /// `changetype: add`.
    Add(Attributes),
    /// `changetype: modify`.
    Modify(Vec<Modification>),
    /// Any other change type, kept by name.
    Unsupported(String),
}

/// Discriminant of [`Change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Content record.
    None,
    /// Add.
    Add,
    /// Modify.
    Modify,
    /// Anything else.
    Unsupported,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeKind::None => "none",
            ChangeKind::Add => "add",
            ChangeKind::Modify => "modify",
            ChangeKind::Unsupported => "unsupported",
        };
        f.write_str(name)
    }
}

/// One parsed directory mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    /// Target DN.
    pub dn: Dn,
    /// Mutation.
    pub change: Change,
}

impl ChangeRecord {
    /// Content record creating an entry.
    pub fn content(dn: Dn, attributes: Attributes) -> Self {
        Self {
            dn,
            change: Change::None(attributes),
        }
    }

    /// `changetype: add` record.
    pub fn add(dn: Dn, attributes: Attributes) -> Self {
        Self {
            dn,
            change: Change::Add(attributes),
        }
    }

    /// `changetype: modify` record.
    pub fn modify(dn: Dn, modifications: Vec<Modification>) -> Self {
        Self {
            dn,
            change: Change::Modify(modifications),
        }
    }

    /// Record with an unsupported change type.
    pub fn unsupported(dn: Dn, change_type: impl Into<String>) -> Self {
        Self {
            dn,
            change: Change::Unsupported(change_type.into()),
        }
    }

    /// Kind of change.
    pub fn kind(&self) -> ChangeKind {
        match &self.change {
            Change::None(_) => ChangeKind::None,
            Change::Add(_) => ChangeKind::Add,
            Change::Modify(_) => ChangeKind::Modify,
            Change::Unsupported(_) => ChangeKind::Unsupported,
        }
    }

    /// Change type as written in the source (`add` for content records).
    pub fn kind_name(&self) -> &str {
        match &self.change {
            Change::None(_) | Change::Add(_) => "add",
            Change::Modify(_) => "modify",
            Change::Unsupported(name) => name,
        }
    }

    /// The entry created by an add or content record.
    pub fn to_entry(&self) -> Option<Entry> {
        match &self.change {
            Change::None(attributes) | Change::Add(attributes) => {
                Some(Entry::new(self.dn.clone(), attributes.clone()))
            }
            Change::Modify(_) | Change::Unsupported(_) => None,
        }
    }
}

impl fmt::Display for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.change {
            Change::None(attributes) | Change::Add(attributes) => {
                write!(f, "add {} ({} attributes)", self.dn, attributes.len())
            }
            Change::Modify(modifications) => {
                write!(f, "modify {} ({} changes)", self.dn, modifications.len())
            }
            Change::Unsupported(name) => write!(f, "{} {}", name, self.dn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dn() -> Dn {
        Dn::parse("ou=a,dc=x").unwrap()
    }

    #[test]
    fn kinds_and_names() {
        let content = ChangeRecord::content(dn(), Attributes::new());
        assert_eq!(content.kind(), ChangeKind::None);
        assert_eq!(content.kind_name(), "add");

        let modify = ChangeRecord::modify(dn(), vec![]);
        assert_eq!(modify.kind(), ChangeKind::Modify);
        assert!(modify.to_entry().is_none());

        let delete = ChangeRecord::unsupported(dn(), "delete");
        assert_eq!(delete.kind(), ChangeKind::Unsupported);
        assert_eq!(delete.kind_name(), "delete");
        assert_eq!(delete.to_string(), "delete ou=a,dc=x");
    }

    #[test]
    fn add_builds_entry() {
        let record = ChangeRecord::add(dn(), Attributes::new().with("objectClass", "top"));
        let entry = record.to_entry().unwrap();
        assert_eq!(entry.dn(), &dn());
        assert!(entry.get("objectclass").is_some());
    }
}
