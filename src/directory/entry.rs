//! Directory entries, attributes and modifications.

use super::dn::Dn;
use crate::core::error::{DirectoryError, DirectoryResult};
use std::collections::BTreeMap;

/// A named attribute with one or more binary values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    name: String,
    values: Vec<Vec<u8>>,
}

impl Attribute {
    /// Create an empty attribute.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    /// Attribute name as first written.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Values in insertion order.
    pub fn values(&self) -> &[Vec<u8>] {
        &self.values
    }

    /// Values decoded as UTF-8, skipping binary ones.
    pub fn string_values(&self) -> impl Iterator<Item = &str> {
        self.values
            .iter()
            .filter_map(|v| std::str::from_utf8(v).ok())
    }

    /// First value decoded as UTF-8.
    pub fn first_str(&self) -> Option<&str> {
        self.string_values().next()
    }

    /// Whether the attribute holds `value`.
    pub fn contains(&self, value: &[u8]) -> bool {
        self.values.iter().any(|v| v == value)
    }

    fn push_unique(&mut self, value: Vec<u8>) -> bool {
        if self.contains(&value) {
            return false;
        }
        self.values.push(value);
        true
    }
}

/// Attribute set keyed case-insensitively by attribute name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    inner: BTreeMap<String, Attribute>,
}

impl Attributes {
    /// Create an empty attribute set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value, ignoring exact duplicates.
    pub fn add(&mut self, name: &str, value: impl Into<Vec<u8>>) {
        self.inner
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| Attribute::new(name))
            .push_unique(value.into());
    }

    /// Builder form of [`Attributes::add`].
    pub fn with(mut self, name: &str, value: impl Into<Vec<u8>>) -> Self {
        self.add(name, value);
        self
    }

    /// Look up an attribute by name.
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.inner.get(&name.to_ascii_lowercase())
    }

    /// Whether the attribute holds `value`.
    pub fn contains_value(&self, name: &str, value: &[u8]) -> bool {
        self.get(name).is_some_and(|a| a.contains(value))
    }

    /// Remove an attribute entirely.
    pub fn remove(&mut self, name: &str) -> Option<Attribute> {
        self.inner.remove(&name.to_ascii_lowercase())
    }

    /// Iterate attributes ordered by lowercase name.
    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.inner.values()
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether there are no attributes.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.inner.get_mut(&name.to_ascii_lowercase())
    }

    fn replace(&mut self, name: &str, values: Vec<Vec<u8>>) {
        let mut attribute = Attribute::new(name);
        for value in values {
            attribute.push_unique(value);
        }
        self.inner.insert(name.to_ascii_lowercase(), attribute);
    }
}

/// A directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    dn: Dn,
    attributes: Attributes,
}

impl Entry {
    /// Create an entry.
    pub fn new(dn: Dn, attributes: Attributes) -> Self {
        Self { dn, attributes }
    }

    /// Entry DN.
    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    /// Entry attributes.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Mutable attributes.
    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    /// Shorthand for `attributes().get(name)`.
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Apply modifications atomically: either all apply or the entry is left
    /// unchanged.
    pub fn apply(&mut self, modifications: &[Modification]) -> DirectoryResult<()> {
        let mut updated = self.attributes.clone();
        for modification in modifications {
            modification.apply_to(&self.dn, &mut updated)?;
        }
        self.attributes = updated;
        Ok(())
    }
}

/// Kind of attribute modification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModOp {
    /// Add values. Fails if any value is already present.
    Add,
    /// Remove the listed values, or the whole attribute when none are listed.
    Delete,
    /// Replace all values. An empty list removes the attribute.
    Replace,
    /// Add an integer to a single-valued integer attribute.
    Increment,
}

impl ModOp {
    /// LDIF keyword for this operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModOp::Add => "add",
            ModOp::Delete => "delete",
            ModOp::Replace => "replace",
            ModOp::Increment => "increment",
        }
    }
}

/// One attribute modification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    /// Operation.
    pub op: ModOp,
    /// Target attribute.
    pub attribute: String,
    /// Operand values.
    pub values: Vec<Vec<u8>>,
}

impl Modification {
    /// Create a modification.
    pub fn new(op: ModOp, attribute: impl Into<String>, values: Vec<Vec<u8>>) -> Self {
        Self {
            op,
            attribute: attribute.into(),
            values,
        }
    }

    /// Replace `attribute` with a single string value.
    pub fn replace(attribute: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self::new(ModOp::Replace, attribute, vec![value.into()])
    }

    fn apply_to(&self, dn: &Dn, attributes: &mut Attributes) -> DirectoryResult<()> {
        let name = self.attribute.as_str();
        match self.op {
            ModOp::Add => {
                if self.values.is_empty() {
                    return Err(self.syntax(dn, "add requires at least one value"));
                }
                for value in &self.values {
                    if attributes.contains_value(name, value) {
                        return Err(DirectoryError::AttributeOrValueExists {
                            dn: dn.to_string(),
                            attribute: name.to_string(),
                        });
                    }
                    attributes.add(name, value.clone());
                }
            }
            ModOp::Delete => {
                if self.values.is_empty() {
                    if attributes.remove(name).is_none() {
                        return Err(self.missing(dn));
                    }
                    return Ok(());
                }
                let attribute = attributes.get_mut(name).ok_or_else(|| self.missing(dn))?;
                for value in &self.values {
                    let before = attribute.values.len();
                    attribute.values.retain(|v| v != value);
                    if attribute.values.len() == before {
                        return Err(self.missing(dn));
                    }
                }
                if attribute.values.is_empty() {
                    attributes.remove(name);
                }
            }
            ModOp::Replace => {
                if self.values.is_empty() {
                    attributes.remove(name);
                } else {
                    attributes.replace(name, self.values.clone());
                }
            }
            ModOp::Increment => {
                let delta = match self.values.as_slice() {
                    [value] => parse_integer(value)
                        .ok_or_else(|| self.syntax(dn, "increment value is not an integer"))?,
                    _ => return Err(self.syntax(dn, "increment requires exactly one value")),
                };
                let attribute = attributes.get_mut(name).ok_or_else(|| self.missing(dn))?;
                let current = match attribute.values.as_slice() {
                    [value] => parse_integer(value)
                        .ok_or_else(|| self.syntax(dn, "current value is not an integer"))?,
                    _ => return Err(self.syntax(dn, "attribute is not single-valued")),
                };
                let next = current
                    .checked_add(delta)
                    .ok_or_else(|| self.syntax(dn, "increment overflows"))?;
                attribute.values = vec![next.to_string().into_bytes()];
            }
        }
        Ok(())
    }

    fn missing(&self, dn: &Dn) -> DirectoryError {
        DirectoryError::NoSuchAttribute {
            dn: dn.to_string(),
            attribute: self.attribute.clone(),
        }
    }

    fn syntax(&self, dn: &Dn, reason: &str) -> DirectoryError {
        DirectoryError::InvalidAttributeSyntax {
            dn: dn.to_string(),
            attribute: self.attribute.clone(),
            reason: reason.to_string(),
        }
    }
}

fn parse_integer(value: &[u8]) -> Option<i64> {
    std::str::from_utf8(value).ok()?.trim().parse().ok()
}
