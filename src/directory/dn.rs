//! Distinguished names.
//!
//! A [`Dn`] is an ordered list of relative names, leftmost (most specific)
//! first, as written in LDAP string form: `ou=Users,dc=example,dc=com`.
//! Equality, ordering and hashing use a normalized form (lowercase attribute
//! types and values, insignificant spaces removed), so `OU=users, DC=Example`
//! and `ou=Users,dc=example` name the same entry.

use crate::core::error::{DirectoryError, DirectoryResult};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// One relative distinguished name, e.g. `ou=Users`.
#[derive(Debug, Clone)]
pub struct Rdn {
    attribute: String,
    value: String,
}

impl Rdn {
    /// Create an RDN from an attribute type and an unescaped value.
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Attribute type as written.
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Unescaped value.
    pub fn value(&self) -> &str {
        &self.value
    }

    fn normalized(&self) -> String {
        format!(
            "{}={}",
            self.attribute.to_ascii_lowercase(),
            escape_value(&self.value.to_lowercase())
        )
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attribute, escape_value(&self.value))
    }
}

/// A distinguished name.
#[derive(Clone)]
pub struct Dn {
    rdns: Vec<Rdn>,
    normalized: String,
}

impl Dn {
    /// The empty (root) DN.
    pub fn root() -> Self {
        Self {
            rdns: Vec::new(),
            normalized: String::new(),
        }
    }

    /// Build a DN from RDNs ordered leftmost first.
    pub fn from_rdns(rdns: Vec<Rdn>) -> Self {
        let normalized = rdns
            .iter()
            .map(Rdn::normalized)
            .collect::<Vec<_>>()
            .join(",");
        Self { rdns, normalized }
    }

    /// Parse an LDAP string DN.
    pub fn parse(input: &str) -> DirectoryResult<Self> {
        let trimmed = input.trim_start();
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        let mut rdns = Vec::new();
        for component in split_unescaped(trimmed, b',') {
            rdns.push(parse_rdn(input, component)?);
        }
        Ok(Self::from_rdns(rdns))
    }

    /// Whether this is the empty DN.
    pub fn is_root(&self) -> bool {
        self.rdns.is_empty()
    }

    /// Number of RDNs.
    pub fn len(&self) -> usize {
        self.rdns.len()
    }

    /// Whether the DN has no RDNs.
    pub fn is_empty(&self) -> bool {
        self.rdns.is_empty()
    }

    /// RDNs, leftmost first.
    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// The leftmost RDN.
    pub fn rdn(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    /// Value of the leftmost RDN: `Users` for `ou=Users,dc=example`.
    pub fn name(&self) -> Option<&str> {
        self.rdn().map(Rdn::value)
    }

    /// The DN without its leftmost RDN. The root has no parent.
    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            return None;
        }
        Some(Self::from_rdns(self.rdns[1..].to_vec()))
    }

    /// A child of this DN with one more RDN on the left.
    pub fn child(&self, rdn: Rdn) -> Dn {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend(self.rdns.iter().cloned());
        Self::from_rdns(rdns)
    }

    /// Whether `self` equals `ancestor` or lies below it.
    pub fn is_within(&self, ancestor: &Dn) -> bool {
        if ancestor.rdns.len() > self.rdns.len() {
            return false;
        }
        let offset = self.rdns.len() - ancestor.rdns.len();
        self.rdns[offset..]
            .iter()
            .zip(&ancestor.rdns)
            .all(|(a, b)| a.normalized() == b.normalized())
    }

    /// Normalized string form used for comparisons.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for Dn {}

impl Hash for Dn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl PartialOrd for Dn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Dn {
    fn cmp(&self, other: &Self) -> Ordering {
        self.normalized.cmp(&other.normalized)
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rdn) in self.rdns.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", rdn)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dn({})", self)
    }
}

impl FromStr for Dn {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn invalid(input: &str, reason: impl Into<String>) -> DirectoryError {
    DirectoryError::InvalidDn {
        input: input.to_string(),
        reason: reason.into(),
    }
}

/// Split on `separator` where it is not preceded by a backslash escape.
fn split_unescaped(input: &str, separator: u8) -> Vec<&str> {
    let bytes = input.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == separator => {
                parts.push(&input[start..i]);
                start = i + 1;
                i += 1;
            }
            _ => i += 1,
        }
    }
    parts.push(&input[start.min(input.len())..]);
    parts
}

fn parse_rdn(input: &str, component: &str) -> DirectoryResult<Rdn> {
    let (attribute, raw_value) = component
        .split_once('=')
        .ok_or_else(|| invalid(input, format!("component '{}' has no '='", component.trim())))?;

    let attribute = attribute.trim();
    if attribute.is_empty() {
        return Err(invalid(input, "empty attribute type"));
    }
    if !attribute
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        return Err(invalid(
            input,
            format!("invalid attribute type '{}'", attribute),
        ));
    }

    let value = unescape_value(input, raw_value)?;
    if value.is_empty() {
        return Err(invalid(input, format!("empty value for '{}'", attribute)));
    }
    Ok(Rdn::new(attribute, value))
}

/// Unescape an RDN value. Unescaped leading and trailing spaces are not
/// part of the value; escaped ones are.
fn unescape_value(input: &str, raw: &str) -> DirectoryResult<String> {
    let bytes = raw.trim_start().as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut significant = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'+' {
            return Err(invalid(input, "multi-valued RDNs are not supported"));
        }
        if b != b'\\' {
            out.push(b);
            if !b.is_ascii_whitespace() {
                significant = out.len();
            }
            i += 1;
            continue;
        }
        let next = *bytes
            .get(i + 1)
            .ok_or_else(|| invalid(input, "dangling escape"))?;
        match bytes.get(i + 1..i + 3) {
            Some(&[hi, lo]) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => {
                out.push((hex_digit(hi) << 4) | hex_digit(lo));
                i += 3;
            }
            _ => {
                out.push(next);
                i += 2;
            }
        }
        significant = out.len();
    }
    out.truncate(significant);
    String::from_utf8(out).map_err(|_| invalid(input, "value is not valid UTF-8"))
}

fn hex_digit(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        _ => b - b'A' + 10,
    }
}

fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        let special = matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (i == 0 && (c == '#' || c == ' '))
            || (i == last && c == ' ');
        if special {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
