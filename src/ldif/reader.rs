//! Streaming LDIF reader (RFC 2849).
//!
//! [`LdifReader`] yields one [`ChangeRecord`] per record, lazily, from any
//! `BufRead`. Supported: folded lines, `#` comments, a leading `version: 1`,
//! base64 (`::`) and `file://` (`:<`) values, `control:` lines (skipped), and
//! the `add` and `modify` change types. Other change types are returned as
//! [`Change::Unsupported`](super::record::Change::Unsupported) so the caller
//! decides how to fail. After the first error the reader yields nothing more.

use super::record::ChangeRecord;
use crate::core::error::LdifError;
use crate::directory::dn::Dn;
use crate::directory::entry::{Attributes, ModOp, Modification};
use base64::Engine as _;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Lazily parses change records.
pub struct LdifReader<R> {
    source: R,
    line_no: usize,
    pending: Option<(usize, String)>,
    version_checked: bool,
    failed: bool,
}

/// One logical (unfolded) line with the number of its first physical line.
type Line = (usize, String);

/// A parsed attribute value line.
struct ValueLine {
    name: String,
    value: Vec<u8>,
}

impl<R: BufRead> LdifReader<R> {
    /// Read records from `source`.
    pub fn new(source: R) -> Self {
        Self {
            source,
            line_no: 0,
            pending: None,
            version_checked: false,
            failed: false,
        }
    }

    fn next_physical(&mut self) -> Result<Option<Line>, LdifError> {
        if let Some(line) = self.pending.take() {
            return Ok(Some(line));
        }
        let mut buf = String::new();
        if self.source.read_line(&mut buf)? == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        while buf.ends_with('\n') || buf.ends_with('\r') {
            buf.pop();
        }
        Ok(Some((self.line_no, buf)))
    }

    /// Collect the unfolded lines of the next record, skipping comments.
    fn next_record_lines(&mut self) -> Result<Option<Vec<Line>>, LdifError> {
        let mut lines: Vec<Line> = Vec::new();
        let mut in_comment = false;

        while let Some((no, line)) = self.next_physical()? {
            if let Some(rest) = line.strip_prefix(' ') {
                if in_comment {
                    continue;
                }
                match lines.last_mut() {
                    Some((_, last)) => last.push_str(rest),
                    None if rest.trim().is_empty() => continue,
                    None => {
                        return Err(LdifError::syntax(
                            no,
                            "continuation line without a preceding line",
                        ))
                    }
                }
                continue;
            }
            if line.trim().is_empty() {
                in_comment = false;
                if lines.is_empty() {
                    continue;
                }
                break;
            }
            if line.starts_with('#') {
                in_comment = true;
                continue;
            }
            in_comment = false;
            lines.push((no, line));
        }

        Ok(if lines.is_empty() { None } else { Some(lines) })
    }

    fn read_next(&mut self) -> Result<Option<ChangeRecord>, LdifError> {
        loop {
            let Some(mut lines) = self.next_record_lines()? else {
                return Ok(None);
            };

            if !self.version_checked {
                self.version_checked = true;
                let (no, first) = &lines[0];
                if first.to_ascii_lowercase().starts_with("version:") {
                    let value = parse_value_line(*no, first)?;
                    if value.value != b"1" {
                        return Err(LdifError::syntax(*no, "unsupported LDIF version"));
                    }
                    lines.remove(0);
                    if lines.is_empty() {
                        continue;
                    }
                }
            }

            return parse_record(lines).map(Some);
        }
    }
}

impl<'a> LdifReader<&'a [u8]> {
    /// Read records from in-memory text.
    pub fn from_text(text: &'a str) -> Self {
        Self::new(text.as_bytes())
    }
}

impl LdifReader<BufReader<File>> {
    /// Open an LDIF file.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> Iterator for LdifReader<R> {
    type Item = Result<ChangeRecord, LdifError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.read_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

fn parse_value_line(no: usize, line: &str) -> Result<ValueLine, LdifError> {
    let (name, rest) = line
        .split_once(':')
        .ok_or_else(|| LdifError::syntax(no, format!("expected 'attribute: value', got '{}'", line)))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(LdifError::syntax(no, "missing attribute name"));
    }

    let value = if let Some(encoded) = rest.strip_prefix(':') {
        base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| LdifError::syntax(no, format!("invalid base64 value for {}: {}", name, e)))?
    } else if let Some(url) = rest.strip_prefix('<') {
        read_url(no, url.trim())?
    } else {
        rest.trim_start_matches(' ').as_bytes().to_vec()
    };

    Ok(ValueLine {
        name: name.to_string(),
        value,
    })
}

fn read_url(no: usize, url: &str) -> Result<Vec<u8>, LdifError> {
    let path = url
        .strip_prefix("file://")
        .ok_or_else(|| LdifError::syntax(no, format!("unsupported URL '{}'", url)))?;
    std::fs::read(path).map_err(|e| LdifError::syntax(no, format!("cannot read {}: {}", url, e)))
}

fn utf8(no: usize, name: &str, value: Vec<u8>) -> Result<String, LdifError> {
    String::from_utf8(value)
        .map_err(|_| LdifError::syntax(no, format!("{} value is not valid UTF-8", name)))
}

fn parse_record(lines: Vec<Line>) -> Result<ChangeRecord, LdifError> {
    let mut lines = lines.into_iter().peekable();

    let Some((dn_line, first)) = lines.next() else {
        return Err(LdifError::syntax(0, "empty record"));
    };
    let dn_value = parse_value_line(dn_line, &first)?;
    if !dn_value.name.eq_ignore_ascii_case("dn") {
        return Err(LdifError::syntax(
            dn_line,
            format!("record must start with 'dn:', got '{}'", dn_value.name),
        ));
    }
    let dn_text = utf8(dn_line, "dn", dn_value.value)?;
    let dn = Dn::parse(&dn_text).map_err(|source| LdifError::Dn {
        line: dn_line,
        source,
    })?;

    let mut change_type = None;
    while let Some((no, line)) = lines.peek() {
        let no = *no;
        let lower = line.to_ascii_lowercase();
        if lower.starts_with("control:") {
            lines.next();
        } else if lower.starts_with("changetype:") {
            let value = parse_value_line(no, line)?;
            change_type = Some(utf8(no, "changetype", value.value)?.trim().to_ascii_lowercase());
            lines.next();
            break;
        } else {
            break;
        }
    }

    match change_type.as_deref() {
        None => Ok(ChangeRecord::content(dn, parse_attributes(lines)?)),
        Some("add") => Ok(ChangeRecord::add(dn, parse_attributes(lines)?)),
        Some("modify") => Ok(ChangeRecord::modify(dn, parse_modifications(lines)?)),
        Some(other) => Ok(ChangeRecord::unsupported(dn, other)),
    }
}

fn parse_attributes(lines: impl Iterator<Item = Line>) -> Result<Attributes, LdifError> {
    let mut attributes = Attributes::new();
    for (no, line) in lines {
        let parsed = parse_value_line(no, &line)?;
        attributes.add(&parsed.name, parsed.value);
    }
    Ok(attributes)
}

fn parse_mod_op(no: usize, keyword: &str) -> Result<ModOp, LdifError> {
    match keyword.to_ascii_lowercase().as_str() {
        "add" => Ok(ModOp::Add),
        "delete" => Ok(ModOp::Delete),
        "replace" => Ok(ModOp::Replace),
        "increment" => Ok(ModOp::Increment),
        other => Err(LdifError::syntax(
            no,
            format!("unknown modification '{}'", other),
        )),
    }
}

/// Attribute type without options: `cn;lang-en` -> `cn`.
fn base_type(name: &str) -> &str {
    name.split(';').next().unwrap_or(name)
}

fn parse_modifications(
    lines: impl Iterator<Item = Line>,
) -> Result<Vec<Modification>, LdifError> {
    let mut modifications = Vec::new();
    let mut current: Option<Modification> = None;

    for (no, line) in lines {
        if line.trim() == "-" {
            match current.take() {
                Some(modification) => modifications.push(modification),
                None => return Err(LdifError::syntax(no, "'-' without a modification")),
            }
            continue;
        }

        let parsed = parse_value_line(no, &line)?;
        match current.as_mut() {
            None => {
                let op = parse_mod_op(no, &parsed.name)?;
                let attribute = utf8(no, &parsed.name, parsed.value)?.trim().to_string();
                if attribute.is_empty() {
                    return Err(LdifError::syntax(no, "modification without attribute"));
                }
                current = Some(Modification::new(op, attribute, Vec::new()));
            }
            Some(modification) => {
                if !base_type(&parsed.name).eq_ignore_ascii_case(base_type(&modification.attribute))
                {
                    return Err(LdifError::syntax(
                        no,
                        format!(
                            "value for '{}' inside modification of '{}'",
                            parsed.name, modification.attribute
                        ),
                    ));
                }
                modification.values.push(parsed.value);
            }
        }
    }

    // The final '-' is optional.
    if let Some(modification) = current {
        modifications.push(modification);
    }
    Ok(modifications)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldif::record::{Change, ChangeKind};

    fn read_all(text: &str) -> Vec<Result<ChangeRecord, LdifError>> {
        LdifReader::from_text(text).collect()
    }

    #[test]
    fn content_records() {
        let records = read_all(
            "version: 1\n\
             \n\
             dn: dc=ldap,dc=example\n\
             objectClass: top\n\
             objectClass: domain\n\
             dc: ldap\n\
             \n\
             # a comment\n\
             dn: ou=Users,dc=ldap,dc=example\n\
             objectClass: organizationalUnit\n",
        );
        assert_eq!(records.len(), 2);
        let first = records[0].as_ref().unwrap();
        assert_eq!(first.dn.to_string(), "dc=ldap,dc=example");
        assert_eq!(first.kind(), ChangeKind::None);
        match &first.change {
            Change::None(attrs) => {
                assert_eq!(attrs.get("objectclass").unwrap().values().len(), 2)
            }
            other => panic!("unexpected change {:?}", other),
        }
    }

    #[test]
    fn folded_lines_and_base64() {
        let records = read_all(
            "dn: uid=jduke,ou=Users,dc=ldap,dc=exa\n mple\n\
             changetype: add\n\
             objectClass: person\n\
             description:: SmF2YSBEdWtl\n\
             cn: Java\n  Duke\n\
             # folded comment\n continues here\n\
             sn: Duke\n",
        );
        let record = records[0].as_ref().unwrap();
        assert_eq!(record.dn.to_string(), "uid=jduke,ou=Users,dc=ldap,dc=example");
        assert_eq!(record.kind(), ChangeKind::Add);
        let entry = record.to_entry().unwrap();
        assert_eq!(entry.get("description").unwrap().first_str(), Some("Java Duke"));
        assert_eq!(entry.get("cn").unwrap().first_str(), Some("Java Duke"));
        assert_eq!(entry.get("sn").unwrap().first_str(), Some("Duke"));
    }

    #[test]
    fn base64_dn() {
        // "cn=Æ,dc=x"
        let records = read_all("dn:: Y249w4YsZGM9eA==\nobjectClass: top\n");
        assert_eq!(records[0].as_ref().unwrap().dn.name(), Some("Æ"));
    }

    #[test]
    fn modify_records() {
        let records = read_all(
            "dn: uid=admin,ou=system\n\
             changetype: modify\n\
             replace: userPassword\n\
             userPassword: s3cret\n\
             -\n\
             add: mail\n\
             mail: a@example\n\
             mail: b@example\n\
             -\n\
             delete: description\n",
        );
        let record = records[0].as_ref().unwrap();
        let Change::Modify(mods) = &record.change else {
            panic!("expected modify");
        };
        assert_eq!(mods.len(), 3);
        assert_eq!(mods[0].op, ModOp::Replace);
        assert_eq!(mods[0].values, vec![b"s3cret".to_vec()]);
        assert_eq!(mods[1].values.len(), 2);
        assert_eq!(mods[2].op, ModOp::Delete);
        assert!(mods[2].values.is_empty());
    }

    #[test]
    fn other_change_types_are_unsupported() {
        let records = read_all(
            "dn: ou=a,dc=x\nchangetype: delete\n\n\
             dn: ou=a,dc=x\nchangetype: modrdn\nnewrdn: ou=b\ndeleteoldrdn: 1\n",
        );
        assert_eq!(records.len(), 2);
        for record in &records {
            assert_eq!(record.as_ref().unwrap().kind(), ChangeKind::Unsupported);
        }
        assert_eq!(records[1].as_ref().unwrap().kind_name(), "modrdn");
    }

    #[test]
    fn control_lines_are_skipped() {
        let records = read_all(
            "dn: ou=a,dc=x\ncontrol: 1.2.840.113556.1.4.805 true\nchangetype: add\nobjectClass: top\n",
        );
        assert_eq!(records[0].as_ref().unwrap().kind(), ChangeKind::Add);
    }

    #[test]
    fn crlf_line_endings() {
        let records = read_all("dn: ou=a,dc=x\r\nobjectClass: top\r\n\r\ndn: ou=b,dc=x\r\nobjectClass: top\r\n");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].as_ref().unwrap().dn.name(), Some("b"));
    }

    #[test]
    fn errors_carry_line_numbers_and_stop_iteration() {
        let mut reader = LdifReader::from_text(
            "dn: ou=a,dc=x\nobjectClass: top\n\nnot a dn line\n\ndn: ou=c,dc=x\nobjectClass: top\n",
        );
        assert!(reader.next().unwrap().is_ok());
        match reader.next().unwrap() {
            Err(LdifError::Syntax { line, .. }) => assert_eq!(line, 4),
            other => panic!("unexpected {:?}", other.map(|r| r.dn)),
        }
        assert!(reader.next().is_none());
    }

    #[test]
    fn invalid_dn_is_reported() {
        let result = read_all("dn: not-a-dn\nobjectClass: top\n");
        assert!(matches!(result[0], Err(LdifError::Dn { line: 1, .. })));
    }

    #[test]
    fn mismatched_modification_value() {
        let result = read_all("dn: ou=a,dc=x\nchangetype: modify\nreplace: cn\nsn: x\n-\n");
        assert!(matches!(result[0], Err(LdifError::Syntax { line: 4, .. })));
    }

    #[test]
    fn file_url_values() {
        let dir = tempfile::tempdir().unwrap();
        let photo = dir.path().join("photo.bin");
        std::fs::write(&photo, [0u8, 1, 2, 255]).unwrap();
        let text = format!(
            "dn: uid=x,dc=x\nobjectClass: top\njpegPhoto:< file://{}\n",
            photo.display()
        );
        let records = read_all(&text);
        let entry = records[0].as_ref().unwrap().to_entry().unwrap();
        assert_eq!(entry.get("jpegPhoto").unwrap().values()[0], vec![0u8, 1, 2, 255]);
    }

    #[test]
    fn unsupported_version() {
        let result = read_all("version: 2\n\ndn: ou=a,dc=x\nobjectClass: top\n");
        assert!(matches!(result[0], Err(LdifError::Syntax { line: 1, .. })));
    }
}
