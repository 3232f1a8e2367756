//! Inspect command implementation.

use crate::ldif::reader::LdifReader;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Inspect LDIF files.
#[derive(Args, Debug)]
pub struct InspectArgs {
    #[command(subcommand)]
    pub command: InspectCommand,
}

/// Inspect subcommands.
#[derive(Subcommand, Debug)]
pub enum InspectCommand {
    /// Parse LDIF files and list their change records.
    Ldif {
        /// LDIF file paths.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

/// Run the inspect command.
pub fn run_inspect(args: InspectArgs) -> Result<()> {
    match args.command {
        InspectCommand::Ldif { paths } => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for path in paths {
                inspect_ldif(&path, &mut out)?;
            }
            Ok(())
        }
    }
}

fn inspect_ldif(path: &Path, out: &mut impl Write) -> Result<()> {
    let reader = LdifReader::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    writeln!(out, "{}:", path.display())?;
    let mut count = 0;
    for (index, record) in reader.enumerate() {
        let record = record.with_context(|| {
            format!("{}: record {} is invalid", path.display(), index + 1)
        })?;
        writeln!(out, "  {:>4}  {:<8} {}", index + 1, record.kind_name(), record.dn)?;
        count += 1;
    }
    writeln!(out, "  {} records", count)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.ldif");
        std::fs::write(
            &path,
            "dn: dc=x\nobjectClass: domain\n\ndn: dc=x\nchangetype: modify\nreplace: description\ndescription: d\n-\n\ndn: cn=y,dc=x\nchangetype: delete\n",
        )
        .unwrap();

        let mut out = Vec::new();
        inspect_ldif(&path, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("add"));
        assert!(text.contains("modify"));
        assert!(text.contains("delete"));
        assert!(text.contains("3 records"));
    }

    #[test]
    fn reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ldif");
        std::fs::write(&path, "objectClass: top\n").unwrap();
        let mut out = Vec::new();
        assert!(inspect_ldif(&path, &mut out).is_err());
    }
}
