//! Error types.
//!
//! Two layers of errors exist:
//! - [`DirectoryError`] is reported by a directory engine (entry storage,
//!   schema checks, partitions, transport binding).
//! - [`ServerError`] is the provisioning/lifecycle taxonomy surfaced to callers
//!   of the importer and of [`crate::runtime::ServerSession`].
//!
//! [`LdifError`] covers change-record parsing.

use std::net::SocketAddr;
use thiserror::Error;

/// Errors reported by a directory engine.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The engine has not been started, or has already been shut down.
    #[error("directory engine is not running")]
    NotStarted,

    /// `start()` was called on an engine that is already running.
    #[error("directory engine is already running")]
    AlreadyStarted,

    /// A DN could not be parsed.
    #[error("invalid DN '{input}': {reason}")]
    InvalidDn { input: String, reason: String },

    /// No entry exists at the given DN.
    #[error("no such object: {dn}")]
    NoSuchObject { dn: String },

    /// An entry already exists at the given DN.
    #[error("entry already exists: {dn}")]
    EntryAlreadyExists { dn: String },

    /// The parent of the entry being added does not exist.
    #[error("parent entry of {dn} does not exist")]
    ParentNotFound { dn: String },

    /// No mounted partition covers the DN.
    #[error("no partition covers {dn}")]
    NoSuchPartition { dn: String },

    /// The engine refused to mount a partition.
    #[error("partition '{id}' at '{suffix}' rejected: {reason}")]
    PartitionRejected {
        id: String,
        suffix: String,
        reason: String,
    },

    /// The entry violates the directory schema.
    #[error("schema violation for {dn}: {reason}")]
    SchemaViolation { dn: String, reason: String },

    /// A value being added already exists.
    #[error("attribute or value exists: {attribute} on {dn}")]
    AttributeOrValueExists { dn: String, attribute: String },

    /// The attribute (or value) being removed is not present.
    #[error("no such attribute: {attribute} on {dn}")]
    NoSuchAttribute { dn: String, attribute: String },

    /// A value does not match the syntax required by the operation.
    #[error("invalid attribute syntax for {attribute} on {dn}: {reason}")]
    InvalidAttributeSyntax {
        dn: String,
        attribute: String,
        reason: String,
    },

    /// Simple bind failed.
    #[error("invalid credentials for {dn}")]
    InvalidCredentials { dn: String },

    /// No handler is registered for the extended operation.
    #[error("unsupported extended operation: {oid}")]
    UnsupportedExtendedOperation { oid: String },

    /// A listener could not bind its socket.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Transport address or runtime problem.
    #[error("transport {name}: {message}")]
    Transport { name: String, message: String },

    /// TLS material or handshake problem.
    #[error("TLS error: {message}")]
    Tls { message: String },

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DirectoryError {
    /// Create a TLS error.
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls {
            message: message.into(),
        }
    }

    /// Create a transport error.
    pub fn transport(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Check if this error means the target entry does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NoSuchObject { .. })
    }
}

/// Result type using DirectoryError.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// LDIF parse error.
#[derive(Debug, Error)]
pub enum LdifError {
    /// Malformed LDIF content.
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    /// The DN of a record could not be parsed.
    #[error("line {line}: {source}")]
    Dn {
        line: usize,
        #[source]
        source: DirectoryError,
    },

    /// Reading the underlying source failed.
    #[error("failed to read LDIF: {0}")]
    Io(#[from] std::io::Error),
}

impl LdifError {
    /// Create a syntax error at the given line.
    pub fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            message: message.into(),
        }
    }
}

/// Provisioning and lifecycle errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The directory engine rejected creation of a partition.
    #[error("failed to create partition for {dn}: {source}")]
    Provisioning {
        dn: String,
        #[source]
        source: DirectoryError,
    },

    /// A modify record targets an entry that does not exist.
    #[error("entry not found: {dn}")]
    EntryNotFound { dn: String },

    /// A change record has a change type other than add/modify.
    #[error("unsupported change type: {kind}")]
    UnsupportedChangeType { kind: String },

    /// A transport could not be bound.
    #[error("transport {name} ({url}) failed to start: {source}")]
    TransportStart {
        name: String,
        url: String,
        #[source]
        source: DirectoryError,
    },

    /// The first failing record of an import, with its position in the stream.
    #[error("import of {source_name} failed at record {position}{}: {cause}", describe_dn(.dn))]
    Import {
        source_name: String,
        position: usize,
        dn: Option<String>,
        #[source]
        cause: Box<ServerError>,
    },

    /// A change source could not be parsed.
    #[error(transparent)]
    Ldif(#[from] LdifError),

    /// One or more components failed to stop.
    #[error("shutdown incomplete: {}", join_failures(.failures))]
    Shutdown { failures: Vec<ShutdownFailure> },

    /// Directory engine error outside of partition creation.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    Config { message: String },

    /// I/O error while opening a change source.
    #[error("failed to open {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ServerError {
    /// The innermost cause of an import failure, or `self` otherwise.
    pub fn root_cause(&self) -> &ServerError {
        match self {
            Self::Import { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

/// One failed step of a shutdown.
#[derive(Debug)]
pub struct ShutdownFailure {
    /// Component that failed to stop (transport name or "directory").
    pub component: String,
    /// Underlying error.
    pub source: DirectoryError,
}

impl std::fmt::Display for ShutdownFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.component, self.source)
    }
}

fn describe_dn(dn: &Option<String>) -> String {
    match dn {
        Some(dn) => format!(" ({})", dn),
        None => String::new(),
    }
}

fn join_failures(failures: &[ShutdownFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type using ServerError.
pub type ServerResult<T> = Result<T, ServerError>;
