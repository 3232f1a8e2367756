//! Core runtime infrastructure.
//!
//! - [`config`] - Configuration parsing and validation
//! - [`runtime`] - Server session lifecycle
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod runtime;
