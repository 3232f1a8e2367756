//! Operations and observability.
//!
//! - [`observability`] - Request observers and counters

pub mod observability;
