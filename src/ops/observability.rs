//! Request observation.
//!
//! Engines report read requests to an injected [`RequestObserver`]. Each
//! server instance gets its own observer, so several directories in one
//! process keep separate counts.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Receives notifications about requests served by an engine.
pub trait RequestObserver: Send + Sync {
    /// A single entry was read.
    fn on_lookup(&self) {}

    /// A search was evaluated.
    fn on_search(&self) {}
}

/// Counts lookups and searches.
#[derive(Debug, Default)]
pub struct RequestCounter {
    lookups: AtomicU64,
    searches: AtomicU64,
}

/// Point-in-time counter values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    /// Lookups served.
    pub lookups: u64,
    /// Searches served.
    pub searches: u64,
}

impl RequestSnapshot {
    /// Total requests.
    pub fn total(&self) -> u64 {
        self.lookups + self.searches
    }
}

impl RequestCounter {
    /// Create a zeroed counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total requests observed.
    pub fn get(&self) -> u64 {
        self.snapshot().total()
    }

    /// Current values.
    pub fn snapshot(&self) -> RequestSnapshot {
        RequestSnapshot {
            lookups: self.lookups.load(Ordering::Relaxed),
            searches: self.searches.load(Ordering::Relaxed),
        }
    }

    /// Reset to zero.
    pub fn reset(&self) {
        self.lookups.store(0, Ordering::Relaxed);
        self.searches.store(0, Ordering::Relaxed);
    }
}

impl RequestObserver for RequestCounter {
    fn on_lookup(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }

    fn on_search(&self) {
        self.searches.fetch_add(1, Ordering::Relaxed);
    }
}
