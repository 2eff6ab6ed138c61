//! Modification times.
//!
//! Every mutable object in the pipeline carries a [`TimeStamp`]. Stamps are
//! drawn from a single process-wide counter, so comparing stamps from two
//! different objects tells which one changed last.

use std::sync::atomic::{AtomicU64, Ordering};

static GLOBAL_TIME: AtomicU64 = AtomicU64::new(0);

/// Returns a fresh, strictly increasing modification time.
#[must_use]
pub fn next_time() -> u64 {
    GLOBAL_TIME.fetch_add(1, Ordering::Relaxed) + 1
}

/// A modification time stamp.
///
/// A default stamp is zero, which is older than anything that was ever
/// modified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeStamp(u64);

impl TimeStamp {
    /// Creates a stamp that is already marked as modified.
    #[must_use]
    pub fn new() -> Self {
        Self(next_time())
    }

    /// Marks the stamp as modified now.
    pub fn modified(&mut self) {
        self.0 = next_time();
    }

    /// Returns the raw time value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}
