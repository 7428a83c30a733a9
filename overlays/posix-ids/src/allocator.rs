use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::*;

use crate::collector::collect_max;
use kernel::prelude::{AttributeDescription, EntrySearcher};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("Identifier space exhausted")]
    Exhausted,
}

/// Hands out increasing identifiers for one store. The high-water mark starts
/// at 0, meaning unseeded, and is seeded by scanning the store for the
/// largest existing value the first time an identifier is needed.
pub struct IdAllocator {
    scanned: AttributeDescription,
    high_water_mark: Mutex<u64>,
}

impl IdAllocator {
    pub fn new(scanned: AttributeDescription) -> Self {
        Self {
            scanned,
            high_water_mark: Mutex::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        // A panicking holder can't leave the mark half-written.
        self.high_water_mark
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The next unused identifier. The lock is held across the seeding scan
    /// so concurrent callers wait for it rather than scanning themselves.
    pub fn next(&self, searcher: &dyn EntrySearcher) -> Result<u64, AllocationError> {
        let mut mark = self.lock();

        if *mark == 0 {
            let _span = span!(Level::INFO, "seeding", attribute = %self.scanned).entered();

            *mark = collect_max(searcher, &self.scanned);

            info!(seed = *mark, "seeded");
        }

        let next = mark.checked_add(1).ok_or(AllocationError::Exhausted)?;

        *mark = next;

        Ok(next)
    }

    pub fn high_water_mark(&self) -> u64 {
        *self.lock()
    }

    /// Forget the mark, the next allocation scans again.
    pub fn reset(&self) {
        *self.lock() = 0;
    }
}
