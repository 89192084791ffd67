//! Record id generation.

use crate::error::{Result, StoreError};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Produces unique record ids and absorbs ids seen elsewhere.
///
/// `generate` must never return an id that was previously returned by this
/// instance or reported through `mark_used`. `mark_used` must be idempotent and
/// must never lower the generator's notion of the highest id seen, regardless
/// of call order.
///
/// The store only tells the generator about ids it loads from disk. A
/// generator that cannot interpret an id it is told about (the default one
/// ignores non-hex ids) can still collide with it; the store reports such a
/// collision as [`StoreError::DuplicateId`](crate::StoreError::DuplicateId)
/// instead of overwriting.
pub trait IdGenerator: fmt::Debug + Send + Sync {
    /// Return a fresh id, or an error once no fresh id is left.
    fn generate(&self) -> Result<String>;

    /// Record that `id` is already taken.
    fn mark_used(&self, id: &str);
}

/// Width of ids produced by [`IncrementingIdGenerator`].
pub const ID_WIDTH: usize = 16;

/// Default generator: a counter formatted as 16 lowercase hex digits.
#[derive(Debug, Default)]
pub struct IncrementingIdGenerator {
    last: AtomicU64,
}

impl IncrementingIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting after `last`.
    pub fn starting_after(last: u64) -> Self {
        Self {
            last: AtomicU64::new(last),
        }
    }

    /// Highest value issued or observed so far.
    pub fn last(&self) -> u64 {
        self.last.load(Ordering::SeqCst)
    }
}

impl IdGenerator for IncrementingIdGenerator {
    fn generate(&self) -> Result<String> {
        // Never wrap: a wrapped counter would reissue ids already on disk.
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| last.checked_add(1))
            .map_err(|last| {
                StoreError::GeneratorExhausted(format!("{:0width$x}", last, width = ID_WIDTH))
            })?;
        Ok(format!("{:0width$x}", previous + 1, width = ID_WIDTH))
    }

    fn mark_used(&self, id: &str) {
        // Ids that are not hex counters cannot collide with ours.
        if let Ok(value) = u64::from_str_radix(id, 16) {
            self.last.fetch_max(value, Ordering::SeqCst);
        }
    }
}
