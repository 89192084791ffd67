//! Filesystem change notification for store reloads.
//!
//! One [`ChangeNotifier`] per process watches the backing files of any number
//! of stores and raises a [`Signal`] for every subscriber interested in the
//! kind of change that happened. Signals are lossy: a subscriber that has not
//! consumed its previous notification simply misses the new one.
//!
//! # Example
//!
//! ```ignore
//! let notifier = ChangeNotifier::global()?;
//! let signal = notifier.subscribe("records.json", Operations::WRITE)?;
//!
//! loop {
//!     signal.wait();
//!     // re-read records.json
//! }
//! ```

mod notifier;
mod types;

pub use notifier::ChangeNotifier;
pub use types::{Operations, Signal};

use crate::error::Result;
use std::path::Path;

/// Anything that can hand out change signals for a path.
pub trait ChangeSource {
    fn subscribe(&self, path: &Path, operations: Operations) -> Result<Signal>;
}
