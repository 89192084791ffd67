//! # Record File
//!
//! An embedded record store backed by a single file. Records live in memory
//! in insertion order, every change is written through to the file, and a
//! store can reload itself whenever the file changes on disk.
//!
//! ## Core Concepts
//!
//! - **Records**: An id plus an opaque JSON payload
//! - **Id generators**: Produce fresh ids and learn about ids loaded from disk
//! - **Codecs**: Read and write the whole record list in one file format
//! - **Change notifier**: One process-wide file watcher fanning out lossy signals
//!
//! ## Example
//!
//! ```ignore
//! use record_file::{ChangeNotifier, FileStore, Operations, StoreConfig};
//!
//! // A reader that follows changes made by other processes
//! let reader = FileStore::open_watched(
//!     StoreConfig::new("records.json"),
//!     ChangeNotifier::global()?,
//!     Operations::WRITE,
//! )?;
//!
//! // A writer on the same file
//! let writer = FileStore::open(StoreConfig::new("records.json"))?;
//! let record = writer.add(&1.0)?;
//!
//! // Shortly after, the reader has reloaded
//! assert_eq!(reader.get(&record.id).map(|r| r.data), Some(1.0.into()));
//! ```

pub mod codec;
pub mod error;
pub mod ids;
pub mod store;
pub mod types;
pub mod watch;

// Re-exports
pub use codec::{Codec, Format, JsonCodec};
pub use error::{Result, StoreError};
pub use ids::{IdGenerator, IncrementingIdGenerator};
pub use store::{FileStore, StoreConfig};
pub use types::{PayloadKind, Record};
pub use watch::{ChangeNotifier, ChangeSource, Operations, Signal};
