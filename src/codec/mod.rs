//! Full-file codecs for the ordered record list.
//!
//! A codec owns one backing file and moves the complete record list in and
//! out of it. Every write replaces the whole file.

mod json;

pub use json::JsonCodec;

use crate::error::{Result, StoreError};
use crate::types::Record;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Reads and writes the full record list of one backing file.
pub trait Codec: Send + Sync {
    /// Load every record, in persisted order.
    ///
    /// A missing file is created empty and yields an empty list.
    fn read(&self) -> Result<Vec<Record>>;

    /// Replace the file's contents with `records`.
    fn write(&self, records: &[Record]) -> Result<()>;

    /// Backing file.
    fn path(&self) -> &Path;
}

/// On-disk format of a store file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Json,
    /// Reserved; opening a store with it fails.
    Xml,
}

impl Format {
    /// Build the codec for `path`.
    pub fn codec(self, path: impl Into<PathBuf>) -> Result<Box<dyn Codec>> {
        match self {
            Format::Json => Ok(Box::new(JsonCodec::new(path))),
            Format::Xml => Err(StoreError::Unimplemented("xml format")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Xml => "xml",
        }
    }
}

impl FromStr for Format {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "xml" => Ok(Format::Xml),
            _ => Err(StoreError::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
