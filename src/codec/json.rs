//! JSON codec: the file holds one array of `{"id": ..., "data": ...}` objects.

use super::Codec;
use crate::error::{Result, StoreError};
use crate::types::Record;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct JsonCodec {
    path: PathBuf,
}

impl JsonCodec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn persistence(&self, operation: &'static str, source: std::io::Error) -> StoreError {
        StoreError::Persistence {
            path: self.path.clone(),
            operation,
            source,
        }
    }

    fn open_or_create(&self) -> Result<File> {
        match File::open(&self.path) {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == ErrorKind::NotFound => OpenOptions::new()
                .read(true)
                .append(true)
                .create(true)
                .open(&self.path)
                .map_err(|e| self.persistence("create", e)),
            Err(e) => Err(self.persistence("open", e)),
        }
    }
}

impl Codec for JsonCodec {
    fn read(&self) -> Result<Vec<Record>> {
        let mut file = self.open_or_create()?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| self.persistence("read", e))?;

        // A fresh file has no array yet, and neither does one caught between a
        // writer's truncate and its write. A partially written one is an error.
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        let records: Vec<Record> =
            serde_json::from_str(&contents).map_err(|source| StoreError::Decode {
                path: self.path.clone(),
                source,
            })?;
        debug!(path = %self.path.display(), count = records.len(), "read records");
        Ok(records)
    }

    fn write(&self, records: &[Record]) -> Result<()> {
        // Truncate in place rather than rename over: a watch on the file
        // follows the inode and would be lost on rename. Readers may see the
        // file empty until the write below lands.
        let file = File::create(&self.path).map_err(|e| self.persistence("create", e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, records).map_err(|e| {
            if e.is_io() {
                self.persistence("write", e.into())
            } else {
                e.into()
            }
        })?;
        writer
            .write_all(b"\n")
            .and_then(|_| writer.flush())
            .map_err(|e| self.persistence("write", e))?;
        debug!(path = %self.path.display(), count = records.len(), "wrote records");
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
