//! Main FileStore struct tying codec, id generator and reload loop together.

use crate::codec::{Codec, Format};
use crate::error::{Result, StoreError};
use crate::ids::{IdGenerator, IncrementingIdGenerator};
use crate::types::{PayloadKind, Record};
use crate::watch::{ChangeSource, Operations, Signal};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::thread;
use tracing::{debug, error};

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Backing file. Created if missing; its directory must exist.
    pub path: PathBuf,

    /// On-disk format.
    pub format: Format,

    /// Kind every payload must have (None = any).
    pub payload_kind: Option<PayloadKind>,

    /// Id generator (None = [`IncrementingIdGenerator`]).
    pub id_generator: Option<Arc<dyn IdGenerator>>,

    /// Signal that triggers a reload each time it is raised (None = never reload).
    pub reload_signal: Option<Signal>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./records.json"),
            format: Format::Json,
            payload_kind: None,
            id_generator: None,
            reload_signal: None,
        }
    }
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn with_payload_kind(mut self, kind: PayloadKind) -> Self {
        self.payload_kind = Some(kind);
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = Some(ids);
        self
    }

    pub fn with_reload_signal(mut self, signal: Signal) -> Self {
        self.reload_signal = Some(signal);
        self
    }
}

/// Records and their id index. Always replaced together.
#[derive(Default)]
struct State {
    /// Insertion order; also the persisted order.
    records: Vec<Record>,
    /// id -> position in `records`.
    by_id: HashMap<String, usize>,
    closed: bool,
}

/// Everything the reload loop needs. The loop holds it weakly.
struct Shared {
    path: PathBuf,
    codec: Box<dyn Codec>,
    payload_kind: Option<PayloadKind>,
    ids: Arc<dyn IdGenerator>,
    state: Mutex<State>,
}

impl Shared {
    fn reload(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(StoreError::Closed);
        }

        let records = self.codec.read()?;
        let mut by_id = HashMap::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            if by_id.insert(record.id.clone(), position).is_some() {
                return Err(StoreError::Corruption(format!(
                    "duplicate record id {} in {}",
                    record.id,
                    self.path.display()
                )));
            }
        }
        for record in &records {
            self.ids.mark_used(&record.id);
        }

        state.records = records;
        state.by_id = by_id;
        debug!(path = %self.path.display(), count = state.records.len(), "loaded records");
        Ok(())
    }
}

/// An ordered collection of records mirrored to one file.
///
/// Every mutation rewrites the whole file before returning. Calls on one
/// store are serialized by a single lock, held across the file write.
///
/// Several stores (in this or other processes) may share a file, but only
/// one of them should write: a store sees other writers' records only after
/// a reload, and two writers will overwrite each other's additions.
pub struct FileStore {
    shared: Arc<Shared>,
    reload_signal: Option<Signal>,
}

impl FileStore {
    /// Open the store at `config.path`, creating the file if missing.
    ///
    /// Fails without returning a store if the format is unsupported or the
    /// initial load fails. If `config.reload_signal` is set, a background
    /// thread reloads the store each time the signal is raised until the
    /// store is closed.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let codec = config.format.codec(&config.path)?;
        let ids: Arc<dyn IdGenerator> = match config.id_generator {
            Some(ids) => ids,
            None => Arc::new(IncrementingIdGenerator::new()),
        };

        let shared = Arc::new(Shared {
            path: config.path,
            codec,
            payload_kind: config.payload_kind,
            ids,
            state: Mutex::new(State::default()),
        });
        shared.reload()?;

        if let Some(signal) = &config.reload_signal {
            let weak = Arc::downgrade(&shared);
            let signal = signal.clone();
            thread::Builder::new()
                .name("record-store-reload".to_string())
                .spawn(move || run_reloader(weak, signal))?;
        }

        Ok(Self {
            shared,
            reload_signal: config.reload_signal,
        })
    }

    /// Open the store and reload it whenever `source` reports one of
    /// `operations` on its file.
    ///
    /// The subscription is made before the store exists, so no store lock is
    /// ever held while calling into `source`.
    pub fn open_watched(
        config: StoreConfig,
        source: &dyn ChangeSource,
        operations: Operations,
    ) -> Result<Self> {
        let signal = source.subscribe(&config.path, operations)?;
        Self::open(config.with_reload_signal(signal))
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Number of records currently held.
    pub fn count(&self) -> usize {
        self.shared.state.lock().records.len()
    }

    /// Add a record holding `data` and persist the store.
    ///
    /// References serialize like their referents, so `add(&s)` is checked
    /// against the payload kind exactly as `add(s)` is.
    pub fn add<T: Serialize + ?Sized>(&self, data: &T) -> Result<Record> {
        let value = serde_json::to_value(data)?;
        self.add_value(value)
    }

    /// Add a record holding an already-serialized payload.
    ///
    /// If the file write fails the record stays in memory and the error is
    /// returned; memory and disk disagree until the next successful write or
    /// reload.
    pub fn add_value(&self, data: Value) -> Result<Record> {
        let mut state = self.shared.state.lock();

        if let Some(expected) = self.shared.payload_kind {
            let got = PayloadKind::of(&data);
            if got != expected {
                return Err(StoreError::TypeMismatch {
                    expected: expected.to_string(),
                    got: got.to_string(),
                });
            }
        }

        let record = Record::new(self.shared.ids.generate()?, data);
        if state.by_id.contains_key(&record.id) {
            return Err(StoreError::DuplicateId(record.id));
        }

        let position = state.records.len();
        state.by_id.insert(record.id.clone(), position);
        state.records.push(record.clone());

        self.shared.codec.write(&state.records)?;
        Ok(record)
    }

    /// Get a record by id.
    pub fn get(&self, id: &str) -> Option<Record> {
        let state = self.shared.state.lock();
        state
            .by_id
            .get(id)
            .and_then(|&position| state.records.get(position))
            .cloned()
    }

    /// Snapshot of all records in insertion order.
    pub fn records(&self) -> Vec<Record> {
        self.shared.state.lock().records.clone()
    }

    /// Replace a record's payload. Not supported yet.
    pub fn update<T: Serialize + ?Sized>(&self, id: &str, _data: &T) -> Result<()> {
        debug!(id, "update requested");
        Err(StoreError::Unimplemented("update"))
    }

    /// Remove a record. Not supported yet.
    pub fn delete(&self, id: &str) -> Result<()> {
        debug!(id, "delete requested");
        Err(StoreError::Unimplemented("delete"))
    }

    /// Records whose payload fields equal every entry of `key`. Not supported yet.
    pub fn find(&self, key: &Map<String, Value>) -> Result<std::vec::IntoIter<Record>> {
        debug!(fields = key.len(), "find requested");
        Err(StoreError::Unimplemented("find"))
    }

    /// Replace the in-memory records with the file's contents.
    ///
    /// Records are replaced, not merged. Every loaded id is reported to the
    /// id generator. Fails with [`StoreError::Closed`] once the store is
    /// closed, and leaves the previous records in place on any error.
    pub fn reload(&self) -> Result<()> {
        self.shared.reload()
    }

    /// Stop reloading. Idempotent.
    ///
    /// Raises the reload signal once more so the background loop wakes, sees
    /// the store closed and exits.
    pub fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        if let Some(signal) = &self.reload_signal {
            signal.notify();
        }
        debug!(path = %self.shared.path.display(), "closed");
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_reloader(shared: Weak<Shared>, signal: Signal) {
    loop {
        signal.wait();
        let Some(shared) = shared.upgrade() else {
            break;
        };
        match shared.reload() {
            Ok(()) => {}
            Err(StoreError::Closed) => break,
            Err(e) => error!(path = %shared.path.display(), error = %e, "failed to reload"),
        }
    }
    debug!("reload loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> StoreConfig {
        StoreConfig::new(dir.path().join("records.json"))
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        condition()
    }

    #[test]
    fn test_open_creates_empty_file() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(test_config(&dir)).unwrap();

        assert_eq!(store.count(), 0);
        assert!(store.path().exists());
    }

    #[test]
    fn test_add_and_get() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(test_config(&dir)).unwrap();

        let record = store.add(&1.0).unwrap();
        assert_eq!(record.id, "0000000000000001");
        assert_eq!(record.data, json!(1.0));
        assert_eq!(store.count(), 1);

        let fetched = store.get(&record.id).unwrap();
        assert_eq!(fetched.id, record.id);
        assert_eq!(fetched.data, record.data);
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn test_records_keep_insertion_order() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(test_config(&dir)).unwrap();

        store.add("a").unwrap();
        store.add("b").unwrap();
        store.add("c").unwrap();

        let data: Vec<Value> = store.records().into_iter().map(|r| r.data).collect();
        assert_eq!(data, vec![json!("a"), json!("b"), json!("c")]);
    }

    #[test]
    fn test_reload_replaces_rather_than_merges() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(test_config(&dir)).unwrap();
        store.add("a").unwrap();
        store.add("b").unwrap();

        std::fs::write(
            store.path(),
            r#"[{"id": "0000000000000009", "data": "external"}]"#,
        )
        .unwrap();
        store.reload().unwrap();

        assert_eq!(store.count(), 1);
        assert!(store.get("0000000000000001").is_none());
        assert_eq!(store.get("0000000000000009").unwrap().data, json!("external"));

        let next = store.add("c").unwrap();
        assert_eq!(next.id, "000000000000000a");
    }

    #[test]
    fn test_reload_keeps_state_on_duplicate_ids() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(test_config(&dir)).unwrap();
        store.add("a").unwrap();

        std::fs::write(
            store.path(),
            r#"[{"id": "x", "data": 1}, {"id": "x", "data": 2}]"#,
        )
        .unwrap();

        assert!(matches!(store.reload(), Err(StoreError::Corruption(_))));
        assert_eq!(store.count(), 1);
        assert!(store.get("0000000000000001").is_some());
    }

    #[test]
    fn test_close_is_idempotent_and_blocks_reload() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(test_config(&dir)).unwrap();

        store.close();
        store.close();
        assert!(store.is_closed());
        assert!(matches!(store.reload(), Err(StoreError::Closed)));
    }

    #[test]
    fn test_reload_signal_drives_reload() {
        let dir = TempDir::new().unwrap();
        let signal = Signal::new();
        let reader =
            FileStore::open(test_config(&dir).with_reload_signal(signal.clone())).unwrap();
        let writer = FileStore::open(test_config(&dir)).unwrap();

        writer.add("from writer").unwrap();
        assert_eq!(reader.count(), 0);

        signal.notify();
        assert!(wait_for(|| reader.count() == 1));
    }

    #[test]
    fn test_reload_loop_survives_bad_file() {
        let dir = TempDir::new().unwrap();
        let signal = Signal::new();
        let store =
            FileStore::open(test_config(&dir).with_reload_signal(signal.clone())).unwrap();

        std::fs::write(store.path(), "not json").unwrap();
        signal.notify();
        // Wait until the loop has consumed the signal and failed.
        assert!(wait_for(|| !signal.is_pending()));
        thread::sleep(Duration::from_millis(50));

        std::fs::write(store.path(), r#"[{"id": "1", "data": true}]"#).unwrap();
        signal.notify();
        assert!(wait_for(|| store.count() == 1));
    }

    #[test]
    fn test_close_raises_final_signal() {
        let dir = TempDir::new().unwrap();
        let signal = Signal::new();
        let store =
            FileStore::open(test_config(&dir).with_reload_signal(signal.clone())).unwrap();

        store.close();
        // The loop consumes the final signal and exits; nothing is left pending.
        assert!(wait_for(|| !signal.is_pending()));
    }

    #[test]
    fn test_unimplemented_operations() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(test_config(&dir)).unwrap();
        let record = store.add("a").unwrap();

        assert!(matches!(
            store.update(&record.id, "b"),
            Err(StoreError::Unimplemented("update"))
        ));
        assert!(matches!(
            store.delete(&record.id),
            Err(StoreError::Unimplemented("delete"))
        ));
        assert!(matches!(
            store.find(&Map::new()),
            Err(StoreError::Unimplemented("find"))
        ));
        assert_eq!(store.count(), 1);
    }
}
