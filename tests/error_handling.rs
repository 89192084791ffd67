//! Error handling and edge case tests.

use record_file::{
    ChangeSource, FileStore, Format, IdGenerator, Operations, PayloadKind, Signal, StoreConfig,
    StoreError,
};
use std::path::Path;
use tempfile::TempDir;

fn test_config(dir: &TempDir) -> StoreConfig {
    StoreConfig::new(dir.path().join("records.json"))
}

/// Always hands out the same id.
#[derive(Debug)]
struct StuckGenerator;

impl IdGenerator for StuckGenerator {
    fn generate(&self) -> record_file::Result<String> {
        Ok("same".to_string())
    }

    fn mark_used(&self, _id: &str) {}
}

/// Source whose paths can never be watched.
struct Unwatchable;

impl ChangeSource for Unwatchable {
    fn subscribe(&self, path: &Path, _operations: Operations) -> record_file::Result<Signal> {
        Err(StoreError::Unwatchable {
            path: path.to_path_buf(),
            source: notify::Error::path_not_found(),
        })
    }
}

// --- Configuration Errors ---

#[test]
fn test_unknown_format_string() {
    let result = "csv".parse::<Format>();
    assert!(matches!(result, Err(StoreError::UnknownFormat(_))));
}

#[test]
fn test_xml_format_fails_construction() {
    let dir = TempDir::new().unwrap();
    let result = FileStore::open(test_config(&dir).with_format(Format::Xml));

    assert!(matches!(result, Err(StoreError::Unimplemented(_))));
    assert!(!dir.path().join("records.json").exists());
}

#[test]
fn test_type_mismatch_leaves_store_untouched() {
    let dir = TempDir::new().unwrap();
    let store =
        FileStore::open(test_config(&dir).with_payload_kind(PayloadKind::Number)).unwrap();

    let err = store.add("not a number").unwrap_err();
    match err {
        StoreError::TypeMismatch { expected, got } => {
            assert_eq!(expected, "number");
            assert_eq!(got, "string");
        }
        other => panic!("Expected TypeMismatch, got {:?}", other),
    }
    assert_eq!(store.count(), 0);
}

// --- Persistence Errors ---

#[test]
fn test_corrupt_file_fails_construction() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("records.json"), "{ this is not a record list").unwrap();

    let result = FileStore::open(test_config(&dir));
    match result {
        Err(err @ StoreError::Decode { .. }) => assert!(err.is_persistence()),
        Err(other) => panic!("Expected Decode error, got {:?}", other),
        Ok(_) => panic!("Expected Decode error, got a store"),
    }
}

#[test]
fn test_missing_directory_fails_construction() {
    let dir = TempDir::new().unwrap();
    let result = FileStore::open(StoreConfig::new(dir.path().join("nope").join("records.json")));

    assert!(matches!(result, Err(StoreError::Persistence { .. })));
}

#[test]
fn test_whitespace_file_is_empty_store() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("records.json"), "\n  \n").unwrap();

    let store = FileStore::open(test_config(&dir)).unwrap();
    assert_eq!(store.count(), 0);
}

#[test]
fn test_write_failure_keeps_record_in_memory() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::open(test_config(&dir)).unwrap();
    let path = store.path().to_path_buf();

    // A directory where the file was: creating the file fails for every user.
    std::fs::remove_file(&path).unwrap();
    std::fs::create_dir(&path).unwrap();

    let result = store.add("unsaved");
    assert!(matches!(
        result,
        Err(StoreError::Persistence { operation: "create", .. })
    ));
    assert_eq!(store.count(), 1);
    assert_eq!(store.records()[0].data, "unsaved");
}

// --- Generator Conflicts ---

#[test]
fn test_duplicate_generated_id_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::open(
        test_config(&dir).with_id_generator(std::sync::Arc::new(StuckGenerator)),
    )
    .unwrap();

    let first = store.add("first").unwrap();
    assert_eq!(first.id, "same");

    let result = store.add("second");
    assert!(matches!(result, Err(StoreError::DuplicateId(ref id)) if id == "same"));
    assert_eq!(store.count(), 1);
    assert_eq!(store.get("same").unwrap().data, "first");
}

#[test]
fn test_exhausted_generator_fails_add() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("records.json"),
        r#"[{"id": "ffffffffffffffff", "data": 1}]"#,
    )
    .unwrap();

    let store = FileStore::open(test_config(&dir)).unwrap();
    let result = store.add(&2);

    assert!(matches!(result, Err(StoreError::GeneratorExhausted(_))));
    assert_eq!(store.count(), 1);
    assert!(store.get("ffffffffffffffff").is_some());
}

// --- Lifecycle ---

#[test]
fn test_reload_after_close() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::open(test_config(&dir)).unwrap();
    store.close();

    assert!(matches!(store.reload(), Err(StoreError::Closed)));
}

#[test]
fn test_unwatchable_path_fails_construction() {
    let dir = TempDir::new().unwrap();
    let result = FileStore::open_watched(test_config(&dir), &Unwatchable, Operations::WRITE);

    assert!(matches!(result, Err(StoreError::Unwatchable { .. })));
}
