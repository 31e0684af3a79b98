//! Persistence and recovery tests: WAL replay, snapshot checkpointing, torn
//! tails, exclusive locking, and config validation across reopen.

use cairndb::{
    AttrValue, ColumnType, DistanceMetric, Document, EngineConfig, Error, Predicate, VectorEngine,
};
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn config() -> EngineConfig {
    EngineConfig::new(2, DistanceMetric::Euclidean)
        .unwrap()
        .with_column("price", ColumnType::Float)
}

fn open(path: &Path) -> VectorEngine {
    VectorEngine::open(path, config()).unwrap()
}

fn seed_documents(engine: &VectorEngine) {
    engine
        .insert(&[
            Document::new("a", vec![1.0, 3.0])
                .with_attribute("price", 1i64)
                .with_payload(json!({"text": "alpha"})),
            Document::new("b", vec![1.0, 1.0]).with_attribute("price", 2i64),
            Document::new("c", vec![3.0, 1.0]).with_attribute("price", 3i64),
        ])
        .unwrap();
}

#[test]
fn test_wal_roundtrip_without_checkpoint() {
    init_logging();
    let dir = TempDir::new().unwrap();

    {
        let engine = open(dir.path());
        seed_documents(&engine);
        // Dropped without close(): durability comes from the WAL alone
    }

    let engine = open(dir.path());
    assert_eq!(engine.len(), 3);

    let a = engine.get("a").unwrap();
    assert_eq!(a.embedding, vec![1.0, 3.0]);
    assert_eq!(a.attributes["price"], AttrValue::Float(1.0));
    assert_eq!(a.payload, Some(json!({"text": "alpha"})));

    // Search behaves like a freshly built index
    let hits = engine.search(&[1.0, 1.0], 1, None).unwrap();
    assert_eq!(hits[0].id, "b");
}

#[test]
fn test_snapshot_roundtrip_through_close() {
    init_logging();
    let dir = TempDir::new().unwrap();

    {
        let engine = open(dir.path());
        seed_documents(&engine);
        engine.close().unwrap();
    }

    let engine = open(dir.path());
    assert_eq!(engine.len(), 3);
    assert_eq!(engine.recovery_stats().snapshot_records, 3);
    assert_eq!(engine.recovery_stats().wal_entries_applied, 0);

    let b = engine.get("b").unwrap();
    assert_eq!(b.embedding, vec![1.0, 1.0]);
}

#[test]
fn test_delete_survives_restart() {
    init_logging();
    let dir = TempDir::new().unwrap();

    {
        let engine = open(dir.path());
        seed_documents(&engine);
        engine.delete(&["b"]).unwrap();
    }

    let engine = open(dir.path());
    assert_eq!(engine.len(), 2);
    assert!(engine.get("b").is_none());

    // No resurrection through search either
    let hits = engine.search(&[1.0, 1.0], 10, None).unwrap();
    assert!(hits.iter().all(|h| h.id != "b"));
    // Recovery rebuild reclaims tombstones
    assert_eq!(engine.status().deleted, 0);
}

#[test]
fn test_update_and_payload_preserved_across_restart() {
    init_logging();
    let dir = TempDir::new().unwrap();

    {
        let engine = open(dir.path());
        seed_documents(&engine);
        // Update embedding only; payload must survive the restart too
        engine
            .update(&[Document::new("a", vec![9.0, 9.0])])
            .unwrap();
    }

    let engine = open(dir.path());
    let a = engine.get("a").unwrap();
    assert_eq!(a.embedding, vec![9.0, 9.0]);
    assert_eq!(a.payload, Some(json!({"text": "alpha"})));
    assert_eq!(a.attributes["price"], AttrValue::Float(1.0));
}

#[test]
fn test_clear_survives_restart() {
    init_logging();
    let dir = TempDir::new().unwrap();

    {
        let engine = open(dir.path());
        seed_documents(&engine);
        engine.clear().unwrap();
        engine
            .insert(&[Document::new("after", vec![5.0, 5.0])])
            .unwrap();
    }

    let engine = open(dir.path());
    assert_eq!(engine.len(), 1);
    assert!(engine.get("after").is_some());
    assert!(engine.get("a").is_none());
}

#[test]
fn test_torn_wal_tail_discards_only_last_entry() {
    init_logging();
    let dir = TempDir::new().unwrap();

    {
        let engine = open(dir.path());
        engine
            .insert(&[Document::new("first", vec![1.0, 1.0])])
            .unwrap();
        engine
            .insert(&[Document::new("second", vec![2.0, 2.0])])
            .unwrap();
    }

    // Simulate a crash mid-write by chopping bytes off the WAL tail
    let wal_path = dir.path().join("wal.bin");
    let data = std::fs::read(&wal_path).unwrap();
    std::fs::write(&wal_path, &data[..data.len() - 5]).unwrap();

    let engine = open(dir.path());
    assert!(engine.recovery_stats().wal_tail_discarded);
    assert_eq!(engine.len(), 1);
    assert!(engine.get("first").is_some());
    assert!(engine.get("second").is_none());

    // The engine keeps working after discarding the torn tail
    engine
        .insert(&[Document::new("third", vec![3.0, 3.0])])
        .unwrap();
    assert_eq!(engine.len(), 2);
}

#[test]
fn test_corrupt_snapshot_fails_open() {
    init_logging();
    let dir = TempDir::new().unwrap();

    {
        let engine = open(dir.path());
        seed_documents(&engine);
        engine.close().unwrap();
    }

    let snapshot_path = dir.path().join("snapshot.bin");
    let mut data = std::fs::read(&snapshot_path).unwrap();
    data[0] ^= 0xFF;
    std::fs::write(&snapshot_path, &data).unwrap();

    assert!(matches!(
        VectorEngine::open(dir.path(), config()),
        Err(Error::Corruption(_))
    ));
}

#[test]
fn test_storage_location_is_exclusive() {
    init_logging();
    let dir = TempDir::new().unwrap();

    let held = open(dir.path());
    assert!(matches!(
        VectorEngine::open(dir.path(), config()),
        Err(Error::StorageLocked { .. })
    ));

    // Released on drop
    drop(held);
    assert!(VectorEngine::open(dir.path(), config()).is_ok());
}

#[test]
fn test_reopen_with_mismatched_config_fails() {
    init_logging();
    let dir = TempDir::new().unwrap();
    {
        let _engine = open(dir.path());
    }

    // Different dimension
    let wrong_dim = EngineConfig::new(3, DistanceMetric::Euclidean).unwrap();
    assert!(matches!(
        VectorEngine::open(dir.path(), wrong_dim),
        Err(Error::ConfigMismatch(_))
    ));

    // Different metric
    let wrong_metric = EngineConfig::new(2, DistanceMetric::Cosine)
        .unwrap()
        .with_column("price", ColumnType::Float);
    assert!(matches!(
        VectorEngine::open(dir.path(), wrong_metric),
        Err(Error::ConfigMismatch(_))
    ));
}

#[test]
fn test_reopen_with_extended_schema() {
    init_logging();
    let dir = TempDir::new().unwrap();

    {
        let engine = open(dir.path());
        seed_documents(&engine);
    }

    // Adding a column is allowed; existing documents simply lack values
    let extended = config().with_column("category", ColumnType::Str);
    let engine = VectorEngine::open(dir.path(), extended).unwrap();
    assert_eq!(engine.len(), 3);

    engine
        .insert(&[Document::new("d", vec![4.0, 4.0])
            .with_attribute("price", 4i64)
            .with_attribute("category", "new")])
        .unwrap();

    let predicate = Predicate::from_json(&json!({"category": {"$eq": "new"}})).unwrap();
    let matches = engine.filter(&predicate).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].id, "d");

    // Retyping the column is still rejected
    drop(engine);
    let retyped = config().with_column("category", ColumnType::Int);
    assert!(matches!(
        VectorEngine::open(dir.path(), retyped),
        Err(Error::ConfigMismatch(_))
    ));
}

#[test]
fn test_vector_ids_not_reused_after_restart() {
    init_logging();
    let dir = TempDir::new().unwrap();

    {
        let engine = open(dir.path());
        seed_documents(&engine);
        engine.delete(&["a", "b", "c"]).unwrap();
    }

    // All documents are gone, but the id counter must not rewind: inserting
    // new documents after reopen may not collide with any historical id.
    let engine = open(dir.path());
    assert_eq!(engine.len(), 0);
    engine
        .insert(&[Document::new("fresh", vec![7.0, 7.0])])
        .unwrap();
    assert_eq!(engine.len(), 1);
    assert_eq!(engine.search(&[7.0, 7.0], 1, None).unwrap()[0].id, "fresh");
}

#[test]
fn test_many_documents_roundtrip() {
    init_logging();
    let dir = TempDir::new().unwrap();

    let docs: Vec<Document> = (0..100)
        .map(|i| {
            Document::new(format!("doc{i:03}"), vec![i as f32, (i * i % 97) as f32])
                .with_attribute("price", i as i64)
        })
        .collect();

    {
        let engine = open(dir.path());
        engine.insert(&docs).unwrap();
        engine.close().unwrap();
    }

    let engine = open(dir.path());
    assert_eq!(engine.len(), 100);
    for doc in &docs {
        let stored = engine.get(&doc.id).unwrap();
        assert_eq!(stored.embedding, doc.embedding, "document {}", doc.id);
    }
}
