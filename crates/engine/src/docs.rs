//! Authoritative document table.
//!
//! The document store is the source of truth for persistence: every record
//! carries its embedding and attributes so snapshots and WAL replay can
//! rebuild the heap, the attribute columns, and the proximity graph without
//! consulting any other structure.

use std::collections::BTreeMap;

use cairn_core::{AttrValue, Error, Result, VectorId};
use serde::{Deserialize, Serialize};

/// A stored document record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Internal vector identity
    pub vector_id: VectorId,
    /// Embedding (authoritative copy; the heap mirrors it for search)
    pub embedding: Vec<f32>,
    /// Declared attribute values
    pub attributes: BTreeMap<String, AttrValue>,
    /// Opaque content/tags blob
    pub payload: Option<serde_json::Value>,
    /// Creation timestamp (microseconds since epoch)
    pub created_at: u64,
    /// Last update timestamp (microseconds since epoch)
    pub updated_at: u64,
}

/// Key -> record table with a reverse VectorId index
#[derive(Default)]
pub struct DocumentStore {
    records: BTreeMap<String, DocumentRecord>,
    /// VectorId -> document id, maintained alongside `records`
    by_vector: BTreeMap<VectorId, String>,
}

impl DocumentStore {
    /// Create an empty store
    pub fn new() -> Self {
        DocumentStore::default()
    }

    /// Number of documents
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Check if a document exists
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Get a record by document id
    pub fn get(&self, id: &str) -> Option<&DocumentRecord> {
        self.records.get(id)
    }

    /// Resolve a VectorId back to its document id
    pub fn id_for_vector(&self, vector_id: VectorId) -> Option<&str> {
        self.by_vector.get(&vector_id).map(String::as_str)
    }

    /// Insert or replace a record
    pub fn put(&mut self, id: String, record: DocumentRecord) {
        let vector_id = record.vector_id;
        if let Some(old) = self.records.insert(id.clone(), record) {
            self.by_vector.remove(&old.vector_id);
        }
        self.by_vector.insert(vector_id, id);
    }

    /// Remove a record, returning it if present
    pub fn remove(&mut self, id: &str) -> Option<DocumentRecord> {
        let record = self.records.remove(id)?;
        self.by_vector.remove(&record.vector_id);
        Some(record)
    }

    /// Drop all records
    pub fn clear(&mut self) {
        self.records.clear();
        self.by_vector.clear();
    }

    /// Iterate records in ascending document-id order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &DocumentRecord)> {
        self.records.iter()
    }

    /// Look up embeddings for a batch of ids.
    ///
    /// Fails fast with `DocumentNotFound` on the first missing id; nothing
    /// is returned for a partially-present batch.
    pub fn fill_embedding(&self, ids: &[&str]) -> Result<BTreeMap<String, Vec<f32>>> {
        let mut out = BTreeMap::new();
        for &id in ids {
            let record = self.records.get(id).ok_or_else(|| Error::DocumentNotFound {
                id: id.to_string(),
            })?;
            out.insert(id.to_string(), record.embedding.clone());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(vector_id: u64, embedding: Vec<f32>) -> DocumentRecord {
        DocumentRecord {
            vector_id: VectorId::new(vector_id),
            embedding,
            attributes: BTreeMap::new(),
            payload: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_put_get_remove() {
        let mut store = DocumentStore::new();
        store.put("doc1".to_string(), record(1, vec![0.1, 0.2]));

        assert!(store.contains("doc1"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("doc1").unwrap().embedding, vec![0.1, 0.2]);
        assert_eq!(store.id_for_vector(VectorId::new(1)), Some("doc1"));

        let removed = store.remove("doc1").unwrap();
        assert_eq!(removed.vector_id, VectorId::new(1));
        assert!(store.is_empty());
        assert_eq!(store.id_for_vector(VectorId::new(1)), None);
    }

    #[test]
    fn test_put_replaces_and_reindexes() {
        let mut store = DocumentStore::new();
        store.put("doc1".to_string(), record(1, vec![0.1]));
        store.put("doc1".to_string(), record(1, vec![0.9]));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("doc1").unwrap().embedding, vec![0.9]);
        assert_eq!(store.id_for_vector(VectorId::new(1)), Some("doc1"));
    }

    #[test]
    fn test_fill_embedding_all_present() {
        let mut store = DocumentStore::new();
        store.put("a".to_string(), record(1, vec![1.0]));
        store.put("b".to_string(), record(2, vec![2.0]));

        let out = store.fill_embedding(&["a", "b"]).unwrap();
        assert_eq!(out["a"], vec![1.0]);
        assert_eq!(out["b"], vec![2.0]);
    }

    #[test]
    fn test_fill_embedding_fails_fast_on_missing() {
        let mut store = DocumentStore::new();
        store.put("a".to_string(), record(1, vec![1.0]));

        let result = store.fill_embedding(&["a", "b"]);
        assert!(matches!(
            result,
            Err(Error::DocumentNotFound { id }) if id == "b"
        ));
    }

    #[test]
    fn test_iteration_order_is_by_document_id() {
        let mut store = DocumentStore::new();
        store.put("c".to_string(), record(1, vec![1.0]));
        store.put("a".to_string(), record(2, vec![2.0]));
        store.put("b".to_string(), record(3, vec![3.0]));

        let ids: Vec<&str> = store.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
