//! VectorEngine: the vector store facade.
//!
//! An explicitly-owned engine instance scoped to one storage directory and
//! one collection. All state lives behind a single `RwLock`: mutating
//! operations take the write lock (giving a total order per document id),
//! while search, get, filter, and status take the read lock and may run
//! concurrently with each other.
//!
//! Durability ordering: every mutation is appended to the WAL and fsynced
//! *before* the in-memory structures are touched, so a completed call
//! survives a crash and a failed WAL append leaves memory untouched.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use cairn_core::{
    validate_document_id, Document, EngineConfig, EngineStatus, Error, InsertReport, Predicate,
    RejectedDocument, Result, SearchHit, UpdateReport,
};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::attrs::AttributeStore;
use crate::docs::{DocumentRecord, DocumentStore};
use crate::index::{display_score, GraphParams, HnswGraph, VectorHeap};
use crate::recovery::{self, RecoveryStats};
use crate::snapshot::{self, SnapshotBody};
use crate::wal::{now_micros, WalEntry, WalWriter};

/// In-memory engine state, guarded by the engine's RwLock
struct EngineInner {
    docs: DocumentStore,
    attrs: AttributeStore,
    heap: VectorHeap,
    graph: HnswGraph,
}

/// Embedded vector store engine for a single collection.
///
/// Open with [`VectorEngine::open`]; the storage directory is exclusively
/// owned until the engine is dropped or closed. The engine is `Send + Sync`
/// and can be shared across threads behind an `Arc`.
pub struct VectorEngine {
    config: EngineConfig,
    inner: RwLock<EngineInner>,
    wal: WalWriter,
    path: PathBuf,
    stats: RecoveryStats,
    /// Advisory lock on the storage directory; released on drop
    _lock: fs::File,
}

impl VectorEngine {
    /// Open (or create) the collection rooted at `path`.
    ///
    /// On first open the configuration is persisted in the manifest. On
    /// reopen the supplied configuration must match the persisted one; the
    /// only permitted difference is extending the attribute schema.
    ///
    /// # Errors
    /// - `StorageLocked` if another engine instance holds the directory
    /// - `ConfigMismatch` if the supplied config disagrees with the manifest
    /// - `Corruption` if the snapshot fails its integrity check
    pub fn open(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        let lock = recovery::acquire_lock(&path)?;

        let recovered = recovery::recover(&path, &config)?;
        let config = recovered.config;

        let mut docs = DocumentStore::new();
        let mut attrs = AttributeStore::new(&config.columns);
        let mut heap = VectorHeap::new(config.dimension);
        let mut graph = HnswGraph::new(config.metric, GraphParams::from_config(&config));

        // Load records in VectorId order so the graph rebuild is
        // deterministic across restarts.
        let mut records: Vec<(String, DocumentRecord)> = recovered.records.into_iter().collect();
        records.sort_by_key(|(_, record)| record.vector_id);

        for (id, record) in records {
            heap.insert_with_id(record.vector_id, &record.embedding)?;
            if let Err(e) = attrs.set(record.vector_id, &record.attributes) {
                tracing::warn!(
                    target: "cairn::engine",
                    id = %id,
                    error = %e,
                    "dropping undecodable attributes for recovered document"
                );
            }
            docs.put(id, record);
        }
        heap.restore_next_id(recovered.next_vector_id);
        graph.rebuild(&heap);

        let wal = WalWriter::open(&path)?;

        info!(
            target: "cairn::engine",
            path = %path.display(),
            documents = docs.len(),
            dimension = config.dimension,
            metric = %config.metric,
            "engine opened"
        );

        let engine = VectorEngine {
            config,
            inner: RwLock::new(EngineInner {
                docs,
                attrs,
                heap,
                graph,
            }),
            wal,
            path,
            stats: recovered.stats,
            _lock: lock,
        };

        // Consolidate recovery into a snapshot and start from an empty WAL.
        // This also clears any torn tail left by a crash, so new appends
        // never land after corrupt bytes.
        engine.checkpoint()?;

        Ok(engine)
    }

    /// The effective collection configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// What the last open observed while recovering
    pub fn recovery_stats(&self) -> &RecoveryStats {
        &self.stats
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.inner.read().docs.len()
    }

    /// Check if the collection is empty
    pub fn is_empty(&self) -> bool {
        self.inner.read().docs.is_empty()
    }

    /// Check if a document exists
    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().docs.contains(id)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Insert a batch of documents (upsert by id).
    ///
    /// Each record is validated independently; a rejected record (bad id,
    /// wrong dimension, non-finite values, undeclared or mistyped
    /// attributes) is reported and never aborts the rest of the batch.
    /// Overwriting an existing id keeps its internal identity and preserves
    /// fields the new document omits (payload, attributes).
    pub fn insert(&self, documents: &[Document]) -> Result<InsertReport> {
        let mut report = InsertReport::default();
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        for doc in documents {
            if let Err(reason) = self.validate_document(doc, &inner.attrs) {
                report.rejected.push(RejectedDocument {
                    id: doc.id.clone(),
                    reason,
                });
                continue;
            }
            self.apply_upsert(inner, doc)?;
            report.inserted += 1;
        }

        debug!(
            target: "cairn::engine",
            inserted = report.inserted,
            rejected = report.rejected.len(),
            "insert batch applied"
        );
        Ok(report)
    }

    /// Update existing documents. Strictly non-upsert: ids that are absent
    /// are reported in the result and never inserted.
    ///
    /// Validation errors (dimension, attribute types) abort the whole batch
    /// before anything is applied; not-found ids never do.
    pub fn update(&self, documents: &[Document]) -> Result<UpdateReport> {
        let mut report = UpdateReport::default();
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        // Fail fast on config errors before applying anything
        for doc in documents {
            if inner.docs.contains(&doc.id) {
                self.validate_document(doc, &inner.attrs)?;
            }
        }

        for doc in documents {
            if inner.docs.contains(&doc.id) {
                self.apply_upsert(inner, doc)?;
                report.updated += 1;
            } else {
                debug!(
                    target: "cairn::engine",
                    id = %doc.id,
                    "cannot update document, it does not exist in storage"
                );
                report.missing.push(doc.id.clone());
            }
        }

        Ok(report)
    }

    /// Delete documents by id. Unknown ids are silently ignored.
    ///
    /// Returns the number of documents removed. From the moment this call
    /// returns, no search result can contain a deleted id.
    pub fn delete(&self, ids: &[&str]) -> Result<usize> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let mut removed = 0;

        for &id in ids {
            let Some(record) = inner.docs.get(id) else {
                continue;
            };
            let vector_id = record.vector_id;

            self.wal.append(&WalEntry::Delete {
                id: id.to_string(),
                vector_id: vector_id.as_u64(),
                timestamp: now_micros(),
            })?;

            inner.docs.remove(id);
            inner.attrs.remove(vector_id);
            inner.heap.delete(vector_id);
            inner.graph.delete(vector_id);
            removed += 1;
        }

        debug!(target: "cairn::engine", removed, "documents deleted");
        Ok(removed)
    }

    /// Drop every document, keeping the configuration. Idempotent.
    pub fn clear(&self) -> Result<()> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        self.wal.append(&WalEntry::Clear {
            timestamp: now_micros(),
        })?;

        inner.docs.clear();
        inner.attrs.clear();
        inner.heap.clear();
        inner.graph.clear();

        info!(target: "cairn::engine", "collection cleared");
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Approximate k-nearest-neighbor search.
    ///
    /// Scores are metric-native: ascending euclidean distance, descending
    /// cosine/dot-product similarity. Ties break by ascending document id.
    /// With a filter, non-matching documents are excluded from results (the
    /// traversal may still pass through them) and the beam widens
    /// adaptively when the filter is selective. Fewer than `k` results is
    /// not an error; an empty collection or `k == 0` yields an empty list.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&Predicate>,
    ) -> Result<Vec<SearchHit>> {
        if query.len() != self.config.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.config.dimension,
                got: query.len(),
            });
        }

        // Predicate problems are config errors and surface even when the
        // collection is empty or k is 0.
        if let Some(predicate) = filter {
            predicate.check_schema(&self.config)?;
        }

        let inner = self.inner.read();
        if k == 0 || inner.docs.is_empty() {
            return Ok(Vec::new());
        }

        let admit = match filter {
            Some(predicate) if !predicate.is_empty() => {
                let matching = inner.attrs.evaluate(predicate)?;
                if matching.is_empty() {
                    return Ok(Vec::new());
                }
                Some(matching)
            }
            _ => None,
        };

        let live = inner.graph.live_len();
        if live == 0 {
            return Ok(Vec::new());
        }

        // A selective filter can starve the beam; widen ef until the target
        // is met or the beam covers every live node.
        let target = admit.as_ref().map_or(k.min(live), |set| k.min(set.len()));
        let mut ef = self.config.ef_search.max(k);
        let results = loop {
            let results = inner.graph.search(query, k, ef, &inner.heap, admit.as_ref());
            if results.len() >= target || ef >= live {
                break results;
            }
            debug!(
                target: "cairn::engine",
                ef,
                found = results.len(),
                target,
                "widening filtered search beam"
            );
            ef = ef.saturating_mul(2);
        };

        let mut scored: Vec<(f32, SearchHit)> = Vec::with_capacity(results.len());
        for (vector_id, internal) in results {
            let Some(doc_id) = inner.docs.id_for_vector(vector_id) else {
                continue;
            };
            let Some(record) = inner.docs.get(doc_id) else {
                continue;
            };
            scored.push((
                internal,
                SearchHit {
                    id: doc_id.to_string(),
                    score: display_score(internal, self.config.metric),
                    document: document_from_record(doc_id, record),
                },
            ));
        }

        // Final ordering at the API edge: best score first, ties by
        // ascending document id.
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });

        Ok(scored.into_iter().map(|(_, hit)| hit).collect())
    }

    /// Get a document by id
    pub fn get(&self, id: &str) -> Option<Document> {
        let inner = self.inner.read();
        inner
            .docs
            .get(id)
            .map(|record| document_from_record(id, record))
    }

    /// Look up embeddings for a batch of ids.
    ///
    /// Fails fast with `DocumentNotFound` on the first missing id.
    pub fn fill_embedding(&self, ids: &[&str]) -> Result<BTreeMap<String, Vec<f32>>> {
        self.inner.read().docs.fill_embedding(ids)
    }

    /// Exact attribute filtering, independent of any similarity query.
    ///
    /// Returns matching documents ordered by document id. A predicate
    /// referencing an undeclared column is rejected; a predicate matching
    /// nothing returns an empty list.
    pub fn filter(&self, predicate: &Predicate) -> Result<Vec<Document>> {
        predicate.check_schema(&self.config)?;

        let inner = self.inner.read();
        let matching = inner.attrs.evaluate(predicate)?;

        let mut ids: Vec<&str> = matching
            .iter()
            .filter_map(|&vector_id| inner.docs.id_for_vector(vector_id))
            .collect();
        ids.sort_unstable();

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = inner.docs.get(id) {
                out.push(document_from_record(id, record));
            }
        }
        Ok(out)
    }

    /// Observability counters
    pub fn status(&self) -> EngineStatus {
        let inner = self.inner.read();
        EngineStatus {
            total: inner.docs.len(),
            live: inner.graph.live_len(),
            deleted: inner.graph.deleted_len(),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Checkpoint: write a snapshot of the current state and truncate the
    /// WAL. Concurrent reads proceed; writers wait.
    pub fn checkpoint(&self) -> Result<()> {
        let inner = self.inner.read();
        let body = SnapshotBody {
            next_vector_id: inner.heap.next_id_value(),
            records: inner
                .docs
                .iter()
                .map(|(id, record)| (id.clone(), record.clone()))
                .collect(),
        };
        snapshot::write_snapshot(&self.path, &body)?;
        self.wal.truncate()?;

        info!(
            target: "cairn::engine",
            records = body.records.len(),
            "checkpoint complete"
        );
        Ok(())
    }

    /// Checkpoint and release the storage directory.
    ///
    /// Dropping the engine without closing is safe: the WAL alone is
    /// sufficient for recovery, closing just makes the next open faster.
    pub fn close(self) -> Result<()> {
        self.checkpoint()
    }

    // ========================================================================
    // Internal
    // ========================================================================

    /// Per-record validation shared by insert and update
    fn validate_document(&self, doc: &Document, attrs: &AttributeStore) -> Result<()> {
        validate_document_id(&doc.id)?;
        if doc.embedding.len() != self.config.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.config.dimension,
                got: doc.embedding.len(),
            });
        }
        if doc.embedding.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidEmbedding {
                reason: "embedding contains NaN or infinite values".to_string(),
            });
        }
        attrs.validate(&doc.attributes)?;
        Ok(())
    }

    /// Write one document durably and apply it to the in-memory stores.
    ///
    /// An existing document keeps its VectorId; fields the new document
    /// omits (payload, attributes) are carried over from the stored record.
    fn apply_upsert(&self, inner: &mut EngineInner, doc: &Document) -> Result<()> {
        let now = now_micros();

        let (vector_id, created_at, payload, attributes) = match inner.docs.get(&doc.id) {
            Some(prev) => (
                prev.vector_id,
                prev.created_at,
                doc.payload.clone().or_else(|| prev.payload.clone()),
                if doc.attributes.is_empty() {
                    prev.attributes.clone()
                } else {
                    doc.attributes.clone()
                },
            ),
            None => (
                inner.heap.allocate_id(),
                now,
                doc.payload.clone(),
                doc.attributes.clone(),
            ),
        };

        let record = DocumentRecord {
            vector_id,
            embedding: doc.embedding.clone(),
            attributes,
            payload,
            created_at,
            updated_at: now,
        };

        // Durability before the in-memory update: if the append fails,
        // nothing has changed.
        self.wal.append(&WalEntry::Upsert {
            id: doc.id.clone(),
            vector_id: vector_id.as_u64(),
            embedding: record.embedding.clone(),
            attributes: record.attributes.clone(),
            payload: record.payload.clone(),
            timestamp: now,
        })?;

        if inner.docs.contains(&doc.id) {
            // A query sees either the old node or the new one, never both;
            // the write lock is held across the whole swap.
            inner.graph.remove_node(vector_id);
        }
        inner.heap.upsert(vector_id, &record.embedding)?;
        inner.graph.insert(vector_id, &record.embedding, &inner.heap);
        inner.attrs.set(vector_id, &record.attributes)?;
        inner.docs.put(doc.id.clone(), record);

        Ok(())
    }
}

/// Assemble the caller-facing document from a stored record
fn document_from_record(id: &str, record: &DocumentRecord) -> Document {
    Document {
        id: id.to_string(),
        embedding: record.embedding.clone(),
        attributes: record.attributes.clone(),
        payload: record.payload.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::{AttrValue, ColumnType, DistanceMetric};
    use serde_json::json;

    fn open_engine(dir: &Path) -> VectorEngine {
        let config = EngineConfig::new(2, DistanceMetric::Euclidean)
            .unwrap()
            .with_column("price", ColumnType::Float);
        VectorEngine::open(dir, config).unwrap()
    }

    #[test]
    fn test_insert_and_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open_engine(dir.path());

        let doc = Document::new("doc1", vec![1.0, 2.0])
            .with_attribute("price", 9.5f64)
            .with_payload(json!({"text": "hello"}));
        let report = engine.insert(&[doc.clone()]).unwrap();
        assert_eq!(report.inserted, 1);
        assert!(report.rejected.is_empty());

        let stored = engine.get("doc1").unwrap();
        assert_eq!(stored.embedding, vec![1.0, 2.0]);
        assert_eq!(stored.attributes["price"], AttrValue::Float(9.5));
        assert_eq!(stored.payload, Some(json!({"text": "hello"})));
    }

    #[test]
    fn test_insert_rejects_wrong_dimension_without_aborting_batch() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open_engine(dir.path());

        let report = engine
            .insert(&[
                Document::new("good", vec![1.0, 1.0]),
                Document::new("bad", vec![1.0, 1.0, 1.0]),
                Document::new("also_good", vec![2.0, 2.0]),
            ])
            .unwrap();

        assert_eq!(report.inserted, 2);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].id, "bad");
        assert!(matches!(
            report.rejected[0].reason,
            Error::DimensionMismatch { expected: 2, got: 3 }
        ));
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn test_insert_rejects_nan_embedding() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open_engine(dir.path());

        let report = engine
            .insert(&[Document::new("nan", vec![f32::NAN, 1.0])])
            .unwrap();
        assert_eq!(report.inserted, 0);
        assert!(matches!(
            report.rejected[0].reason,
            Error::InvalidEmbedding { .. }
        ));
        assert_eq!(engine.len(), 0);
    }

    #[test]
    fn test_upsert_preserves_omitted_payload_and_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open_engine(dir.path());

        engine
            .insert(&[Document::new("doc1", vec![1.0, 1.0])
                .with_attribute("price", 5.0f64)
                .with_payload(json!({"kept": true}))])
            .unwrap();

        // Overwrite with a bare document: payload and attributes survive
        engine
            .insert(&[Document::new("doc1", vec![2.0, 2.0])])
            .unwrap();

        let stored = engine.get("doc1").unwrap();
        assert_eq!(stored.embedding, vec![2.0, 2.0]);
        assert_eq!(stored.attributes["price"], AttrValue::Float(5.0));
        assert_eq!(stored.payload, Some(json!({"kept": true})));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_update_is_not_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open_engine(dir.path());

        engine
            .insert(&[Document::new("present", vec![1.0, 1.0])])
            .unwrap();

        let report = engine
            .update(&[
                Document::new("present", vec![3.0, 3.0]),
                Document::new("absent", vec![4.0, 4.0]),
            ])
            .unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.missing, vec!["absent".to_string()]);
        assert_eq!(engine.len(), 1);
        assert!(!engine.contains("absent"));
        assert_eq!(engine.get("present").unwrap().embedding, vec![3.0, 3.0]);
    }

    #[test]
    fn test_update_validation_aborts_batch_before_applying() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open_engine(dir.path());

        engine
            .insert(&[
                Document::new("a", vec![1.0, 1.0]),
                Document::new("b", vec![2.0, 2.0]),
            ])
            .unwrap();

        let result = engine.update(&[
            Document::new("a", vec![9.0, 9.0]),
            Document::new("b", vec![1.0, 2.0, 3.0]),
        ]);
        assert!(matches!(result, Err(Error::DimensionMismatch { .. })));

        // Nothing was applied
        assert_eq!(engine.get("a").unwrap().embedding, vec![1.0, 1.0]);
    }

    #[test]
    fn test_delete_ignores_unknown_ids() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open_engine(dir.path());

        engine
            .insert(&[Document::new("doc1", vec![1.0, 1.0])])
            .unwrap();
        let removed = engine.delete(&["doc1", "never_existed"]).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(engine.len(), 0);
    }

    #[test]
    fn test_search_query_dimension_checked() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open_engine(dir.path());
        let result = engine.search(&[1.0, 2.0, 3.0], 5, None);
        assert!(matches!(result, Err(Error::DimensionMismatch { .. })));
    }

    #[test]
    fn test_search_empty_and_k_zero() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open_engine(dir.path());
        assert!(engine.search(&[1.0, 1.0], 5, None).unwrap().is_empty());

        engine
            .insert(&[Document::new("doc1", vec![1.0, 1.0])])
            .unwrap();
        assert!(engine.search(&[1.0, 1.0], 0, None).unwrap().is_empty());
    }

    #[test]
    fn test_status_tracks_tombstones() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open_engine(dir.path());

        engine
            .insert(&[
                Document::new("a", vec![1.0, 1.0]),
                Document::new("b", vec![2.0, 2.0]),
                Document::new("c", vec![3.0, 3.0]),
            ])
            .unwrap();
        engine.delete(&["b"]).unwrap();

        let status = engine.status();
        assert_eq!(status.total, 2);
        assert_eq!(status.live, 2);
        assert_eq!(status.deleted, 1);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open_engine(dir.path());

        engine.clear().unwrap();
        assert_eq!(engine.len(), 0);

        engine
            .insert(&[Document::new("doc1", vec![1.0, 1.0])])
            .unwrap();
        engine.clear().unwrap();
        engine.clear().unwrap();
        assert_eq!(engine.len(), 0);
        assert_eq!(engine.status(), EngineStatus::default());
    }

    #[test]
    fn test_fill_embedding_both_cases() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open_engine(dir.path());

        engine
            .insert(&[Document::new("a", vec![1.0, 0.0])])
            .unwrap();

        let out = engine.fill_embedding(&["a"]).unwrap();
        assert_eq!(out["a"], vec![1.0, 0.0]);

        let result = engine.fill_embedding(&["a", "b"]);
        assert!(matches!(
            result,
            Err(Error::DocumentNotFound { id }) if id == "b"
        ));
    }
}
