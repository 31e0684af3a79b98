//! CairnDB - embedded, filterable, persistent approximate-nearest-neighbor
//! document store.
//!
//! A collection is rooted at a storage directory and holds documents with a
//! fixed-dimension embedding, typed attributes, and an opaque payload.
//! Similarity search runs over an HNSW proximity graph; attribute filters
//! apply exactly. Every mutation is durable before the call returns, and
//! reopening the directory reconstructs the collection.
//!
//! # Quick Start
//!
//! ```no_run
//! use cairndb::{ColumnType, DistanceMetric, Document, EngineConfig, Predicate, VectorEngine};
//!
//! # fn main() -> cairndb::Result<()> {
//! let config = EngineConfig::new(128, DistanceMetric::Cosine)?
//!     .with_column("price", ColumnType::Float);
//! let engine = VectorEngine::open("./data", config)?;
//!
//! engine.insert(&[
//!     Document::new("doc1", vec![0.1; 128]).with_attribute("price", 9.5f64),
//! ])?;
//!
//! let filter = Predicate::from_json(&serde_json::json!({"price": {"$lte": 10}}))?;
//! let hits = engine.search(&vec![0.1; 128], 5, Some(&filter))?;
//! # let _ = hits;
//! # Ok(())
//! # }
//! ```
//!
//! Internal implementation details (index, stores, durability) live in
//! `cairn-engine`; this crate re-exports the public API.

pub use cairn_engine::*;
