//! Cairn vector store engine.
//!
//! A single-collection embedded document store with approximate similarity
//! search and exact attribute filtering:
//!
//! - **engine**: [`VectorEngine`], the owned facade over all state
//! - **index**: HNSW proximity graph and contiguous embedding heap
//! - **attrs**: columnar typed attribute storage and predicate evaluation
//! - **docs**: the authoritative id -> record table
//! - **wal / snapshot / recovery**: the durable write path and startup
//!   reload
//!
//! Core vocabulary types ([`Document`], [`EngineConfig`], [`Predicate`],
//! [`Error`]) are re-exported from `cairn-core`.

pub mod attrs;
pub mod docs;
pub mod engine;
pub mod index;
pub mod recovery;
pub mod snapshot;
pub mod wal;

pub use engine::VectorEngine;
pub use recovery::RecoveryStats;

pub use cairn_core::{
    validate_document_id, AttrValue, ColumnType, Condition, DistanceMetric, Document,
    EngineConfig, EngineStatus, Error, FilterOp, InsertReport, Predicate, RejectedDocument,
    Result, SearchHit, UpdateReport, VectorId,
};
