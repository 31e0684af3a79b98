//! Core types for the cairn vector store engine.
//!
//! This crate defines the shared vocabulary used by the engine:
//!
//! - **EngineConfig / DistanceMetric / ColumnType**: collection configuration
//! - **Document / AttrValue / VectorId**: the data model
//! - **Predicate / FilterOp**: attribute filter expressions
//! - **Error / Result**: the error taxonomy
//!
//! No storage or indexing logic lives here; this crate is dependency-light
//! so the types can be shared freely.

pub mod config;
pub mod error;
pub mod filter;
pub mod types;

pub use config::{ColumnType, DistanceMetric, EngineConfig};
pub use error::{Error, Result};
pub use filter::{compare_values, Condition, FilterOp, Predicate};
pub use types::{
    validate_document_id, AttrValue, Document, EngineStatus, InsertReport, RejectedDocument,
    SearchHit, UpdateReport, VectorId,
};
