//! Error types for the cairn engine.
//!
//! We use `thiserror` for automatic `Display` and `Error` trait
//! implementations. Every rejected record or predicate surfaces one of these
//! variants to the caller; nothing is silently coerced or dropped.

use crate::config::ColumnType;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cairn operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the cairn engine
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations during WAL append, snapshot, recovery)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Collection dimension outside the accepted range
    #[error("invalid dimension: {dimension}")]
    InvalidDimension {
        /// The rejected dimension value
        dimension: usize,
    },

    /// Embedding length does not match the collection dimension
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Configured collection dimension
        expected: usize,
        /// Length of the offending embedding
        got: usize,
    },

    /// Embedding contains non-finite values
    #[error("invalid embedding: {reason}")]
    InvalidEmbedding {
        /// Why the embedding was rejected
        reason: String,
    },

    /// Document id failed validation
    #[error("invalid document id {id:?}: {reason}")]
    InvalidDocumentId {
        /// The rejected id
        id: String,
        /// Why the id was rejected
        reason: String,
    },

    /// Document id not present in the store
    #[error("document not found: {id:?}")]
    DocumentNotFound {
        /// The missing id
        id: String,
    },

    /// Attribute or predicate references a column absent from the schema
    #[error("column {column:?} is not declared in the schema")]
    UndeclaredColumn {
        /// The undeclared column name
        column: String,
    },

    /// Attribute value type does not match the declared column type
    #[error("type mismatch for column {column:?}: expected {expected}, got {got}")]
    TypeMismatch {
        /// The declared column
        column: String,
        /// Declared column type
        expected: ColumnType,
        /// Type of the offending value
        got: &'static str,
    },

    /// Filter expression is malformed
    #[error("invalid predicate: {0}")]
    InvalidPredicate(String),

    /// Supplied configuration disagrees with the persisted one
    #[error("configuration mismatch: {0}")]
    ConfigMismatch(String),

    /// Storage location is held by another engine instance
    #[error("storage location locked by another engine instance: {path:?}")]
    StorageLocked {
        /// The contested storage directory
        path: PathBuf,
    },

    /// Data corruption detected (CRC mismatch, undecodable snapshot)
    #[error("data corruption: {0}")]
    Corruption(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_dimension_mismatch() {
        let err = Error::DimensionMismatch {
            expected: 128,
            got: 64,
        };
        let msg = err.to_string();
        assert!(msg.contains("128"));
        assert!(msg.contains("64"));
    }

    #[test]
    fn test_error_display_io() {
        let err = Error::Io(io::Error::new(io::ErrorKind::NotFound, "file not found"));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_error_display_undeclared_column() {
        let err = Error::UndeclaredColumn {
            column: "price".to_string(),
        };
        assert!(err.to_string().contains("price"));
    }

    #[test]
    fn test_error_display_type_mismatch() {
        let err = Error::TypeMismatch {
            column: "price".to_string(),
            expected: ColumnType::Float,
            got: "str",
        };
        let msg = err.to_string();
        assert!(msg.contains("price"));
        assert!(msg.contains("float"));
        assert!(msg.contains("str"));
    }

    #[test]
    fn test_error_display_storage_locked() {
        let err = Error::StorageLocked {
            path: PathBuf::from("/tmp/data"),
        };
        assert!(err.to_string().contains("locked"));
    }

    #[test]
    fn test_error_display_document_not_found() {
        let err = Error::DocumentNotFound {
            id: "doc1".to_string(),
        };
        assert!(err.to_string().contains("doc1"));
    }
}
