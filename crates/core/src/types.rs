//! Data model types: documents, attribute values, internal vector ids,
//! operation reports.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Internal vector identity, allocated from a per-engine monotonic counter.
///
/// VectorIds are never reused, even after deletion; the counter is persisted
/// across restarts so recovery cannot reallocate an old id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct VectorId(pub u64);

impl VectorId {
    /// Construct from a raw u64
    pub fn new(id: u64) -> Self {
        VectorId(id)
    }

    /// The raw u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for VectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A typed attribute value stored in a declared column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// UTF-8 string
    Str(String),
}

impl AttrValue {
    /// Short type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            AttrValue::Int(_) => "int",
            AttrValue::Float(_) => "float",
            AttrValue::Str(_) => "str",
        }
    }

    /// Parse a scalar JSON value; non-scalar values yield `None`
    pub fn from_json(value: &serde_json::Value) -> Option<AttrValue> {
        match value {
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(AttrValue::Int(i))
                } else {
                    n.as_f64().map(AttrValue::Float)
                }
            }
            serde_json::Value::String(s) => Some(AttrValue::Str(s.clone())),
            _ => None,
        }
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        AttrValue::Int(v as i64)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<f32> for AttrValue {
    fn from(v: f32) -> Self {
        AttrValue::Float(v as f64)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Str(v)
    }
}

/// A document as seen by callers: id, embedding, declared attributes, and an
/// opaque payload blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique caller-supplied key
    pub id: String,
    /// Embedding of the collection's dimension
    pub embedding: Vec<f32>,
    /// Values for declared attribute columns
    pub attributes: BTreeMap<String, AttrValue>,
    /// Opaque content/tags blob; preserved across updates that omit it
    pub payload: Option<serde_json::Value>,
}

impl Document {
    /// Create a document with no attributes or payload
    pub fn new(id: impl Into<String>, embedding: Vec<f32>) -> Self {
        Document {
            id: id.into(),
            embedding,
            attributes: BTreeMap::new(),
            payload: None,
        }
    }

    /// Set an attribute value (builder style)
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set the payload (builder style)
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// A ranked search result
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Document id
    pub id: String,
    /// Metric-native score: ascending distance for euclidean, descending
    /// similarity for cosine/dot product
    pub score: f32,
    /// The full matched document
    pub document: Document,
}

/// Engine observability counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStatus {
    /// Total documents in the store
    pub total: usize,
    /// Live nodes in the index
    pub live: usize,
    /// Tombstoned-but-not-reclaimed index nodes
    pub deleted: usize,
}

/// Outcome of a batch insert
#[derive(Debug, Default)]
pub struct InsertReport {
    /// Number of documents accepted (inserted or overwritten)
    pub inserted: usize,
    /// Documents rejected with the reason for each; rejection of one record
    /// never aborts the rest of the batch
    pub rejected: Vec<RejectedDocument>,
}

/// A document rejected during a batch insert
#[derive(Debug)]
pub struct RejectedDocument {
    /// Id of the rejected document
    pub id: String,
    /// Why it was rejected
    pub reason: Error,
}

/// Outcome of a batch update
#[derive(Debug, Default)]
pub struct UpdateReport {
    /// Number of documents updated
    pub updated: usize,
    /// Ids that were not present; these are reported, never inserted
    pub missing: Vec<String>,
}

/// Validate a document id
///
/// Ids must be non-empty, at most 1024 bytes, and free of null bytes.
pub fn validate_document_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::InvalidDocumentId {
            id: id.to_string(),
            reason: "document id cannot be empty".to_string(),
        });
    }
    if id.len() > 1024 {
        return Err(Error::InvalidDocumentId {
            id: id.to_string(),
            reason: "document id cannot exceed 1024 bytes".to_string(),
        });
    }
    if id.contains('\0') {
        return Err(Error::InvalidDocumentId {
            id: id.to_string(),
            reason: "document id cannot contain null bytes".to_string(),
        });
    }
    Ok(())
}
