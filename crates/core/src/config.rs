//! Collection configuration.
//!
//! `EngineConfig` is fixed when a storage location is first created and is
//! validated against the persisted manifest on every reopen. The only change
//! allowed after creation is *extending* the attribute schema with new
//! columns; narrowing or retyping an existing column requires a rebuild and
//! is rejected at open time.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest accepted embedding dimension
pub const MAX_DIMENSION: usize = 65536;

/// Default build-time beam width
pub const DEFAULT_EF_CONSTRUCTION: usize = 200;
/// Default query-time beam width
pub const DEFAULT_EF_SEARCH: usize = 50;
/// Default max connections per graph node
pub const DEFAULT_MAX_CONNECTION: usize = 16;

/// Distance metric for similarity computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Cosine similarity (higher = more similar)
    Cosine,
    /// Euclidean (L2) distance (lower = more similar)
    Euclidean,
    /// Inner product (higher = more similar)
    #[serde(alias = "inner_product")]
    DotProduct,
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::Cosine => write!(f, "cosine"),
            DistanceMetric::Euclidean => write!(f, "euclidean"),
            DistanceMetric::DotProduct => write!(f, "dot_product"),
        }
    }
}

/// Declared type of an attribute column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// 64-bit signed integer
    Int,
    /// 64-bit float (accepts integer values, widened on insert)
    Float,
    /// UTF-8 string
    Str,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Int => write!(f, "int"),
            ColumnType::Float => write!(f, "float"),
            ColumnType::Str => write!(f, "str"),
        }
    }
}

/// Collection configuration
///
/// Immutable after creation except for schema extension (see module docs).
/// Persisted in the storage manifest and validated on reopen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Embedding dimension; every stored vector has exactly this length
    pub dimension: usize,
    /// Distance metric used for search ordering
    pub metric: DistanceMetric,
    /// Build-time beam width (construction accuracy/speed trade-off)
    pub ef_construction: usize,
    /// Query-time beam width (recall/speed trade-off)
    pub ef_search: usize,
    /// Max connections per graph node (the "M" parameter)
    pub max_connection: usize,
    /// Declared attribute schema, in declaration order
    pub columns: Vec<(String, ColumnType)>,
}

impl EngineConfig {
    /// Create a config with default graph parameters and an empty schema
    ///
    /// # Errors
    /// `InvalidDimension` if `dimension` is 0 or exceeds [`MAX_DIMENSION`].
    pub fn new(dimension: usize, metric: DistanceMetric) -> Result<Self> {
        if dimension == 0 || dimension > MAX_DIMENSION {
            return Err(Error::InvalidDimension { dimension });
        }
        Ok(EngineConfig {
            dimension,
            metric,
            ef_construction: DEFAULT_EF_CONSTRUCTION,
            ef_search: DEFAULT_EF_SEARCH,
            max_connection: DEFAULT_MAX_CONNECTION,
            columns: Vec::new(),
        })
    }

    /// Declare an attribute column (builder style)
    pub fn with_column(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        self.columns.push((name.into(), ty));
        self
    }

    /// Override the query-time beam width (builder style)
    pub fn with_ef_search(mut self, ef_search: usize) -> Self {
        self.ef_search = ef_search;
        self
    }

    /// Override the build-time beam width (builder style)
    pub fn with_ef_construction(mut self, ef_construction: usize) -> Self {
        self.ef_construction = ef_construction;
        self
    }

    /// Override the max connections per node (builder style)
    pub fn with_max_connection(mut self, max_connection: usize) -> Self {
        self.max_connection = max_connection;
        self
    }

    /// Look up the declared type of a column
    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ty)| *ty)
    }

    /// Validate structural soundness (dimension bounds, unique column names)
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 || self.dimension > MAX_DIMENSION {
            return Err(Error::InvalidDimension {
                dimension: self.dimension,
            });
        }
        for (i, (name, _)) in self.columns.iter().enumerate() {
            if name.is_empty() {
                return Err(Error::ConfigMismatch(
                    "column names cannot be empty".to_string(),
                ));
            }
            if self.columns[..i].iter().any(|(n, _)| n == name) {
                return Err(Error::ConfigMismatch(format!(
                    "duplicate column {name:?} in schema"
                )));
            }
        }
        Ok(())
    }

    /// Check that this (supplied) config is compatible with a persisted one.
    ///
    /// All scalar fields must match exactly. The column list may only be
    /// extended: the persisted columns must be a prefix of the supplied ones,
    /// with identical names and types.
    pub fn check_reopen(&self, persisted: &EngineConfig) -> Result<()> {
        if self.dimension != persisted.dimension {
            return Err(Error::ConfigMismatch(format!(
                "dimension {} does not match persisted dimension {}",
                self.dimension, persisted.dimension
            )));
        }
        if self.metric != persisted.metric {
            return Err(Error::ConfigMismatch(format!(
                "metric {} does not match persisted metric {}",
                self.metric, persisted.metric
            )));
        }
        if self.ef_construction != persisted.ef_construction
            || self.ef_search != persisted.ef_search
            || self.max_connection != persisted.max_connection
        {
            return Err(Error::ConfigMismatch(
                "graph parameters do not match persisted configuration".to_string(),
            ));
        }
        if self.columns.len() < persisted.columns.len() {
            return Err(Error::ConfigMismatch(
                "attribute schema cannot be narrowed".to_string(),
            ));
        }
        for (supplied, existing) in self.columns.iter().zip(persisted.columns.iter()) {
            if supplied != existing {
                return Err(Error::ConfigMismatch(format!(
                    "column {:?} cannot be renamed or retyped (persisted as {:?} {})",
                    supplied.0, existing.0, existing.1
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_dimension() {
        assert!(matches!(
            EngineConfig::new(0, DistanceMetric::Cosine),
            Err(Error::InvalidDimension { dimension: 0 })
        ));
        assert!(matches!(
            EngineConfig::new(MAX_DIMENSION + 1, DistanceMetric::Cosine),
            Err(Error::InvalidDimension { .. })
        ));
        assert!(EngineConfig::new(128, DistanceMetric::Cosine).is_ok());
        assert!(EngineConfig::new(MAX_DIMENSION, DistanceMetric::Cosine).is_ok());
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new(128, DistanceMetric::Euclidean).unwrap();
        assert_eq!(config.ef_construction, 200);
        assert_eq!(config.ef_search, 50);
        assert_eq!(config.max_connection, 16);
        assert!(config.columns.is_empty());
    }

    #[test]
    fn test_column_lookup() {
        let config = EngineConfig::new(3, DistanceMetric::Cosine)
            .unwrap()
            .with_column("price", ColumnType::Float)
            .with_column("category", ColumnType::Str);
        assert_eq!(config.column_type("price"), Some(ColumnType::Float));
        assert_eq!(config.column_type("category"), Some(ColumnType::Str));
        assert_eq!(config.column_type("missing"), None);
    }

    #[test]
    fn test_validate_rejects_duplicate_columns() {
        let config = EngineConfig::new(3, DistanceMetric::Cosine)
            .unwrap()
            .with_column("price", ColumnType::Float)
            .with_column("price", ColumnType::Int);
        assert!(matches!(config.validate(), Err(Error::ConfigMismatch(_))));
    }

    #[test]
    fn test_check_reopen_exact_match() {
        let config = EngineConfig::new(128, DistanceMetric::Cosine)
            .unwrap()
            .with_column("price", ColumnType::Float);
        assert!(config.check_reopen(&config.clone()).is_ok());
    }

    #[test]
    fn test_check_reopen_rejects_dimension_change() {
        let persisted = EngineConfig::new(128, DistanceMetric::Cosine).unwrap();
        let supplied = EngineConfig::new(256, DistanceMetric::Cosine).unwrap();
        assert!(matches!(
            supplied.check_reopen(&persisted),
            Err(Error::ConfigMismatch(_))
        ));
    }

    #[test]
    fn test_check_reopen_rejects_metric_change() {
        let persisted = EngineConfig::new(128, DistanceMetric::Cosine).unwrap();
        let supplied = EngineConfig::new(128, DistanceMetric::Euclidean).unwrap();
        assert!(matches!(
            supplied.check_reopen(&persisted),
            Err(Error::ConfigMismatch(_))
        ));
    }

    #[test]
    fn test_check_reopen_allows_schema_extension() {
        let persisted = EngineConfig::new(128, DistanceMetric::Cosine)
            .unwrap()
            .with_column("price", ColumnType::Float);
        let supplied = persisted.clone().with_column("category", ColumnType::Str);
        assert!(supplied.check_reopen(&persisted).is_ok());
    }

    #[test]
    fn test_check_reopen_rejects_schema_narrowing() {
        let persisted = EngineConfig::new(128, DistanceMetric::Cosine)
            .unwrap()
            .with_column("price", ColumnType::Float);
        let supplied = EngineConfig::new(128, DistanceMetric::Cosine).unwrap();
        assert!(matches!(
            supplied.check_reopen(&persisted),
            Err(Error::ConfigMismatch(_))
        ));
    }

    #[test]
    fn test_check_reopen_rejects_column_retype() {
        let persisted = EngineConfig::new(128, DistanceMetric::Cosine)
            .unwrap()
            .with_column("price", ColumnType::Float);
        let supplied = EngineConfig::new(128, DistanceMetric::Cosine)
            .unwrap()
            .with_column("price", ColumnType::Int);
        assert!(matches!(
            supplied.check_reopen(&persisted),
            Err(Error::ConfigMismatch(_))
        ));
    }

    #[test]
    fn test_metric_serde_accepts_inner_product_alias() {
        let metric: DistanceMetric = serde_json::from_str("\"inner_product\"").unwrap();
        assert_eq!(metric, DistanceMetric::DotProduct);
        let metric: DistanceMetric = serde_json::from_str("\"cosine\"").unwrap();
        assert_eq!(metric, DistanceMetric::Cosine);
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = EngineConfig::new(384, DistanceMetric::DotProduct)
            .unwrap()
            .with_column("price", ColumnType::Float);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
