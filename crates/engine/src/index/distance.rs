//! Shared distance functions for vector similarity computation.
//!
//! Internally all scores are normalized to "higher = more similar" so heap
//! ordering and tie-breaking work the same way for every metric. For
//! euclidean the internal score is the *negated* L2 distance; negation is
//! exact in floating point, so the metric-native distance reported to
//! callers is recovered losslessly by [`display_score`].
//!
//! Functions are single-threaded for determinism. Vectors are used as-is,
//! with no implicit normalization.

use cairn_core::DistanceMetric;

/// Compute the internal similarity score between two vectors
/// (higher = more similar, for every metric).
pub fn score(a: &[f32], b: &[f32], metric: DistanceMetric) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "dimension mismatch in score computation");

    match metric {
        DistanceMetric::Cosine => cosine_similarity(a, b),
        DistanceMetric::Euclidean => -euclidean_distance(a, b),
        DistanceMetric::DotProduct => dot_product(a, b),
    }
}

/// Convert an internal score to the metric-native value reported to callers:
/// euclidean distance (ascending = better) or similarity (descending = better).
pub fn display_score(internal: f32, metric: DistanceMetric) -> f32 {
    match metric {
        DistanceMetric::Euclidean => -internal,
        DistanceMetric::Cosine | DistanceMetric::DotProduct => internal,
    }
}

/// Cosine similarity: dot(a,b) / (||a|| * ||b||)
///
/// Range: [-1, 1]. Returns 0.0 if either vector has zero norm.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot = dot_product(a, b);
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Dot product (inner product)
fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// L2 norm (Euclidean length)
fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Euclidean distance (L2 distance)
fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}
