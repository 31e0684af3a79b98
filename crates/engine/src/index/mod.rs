//! Approximate nearest neighbor index.
//!
//! - **VectorHeap**: contiguous embedding storage with slot reuse
//! - **HnswGraph**: multi-layer proximity graph over heap contents
//! - **distance**: per-metric scoring, normalized internally to
//!   higher-is-better

pub mod distance;
pub mod heap;
pub mod hnsw;

pub use distance::{display_score, score};
pub use heap::VectorHeap;
pub use hnsw::{GraphParams, HnswGraph};
