//! Contiguous embedding storage.
//!
//! `VectorHeap` stores embeddings in one contiguous `Vec<f32>` for
//! cache-friendly similarity computation, with a `BTreeMap` from `VectorId`
//! to slot offset for deterministic iteration.
//!
//! Invariants:
//! - VectorIds are never reused; only storage slots are reused
//! - `next_id` is monotonically increasing and survives restarts (restored
//!   during recovery via [`VectorHeap::insert_with_id`] and
//!   [`VectorHeap::restore_next_id`])
//! - `id_to_offset` is the sole source of truth for which vectors are active

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use cairn_core::{Error, Result, VectorId};

/// Per-engine vector heap
pub struct VectorHeap {
    /// Embedding dimension; every slot occupies this many consecutive f32s
    dimension: usize,

    /// Contiguous embedding storage
    /// Layout: [v0_dim0, ..., v0_dimN, v1_dim0, ...]
    data: Vec<f32>,

    /// VectorId -> offset in data (in floats, not bytes)
    ///
    /// BTreeMap so iteration is deterministic; HashMap would make rebuild
    /// order (and therefore graph structure) nondeterministic.
    id_to_offset: BTreeMap<VectorId, usize>,

    /// Free list of deleted storage slots, available for reuse
    free_slots: Vec<usize>,

    /// Next VectorId to allocate; never decremented, even after deletions
    next_id: AtomicU64,
}

impl VectorHeap {
    /// Create an empty heap.
    ///
    /// `next_id` starts at 1 so ids are positive integers.
    pub fn new(dimension: usize) -> Self {
        VectorHeap {
            dimension,
            data: Vec::new(),
            id_to_offset: BTreeMap::new(),
            free_slots: Vec::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Embedding dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of active vectors
    pub fn len(&self) -> usize {
        self.id_to_offset.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.id_to_offset.is_empty()
    }

    /// Next id value (persisted in snapshots)
    pub fn next_id_value(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }

    /// Restore the id counter from a snapshot.
    ///
    /// Only moves the counter forward; recovery must never allow an old id
    /// to be reallocated.
    pub fn restore_next_id(&self, next_id: u64) {
        self.next_id.fetch_max(next_id, Ordering::Relaxed);
    }

    /// Allocate a new VectorId (monotonically increasing, never reused)
    pub fn allocate_id(&self) -> VectorId {
        VectorId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Insert or update a vector.
    ///
    /// An existing id is updated in place; a new id takes a free slot if one
    /// is available, otherwise grows the arena.
    pub fn upsert(&mut self, id: VectorId, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                got: embedding.len(),
            });
        }

        if let Some(&offset) = self.id_to_offset.get(&id) {
            self.data[offset..offset + self.dimension].copy_from_slice(embedding);
        } else {
            let offset = if let Some(slot) = self.free_slots.pop() {
                self.data[slot..slot + self.dimension].copy_from_slice(embedding);
                slot
            } else {
                let offset = self.data.len();
                self.data.extend_from_slice(embedding);
                offset
            };
            self.id_to_offset.insert(id, offset);
        }

        Ok(())
    }

    /// Insert with a specific VectorId (recovery/replay path).
    ///
    /// Bumps `next_id` past the replayed id so future allocations stay
    /// unique.
    pub fn insert_with_id(&mut self, id: VectorId, embedding: &[f32]) -> Result<()> {
        self.next_id.fetch_max(id.as_u64() + 1, Ordering::Relaxed);
        self.upsert(id, embedding)
    }

    /// Delete a vector, freeing its slot for reuse.
    ///
    /// Returns true if the vector existed. The slot data is zeroed; the
    /// VectorId itself is never reused.
    pub fn delete(&mut self, id: VectorId) -> bool {
        if let Some(offset) = self.id_to_offset.remove(&id) {
            self.free_slots.push(offset);
            self.data[offset..offset + self.dimension].fill(0.0);
            true
        } else {
            false
        }
    }

    /// Remove all vectors. The id counter is NOT reset.
    pub fn clear(&mut self) {
        self.data.clear();
        self.id_to_offset.clear();
        self.free_slots.clear();
    }

    /// Get an embedding by id
    pub fn get(&self, id: VectorId) -> Option<&[f32]> {
        let offset = *self.id_to_offset.get(&id)?;
        Some(&self.data[offset..offset + self.dimension])
    }

    /// Check if a vector exists
    pub fn contains(&self, id: VectorId) -> bool {
        self.id_to_offset.contains_key(&id)
    }

    /// Iterate all vectors in ascending VectorId order
    pub fn iter(&self) -> impl Iterator<Item = (VectorId, &[f32])> {
        self.id_to_offset.iter().map(|(&id, &offset)| {
            (id, &self.data[offset..offset + self.dimension])
        })
    }

    /// All VectorIds in ascending order
    pub fn ids(&self) -> impl Iterator<Item = VectorId> + '_ {
        self.id_to_offset.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let mut heap = VectorHeap::new(4);

        let id = heap.allocate_id();
        heap.upsert(id, &[0.1, 0.2, 0.3, 0.4]).unwrap();
        assert_eq!(heap.get(id).unwrap(), &[0.1, 0.2, 0.3, 0.4]);

        heap.upsert(id, &[0.5, 0.5, 0.5, 0.5]).unwrap();
        assert_eq!(heap.get(id).unwrap(), &[0.5, 0.5, 0.5, 0.5]);

        assert!(heap.delete(id));
        assert!(heap.get(id).is_none());
        assert!(!heap.delete(id));
    }

    #[test]
    fn test_vector_ids_never_reused() {
        let mut heap = VectorHeap::new(2);

        let id1 = heap.allocate_id();
        heap.upsert(id1, &[0.1, 0.1]).unwrap();
        heap.delete(id1);

        let id2 = heap.allocate_id();
        heap.upsert(id2, &[0.2, 0.2]).unwrap();
        heap.delete(id2);

        let id3 = heap.allocate_id();
        assert!(id1 < id2);
        assert!(id2 < id3);
    }

    #[test]
    fn test_slot_reuse_does_not_grow_arena() {
        let mut heap = VectorHeap::new(8);

        let id1 = heap.allocate_id();
        heap.upsert(id1, &[0.1; 8]).unwrap();
        let arena_len = heap.data.len();
        heap.delete(id1);

        let id2 = heap.allocate_id();
        heap.upsert(id2, &[0.2; 8]).unwrap();

        assert_eq!(heap.data.len(), arena_len);
        assert_ne!(id1, id2);
        assert_eq!(heap.get(id2).unwrap(), &[0.2; 8]);
    }

    #[test]
    fn test_dimension_validation() {
        let mut heap = VectorHeap::new(4);
        let id = heap.allocate_id();
        let result = heap.upsert(id, &[0.1, 0.2]);
        assert!(matches!(
            result,
            Err(Error::DimensionMismatch {
                expected: 4,
                got: 2
            })
        ));
    }

    #[test]
    fn test_insert_with_id_bumps_counter() {
        let mut heap = VectorHeap::new(2);
        heap.insert_with_id(VectorId::new(10), &[0.1, 0.1]).unwrap();

        let next = heap.allocate_id();
        assert!(next.as_u64() > 10);
    }

    #[test]
    fn test_deterministic_iteration_order() {
        let mut heap = VectorHeap::new(2);
        heap.insert_with_id(VectorId::new(3), &[0.3, 0.3]).unwrap();
        heap.insert_with_id(VectorId::new(1), &[0.1, 0.1]).unwrap();
        heap.insert_with_id(VectorId::new(2), &[0.2, 0.2]).unwrap();

        let ids: Vec<u64> = heap.ids().map(|id| id.as_u64()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_clear_preserves_id_counter() {
        let mut heap = VectorHeap::new(2);
        let id1 = heap.allocate_id();
        heap.upsert(id1, &[0.1, 0.1]).unwrap();
        heap.clear();

        assert!(heap.is_empty());
        let id2 = heap.allocate_id();
        assert!(id2 > id1);
    }
}
