//! HNSW (Hierarchical Navigable Small World) proximity graph.
//!
//! Approximate nearest neighbor search over a multi-layer graph:
//! - Layer 0 contains all nodes with up to 2*M connections each
//! - Higher layers contain a subset of nodes with up to M connections each
//! - Search starts at the top layer and greedily descends to layer 0,
//!   where a beam search bounded by `ef` collects the closest candidates
//!
//! The graph does not own embeddings; search and build methods take an
//! external [`VectorHeap`] for distance computation.
//!
//! Determinism:
//! - Fixed RNG seed + monotonic counter for level assignment
//! - BTreeMap node storage and BTreeSet neighbor lists (sorted iteration)
//! - Tie-breaking: (score desc, VectorId asc)
//!
//! Deletion is tombstone-and-filter: a deleted node stays in the graph but
//! is excluded from every result set from the moment [`HnswGraph::delete`]
//! returns; traversal routes around it once its embedding is released.
//! Tombstones are reclaimed when the graph is rebuilt (recovery or clear).
//! Updates instead remove the node outright ([`HnswGraph::remove_node`])
//! and re-insert, so each live id has exactly one node.
//!
//! Filtered search takes an optional admissible id set: nodes outside the
//! set are still traversed as stepping-stones but never returned.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use cairn_core::{DistanceMetric, EngineConfig, VectorId};

use crate::index::distance::score;
use crate::index::heap::VectorHeap;

/// Graph construction and search parameters
#[derive(Debug, Clone)]
pub struct GraphParams {
    /// Max connections per layer (the "M" parameter)
    pub max_connection: usize,
    /// Build-time beam width
    pub ef_construction: usize,
    /// Default query-time beam width
    pub ef_search: usize,
    /// Level multiplier: 1/ln(M)
    pub ml: f64,
}

impl GraphParams {
    /// Derive graph parameters from the collection config
    pub fn from_config(config: &EngineConfig) -> Self {
        let max_connection = config.max_connection.max(2);
        GraphParams {
            max_connection,
            ef_construction: config.ef_construction.max(1),
            ef_search: config.ef_search.max(1),
            ml: 1.0 / (max_connection as f64).ln(),
        }
    }

    /// Max connections for layer 0 (2*M)
    fn max_connections_layer0(&self) -> usize {
        self.max_connection * 2
    }
}

/// A node in the HNSW graph
#[derive(Debug, Clone)]
struct HnswNode {
    /// Neighbors per layer: neighbors[layer] = set of neighbor ids
    neighbors: Vec<BTreeSet<VectorId>>,
    /// Max layer this node appears in
    max_layer: usize,
    /// Tombstone flag; deleted nodes are traversed but never returned
    deleted: bool,
}

impl HnswNode {
    fn new(max_layer: usize) -> Self {
        HnswNode {
            neighbors: (0..=max_layer).map(|_| BTreeSet::new()).collect(),
            max_layer,
            deleted: false,
        }
    }
}

/// Scored candidate for search (max-heap by score, tie-break by VectorId asc)
#[derive(Debug, Clone, PartialEq)]
struct ScoredId {
    score: f32,
    id: VectorId,
}

impl Eq for ScoredId {}

impl PartialOrd for ScoredId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredId {
    fn cmp(&self, other: &Self) -> Ordering {
        // Natural ordering: higher score = Greater, so BinaryHeap<ScoredId>
        // pops the nearest candidate first and BinaryHeap<Reverse<ScoredId>>
        // keeps the worst result on top for O(1) eviction.
        self.score
            .partial_cmp(&other.score)
            .unwrap_or(Ordering::Equal)
            // Tie-break: lower VectorId = Greater (lower id preferred)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Multi-layer proximity graph. Does not own embeddings.
pub struct HnswGraph {
    params: GraphParams,
    metric: DistanceMetric,
    /// Graph structure; BTreeMap for deterministic iteration
    nodes: BTreeMap<VectorId, HnswNode>,
    /// Entry point (a node on the current top layer)
    entry_point: Option<VectorId>,
    /// Current max level in the graph
    max_level: usize,
    /// Fixed seed for deterministic level assignment
    rng_seed: u64,
    /// Monotonic counter for deterministic RNG
    rng_counter: u64,
}

impl HnswGraph {
    /// Create an empty graph
    pub fn new(metric: DistanceMetric, params: GraphParams) -> Self {
        HnswGraph {
            params,
            metric,
            nodes: BTreeMap::new(),
            entry_point: None,
            max_level: 0,
            rng_seed: 42,
            rng_counter: 0,
        }
    }

    /// Count of live (non-tombstoned) nodes
    pub fn live_len(&self) -> usize {
        self.nodes.values().filter(|n| !n.deleted).count()
    }

    /// Count of tombstoned nodes awaiting reclamation
    pub fn deleted_len(&self) -> usize {
        self.nodes.values().filter(|n| n.deleted).count()
    }

    /// Check if an id exists and is live
    pub fn contains(&self, id: VectorId) -> bool {
        self.nodes.get(&id).is_some_and(|n| !n.deleted)
    }

    // ========================================================================
    // Level assignment
    // ========================================================================

    /// Assign a level for a new node using a deterministic PRNG.
    ///
    /// Identical insert sequences produce identical level assignments, which
    /// keeps recovery rebuilds reproducible.
    fn assign_level(&mut self) -> usize {
        self.rng_counter += 1;
        let hash = splitmix64(self.rng_seed.wrapping_add(self.rng_counter));

        // Uniform [0, 1), clamped away from 0 to avoid log(0)
        let uniform = ((hash as f64) / (u64::MAX as f64)).max(1e-15);
        (-uniform.ln() * self.params.ml) as usize
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Whether a node may appear in result sets
    fn is_returnable(&self, id: VectorId, admit: Option<&BTreeSet<VectorId>>) -> bool {
        self.nodes.get(&id).is_some_and(|n| !n.deleted)
            && admit.map_or(true, |set| set.contains(&id))
    }

    /// Beam search at a single layer.
    ///
    /// Returns up to `ef` returnable nodes sorted by (score desc, id asc).
    /// Non-admitted nodes are traversed as waypoints but excluded from
    /// results; tombstoned nodes are excluded too.
    fn search_layer(
        &self,
        query: &[f32],
        entry_id: VectorId,
        ef: usize,
        layer: usize,
        heap: &VectorHeap,
        admit: Option<&BTreeSet<VectorId>>,
    ) -> Vec<ScoredId> {
        let entry_embedding = match heap.get(entry_id) {
            Some(e) => e,
            None => return Vec::new(),
        };
        let entry_score = score(query, entry_embedding, self.metric);

        let mut visited = BTreeSet::new();
        visited.insert(entry_id);

        // Candidates: max-heap, nearest popped first for expansion
        let mut candidates = BinaryHeap::new();
        candidates.push(ScoredId {
            score: entry_score,
            id: entry_id,
        });

        // Results: min-heap via Reverse, worst result on top for eviction
        let mut results: BinaryHeap<Reverse<ScoredId>> = BinaryHeap::new();
        if self.is_returnable(entry_id, admit) {
            results.push(Reverse(ScoredId {
                score: entry_score,
                id: entry_id,
            }));
        }

        while let Some(nearest) = candidates.pop() {
            let worst_result_score = results
                .peek()
                .map(|r| r.0.score)
                .unwrap_or(f32::NEG_INFINITY);
            if nearest.score < worst_result_score && results.len() >= ef {
                break;
            }

            if let Some(node) = self.nodes.get(&nearest.id) {
                if layer < node.neighbors.len() {
                    for &neighbor_id in &node.neighbors[layer] {
                        if !visited.insert(neighbor_id) {
                            continue;
                        }

                        if let Some(neighbor_embedding) = heap.get(neighbor_id) {
                            let neighbor_score = score(query, neighbor_embedding, self.metric);

                            let worst_result_score = results
                                .peek()
                                .map(|r| r.0.score)
                                .unwrap_or(f32::NEG_INFINITY);

                            if results.len() < ef || neighbor_score > worst_result_score {
                                // Always continue traversal through this node
                                candidates.push(ScoredId {
                                    score: neighbor_score,
                                    id: neighbor_id,
                                });

                                if self.is_returnable(neighbor_id, admit) {
                                    results.push(Reverse(ScoredId {
                                        score: neighbor_score,
                                        id: neighbor_id,
                                    }));
                                    if results.len() > ef {
                                        results.pop();
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        let mut result_vec: Vec<ScoredId> = results.into_iter().map(|r| r.0).collect();
        result_vec.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        result_vec
    }

    /// Greedy descent from `from_layer` down to `to_layer`.
    ///
    /// At each layer, evaluates all neighbors and moves to the globally best
    /// one; equivalent to a layer search with ef=1.
    fn greedy_search_to_layer(
        &self,
        query: &[f32],
        entry_id: VectorId,
        from_layer: usize,
        to_layer: usize,
        heap: &VectorHeap,
    ) -> VectorId {
        let mut current = entry_id;

        for layer in (to_layer..=from_layer).rev() {
            let mut improved = true;
            while improved {
                improved = false;
                let current_embedding = match heap.get(current) {
                    Some(e) => e,
                    None => break,
                };
                let current_score = score(query, current_embedding, self.metric);

                let mut best_score = current_score;
                let mut best_id = current;

                if let Some(node) = self.nodes.get(&current) {
                    if layer < node.neighbors.len() {
                        for &neighbor_id in &node.neighbors[layer] {
                            if let Some(neighbor_embedding) = heap.get(neighbor_id) {
                                let neighbor_score =
                                    score(query, neighbor_embedding, self.metric);
                                if neighbor_score > best_score
                                    || (neighbor_score == best_score && neighbor_id < best_id)
                                {
                                    best_score = neighbor_score;
                                    best_id = neighbor_id;
                                }
                            }
                        }
                    }
                }

                if best_id != current {
                    current = best_id;
                    improved = true;
                }
            }
        }

        current
    }

    /// Prune a node's neighbor list at a layer down to `max_connections`,
    /// keeping the closest
    fn prune_neighbors_for(
        &mut self,
        id: VectorId,
        layer: usize,
        max_connections: usize,
        heap: &VectorHeap,
    ) {
        let embedding = match heap.get(id) {
            Some(e) => e.to_vec(),
            None => return,
        };

        let neighbors: Vec<VectorId> = match self.nodes.get(&id) {
            Some(node) if layer < node.neighbors.len() => {
                node.neighbors[layer].iter().copied().collect()
            }
            _ => return,
        };

        let mut scored: Vec<ScoredId> = neighbors
            .iter()
            .filter_map(|&nid| {
                heap.get(nid).map(|n_emb| ScoredId {
                    score: score(&embedding, n_emb, self.metric),
                    id: nid,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        let keep: BTreeSet<VectorId> =
            scored.iter().take(max_connections).map(|s| s.id).collect();

        if let Some(node) = self.nodes.get_mut(&id) {
            if layer < node.neighbors.len() {
                node.neighbors[layer] = keep;
            }
        }
    }

    // ========================================================================
    // Build
    // ========================================================================

    /// Insert a vector into the graph
    pub fn insert(&mut self, id: VectorId, embedding: &[f32], heap: &VectorHeap) {
        let level = self.assign_level();

        self.nodes.insert(id, HnswNode::new(level));

        // First node becomes the entry point
        let Some(entry_id) = self.entry_point else {
            self.entry_point = Some(id);
            self.max_level = level;
            return;
        };

        // Greedy descent from the top layer to level+1
        let mut current_entry = entry_id;
        if self.max_level > level {
            current_entry =
                self.greedy_search_to_layer(embedding, entry_id, self.max_level, level + 1, heap);
        }

        // At each layer at or below the node's level, find neighbors and link
        let start_layer = level.min(self.max_level);
        for layer in (0..=start_layer).rev() {
            let candidates = self.search_layer(
                embedding,
                current_entry,
                self.params.ef_construction,
                layer,
                heap,
                None,
            );

            // New node gets up to M connections regardless of layer
            let selected: Vec<VectorId> = candidates
                .iter()
                .take(self.params.max_connection)
                .map(|s| s.id)
                .collect();

            if let Some(new_node) = self.nodes.get_mut(&id) {
                if layer < new_node.neighbors.len() {
                    for &neighbor_id in &selected {
                        new_node.neighbors[layer].insert(neighbor_id);
                    }
                }
            }

            // Reverse links, pruning neighbors that exceed capacity
            let max_conn = if layer == 0 {
                self.params.max_connections_layer0()
            } else {
                self.params.max_connection
            };

            for &neighbor_id in &selected {
                let needs_prune = match self.nodes.get_mut(&neighbor_id) {
                    Some(neighbor_node) if layer < neighbor_node.neighbors.len() => {
                        neighbor_node.neighbors[layer].insert(id);
                        neighbor_node.neighbors[layer].len() > max_conn
                    }
                    _ => false,
                };

                if needs_prune {
                    self.prune_neighbors_for(neighbor_id, layer, max_conn, heap);
                }
            }

            // Closest candidate seeds the next layer down
            if let Some(closest) = candidates.first() {
                current_entry = closest.id;
            }
        }

        if level > self.max_level {
            self.entry_point = Some(id);
            self.max_level = level;
        }
    }

    /// Rebuild the graph from heap contents (recovery path).
    ///
    /// Resets graph state and re-inserts every heap vector in ascending id
    /// order, which reclaims all tombstones deterministically.
    pub fn rebuild(&mut self, heap: &VectorHeap) {
        self.nodes.clear();
        self.entry_point = None;
        self.max_level = 0;
        self.rng_counter = 0;

        let ids: Vec<VectorId> = heap.ids().collect();
        for id in ids {
            let embedding = match heap.get(id) {
                Some(e) => e.to_vec(),
                None => continue,
            };
            self.insert(id, &embedding, heap);
        }
    }

    /// Drop all nodes (collection clear). The RNG counter resets with the
    /// structure, matching a fresh graph.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.entry_point = None;
        self.max_level = 0;
        self.rng_counter = 0;
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Tombstone a node. Returns true if it was live.
    ///
    /// The node stays in the graph as a traversal waypoint until the next
    /// rebuild, but is excluded from all results from this point on.
    pub fn delete(&mut self, id: VectorId) -> bool {
        let was_live = self.nodes.get(&id).is_some_and(|n| !n.deleted);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.deleted = true;
        }
        if was_live && self.entry_point == Some(id) {
            self.entry_point = self
                .nodes
                .iter()
                .find(|(_, n)| !n.deleted)
                .map(|(id, _)| *id);
            self.max_level = match self.entry_point {
                Some(ep) => self.nodes[&ep].max_layer,
                None => 0,
            };
        }
        was_live
    }

    /// Remove a node and all its bidirectional links (update path)
    pub fn remove_node(&mut self, id: VectorId) {
        if let Some(node) = self.nodes.remove(&id) {
            for (layer, neighbors) in node.neighbors.iter().enumerate() {
                for &neighbor_id in neighbors {
                    if let Some(n) = self.nodes.get_mut(&neighbor_id) {
                        if layer < n.neighbors.len() {
                            n.neighbors[layer].remove(&id);
                        }
                    }
                }
            }
            if self.entry_point == Some(id) {
                self.entry_point = self.nodes.keys().next().copied();
                self.max_level = self.nodes.values().map(|n| n.max_layer).max().unwrap_or(0);
            }
        }
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Search for the k nearest neighbors.
    ///
    /// `ef` is the layer-0 beam width (raised to at least k). When `admit`
    /// is given, only ids in the set are returned; other nodes still serve
    /// as stepping-stones. Returns (id, internal score) sorted by
    /// (score desc, id asc).
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
        heap: &VectorHeap,
        admit: Option<&BTreeSet<VectorId>>,
    ) -> Vec<(VectorId, f32)> {
        if k == 0 || self.nodes.is_empty() || query.len() != heap.dimension() {
            return Vec::new();
        }

        let Some(entry_id) = self.entry_point else {
            return Vec::new();
        };

        if self.nodes.values().all(|n| n.deleted) {
            return Vec::new();
        }

        let mut current_entry = entry_id;
        if self.max_level > 0 {
            current_entry = self.greedy_search_to_layer(query, entry_id, self.max_level, 1, heap);
        }

        let ef = ef.max(k);
        let candidates = self.search_layer(query, current_entry, ef, 0, heap, admit);

        candidates
            .into_iter()
            .filter(|s| self.is_returnable(s.id, admit))
            .take(k)
            .map(|s| (s.id, s.score))
            .collect()
    }
}

/// SplitMix64 hash for the deterministic level-assignment PRNG
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e3779b97f4a7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}
