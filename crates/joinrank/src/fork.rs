//! Tree-shaped index: branches hang off records of inner tables.
//!
//! Levels are a DFS linearization of the tree's edges. Each level reads
//! its bridging value from an already-emitted output slot rather than
//! from the immediately preceding emission, and a per-level last-child
//! flag tells the rank walk when a sibling group closes.
//!
//! The rank space is mixed-radix: a record's completion weight at a
//! branching level is the product of its child-subtree totals, and the
//! walk peels one factor per child edge. Earlier siblings take the
//! low-order digits; the high-order remainder is deferred on a stack
//! until the walk ascends back to start the next sibling subtree.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use joinrank_types::{RecordId, Weight};

use crate::level::Level;
use crate::stats::IndexStats;
use crate::store::RecordStore;
use crate::vertex::Vertex;

/// Rank-addressable index over a tree of equi-joins.
pub struct ForkIndex {
    levels: Vec<Level>,
    /// Output slot each level joins from. Slot 0 is the root table;
    /// slot i + 1 holds the record emitted by level i.
    parent_slots: Vec<usize>,
    /// Whether each level is the last child edge of its parent slot.
    is_last_child: Vec<bool>,
    store: Arc<dyn RecordStore + Send + Sync>,
    start_weight: Weight,
    rng: StdRng,
}

impl std::fmt::Debug for ForkIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForkIndex")
            .field("levels", &self.levels)
            .field("parent_slots", &self.parent_slots)
            .field("is_last_child", &self.is_last_child)
            .field("start_weight", &self.start_weight)
            .field("rng", &self.rng)
            .finish()
    }
}

impl ForkIndex {
    pub(crate) fn from_parts(
        levels: Vec<Level>,
        parent_slots: Vec<usize>,
        is_last_child: Vec<bool>,
        store: Arc<dyn RecordStore + Send + Sync>,
    ) -> Self {
        debug_assert_eq!(levels.len(), parent_slots.len());
        debug_assert_eq!(levels.len(), is_last_child.len());
        Self {
            levels,
            parent_slots,
            is_last_child,
            store,
            start_weight: 0,
            rng: StdRng::seed_from_u64(0),
        }
    }

    /// Reseeds the built-in generator, for reproducible sampling runs.
    pub fn seed_rng(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Total join cardinality N: the size of the rank space.
    #[inline]
    pub fn total(&self) -> Weight {
        self.start_weight
    }

    /// Number of tables a join tuple spans.
    #[inline]
    pub fn number_of_levels(&self) -> usize {
        self.levels.len() + 1
    }

    /// Writes the `rank`-th join tuple into `out`, one record id per
    /// table in DFS emission order. Requires `rank < self.total()`.
    pub fn join_number(&self, rank: Weight, out: &mut Vec<RecordId>) {
        self.walk(rank, out, None);
    }

    /// Like [`ForkIndex::join_number`], also returning the weight each
    /// choice contributed.
    pub fn join_number_with_weights(&self, rank: Weight, out: &mut Vec<RecordId>) -> Vec<Weight> {
        let mut weights = Vec::with_capacity(self.number_of_levels());
        self.walk(rank, out, Some(&mut weights));
        weights
    }

    /// Uniform random tuple via the built-in generator.
    pub fn random_join(&mut self, out: &mut Vec<RecordId>) {
        let rank = self.rng.gen_range(0..self.start_weight);
        self.join_number(rank, out);
    }

    /// Uniform random tuple with weights via the built-in generator.
    pub fn random_join_with_weights(&mut self, out: &mut Vec<RecordId>) -> Vec<Weight> {
        let rank = self.rng.gen_range(0..self.start_weight);
        self.join_number_with_weights(rank, out)
    }

    /// Uniform random tuple from a caller-supplied generator.
    pub fn random_join_from<R: Rng>(&self, rng: &mut R, out: &mut Vec<RecordId>) {
        let rank = rng.gen_range(0..self.start_weight);
        self.join_number(rank, out);
    }

    /// Uniform random tuple with weights from a caller-supplied
    /// generator.
    pub fn random_join_with_weights_from<R: Rng>(
        &self,
        rng: &mut R,
        out: &mut Vec<RecordId>,
    ) -> Vec<Weight> {
        let rank = rng.gen_range(0..self.start_weight);
        self.join_number_with_weights(rank, out)
    }

    /// Batch of `count` random tuples, values and weights in parallel
    /// arrays.
    pub fn generate_data(&mut self, count: usize) -> (Vec<Vec<RecordId>>, Vec<Vec<Weight>>) {
        let mut tuples = Vec::with_capacity(count);
        let mut weights = Vec::with_capacity(count);
        for _ in 0..count {
            let mut out = Vec::with_capacity(self.number_of_levels());
            let w = self.random_join_with_weights(&mut out);
            tuples.push(out);
            weights.push(w);
        }
        (tuples, weights)
    }

    /// One random tuple, values and weights.
    pub fn generate_sample_data(&mut self) -> (Vec<RecordId>, Vec<Weight>) {
        let mut out = Vec::with_capacity(self.number_of_levels());
        let weights = self.random_join_with_weights(&mut out);
        (out, weights)
    }

    /// First record id of tuple `tuple_index`, with the weight span it
    /// sits in.
    pub fn generate_first_entry(&self, tuple_index: Weight) -> (RecordId, Weight) {
        debug_assert!(tuple_index < self.start_weight);
        let (vertex, residual) = self.levels[0].find_start(tuple_index);
        let lhs_idx = (residual / vertex.total()) as usize;
        (vertex.lhs_records()[lhs_idx], vertex.total())
    }

    /// Backwards weight propagation over the tree. Leaf edges count
    /// one per record; a branching level's record weighs the product
    /// of its child-vertex totals, children in builder order.
    pub fn rebuild_initial(&mut self) {
        let n = self.levels.len();
        for i in (0..n).rev() {
            let children: Vec<usize> = (i + 1..n)
                .filter(|&j| self.parent_slots[j] == i + 1)
                .collect();
            if children.is_empty() {
                for (_, vertex) in self.levels[i].iter_vertices_mut() {
                    vertex.rebuild_bottom();
                }
            } else {
                let (head, tail) = self.levels.split_at_mut(i + 1);
                let level = &mut head[i];
                for (_, vertex) in level.iter_vertices_mut() {
                    let raw: Vec<Weight> = vertex
                        .rhs_records()
                        .iter()
                        .map(|&record| {
                            if record.is_tombstone() {
                                return 0;
                            }
                            children
                                .iter()
                                .map(|&j| {
                                    let child = &tail[j - i - 1];
                                    let key = self.store.join_key(
                                        child.left_table(),
                                        record,
                                        child.left_column(),
                                    );
                                    child.vertex(key).map_or(0, Vertex::total)
                                })
                                .product()
                        })
                        .collect();
                    vertex.install_weights(raw);
                    vertex.sort();
                    vertex.purge_zero_weights();
                    vertex.setup_prefix_sum();
                }
            }
            tracing::debug!(
                level = i,
                children = children.len(),
                vertices = self.levels[i].vertex_count(),
                "level weights propagated"
            );
        }
        self.start_weight = self.levels.first().map_or(0, Level::start_weight);
        tracing::info!(
            start_weight = self.start_weight,
            levels = n,
            "rebuild complete"
        );
    }

    /// Point-in-time statistics snapshot.
    pub fn stats(&self) -> IndexStats {
        IndexStats::collect(self.start_weight, &self.levels)
    }

    fn walk(&self, rank: Weight, out: &mut Vec<RecordId>, mut weights: Option<&mut Vec<Weight>>) {
        debug_assert!(
            rank < self.start_weight,
            "rank {rank} out of range for join of size {}",
            self.start_weight
        );
        out.clear();

        let first = &self.levels[0];
        let (vertex, mut residual) = first.find_start(rank);
        let top_total = vertex.total();
        let lhs_idx = (residual / top_total) as usize;
        residual %= top_total;
        out.push(vertex.lhs_records()[lhs_idx]);
        if let Some(w) = weights.as_deref_mut() {
            w.push(top_total);
        }

        let (record, chosen) = vertex.get_record(&mut residual);
        out.push(record);
        if let Some(w) = weights.as_deref_mut() {
            w.push(chosen);
        }

        // Deferred high-order residuals for sibling subtrees not yet
        // walked, innermost group on top.
        let mut pending: Vec<Weight> = Vec::new();
        for i in 1..self.levels.len() {
            let level = &self.levels[i];
            let slot = self.parent_slots[i];
            if slot < i {
                // Ascending: this edge starts the next sibling subtree
                // of an earlier record.
                residual = pending
                    .pop()
                    .expect("sibling subtree without deferred residual");
            }
            let key = self
                .store
                .join_key(level.left_table(), out[slot], level.left_column());
            let vertex = level
                .vertex(key)
                .expect("bridging key has no vertex; index queried before rebuild");
            if !self.is_last_child[i] {
                let total = vertex.total();
                pending.push(residual / total);
                residual %= total;
            }
            let (next_record, next_chosen) = vertex.get_record(&mut residual);
            out.push(next_record);
            if let Some(w) = weights.as_deref_mut() {
                w.push(next_chosen);
            }
        }
        debug_assert!(pending.is_empty(), "unconsumed sibling residuals");
    }
}
