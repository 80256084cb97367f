//! Chain-shaped index: rank walk, sampling, and weight propagation.
//!
//! Levels L0..Ln-1 bridge n+1 tables. Construction fills the record
//! buckets; [`LinearIndex::rebuild_initial`] then propagates completion
//! weights backwards so that every rank in `[0, start_weight)` maps to
//! exactly one join tuple. After rebuild the structure is immutable and
//! any number of readers may walk it concurrently, each with its own
//! random generator.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use joinrank_types::{RecordId, TableId, Weight};

use crate::level::Level;
use crate::stats::IndexStats;
use crate::store::RecordStore;
use crate::vertex::Vertex;

/// Rank-addressable index over a chain of equi-joins.
pub struct LinearIndex {
    levels: Vec<Level>,
    store: Arc<dyn RecordStore + Send + Sync>,
    start_weight: Weight,
    /// Built-in generator for the convenience sampling calls. Not
    /// shared across readers; concurrent readers pass their own via
    /// [`LinearIndex::random_join_from`].
    rng: StdRng,
    postpone_rebuild: bool,
}

impl std::fmt::Debug for LinearIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinearIndex")
            .field("levels", &self.levels)
            .field("start_weight", &self.start_weight)
            .field("rng", &self.rng)
            .field("postpone_rebuild", &self.postpone_rebuild)
            .finish()
    }
}

impl LinearIndex {
    pub(crate) fn from_levels(
        levels: Vec<Level>,
        store: Arc<dyn RecordStore + Send + Sync>,
    ) -> Self {
        Self {
            levels,
            store,
            start_weight: 0,
            rng: StdRng::seed_from_u64(0),
            postpone_rebuild: false,
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

    #[inline]
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Mutable level access, for seeding custom completion weights
    /// before a rebuild. Mutation invalidates in-flight readers.
    #[inline]
    pub fn level_mut(&mut self, index: usize) -> &mut Level {
        &mut self.levels[index]
    }

    /// Defer weight propagation while a batch of inserts or deletes is
    /// applied; call [`LinearIndex::rebuild_initial`] when done.
    pub fn set_postpone_rebuild(&mut self, value: bool) {
        self.postpone_rebuild = value;
    }

    /// Writes the `rank`-th join tuple into `out`, one record id per
    /// table. Requires `rank < self.total()` and a rebuilt index.
    pub fn join_number(&self, rank: Weight, out: &mut Vec<RecordId>) {
        self.walk(rank, out, None);
    }

    /// Like [`LinearIndex::join_number`], also returning the weight
    /// each choice contributed: the top vertex total for the first
    /// entry, then the chosen record's completion weight per level.
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

    /// Uniform random tuple from a caller-supplied generator; the
    /// shared-reader form.
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
    /// sits in. Lets a pager stream the leading column without walking
    /// whole tuples.
    pub fn generate_first_entry(&self, tuple_index: Weight) -> (RecordId, Weight) {
        debug_assert!(tuple_index < self.start_weight);
        let (vertex, residual) = self.levels[0].find_start(tuple_index);
        let lhs_idx = (residual / vertex.total()) as usize;
        (vertex.lhs_records()[lhs_idx], vertex.total())
    }

    /// Adds `record` of `table` to every level the table participates
    /// in. Repeated inserts of the same record are not idempotent:
    /// each one adds an occurrence. Rebuilds unless postponed.
    pub fn insert(&mut self, table: TableId, record: RecordId) {
        for level in &mut self.levels {
            if level.left_table() == table {
                let key = self.store.join_key(table, record, level.left_column());
                level.insert_lhs(key, record);
            }
            if level.right_table() == table {
                let key = self.store.join_key(table, record, level.right_column());
                level.insert_rhs(key, record, 1);
            }
        }
        if !self.postpone_rebuild {
            self.rebuild_initial();
        }
    }

    /// Removes one occurrence of `record` from every level the table
    /// participates in. RHS removals tombstone in place so prefix sums
    /// stay valid until rebuild. Rebuilds unless postponed.
    pub fn delete(&mut self, table: TableId, record: RecordId) {
        for level in &mut self.levels {
            if level.left_table() == table {
                let key = self.store.join_key(table, record, level.left_column());
                level.delete_lhs(key, record);
            }
            if level.right_table() == table {
                let key = self.store.join_key(table, record, level.right_column());
                level.delete_rhs(key, record);
            }
        }
        if !self.postpone_rebuild {
            self.rebuild_initial();
        }
    }

    /// Backwards weight propagation. The bottom level counts one per
    /// RHS record (or keeps explicitly assigned weights); every level
    /// above takes each RHS record's weight from the next level's
    /// vertex total under that record's bridging value. Idempotent
    /// when no mutation happened in between.
    pub fn rebuild_initial(&mut self) {
        let n = self.levels.len();
        for i in (0..n).rev() {
            if i + 1 == n {
                for (_, vertex) in self.levels[i].iter_vertices_mut() {
                    vertex.rebuild_bottom();
                }
            } else {
                let (head, tail) = self.levels.split_at_mut(i + 1);
                let level = &mut head[i];
                let next = &tail[0];
                for (_, vertex) in level.iter_vertices_mut() {
                    let raw: Vec<Weight> = vertex
                        .rhs_records()
                        .iter()
                        .map(|&record| {
                            if record.is_tombstone() {
                                return 0;
                            }
                            let key =
                                self.store
                                    .join_key(next.left_table(), record, next.left_column());
                            next.vertex(key).map_or(0, Vertex::total)
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

    /// Largest LHS bucket at the top level.
    pub fn max_outdegree(&self) -> usize {
        self.levels.first().map_or(0, Level::max_lhs_outdegree)
    }

    /// Largest RHS bucket at the top level.
    pub fn max_indegree(&self) -> usize {
        self.levels.first().map_or(0, Level::max_rhs_outdegree)
    }

    /// Trace-level dump of top-level vertex weights.
    pub fn dump_search_weights(&self) {
        if let Some(level) = self.levels.first() {
            level.dump_weights();
        }
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

        let (mut record, chosen) = vertex.get_record(&mut residual);
        out.push(record);
        if let Some(w) = weights.as_deref_mut() {
            w.push(chosen);
        }

        for level in &self.levels[1..] {
            let key = self
                .store
                .join_key(level.left_table(), record, level.left_column());
            let vertex = level
                .vertex(key)
                .expect("bridging key has no vertex; index mutated without rebuild");
            let (next_record, next_chosen) = vertex.get_record(&mut residual);
            out.push(next_record);
            if let Some(w) = weights.as_deref_mut() {
                w.push(next_chosen);
            }
            record = next_record;
        }
        // A custom-weighted bottom record covers several ranks; the
        // leftover residual is that tuple's intra-weight offset and is
        // deliberately dropped here.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IndexBuilder;
    use crate::store::MemoryRecordStore;
    use joinrank_types::{ColumnIdx, JoinKey, TableId};

    fn rid(raw: i64) -> RecordId {
        RecordId::new(raw)
    }

    /// T0(id, k) ⋈ T1(id, k, m) ⋈ T2(id, m): scenario 3 shape.
    fn three_chain() -> (Arc<MemoryRecordStore>, LinearIndex) {
        let mut store = MemoryRecordStore::new();
        let (t0, t1, t2) = (TableId::new(0), TableId::new(1), TableId::new(2));
        store.add_table(t0, 1);
        store.add_table(t1, 2);
        store.add_table(t2, 1);
        store.insert_row(t0, rid(1), vec![JoinKey::new(100)]);
        store.insert_row(t1, rid(20), vec![JoinKey::new(100), JoinKey::new(200)]);
        store.insert_row(t1, rid(21), vec![JoinKey::new(100), JoinKey::new(200)]);
        store.insert_row(t2, rid(30), vec![JoinKey::new(200)]);
        store.insert_row(t2, rid(31), vec![JoinKey::new(200)]);
        let store = Arc::new(store);

        let index = IndexBuilder::new()
            .append_level(t0, ColumnIdx::new(0), t1, ColumnIdx::new(0))
            .append_level(t1, ColumnIdx::new(1), t2, ColumnIdx::new(0))
            .build(Arc::clone(&store) as Arc<dyn RecordStore + Send + Sync>)
            .unwrap();
        (store, index)
    }

    #[test]
    fn test_three_chain_total_and_enumeration() {
        let (_store, index) = three_chain();
        assert_eq!(index.total(), 4);
        assert_eq!(index.number_of_levels(), 3);

        let mut seen = Vec::new();
        let mut out = Vec::new();
        for rank in 0..index.total() {
            index.join_number(rank, &mut out);
            assert_eq!(out.len(), 3);
            assert_eq!(out[0], rid(1));
            seen.push((out[1], out[2]));
        }
        seen.sort();
        assert_eq!(
            seen,
            vec![
                (rid(20), rid(30)),
                (rid(20), rid(31)),
                (rid(21), rid(30)),
                (rid(21), rid(31)),
            ]
        );
    }

    #[test]
    fn test_weights_report_vertex_total_then_choices() {
        let (_store, index) = three_chain();
        let mut out = Vec::new();
        let weights = index.join_number_with_weights(0, &mut out);
        // Top vertex total is 4 (two T1 records × two completions),
        // the T1 choice covers 2 completions, the T2 choice 1.
        assert_eq!(weights, vec![4, 2, 1]);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let (_store, mut index) = three_chain();
        let mut before = Vec::new();
        for rank in 0..index.total() {
            let mut out = Vec::new();
            index.join_number(rank, &mut out);
            before.push(out);
        }
        index.rebuild_initial();
        assert_eq!(index.total(), 4);
        for (rank, expected) in before.iter().enumerate() {
            let mut out = Vec::new();
            index.join_number(rank as Weight, &mut out);
            assert_eq!(&out, expected, "tuple changed at rank {rank}");
        }
    }

    #[test]
    fn test_delete_then_rebuild_shrinks_rank_space() {
        let (_store, mut index) = three_chain();
        index.delete(TableId::new(1), rid(21));
        assert_eq!(index.total(), 2);
        let mut out = Vec::new();
        for rank in 0..2 {
            index.join_number(rank, &mut out);
            assert_eq!(out[1], rid(20));
        }
    }

    #[test]
    fn test_duplicate_insert_is_not_idempotent() {
        let (_store, mut index) = three_chain();
        index.insert(TableId::new(2), rid(30));
        // T2 now holds {30, 30, 31}: 1 × 2 × 3 tuples.
        assert_eq!(index.total(), 6);
        let mut hits = 0;
        let mut out = Vec::new();
        for rank in 0..index.total() {
            index.join_number(rank, &mut out);
            if out[2] == rid(30) {
                hits += 1;
            }
        }
        assert_eq!(hits, 4, "duplicated record must cover twice the ranks");
    }

    #[test]
    fn test_postponed_rebuild_batches_work() {
        let (_store, mut index) = three_chain();
        index.set_postpone_rebuild(true);
        index.delete(TableId::new(2), rid(30));
        index.delete(TableId::new(2), rid(31));
        // Weights untouched so far.
        assert_eq!(index.total(), 4);
        index.set_postpone_rebuild(false);
        index.rebuild_initial();
        assert_eq!(index.total(), 0);
    }

    #[test]
    fn test_degree_diagnostics() {
        let (_store, index) = three_chain();
        assert_eq!(index.max_outdegree(), 1);
        assert_eq!(index.max_indegree(), 2);
    }

    #[test]
    fn test_generate_first_entry_matches_walk() {
        let (_store, index) = three_chain();
        let mut out = Vec::new();
        for rank in 0..index.total() {
            index.join_number(rank, &mut out);
            let (first, span) = index.generate_first_entry(rank);
            assert_eq!(first, out[0]);
            assert_eq!(span, 4);
        }
    }

    #[test]
    fn test_random_join_stays_in_result_set() {
        let (_store, mut index) = three_chain();
        index.seed_rng(7);
        let (tuples, weights) = index.generate_data(32);
        assert_eq!(tuples.len(), 32);
        for (tuple, w) in tuples.iter().zip(&weights) {
            assert_eq!(tuple.len(), 3);
            assert_eq!(w.len(), 3);
            assert_eq!(tuple[0], rid(1));
        }
    }

    #[test]
    fn test_reader_owned_generator() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;
        let (_store, index) = three_chain();
        let mut rng = StdRng::seed_from_u64(42);
        let mut out = Vec::new();
        index.random_join_from(&mut rng, &mut out);
        assert_eq!(out.len(), 3);
        let w = index.random_join_with_weights_from(&mut rng, &mut out);
        assert_eq!(w.len(), 3);
    }
}
