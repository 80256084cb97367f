//! Whole-index invariant tests over randomized table data.
//!
//! Covers:
//! 1. Rank enumeration is a bijection onto the nested-loop join result
//! 2. Prefix-sum invariants hold in every steady-state vertex
//! 3. Rebuild is idempotent absent mutation
//! 4. Delete followed by rebuild matches the reference on the
//!    remaining rows
//! 5. Fork enumeration matches the nested-loop tree join

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use crate::builder::{ForkBuilder, IndexBuilder};
    use crate::fork::ForkIndex;
    use crate::linear::LinearIndex;
    use crate::store::MemoryRecordStore;
    use joinrank_types::{ColumnIdx, JoinKey, RecordId, TableId, Weight};

    const T0: TableId = TableId::new(0);
    const T1: TableId = TableId::new(1);
    const T2: TableId = TableId::new(2);
    const T3: TableId = TableId::new(3);

    fn rid(raw: i64) -> RecordId {
        RecordId::new(raw)
    }

    /// T0(k) ⋈ T1(k, m) ⋈ T2(m), record ids offset per table.
    fn build_chain(t0: &[i64], t1: &[(i64, i64)], t2: &[i64]) -> LinearIndex {
        let mut store = MemoryRecordStore::new();
        store.add_table(T0, 1);
        store.add_table(T1, 2);
        store.add_table(T2, 1);
        for (i, &k) in t0.iter().enumerate() {
            store.insert_row(T0, rid(i as i64), vec![JoinKey::new(k)]);
        }
        for (i, &(k, m)) in t1.iter().enumerate() {
            store.insert_row(
                T1,
                rid(100 + i as i64),
                vec![JoinKey::new(k), JoinKey::new(m)],
            );
        }
        for (i, &m) in t2.iter().enumerate() {
            store.insert_row(T2, rid(200 + i as i64), vec![JoinKey::new(m)]);
        }
        IndexBuilder::new()
            .append_level(T0, ColumnIdx::new(0), T1, ColumnIdx::new(0))
            .append_level(T1, ColumnIdx::new(1), T2, ColumnIdx::new(0))
            .build(Arc::new(store))
            .unwrap()
    }

    /// Nested-loop reference for the same chain.
    fn chain_reference(
        t0: &[i64],
        t1: &[(i64, i64)],
        t2: &[i64],
    ) -> Vec<(RecordId, RecordId, RecordId)> {
        let mut tuples = Vec::new();
        for (i0, &k0) in t0.iter().enumerate() {
            for (i1, &(k1, m1)) in t1.iter().enumerate() {
                if k0 != k1 {
                    continue;
                }
                for (i2, &m2) in t2.iter().enumerate() {
                    if m1 == m2 {
                        tuples.push((
                            rid(i0 as i64),
                            rid(100 + i1 as i64),
                            rid(200 + i2 as i64),
                        ));
                    }
                }
            }
        }
        tuples.sort();
        tuples
    }

    fn enumerate_chain(index: &LinearIndex) -> Vec<(RecordId, RecordId, RecordId)> {
        let mut tuples = Vec::new();
        let mut out = Vec::new();
        for rank in 0..index.total() {
            index.join_number(rank, &mut out);
            tuples.push((out[0], out[1], out[2]));
        }
        tuples.sort();
        tuples
    }

    fn assert_vertex_invariants(index: &LinearIndex) {
        for level in index.levels() {
            for (key, vertex) in level.iter_vertices() {
                let Some(weights) = vertex.rhs_weights() else {
                    continue;
                };
                if weights.is_empty() {
                    assert_eq!(vertex.total(), 0, "key {key}: empty weights need zero total");
                    continue;
                }
                assert_eq!(weights[0], 0, "key {key}: prefix must start at zero");
                assert!(
                    weights.windows(2).all(|w| w[0] <= w[1]),
                    "key {key}: prefix must be non-decreasing"
                );
                assert!(
                    vertex.total() >= *weights.last().unwrap(),
                    "key {key}: total below last prefix entry"
                );
                assert!(
                    weights.len() <= vertex.rhs_outdegree(),
                    "key {key}: more weights than records"
                );
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_chain_enumeration_matches_nested_loop(
            t0 in proptest::collection::vec(0..4_i64, 0..6),
            t1 in proptest::collection::vec((0..4_i64, 0..4_i64), 0..8),
            t2 in proptest::collection::vec(0..4_i64, 0..6),
        ) {
            let index = build_chain(&t0, &t1, &t2);
            let reference = chain_reference(&t0, &t1, &t2);

            prop_assert_eq!(index.total(), reference.len() as Weight);
            let enumerated = enumerate_chain(&index);
            prop_assert_eq!(&enumerated, &reference);

            // Distinct ranks, distinct tuples: the reference has no
            // duplicates because record ids are unique per table.
            let mut dedup = enumerated.clone();
            dedup.dedup();
            prop_assert_eq!(dedup.len(), enumerated.len());

            assert_vertex_invariants(&index);
        }

        #[test]
        fn prop_rebuild_is_idempotent(
            t0 in proptest::collection::vec(0..3_i64, 0..5),
            t1 in proptest::collection::vec((0..3_i64, 0..3_i64), 0..6),
            t2 in proptest::collection::vec(0..3_i64, 0..5),
        ) {
            let mut index = build_chain(&t0, &t1, &t2);
            let before_total = index.total();
            let before = enumerate_chain(&index);
            index.rebuild_initial();
            prop_assert_eq!(index.total(), before_total);
            prop_assert_eq!(enumerate_chain(&index), before);
        }

        #[test]
        fn prop_delete_then_rebuild_matches_reference(
            t0 in proptest::collection::vec(0..3_i64, 1..5),
            t1 in proptest::collection::vec((0..3_i64, 0..3_i64), 1..6),
            t2 in proptest::collection::vec(0..3_i64, 1..5),
            victim in 0..6_usize,
        ) {
            let mut index = build_chain(&t0, &t1, &t2);
            let victim = victim % t1.len();

            index.delete(T1, rid(100 + victim as i64));

            // The reference must keep the surviving ids stable, so it
            // skips the victim in place rather than reindexing.
            let mut reference = Vec::new();
            for (i0, &k0) in t0.iter().enumerate() {
                for (i1, &(k1, m1)) in t1.iter().enumerate() {
                    if i1 == victim || k0 != k1 {
                        continue;
                    }
                    for (i2, &m2) in t2.iter().enumerate() {
                        if m1 == m2 {
                            reference.push((
                                rid(i0 as i64),
                                rid(100 + i1 as i64),
                                rid(200 + i2 as i64),
                            ));
                        }
                    }
                }
            }
            reference.sort();

            prop_assert_eq!(index.total(), reference.len() as Weight);
            prop_assert_eq!(enumerate_chain(&index), reference);
            assert_vertex_invariants(&index);
        }

        #[test]
        fn prop_fork_enumeration_matches_nested_loop(
            t0 in proptest::collection::vec(0..3_i64, 0..4),
            t1 in proptest::collection::vec((0..3_i64, 0..3_i64, 0..3_i64), 0..5),
            t2 in proptest::collection::vec(0..3_i64, 0..4),
            t3 in proptest::collection::vec(0..3_i64, 0..4),
        ) {
            let index = build_fork(&t0, &t1, &t2, &t3);

            let mut reference = Vec::new();
            for (i0, &k0) in t0.iter().enumerate() {
                for (i1, &(k1, a1, b1)) in t1.iter().enumerate() {
                    if k0 != k1 {
                        continue;
                    }
                    for (i2, &a2) in t2.iter().enumerate() {
                        if a1 != a2 {
                            continue;
                        }
                        for (i3, &b3) in t3.iter().enumerate() {
                            if b1 == b3 {
                                reference.push(vec![
                                    rid(i0 as i64),
                                    rid(100 + i1 as i64),
                                    rid(200 + i2 as i64),
                                    rid(300 + i3 as i64),
                                ]);
                            }
                        }
                    }
                }
            }
            reference.sort();

            prop_assert_eq!(index.total(), reference.len() as Weight);
            let mut enumerated = Vec::new();
            let mut out = Vec::new();
            for rank in 0..index.total() {
                index.join_number(rank, &mut out);
                enumerated.push(out.clone());
            }
            enumerated.sort();
            prop_assert_eq!(enumerated, reference);
        }
    }

    /// T0(k) ⋈ T1(k, a, b); T1.a ⋈ T2.a; T1.b ⋈ T3.b.
    fn build_fork(t0: &[i64], t1: &[(i64, i64, i64)], t2: &[i64], t3: &[i64]) -> ForkIndex {
        let mut store = MemoryRecordStore::new();
        store.add_table(T0, 1);
        store.add_table(T1, 3);
        store.add_table(T2, 1);
        store.add_table(T3, 1);
        for (i, &k) in t0.iter().enumerate() {
            store.insert_row(T0, rid(i as i64), vec![JoinKey::new(k)]);
        }
        for (i, &(k, a, b)) in t1.iter().enumerate() {
            store.insert_row(
                T1,
                rid(100 + i as i64),
                vec![JoinKey::new(k), JoinKey::new(a), JoinKey::new(b)],
            );
        }
        for (i, &a) in t2.iter().enumerate() {
            store.insert_row(T2, rid(200 + i as i64), vec![JoinKey::new(a)]);
        }
        for (i, &b) in t3.iter().enumerate() {
            store.insert_row(T3, rid(300 + i as i64), vec![JoinKey::new(b)]);
        }
        ForkBuilder::new()
            .append_level(T0, ColumnIdx::new(0), T1, ColumnIdx::new(0), 0, true)
            .append_level(T1, ColumnIdx::new(1), T2, ColumnIdx::new(0), 1, false)
            .append_level(T1, ColumnIdx::new(2), T3, ColumnIdx::new(0), 1, true)
            .build(Arc::new(store))
            .unwrap()
    }

    /// An empty table anywhere in the chain empties the whole join.
    #[test]
    fn test_empty_middle_table() {
        let index = build_chain(&[1, 2], &[], &[1, 2]);
        assert_eq!(index.total(), 0);
    }

    /// Keys with no partner on the other side are pruned from the rank
    /// space entirely.
    #[test]
    fn test_unmatched_keys_prune() {
        let index = build_chain(&[0, 1], &[(0, 0), (2, 0)], &[0]);
        // Only T0 row 0 joins T1 row 100; T1 row 101 has key 2 with no
        // partner in T0 but still matches T2, so it stays in level 1's
        // buckets while contributing no rank.
        assert_eq!(index.total(), 1);
        let mut out = Vec::new();
        index.join_number(0, &mut out);
        assert_eq!(out, vec![rid(0), rid(100), rid(200)]);
        assert_vertex_invariants(&index);
    }
}
