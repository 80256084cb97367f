//! Point-in-time statistics over a built index.
//!
//! Snapshots are plain serializable data so a host can ship them to
//! whatever monitoring it runs; nothing here holds a borrow into the
//! index.

use serde::Serialize;

use joinrank_types::Weight;

use crate::level::Level;

/// Statistics for one level.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LevelStats {
    /// Position in the chain / DFS order, 0-based.
    pub level: usize,
    /// Distinct join-key values.
    pub vertex_count: usize,
    /// LHS records summed over vertices.
    pub lhs_records: usize,
    /// RHS records summed over vertices (tombstones included).
    pub rhs_records: usize,
    /// Largest LHS bucket.
    pub max_outdegree: usize,
    /// Largest RHS bucket.
    pub max_indegree: usize,
}

/// Statistics for a whole index.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IndexStats {
    /// Total join cardinality (the rank-space size).
    pub start_weight: Weight,
    pub levels: Vec<LevelStats>,
}

impl IndexStats {
    pub(crate) fn collect(start_weight: Weight, levels: &[Level]) -> Self {
        Self {
            start_weight,
            levels: levels
                .iter()
                .enumerate()
                .map(|(i, level)| LevelStats {
                    level: i,
                    vertex_count: level.vertex_count(),
                    lhs_records: level.lhs_record_count(),
                    rhs_records: level.rhs_record_count(),
                    max_outdegree: level.max_lhs_outdegree(),
                    max_indegree: level.max_rhs_outdegree(),
                })
                .collect(),
        }
    }
}
