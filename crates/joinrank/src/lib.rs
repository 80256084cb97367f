//! Rank-addressable sampling index over chains and trees of equi-joins.
//!
//! Given tables T0..Tn connected by equi-join predicates, the index
//! assigns every tuple of the (never materialized) join result a
//! deterministic rank in `[0, N)` and answers two queries in
//! O(levels · log) time: the k-th tuple, and a uniformly random tuple.
//!
//! The machinery is a per-level weighted vertex map: each distinct join
//! value owns the matching records of both adjacent tables, and each
//! right-side record carries the count of join completions below it as
//! a prefix sum. Rebuilding propagates those counts from the last level
//! backwards; a lookup peels one level per step, binary-searching the
//! prefix sums.
//!
//! # Threading
//!
//! Single writer, then immutable. After [`LinearIndex::rebuild_initial`]
//! any number of readers may walk the index concurrently as long as each
//! brings its own random generator (`random_join_from`). The built-in
//! generator is a convenience for single-threaded use only.

pub mod builder;
pub mod fork;
pub mod level;
pub mod linear;
pub mod stats;
pub mod store;
pub mod vertex;

#[cfg(test)]
mod index_invariant_tests;

pub use builder::{ForkBuilder, IndexBuilder};
pub use fork::ForkIndex;
pub use level::Level;
pub use linear::LinearIndex;
pub use stats::{IndexStats, LevelStats};
pub use store::{MemoryRecordStore, RecordStore};
pub use vertex::{LhsCursor, RhsCursor, Vertex, VertexCursor};

pub use joinrank_error::JoinrankError;
pub use joinrank_types::{ColumnIdx, JoinKey, RecordId, TableId, Weight};
