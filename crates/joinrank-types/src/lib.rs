//! Shared identifier and weight types for the joinrank index.
//!
//! Keeping the id types in their own crate gives the index core and any
//! host integration the same vocabulary without a dependency cycle. All
//! ids are thin newtypes so that a table id can never be passed where a
//! record id is expected.

use std::fmt;

/// Identifier for a base table participating in the join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[repr(transparent)]
pub struct TableId(u32);

impl TableId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Zero-based column index within a base table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[repr(transparent)]
pub struct ColumnIdx(u32);

impl ColumnIdx {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ColumnIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for one row of a base table.
///
/// Record ids are signed so that [`RecordId::TOMBSTONE`] can mark a slot
/// whose row was deleted while the surrounding prefix sums are kept
/// intact until the next rebuild compacts the vertex.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct RecordId(i64);

impl RecordId {
    /// Sentinel for a deleted slot awaiting compaction.
    pub const TOMBSTONE: Self = Self(-1);

    #[inline]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Whether this slot holds the deletion sentinel rather than a row.
    #[inline]
    pub const fn is_tombstone(self) -> bool {
        self.0 == Self::TOMBSTONE.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value of a join attribute. Shares the 64-bit integer domain with
/// record ids but is a distinct type: a key is compared, never
/// dereferenced.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct JoinKey(i64);

impl JoinKey {
    #[inline]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for JoinKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Completion weight / join cardinality. Wide enough to hold the total
/// tuple count of the join, which is what the top level sums to.
pub type Weight = u64;
