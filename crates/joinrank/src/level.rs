//! One join edge: the vertex map between two adjacent tables.
//!
//! Vertices live in a `BTreeMap` keyed by join value. Sorted-key
//! iteration is what makes rank dispatch at the top level deterministic
//! across runs for identical insertions.

use std::collections::BTreeMap;

use joinrank_types::{ColumnIdx, JoinKey, RecordId, TableId, Weight};

use crate::vertex::Vertex;

/// One join edge, bridging `left_table.left_column =
/// right_table.right_column`.
#[derive(Debug, Clone)]
pub struct Level {
    left_table: TableId,
    left_column: ColumnIdx,
    right_table: TableId,
    right_column: ColumnIdx,
    vertices: BTreeMap<JoinKey, Vertex>,
}

impl Level {
    pub fn new(
        left_table: TableId,
        left_column: ColumnIdx,
        right_table: TableId,
        right_column: ColumnIdx,
    ) -> Self {
        Self {
            left_table,
            left_column,
            right_table,
            right_column,
            vertices: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn left_table(&self) -> TableId {
        self.left_table
    }

    #[inline]
    pub fn left_column(&self) -> ColumnIdx {
        self.left_column
    }

    #[inline]
    pub fn right_table(&self) -> TableId {
        self.right_table
    }

    #[inline]
    pub fn right_column(&self) -> ColumnIdx {
        self.right_column
    }

    #[inline]
    pub fn vertex(&self, key: JoinKey) -> Option<&Vertex> {
        self.vertices.get(&key)
    }

    /// Mutable vertex access, for seeding custom weights through the
    /// RHS cursor before a rebuild. Mutation invalidates readers.
    #[inline]
    pub fn vertex_mut(&mut self, key: JoinKey) -> Option<&mut Vertex> {
        self.vertices.get_mut(&key)
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn iter_vertices(&self) -> impl Iterator<Item = (JoinKey, &Vertex)> {
        self.vertices.iter().map(|(&k, v)| (k, v))
    }

    pub(crate) fn iter_vertices_mut(&mut self) -> impl Iterator<Item = (JoinKey, &mut Vertex)> {
        self.vertices.iter_mut().map(|(&k, v)| (k, v))
    }

    /// Inserts a left-table record under `key`, creating the vertex if
    /// absent.
    pub fn insert_lhs(&mut self, key: JoinKey, record: RecordId) {
        self.vertices.entry(key).or_default().insert_lhs(record);
    }

    /// Inserts a right-table record under `key` with a provisional
    /// completion weight; rebuild recomputes weights from scratch.
    pub fn insert_rhs(&mut self, key: JoinKey, record: RecordId, weight: Weight) {
        self.vertices
            .entry(key)
            .or_default()
            .insert_rhs(record, weight);
    }

    /// Removes one LHS occurrence under `key`; silent no-op when the
    /// vertex or record is absent.
    pub fn delete_lhs(&mut self, key: JoinKey, record: RecordId) {
        if let Some(vertex) = self.vertices.get_mut(&key) {
            vertex.delete_lhs(record);
        }
    }

    /// Removes one RHS occurrence under `key`; silent no-op when the
    /// vertex or record is absent.
    pub fn delete_rhs(&mut self, key: JoinKey, record: RecordId) {
        if let Some(vertex) = self.vertices.get_mut(&key) {
            vertex.delete_rhs(record);
        }
    }

    /// Total rank space this level contributes when it is the top of
    /// the chain: each vertex covers `total × |lhs|` ranks.
    pub fn start_weight(&self) -> Weight {
        self.vertices
            .values()
            .map(|v| v.total() * v.lhs_outdegree() as Weight)
            .sum()
    }

    /// Top-level rank dispatch: walks vertices in key order until the
    /// running `total × |lhs|` sum covers `rank`, returning the chosen
    /// vertex and the residual within its span.
    ///
    /// The caller must guarantee `rank < self.start_weight()`.
    pub fn find_start(&self, mut rank: Weight) -> (&Vertex, Weight) {
        for vertex in self.vertices.values() {
            let span = vertex.total() * vertex.lhs_outdegree() as Weight;
            if rank < span {
                return (vertex, rank);
            }
            rank -= span;
        }
        unreachable!("rank beyond level start weight; index queried before rebuild")
    }

    /// Join value owning the given top-level rank; the key-valued twin
    /// of [`Level::find_start`].
    pub fn get_join_value(&self, mut rank: Weight) -> JoinKey {
        for (key, vertex) in &self.vertices {
            let span = vertex.total() * vertex.lhs_outdegree() as Weight;
            if rank < span {
                return *key;
            }
            rank -= span;
        }
        unreachable!("rank beyond level start weight; index queried before rebuild")
    }

    /// Largest LHS bucket across vertices.
    pub fn max_lhs_outdegree(&self) -> usize {
        self.vertices
            .values()
            .map(Vertex::lhs_outdegree)
            .max()
            .unwrap_or(0)
    }

    /// Largest RHS bucket across vertices.
    pub fn max_rhs_outdegree(&self) -> usize {
        self.vertices
            .values()
            .map(Vertex::rhs_outdegree)
            .max()
            .unwrap_or(0)
    }

    pub(crate) fn lhs_record_count(&self) -> usize {
        self.vertices.values().map(Vertex::lhs_outdegree).sum()
    }

    pub(crate) fn rhs_record_count(&self) -> usize {
        self.vertices.values().map(Vertex::rhs_outdegree).sum()
    }

    /// Trace-level dump of per-vertex weights, for chasing skew while
    /// debugging rank walks.
    pub fn dump_weights(&self) {
        for (key, vertex) in &self.vertices {
            tracing::trace!(
                key = key.get(),
                total = vertex.total(),
                lhs = vertex.lhs_outdegree(),
                rhs = vertex.rhs_outdegree(),
                "vertex weight"
            );
        }
    }
}
