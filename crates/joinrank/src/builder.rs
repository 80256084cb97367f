//! Construction protocol for both index shapes.
//!
//! A builder collects the join edges, validates them, then drives the
//! standard population sequence: postpone rebuild, insert every record
//! of every participating table, rebuild once at the end. The finished
//! index is handed to consumers as immutable.

use std::collections::BTreeSet;
use std::sync::Arc;

use joinrank_error::JoinrankError;
use joinrank_types::{ColumnIdx, TableId};

use crate::fork::ForkIndex;
use crate::level::Level;
use crate::linear::LinearIndex;
use crate::store::RecordStore;

#[derive(Debug, Clone, Copy)]
struct EdgeSpec {
    left_table: TableId,
    left_column: ColumnIdx,
    right_table: TableId,
    right_column: ColumnIdx,
}

/// Builder for a chain-shaped [`LinearIndex`].
#[derive(Debug, Default)]
pub struct IndexBuilder {
    edges: Vec<EdgeSpec>,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the next join edge of the chain:
    /// `left_table.left_column = right_table.right_column`.
    pub fn append_level(
        mut self,
        left_table: TableId,
        left_column: ColumnIdx,
        right_table: TableId,
        right_column: ColumnIdx,
    ) -> Self {
        self.edges.push(EdgeSpec {
            left_table,
            left_column,
            right_table,
            right_column,
        });
        self
    }

    /// Validates the chain, populates the levels from `store`, and
    /// returns a rebuilt index.
    pub fn build(
        self,
        store: Arc<dyn RecordStore + Send + Sync>,
    ) -> Result<LinearIndex, JoinrankError> {
        if self.edges.is_empty() {
            return Err(JoinrankError::EmptyJoin);
        }
        for (i, edge) in self.edges.iter().enumerate() {
            check_tables(store.as_ref(), edge)?;
            if i > 0 && edge.left_table != self.edges[i - 1].right_table {
                return Err(JoinrankError::ParentTableMismatch {
                    level: i,
                    slot: i,
                    expected: self.edges[i - 1].right_table,
                    actual: edge.left_table,
                });
            }
        }

        let levels = self
            .edges
            .iter()
            .map(|e| Level::new(e.left_table, e.left_column, e.right_table, e.right_column))
            .collect();
        let mut index = LinearIndex::from_levels(levels, Arc::clone(&store));
        index.set_postpone_rebuild(true);
        for table in participating_tables(&self.edges) {
            let records = store.record_ids(table);
            tracing::debug!(table = table.get(), records = records.len(), "loading table");
            for record in records {
                index.insert(table, record);
            }
        }
        index.set_postpone_rebuild(false);
        index.rebuild_initial();
        Ok(index)
    }
}

/// Builder for a tree-shaped [`ForkIndex`].
///
/// Edges must arrive in DFS order: each edge names the output slot its
/// bridging value is read from, and whether it is the last child edge
/// hanging off that slot.
#[derive(Debug, Default)]
pub struct ForkBuilder {
    edges: Vec<EdgeSpec>,
    parent_slots: Vec<usize>,
    is_last_child: Vec<bool>,
}

impl ForkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the next edge of the DFS linearization. `parent_slot`
    /// is the output position holding the record this edge joins from;
    /// `last_child` closes the sibling group of that slot.
    pub fn append_level(
        mut self,
        left_table: TableId,
        left_column: ColumnIdx,
        right_table: TableId,
        right_column: ColumnIdx,
        parent_slot: usize,
        last_child: bool,
    ) -> Self {
        self.edges.push(EdgeSpec {
            left_table,
            left_column,
            right_table,
            right_column,
        });
        self.parent_slots.push(parent_slot);
        self.is_last_child.push(last_child);
        self
    }

    pub fn build(
        self,
        store: Arc<dyn RecordStore + Send + Sync>,
    ) -> Result<ForkIndex, JoinrankError> {
        if self.edges.is_empty() {
            return Err(JoinrankError::EmptyJoin);
        }
        for (i, edge) in self.edges.iter().enumerate() {
            check_tables(store.as_ref(), edge)?;
            let slot = self.parent_slots[i];
            // Slot 0 feeds the root edge only; every later edge joins
            // from a record slot already emitted when it is walked.
            let valid = if i == 0 { slot == 0 } else { (1..=i).contains(&slot) };
            if !valid {
                return Err(JoinrankError::InvalidParentSlot { level: i, slot });
            }
            let slot_table = if slot == 0 {
                self.edges[0].left_table
            } else {
                self.edges[slot - 1].right_table
            };
            if edge.left_table != slot_table {
                return Err(JoinrankError::ParentTableMismatch {
                    level: i,
                    slot,
                    expected: slot_table,
                    actual: edge.left_table,
                });
            }
        }

        let mut levels: Vec<Level> = self
            .edges
            .iter()
            .map(|e| Level::new(e.left_table, e.left_column, e.right_table, e.right_column))
            .collect();
        for table in participating_tables(&self.edges) {
            let records = store.record_ids(table);
            tracing::debug!(table = table.get(), records = records.len(), "loading table");
            for record in records {
                for level in &mut levels {
                    if level.left_table() == table {
                        let key = store.join_key(table, record, level.left_column());
                        level.insert_lhs(key, record);
                    }
                    if level.right_table() == table {
                        let key = store.join_key(table, record, level.right_column());
                        level.insert_rhs(key, record, 1);
                    }
                }
            }
        }

        let mut index = ForkIndex::from_parts(levels, self.parent_slots, self.is_last_child, store);
        index.rebuild_initial();
        Ok(index)
    }
}

fn check_tables(store: &dyn RecordStore, edge: &EdgeSpec) -> Result<(), JoinrankError> {
    for table in [edge.left_table, edge.right_table] {
        if !store.contains_table(table) {
            return Err(JoinrankError::UnknownTable { table });
        }
    }
    Ok(())
}

fn participating_tables(edges: &[EdgeSpec]) -> BTreeSet<TableId> {
    edges
        .iter()
        .flat_map(|e| [e.left_table, e.right_table])
        .collect()
}
