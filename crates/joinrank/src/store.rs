//! Base-table collaborator: where join-column values actually live.
//!
//! The index never stores row contents. Whenever a walk or a rebuild
//! needs "the value of column c in record r of table t", it asks the
//! [`RecordStore`]. The contract is totality and stability: every
//! record ever inserted into the index must resolve, and resolve to the
//! same value on every call.

use std::collections::{BTreeMap, HashMap};

use joinrank_types::{ColumnIdx, JoinKey, RecordId, TableId};

/// Read access to the base tables bridged by the index.
pub trait RecordStore {
    /// Join-column value of one record. Total on every record the
    /// index was fed; a miss is a caller bug, not a recoverable state.
    fn join_key(&self, table: TableId, record: RecordId, column: ColumnIdx) -> JoinKey;

    /// All record ids of a table, in a stable order.
    fn record_ids(&self, table: TableId) -> Vec<RecordId>;

    fn contains_table(&self, table: TableId) -> bool;
}

/// HashMap-backed record store for tests and self-contained builds.
///
/// Rows are kept in a `BTreeMap` so that [`RecordStore::record_ids`]
/// enumerates in a stable order regardless of insertion history.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    tables: HashMap<TableId, MemoryTable>,
}

#[derive(Debug)]
struct MemoryTable {
    columns: usize,
    rows: BTreeMap<RecordId, Vec<JoinKey>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table with a fixed column count. Re-registering
    /// replaces the table.
    pub fn add_table(&mut self, table: TableId, columns: usize) {
        self.tables.insert(
            table,
            MemoryTable {
                columns,
                rows: BTreeMap::new(),
            },
        );
    }

    /// Inserts one row. The table must be registered and the value
    /// count must match its column count.
    pub fn insert_row(&mut self, table: TableId, record: RecordId, values: Vec<JoinKey>) {
        let t = self
            .tables
            .get_mut(&table)
            .unwrap_or_else(|| panic!("insert_row into unregistered table {table}"));
        assert_eq!(
            values.len(),
            t.columns,
            "row width {} does not match table {table} width {}",
            values.len(),
            t.columns
        );
        t.rows.insert(record, values);
    }

    pub fn row_count(&self, table: TableId) -> usize {
        self.tables.get(&table).map_or(0, |t| t.rows.len())
    }
}

impl RecordStore for MemoryRecordStore {
    fn join_key(&self, table: TableId, record: RecordId, column: ColumnIdx) -> JoinKey {
        let row = self
            .tables
            .get(&table)
            .and_then(|t| t.rows.get(&record))
            .unwrap_or_else(|| panic!("join_key miss: table {table} record {record}"));
        row[column.get() as usize]
    }

    fn record_ids(&self, table: TableId) -> Vec<RecordId> {
        self.tables
            .get(&table)
            .map(|t| t.rows.keys().copied().collect())
            .unwrap_or_default()
    }

    fn contains_table(&self, table: TableId) -> bool {
        self.tables.contains_key(&table)
    }
}
