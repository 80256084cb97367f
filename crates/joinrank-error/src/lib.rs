//! Error type for joinrank operations.
//!
//! Steady-state reads are total and never return errors; everything here
//! is raised either by a cursor asked for an operation its flavor does
//! not support, or by the builder while validating a join description.

use joinrank_types::TableId;
use thiserror::Error;

/// Primary error type for joinrank operations.
#[derive(Error, Debug)]
pub enum JoinrankError {
    /// A cursor flavor was asked for an operation it does not carry
    /// (e.g. weight access on an LHS cursor, or the join value on
    /// either flavor). This is a caller bug, not a recoverable state.
    #[error("unsupported {cursor} cursor operation: {op}")]
    UnsupportedCursorOp {
        cursor: &'static str,
        op: &'static str,
    },

    /// The builder was finalized without any join edge.
    #[error("join description has no levels")]
    EmptyJoin,

    /// A join edge references a table the record store does not hold.
    #[error("no such table in record store: {table}")]
    UnknownTable { table: TableId },

    /// A fork edge names a parent output slot that is not materialized
    /// by the time the edge is walked.
    #[error("level {level} references invalid parent slot {slot}")]
    InvalidParentSlot { level: usize, slot: usize },

    /// A fork edge's left table does not match the table emitted into
    /// its parent output slot.
    #[error("level {level} joins from table {actual} but parent slot {slot} holds table {expected}")]
    ParentTableMismatch {
        level: usize,
        slot: usize,
        expected: TableId,
        actual: TableId,
    },
}
