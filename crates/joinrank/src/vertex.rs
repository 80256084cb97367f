//! Per-join-key vertex: record buckets and the weight prefix sum.
//!
//! A vertex gathers, for one join-key value at one level, the matching
//! records on both sides of the edge. The RHS carries a completion
//! weight per record; in cumulative (exclusive prefix) form it supports
//! O(log n) rank lookup via [`Vertex::get_record`].
//!
//! Weight convention: `weights[0] == 0` and `weights[i]` is the summed
//! weight of records `0..i`. `total` is held separately, so the weight
//! of record `i` is `weights[i + 1] - weights[i]`, or
//! `total - weights.last()` for the final record.

use joinrank_error::JoinrankError;
use joinrank_types::{JoinKey, RecordId, Weight};

/// Matching records on both sides of one level, for one join-key value.
///
/// A vertex starts in default-weight mode (`weights` absent): every RHS
/// record counts 1 and the total is the RHS bucket size. Installing any
/// explicit weight switches the vertex to weighted mode permanently.
#[derive(Debug, Clone, Default)]
pub struct Vertex {
    lhs: Vec<RecordId>,
    rhs: Vec<RecordId>,
    weights: Option<Vec<Weight>>,
    total: Weight,
    /// Whether `weights` currently holds the cumulative form rather
    /// than raw per-record weights.
    cumulative: bool,
}

impl Vertex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total completion weight of this vertex. In default-weight mode
    /// this is the RHS outdegree.
    #[inline]
    pub fn total(&self) -> Weight {
        if self.weights.is_none() {
            self.rhs.len() as Weight
        } else {
            self.total
        }
    }

    #[inline]
    pub fn lhs_outdegree(&self) -> usize {
        self.lhs.len()
    }

    #[inline]
    pub fn rhs_outdegree(&self) -> usize {
        self.rhs.len()
    }

    #[inline]
    pub fn lhs_records(&self) -> &[RecordId] {
        &self.lhs
    }

    #[inline]
    pub fn rhs_records(&self) -> &[RecordId] {
        &self.rhs
    }

    /// Whether every RHS record implicitly weighs 1.
    #[inline]
    pub fn is_default_weight(&self) -> bool {
        self.weights.is_none()
    }

    /// The weight array as currently stored (raw or cumulative),
    /// absent in default-weight mode. Read-only diagnostic surface.
    #[inline]
    pub fn rhs_weights(&self) -> Option<&[Weight]> {
        self.weights.as_deref()
    }

    pub fn insert_lhs(&mut self, record: RecordId) {
        self.lhs.push(record);
    }

    /// Removes one occurrence of `record` from the LHS bucket. Missing
    /// records are a silent no-op.
    pub fn delete_lhs(&mut self, record: RecordId) {
        if let Some(pos) = self.lhs.iter().position(|&r| r == record) {
            self.lhs.remove(pos);
        }
    }

    /// Appends an RHS record with the given completion weight and
    /// returns the new total. In default-weight mode the weight
    /// argument is ignored and the record counts 1.
    pub fn insert_rhs(&mut self, record: RecordId, weight: Weight) -> Weight {
        self.rhs.push(record);
        if let Some(weights) = &mut self.weights {
            if self.cumulative {
                // The new record's exclusive prefix is the old total.
                weights.push(self.total);
            } else {
                weights.push(weight);
            }
            self.total += weight;
        }
        self.total()
    }

    /// Removes `record` from the RHS. In default-weight mode the slot
    /// is removed physically; in weighted mode the id is tombstoned and
    /// its weight zeroed so already-built prefix sums stay valid until
    /// the next rebuild. Returns the new total.
    pub fn delete_rhs(&mut self, record: RecordId) -> Weight {
        if self.weights.is_none() {
            if let Some(pos) = self.rhs.iter().position(|&r| r == record) {
                self.rhs.remove(pos);
            }
            return self.total();
        }
        self.adjust_rhs_weight(record, 0);
        if let Some(pos) = self.rhs.iter().position(|&r| r == record) {
            self.rhs[pos] = RecordId::TOMBSTONE;
        }
        self.total
    }

    /// Sets the weight of `record` to `new_weight`, patching the
    /// cumulative array in place. Records not present are a silent
    /// no-op. Returns the new total.
    pub fn adjust_rhs_weight(&mut self, record: RecordId, new_weight: Weight) -> Weight {
        let Some(pos) = self.rhs.iter().position(|&r| r == record) else {
            return self.total();
        };
        let Some(weights) = &mut self.weights else {
            return self.total();
        };
        debug_assert!(self.cumulative, "adjust_rhs_weight expects prefix form");
        let old = if pos + 1 < weights.len() {
            weights[pos + 1] - weights[pos]
        } else {
            self.total - weights[pos]
        };
        let delta = new_weight as i64 - old as i64;
        for w in weights.iter_mut().skip(pos + 1) {
            *w = (*w as i64 + delta) as Weight;
        }
        self.total = (self.total as i64 + delta) as Weight;
        self.total
    }

    /// Locates the RHS record whose cumulative-weight interval covers
    /// `residual`, subtracts the covered prefix from `residual`, and
    /// returns the record id together with its own weight.
    ///
    /// The caller must guarantee `residual < self.total()`.
    pub fn get_record(&self, residual: &mut Weight) -> (RecordId, Weight) {
        debug_assert!(
            *residual < self.total(),
            "residual {residual} out of range for vertex total {}",
            self.total()
        );
        let Some(weights) = &self.weights else {
            // Default weights: the residual is the index.
            let record = self.rhs[*residual as usize];
            *residual = 0;
            return (record, 1);
        };
        debug_assert!(self.cumulative, "get_record expects prefix form");
        let pos = weights.partition_point(|&w| w <= *residual) - 1;
        let weight = if pos + 1 < weights.len() {
            weights[pos + 1] - weights[pos]
        } else {
            self.total - weights[pos]
        };
        *residual -= weights[pos];
        (self.rhs[pos], weight)
    }

    /// Installs raw per-record weights, replacing whatever weight state
    /// the vertex held. The vertex is weighted from here on.
    pub(crate) fn install_weights(&mut self, raw: Vec<Weight>) {
        debug_assert_eq!(raw.len(), self.rhs.len());
        self.total = raw.iter().sum();
        self.weights = Some(raw);
        self.cumulative = false;
    }

    /// Recovers raw per-record weights from the cumulative form, so a
    /// weighted vertex can be re-sorted and re-summed during rebuild.
    pub(crate) fn to_raw_weights(&mut self) {
        let Some(weights) = &mut self.weights else {
            return;
        };
        if !self.cumulative {
            return;
        }
        // Step i reads weights[i + 1] before step i + 1 overwrites it.
        let n = weights.len();
        for i in 0..n {
            weights[i] = if i + 1 < n {
                weights[i + 1] - weights[i]
            } else {
                self.total - weights[i]
            };
        }
        self.cumulative = false;
    }

    /// Joint stable sort of RHS records and raw weights, heaviest
    /// first. Shortens the expected binary-search path for skewed
    /// weight distributions; run before [`Vertex::setup_prefix_sum`].
    pub fn sort(&mut self) {
        let Some(weights) = &mut self.weights else {
            return;
        };
        debug_assert!(!self.cumulative, "sort expects raw weights");
        debug_assert_eq!(weights.len(), self.rhs.len());
        let mut pairs: Vec<(RecordId, Weight)> = self
            .rhs
            .iter()
            .copied()
            .zip(weights.iter().copied())
            .collect();
        pairs.sort_by(|a, b| b.1.cmp(&a.1));
        for (i, (record, weight)) in pairs.into_iter().enumerate() {
            self.rhs[i] = record;
            weights[i] = weight;
        }
    }

    /// Drops RHS positions whose raw weight is zero, preserving the
    /// order of survivors. Tombstoned slots carry weight zero, so this
    /// also completes deferred deletes.
    pub fn purge_zero_weights(&mut self) {
        let Some(weights) = &mut self.weights else {
            return;
        };
        debug_assert!(!self.cumulative, "purge expects raw weights");
        debug_assert!(weights.len() <= self.rhs.len());
        let mut keep = 0;
        for pos in 0..weights.len() {
            if weights[pos] > 0 {
                self.rhs[keep] = self.rhs[pos];
                weights[keep] = weights[pos];
                keep += 1;
            }
        }
        self.rhs.truncate(keep);
        weights.truncate(keep);
    }

    /// Converts raw per-record weights to the cumulative form in place.
    pub fn setup_prefix_sum(&mut self) {
        let Some(weights) = &mut self.weights else {
            return;
        };
        debug_assert!(!self.cumulative, "prefix sum is already built");
        let mut sum = 0;
        for w in weights.iter_mut() {
            let raw = *w;
            *w = sum;
            sum += raw;
        }
        self.total = sum;
        self.cumulative = true;
    }

    /// Bottom-of-chain rebuild: default-weight vertices need nothing
    /// (total is the outdegree); vertices carrying explicit weights are
    /// re-sorted, compacted, and re-summed without losing the weights
    /// (a weighted vertex never reverts to default mode).
    pub(crate) fn rebuild_bottom(&mut self) {
        if self.weights.is_none() {
            return;
        }
        self.to_raw_weights();
        self.sort();
        self.purge_zero_weights();
        self.setup_prefix_sum();
    }

    pub fn lhs_cursor(&self) -> LhsCursor<'_> {
        LhsCursor {
            vertex: self,
            pos: usize::MAX,
        }
    }

    pub fn rhs_cursor(&mut self) -> RhsCursor<'_> {
        RhsCursor {
            vertex: self,
            pos: usize::MAX,
        }
    }

    /// Patches the raw weight at `pos` and fixes the total by the
    /// delta, materializing a zeroed weight vector on first use. The
    /// prefix sum is left to a later rebuild.
    fn set_weight_at(&mut self, pos: usize, weight: Weight) {
        debug_assert!(!self.cumulative, "set_weight expects raw weights");
        let len = self.rhs.len();
        let weights = self.weights.get_or_insert_with(Vec::new);
        weights.resize(len, 0);
        self.total += weight;
        self.total -= weights[pos];
        weights[pos] = weight;
    }
}

/// Common surface of the two cursor flavors.
///
/// Operations a flavor does not carry report
/// [`JoinrankError::UnsupportedCursorOp`] rather than a default value:
/// asking the LHS for a weight is a caller bug.
pub trait VertexCursor {
    /// Advances by one; false once the bucket is exhausted.
    fn step(&mut self) -> bool;

    /// Advances by `s`; false once the bucket is exhausted.
    fn step_by(&mut self, s: usize) -> bool;

    /// Record id under the cursor.
    fn record_id(&self) -> RecordId;

    /// Join value under the cursor. Unsupported on both flavors: the
    /// vertex does not store neighbor values.
    fn join_value(&self) -> Result<JoinKey, JoinrankError>;

    /// Raw weight under the cursor (RHS only).
    fn weight(&self) -> Result<Weight, JoinrankError>;

    /// Overwrites the weight under the cursor (RHS only).
    fn set_weight(&mut self, weight: Weight) -> Result<(), JoinrankError>;
}

/// Cursor over the LHS bucket.
pub struct LhsCursor<'a> {
    vertex: &'a Vertex,
    pos: usize,
}

impl VertexCursor for LhsCursor<'_> {
    fn step(&mut self) -> bool {
        self.step_by(1)
    }

    fn step_by(&mut self, s: usize) -> bool {
        self.pos = self.pos.wrapping_add(s);
        self.pos < self.vertex.lhs.len()
    }

    fn record_id(&self) -> RecordId {
        self.vertex.lhs[self.pos]
    }

    fn join_value(&self) -> Result<JoinKey, JoinrankError> {
        Err(JoinrankError::UnsupportedCursorOp {
            cursor: "lhs",
            op: "join_value",
        })
    }

    fn weight(&self) -> Result<Weight, JoinrankError> {
        Err(JoinrankError::UnsupportedCursorOp {
            cursor: "lhs",
            op: "weight",
        })
    }

    fn set_weight(&mut self, _weight: Weight) -> Result<(), JoinrankError> {
        Err(JoinrankError::UnsupportedCursorOp {
            cursor: "lhs",
            op: "set_weight",
        })
    }
}

/// Cursor over the RHS bucket, with raw-weight access used during
/// rebuild to push the next level's totals into this vertex.
pub struct RhsCursor<'a> {
    vertex: &'a mut Vertex,
    pos: usize,
}

impl VertexCursor for RhsCursor<'_> {
    fn step(&mut self) -> bool {
        self.step_by(1)
    }

    fn step_by(&mut self, s: usize) -> bool {
        self.pos = self.pos.wrapping_add(s);
        self.pos < self.vertex.rhs.len()
    }

    fn record_id(&self) -> RecordId {
        self.vertex.rhs[self.pos]
    }

    fn join_value(&self) -> Result<JoinKey, JoinrankError> {
        Err(JoinrankError::UnsupportedCursorOp {
            cursor: "rhs",
            op: "join_value",
        })
    }

    fn weight(&self) -> Result<Weight, JoinrankError> {
        let Some(weights) = self.vertex.weights.as_ref() else {
            // Default-weight mode: every record weighs 1.
            return Ok(1);
        };
        Ok(weights.get(self.pos).copied().unwrap_or(0))
    }

    fn set_weight(&mut self, weight: Weight) -> Result<(), JoinrankError> {
        self.vertex.set_weight_at(self.pos, weight);
        Ok(())
    }
}
