//! Transaction-keyed correlation between block verdicts and log records
//!
//! The inspection gate stores a block record under the transaction id; the
//! orchestrator claims it exactly once when writing the response summary.
//! Backed by a sharded map so unrelated transactions never contend.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::inspect::BlockRecord;

/// Identity of one in-flight request.
///
/// A process-local monotonic counter rather than the request URI: concurrent
/// requests for the same URI must not share a correlation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxId(u64);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-wide store of pending block records, keyed by transaction id.
///
/// Entries never outlive one request lifecycle: the orchestrator performs a
/// `load_and_clear` on every completion path, claimed or not.
pub struct CorrelationLog {
    entries: DashMap<TxId, BlockRecord>,
    next_id: AtomicU64,
}

impl CorrelationLog {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate the identity for a new transaction
    pub fn next_id(&self) -> TxId {
        TxId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Insert or overwrite the block record for a transaction
    pub fn store(&self, key: TxId, record: BlockRecord) {
        self.entries.insert(key, record);
    }

    /// Atomically remove and return the record for a transaction, if any
    pub fn load_and_clear(&self, key: TxId) -> Option<BlockRecord> {
        self.entries.remove(&key).map(|(_, record)| record)
    }

    /// Number of unclaimed records (diagnostics only)
    pub fn pending(&self) -> usize {
        self.entries.len()
    }
}

impl Default for CorrelationLog {
    fn default() -> Self {
        Self::new()
    }
}
