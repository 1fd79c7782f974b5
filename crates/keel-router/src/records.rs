//! Append-only execution log.

use parking_lot::RwLock;
use std::sync::Arc;

use keel_core::{AssetPair, ExecutionRecord};

/// Ordered store of execution records. Entries are immutable once appended;
/// readers get `Arc` snapshots and never block writers for long.
#[derive(Debug, Default)]
pub struct ExecutionLog {
    entries: RwLock<Vec<Arc<ExecutionRecord>>>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, record: ExecutionRecord) -> Arc<ExecutionRecord> {
        let record = Arc::new(record);
        self.entries.write().push(Arc::clone(&record));
        record
    }

    /// Every record in append order.
    pub fn snapshot(&self) -> Vec<Arc<ExecutionRecord>> {
        self.entries.read().clone()
    }

    /// Records for one pair in append order.
    pub fn for_pair(&self, pair: &AssetPair) -> Vec<Arc<ExecutionRecord>> {
        self.entries
            .read()
            .iter()
            .filter(|r| &r.pair == pair)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
