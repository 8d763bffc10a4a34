//! Bounded record of finished executions.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::execute::{ExecutionResult, RequestId};

/// One recorded execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub result: ExecutionResult,
    /// Whether the caller received this result. Late completions after a
    /// timeout are recorded with `false`.
    pub delivered: bool,
}

/// Newest-first execution history with a fixed capacity.
#[derive(Debug)]
pub struct ExecutionHistory {
    entries: Mutex<VecDeque<HistoryEntry>>,
    capacity: usize,
}

impl ExecutionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, result: ExecutionResult, delivered: bool) {
        let mut entries = self.lock();
        entries.push_front(HistoryEntry { result, delivered });
        entries.truncate(self.capacity);
    }

    /// All entries, newest first.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.lock().iter().cloned().collect()
    }

    /// Entries for one request (normally exactly one).
    pub fn for_request(&self, id: RequestId) -> Vec<HistoryEntry> {
        self.lock()
            .iter()
            .filter(|e| e.result.request_id == id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<HistoryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
