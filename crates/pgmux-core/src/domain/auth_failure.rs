//! Auth failure log - bounded, append-only record of credential rejections

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::ServiceName;

/// Default number of entries kept per process
pub const DEFAULT_FAILURE_LOG_CAPACITY: usize = 1000;

/// One rejected configuration attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthFailureLogEntry {
    pub project_ref: String,
    pub service: ServiceName,
    pub timestamp: DateTime<Utc>,
    pub error: String,
    pub database_user: String,
}

/// Append-only log capped by retention count.
///
/// Entries are never removed individually; once the log is full the oldest
/// entry is evicted on append.
pub struct AuthFailureLog {
    entries: Mutex<VecDeque<AuthFailureLogEntry>>,
    capacity: usize,
}

impl AuthFailureLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    pub fn append(&self, entry: AuthFailureLogEntry) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Most recent entries for one project, newest first
    pub fn for_project(&self, project_ref: &str, limit: usize) -> Vec<AuthFailureLogEntry> {
        self.entries
            .lock()
            .iter()
            .rev()
            .filter(|e| e.project_ref == project_ref)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Most recent entries across all projects, newest first
    pub fn recent(&self, limit: usize) -> Vec<AuthFailureLogEntry> {
        self.entries.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry (test isolation)
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for AuthFailureLog {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_LOG_CAPACITY)
    }
}
