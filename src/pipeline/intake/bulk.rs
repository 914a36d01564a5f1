use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One guest committed during a bulk intake run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkQueueEntry {
    /// 1-based commit order within the run.
    pub position: usize,
    pub guest_id: Uuid,
    pub display_name: String,
    pub committed_at: NaiveDateTime,
}

/// Guests committed in bulk mode, in commit order. Only the most recent
/// entry can be undone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkQueue {
    entries: Vec<BulkQueueEntry>,
}

impl BulkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, guest_id: Uuid, display_name: String, committed_at: NaiveDateTime) {
        let position = self.entries.len() + 1;
        self.entries.push(BulkQueueEntry {
            position,
            guest_id,
            display_name,
            committed_at,
        });
    }

    pub fn last(&self) -> Option<&BulkQueueEntry> {
        self.entries.last()
    }

    pub fn pop_last(&mut self) -> Option<BulkQueueEntry> {
        self.entries.pop()
    }

    pub fn entries(&self) -> &[BulkQueueEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
