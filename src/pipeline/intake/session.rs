use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ExtractionField, ExtractionRecord, FieldChange};
use crate::pipeline::extraction::ExtractionOutcome;

/// One recognized document awaiting operator review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEntry {
    /// Provider output, never modified.
    pub original: ExtractionRecord,
    /// Operator-edited copy.
    pub current: ExtractionRecord,
    pub consent_given: bool,
    pub saved_guest: Option<Uuid>,
}

impl SessionEntry {
    pub fn new(record: ExtractionRecord) -> Self {
        Self {
            current: record.clone(),
            original: record,
            consent_given: false,
            saved_guest: None,
        }
    }

    pub fn is_saved(&self) -> bool {
        self.saved_guest.is_some()
    }

    pub fn edits(&self) -> Vec<FieldChange> {
        self.original.diff(&self.current)
    }
}

/// What saving the entry under the cursor did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAdvance {
    /// Cursor moved to this unsaved entry.
    Advanced(usize),
    /// Every entry is saved; the session is now empty.
    Completed,
}

/// Ordered documents from one capture plus a cursor.
///
/// Navigation is bounds-checked and does nothing at the ends. The cursor
/// is always a valid index while the session is non-empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanSession {
    entries: Vec<SessionEntry>,
    cursor: usize,
}

impl ScanSession {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<ExtractionRecord>) -> Self {
        Self {
            entries: records.into_iter().map(SessionEntry::new).collect(),
            cursor: 0,
        }
    }

    pub fn from_outcome(outcome: &ExtractionOutcome) -> Self {
        Self::from_records(outcome.documents.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[SessionEntry] {
        &self.entries
    }

    /// `None` when the session is empty.
    pub fn cursor(&self) -> Option<usize> {
        (!self.entries.is_empty()).then_some(self.cursor)
    }

    pub fn current(&self) -> Option<&SessionEntry> {
        self.entries.get(self.cursor)
    }

    pub fn saved_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_saved()).count()
    }

    pub fn next(&mut self) {
        if self.cursor + 1 < self.entries.len() {
            self.cursor += 1;
        }
    }

    pub fn previous(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    /// Returns false (and stays put) for an out-of-range index.
    pub fn jump_to(&mut self, index: usize) -> bool {
        if index < self.entries.len() {
            self.cursor = index;
            true
        } else {
            false
        }
    }

    /// Edit one field of the current entry. Saved entries are read-only.
    pub fn edit_current(&mut self, field: ExtractionField, value: Option<String>) -> bool {
        match self.entries.get_mut(self.cursor) {
            Some(entry) if !entry.is_saved() => {
                let value = value.filter(|v| !v.trim().is_empty());
                entry.current.set(field, value);
                true
            }
            _ => false,
        }
    }

    pub fn set_current_consent(&mut self, consent_given: bool) -> bool {
        match self.entries.get_mut(self.cursor) {
            Some(entry) if !entry.is_saved() => {
                entry.consent_given = consent_given;
                true
            }
            _ => false,
        }
    }

    /// Record that the current entry became `guest_id`, then move to the
    /// next unsaved entry (later ones first, then earlier ones). When none
    /// is left the session resets to empty.
    ///
    /// Returns `None` when there is no current entry or it was already saved.
    pub fn mark_current_saved(&mut self, guest_id: Uuid) -> Option<SessionAdvance> {
        let entry = self.entries.get_mut(self.cursor)?;
        if entry.is_saved() {
            return None;
        }
        entry.saved_guest = Some(guest_id);

        let len = self.entries.len();
        let next_unsaved = (1..len)
            .map(|offset| (self.cursor + offset) % len)
            .find(|&i| !self.entries[i].is_saved());

        match next_unsaved {
            Some(index) => {
                self.cursor = index;
                Some(SessionAdvance::Advanced(index))
            }
            None => {
                *self = Self::empty();
                Some(SessionAdvance::Completed)
            }
        }
    }
}
