//! Offline intake queue.
//!
//! Captures taken while connectivity is degraded are stored as sync
//! entries. Once the operator confirms connectivity, `process` replays each
//! pending entry through the same extraction and commit path as a live
//! capture. Every entry moves `pending → processed | failed` exactly once.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::gateway::{CaptureImage, PersistenceError, PersistenceGateway, SyncStore};
pub use crate::models::{SyncEntry, SyncStatus};
use crate::pipeline::extraction::{ExtractionOrchestrator, SubmitOptions};
use crate::pipeline::intake::{commit_record, CommitOutcome, DuplicateResolver};

// ═══════════════════════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("Sync entry {id} is already {status}")]
    NotPending { id: Uuid, status: SyncStatus },

    #[error("Connectivity has not been confirmed")]
    ConnectivityUnconfirmed,

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Operator's view of the network when asking to process the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Confirmed,
    Unconfirmed,
}

/// Result of one `process` run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub processed: usize,
    pub failed: usize,
    pub entries: Vec<SyncEntry>,
}

/// Error text stored on entries whose documents matched existing guests.
pub const DUPLICATE_REVIEW: &str = "duplicate requires review";

// ═══════════════════════════════════════════════════════════════════════════
// Processor
// ═══════════════════════════════════════════════════════════════════════════

pub struct OfflineSyncProcessor {
    store: Arc<dyn SyncStore>,
    persistence: Arc<dyn PersistenceGateway>,
    resolver: DuplicateResolver,
    orchestrator: ExtractionOrchestrator,
    device_id: String,
}

impl OfflineSyncProcessor {
    /// `orchestrator` is the live one; replays run on a detached copy so
    /// they never supersede an operator's capture.
    pub fn new(
        store: Arc<dyn SyncStore>,
        persistence: Arc<dyn PersistenceGateway>,
        orchestrator: &ExtractionOrchestrator,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            resolver: DuplicateResolver::new(Arc::clone(&persistence)),
            persistence,
            orchestrator: orchestrator.detached(),
            device_id: device_id.into(),
        }
    }

    /// Queue a capture for later processing.
    pub async fn enqueue(&self, image: &CaptureImage) -> Result<SyncEntry, SyncError> {
        let entry = SyncEntry {
            id: Uuid::new_v4(),
            device_id: self.device_id.clone(),
            payload: image.to_data_uri(),
            status: SyncStatus::Pending,
            error: None,
            guest_ids: Vec::new(),
            created_at: Utc::now().naive_utc(),
            processed_at: None,
        };
        self.store.enqueue(entry.clone()).await?;
        info!(entry_id = %entry.id, device_id = %self.device_id, "Capture queued for sync");
        Ok(entry)
    }

    /// Replay every pending entry, oldest first.
    pub async fn process(&self, connectivity: Connectivity) -> Result<SyncReport, SyncError> {
        if connectivity != Connectivity::Confirmed {
            return Err(SyncError::ConnectivityUnconfirmed);
        }

        let mut report = SyncReport::default();
        for pending in self.store.pending_entries().await? {
            let entry = match self.process_entry(pending.id).await {
                Ok(entry) => entry,
                Err(e) => self.record_store_failure(pending, &e).await,
            };
            match entry.status {
                SyncStatus::Processed => report.processed += 1,
                _ => report.failed += 1,
            }
            report.entries.push(entry);
        }
        info!(
            processed = report.processed,
            failed = report.failed,
            "Sync queue processed"
        );
        Ok(report)
    }

    /// Replay one entry. Guests created before a failure stay created and
    /// are listed on the entry.
    pub async fn process_entry(&self, id: Uuid) -> Result<SyncEntry, SyncError> {
        let entry = self.store.get_entry(id).await?;
        if entry.status != SyncStatus::Pending {
            return Err(SyncError::NotPending {
                id,
                status: entry.status,
            });
        }

        let image = match CaptureImage::from_data_uri(&entry.payload) {
            Ok(image) => image,
            Err(e) => return self.fail(id, &e.to_string(), &[]).await,
        };
        let outcome = match self.orchestrator.submit(&image, SubmitOptions::auto()).await {
            Ok(outcome) => outcome,
            Err(e) => return self.fail(id, &e.to_string(), &[]).await,
        };

        let mut created = Vec::new();
        let mut problems = Vec::new();
        for document in &outcome.documents {
            match commit_record(
                &self.resolver,
                self.persistence.as_ref(),
                document,
                document,
                false,
                false,
            )
            .await
            {
                Ok(CommitOutcome::Created(guest)) => created.push(guest.id),
                Ok(CommitOutcome::Conflict(_)) => problems.push(DUPLICATE_REVIEW.to_string()),
                Err(e) => problems.push(e.to_string()),
            }
        }

        if problems.is_empty() {
            let entry = self.store.mark_processed(id, &created).await?;
            info!(entry_id = %id, guests = created.len(), "Sync entry processed");
            Ok(entry)
        } else {
            problems.dedup();
            self.fail(id, &problems.join("; "), &created).await
        }
    }

    /// The entry could not be replayed at all. Mark it failed if the store
    /// still accepts writes; otherwise report it failed and leave it pending.
    async fn record_store_failure(&self, pending: SyncEntry, error: &SyncError) -> SyncEntry {
        let reason = error.to_string();
        warn!(entry_id = %pending.id, error = %reason, "Sync entry could not be replayed");
        match self.store.mark_failed(pending.id, &reason, &[]).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(entry_id = %pending.id, error = %e, "Sync entry left pending");
                SyncEntry {
                    status: SyncStatus::Failed,
                    error: Some(reason),
                    ..pending
                }
            }
        }
    }

    async fn fail(&self, id: Uuid, reason: &str, created: &[Uuid]) -> Result<SyncEntry, SyncError> {
        warn!(entry_id = %id, guests = created.len(), reason, "Sync entry failed");
        Ok(self.store.mark_failed(id, reason, created).await?)
    }
}
