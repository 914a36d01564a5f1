//! Group check-in: best-effort batch over independent guests, followed by
//! an optional room assignment.
//!
//! Each guest transition stands alone. A failed guest never aborts the
//! batch, and a failed assignment never rolls back completed check-ins.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::gateway::{
    AssignmentOutcome, PersistenceError, PersistenceGateway, ResourceAssignmentGateway,
};
use crate::models::GuestRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckInFailure {
    pub guest_id: Uuid,
    pub reason: String,
    pub error: PersistenceError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub successful_count: usize,
    pub failed_count: usize,
    /// Guests now checked in, in request order.
    pub checked_in: Vec<GuestRecord>,
    pub failed: Vec<CheckInFailure>,
    /// Present when a room was requested.
    pub assignment: Option<AssignmentOutcome>,
}

impl BatchResult {
    pub fn is_complete_success(&self) -> bool {
        self.failed_count == 0 && self.assignment.as_ref().map_or(true, |a| a.success)
    }
}

pub struct GroupCheckIn {
    persistence: Arc<dyn PersistenceGateway>,
    rooms: Arc<dyn ResourceAssignmentGateway>,
}

impl GroupCheckIn {
    pub fn new(
        persistence: Arc<dyn PersistenceGateway>,
        rooms: Arc<dyn ResourceAssignmentGateway>,
    ) -> Self {
        Self { persistence, rooms }
    }

    /// Check in every listed guest, then assign `resource_id` to the ones
    /// that succeeded. A guest id listed twice is processed once; the repeat
    /// is reported as failed.
    pub async fn group_check_in(&self, guest_ids: &[Uuid], resource_id: Option<&str>) -> BatchResult {
        let mut seen = HashSet::new();
        let mut repeats = Vec::new();
        let unique: Vec<Uuid> = guest_ids
            .iter()
            .copied()
            .filter(|id| {
                let first = seen.insert(*id);
                if !first {
                    repeats.push(*id);
                }
                first
            })
            .collect();

        let results = join_all(unique.iter().map(|&id| async move {
            (id, self.persistence.check_in(id).await)
        }))
        .await;

        let mut checked_in = Vec::new();
        let mut failed = Vec::new();
        for (guest_id, result) in results {
            match result {
                Ok(guest) => checked_in.push(guest),
                Err(error) => {
                    warn!(guest_id = %guest_id, error = %error, "Guest check-in failed");
                    failed.push(CheckInFailure {
                        guest_id,
                        reason: error.to_string(),
                        error,
                    });
                }
            }
        }
        for guest_id in repeats {
            let error = PersistenceError::Validation(format!(
                "guest {guest_id} listed more than once in this batch"
            ));
            failed.push(CheckInFailure {
                guest_id,
                reason: error.to_string(),
                error,
            });
        }

        let assignment = match resource_id {
            None => None,
            Some(_) if checked_in.is_empty() => {
                Some(AssignmentOutcome::rejected("no guests were checked in"))
            }
            Some(room) => {
                let ids: Vec<Uuid> = checked_in.iter().map(|g| g.id).collect();
                let outcome = self.rooms.assign(room, &ids).await;
                if !outcome.success {
                    warn!(room, error = ?outcome.error, "Room assignment failed");
                }
                Some(outcome)
            }
        };

        info!(
            successful = checked_in.len(),
            failed = failed.len(),
            assigned = assignment.as_ref().map(|a| a.success),
            "Group check-in finished"
        );
        BatchResult {
            successful_count: checked_in.len(),
            failed_count: failed.len(),
            checked_in,
            failed,
            assignment,
        }
    }
}
