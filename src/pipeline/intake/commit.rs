use tracing::info;

use super::duplicate::DuplicateResolver;
use crate::gateway::{PersistenceError, PersistenceGateway};
use crate::models::{DuplicateCandidate, DuplicateQuery, ExtractionRecord, GuestRecord, NewGuest};

/// Result of trying to persist one reviewed extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Created(GuestRecord),
    /// Nothing was written; the operator must decide.
    Conflict(Vec<DuplicateCandidate>),
}

/// Persist `current` as a new guest, unless it matches existing guests
/// and `force_create` is off. Live captures and offline replays both go
/// through here.
pub async fn commit_record(
    resolver: &DuplicateResolver,
    persistence: &dyn PersistenceGateway,
    original: &ExtractionRecord,
    current: &ExtractionRecord,
    consent_given: bool,
    force_create: bool,
) -> Result<CommitOutcome, PersistenceError> {
    if !force_create {
        let candidates = resolver.check(&DuplicateQuery::from_record(current)).await?;
        if !candidates.is_empty() {
            info!(candidates = candidates.len(), "Duplicate candidates found, commit held");
            return Ok(CommitOutcome::Conflict(candidates));
        }
    }

    let guest = persistence
        .create_guest(NewGuest::from_extraction(original, current, consent_given))
        .await?;
    info!(guest_id = %guest.id, forced = force_create, "Guest committed");
    Ok(CommitOutcome::Created(guest))
}
