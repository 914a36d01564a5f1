//! The intake desk ties capture, review, duplicate resolution and commit
//! together for one operator station.
//!
//! Every input surface (buttons, keyboard shortcuts, scripted batches)
//! goes through [`IntakeDesk::execute`], and [`CommandPolicy`] answers
//! whether a command is currently available, so the rules are the same
//! everywhere.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::bulk::{BulkQueue, BulkQueueEntry};
use super::commit::{commit_record, CommitOutcome};
use super::duplicate::DuplicateResolver;
use super::session::{ScanSession, SessionAdvance};
use super::IntakeError;
use crate::gateway::{CaptureImage, PersistenceError, PersistenceGateway};
use crate::models::{DuplicateCandidate, ExtractionField, GuestRecord};
use crate::pipeline::extraction::{
    ExtractionError, ExtractionOrchestrator, ExtractionOutcome, ExtractionState, SubmitOptions,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeMode {
    /// One guest at a time; after the last save the caller opens the guest.
    #[default]
    Single,
    /// Commits accumulate in the bulk queue; the camera is re-armed.
    Bulk,
}

/// Where the operator goes after a successful save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "next", content = "value", rename_all = "snake_case")]
pub enum AfterSave {
    /// Next unsaved document of the same capture, by index.
    Advanced(usize),
    /// Single mode: the capture is done, show this guest.
    NavigateToGuest(Uuid),
    /// Bulk mode, or the session was reset while saving.
    ReadyForCapture,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved { guest: GuestRecord, after: AfterSave },
    /// Duplicate prompt is now open; nothing was written.
    Conflict(Vec<DuplicateCandidate>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    ConflictDismissed,
    SessionReset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    CommitCurrent { force_create: bool },
    Next,
    Previous,
    JumpTo { index: usize },
    Reset,
    UndoLast,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    Saved(SaveOutcome),
    Navigated(Option<usize>),
    Cancelled(CancelOutcome),
    Undone(BulkQueueEntry),
}

/// Snapshot of the desk for rendering and command gating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeskStatus {
    pub mode: IntakeMode,
    pub extraction: ExtractionState,
    pub session_len: usize,
    pub cursor: Option<usize>,
    /// The entry under the cursor is already committed and read-only.
    pub current_saved: bool,
    pub saved_count: usize,
    /// A commit or an undo is writing.
    pub saving: bool,
    pub conflict_open: bool,
    pub bulk_count: usize,
}

impl DeskStatus {
    pub fn busy(&self) -> bool {
        self.saving || self.extraction == ExtractionState::Extracting
    }
}

/// Which commands are available in a given desk state.
pub struct CommandPolicy;

impl CommandPolicy {
    pub fn is_enabled(command: &Command, status: &DeskStatus) -> bool {
        match command {
            Command::CommitCurrent { .. } => {
                !status.busy() && status.cursor.is_some() && !status.current_saved
            }
            Command::Next | Command::Previous | Command::JumpTo { .. } => {
                !status.saving && status.cursor.is_some()
            }
            Command::Reset => true,
            Command::UndoLast => !status.busy() && status.bulk_count > 0,
        }
    }
}

#[derive(Default)]
struct DeskState {
    session: ScanSession,
    conflict: Option<Vec<DuplicateCandidate>>,
    saving: bool,
    /// Bumped whenever the session is replaced or reset.
    epoch: u64,
    bulk: BulkQueue,
}

pub struct IntakeDesk {
    orchestrator: Arc<ExtractionOrchestrator>,
    persistence: Arc<dyn PersistenceGateway>,
    resolver: DuplicateResolver,
    mode: IntakeMode,
    state: Mutex<DeskState>,
}

impl IntakeDesk {
    pub fn new(
        orchestrator: Arc<ExtractionOrchestrator>,
        persistence: Arc<dyn PersistenceGateway>,
        mode: IntakeMode,
    ) -> Self {
        Self {
            resolver: DuplicateResolver::new(Arc::clone(&persistence)),
            orchestrator,
            persistence,
            mode,
            state: Mutex::new(DeskState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, DeskState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn mode(&self) -> IntakeMode {
        self.mode
    }

    pub fn status(&self) -> DeskStatus {
        let extraction = self.orchestrator.state();
        let state = self.state();
        DeskStatus {
            mode: self.mode,
            extraction,
            session_len: state.session.len(),
            cursor: state.session.cursor(),
            current_saved: state.session.current().is_some_and(|e| e.is_saved()),
            saved_count: state.session.saved_count(),
            saving: state.saving,
            conflict_open: state.conflict.is_some(),
            bulk_count: state.bulk.len(),
        }
    }

    pub fn session(&self) -> ScanSession {
        self.state().session.clone()
    }

    pub fn bulk_queue(&self) -> BulkQueue {
        self.state().bulk.clone()
    }

    pub fn open_conflict(&self) -> Option<Vec<DuplicateCandidate>> {
        self.state().conflict.clone()
    }

    /// Extract the documents in `image` and open them for review.
    ///
    /// Replaces any session in progress. Calling this while a previous
    /// extraction hangs cancels interest in that extraction.
    pub async fn capture(
        &self,
        image: &CaptureImage,
        options: SubmitOptions,
    ) -> Result<ExtractionOutcome, IntakeError> {
        {
            let mut state = self.state();
            if state.saving {
                return Err(IntakeError::Busy);
            }
            state.session = ScanSession::empty();
            state.conflict = None;
            state.epoch += 1;
        }
        self.orchestrator.begin_capture();

        match self.orchestrator.submit(image, options).await {
            Ok(outcome) => {
                let mut state = self.state();
                state.session = ScanSession::from_outcome(&outcome);
                state.epoch += 1;
                debug!(documents = outcome.documents.len(), "Session opened");
                Ok(outcome)
            }
            Err(e @ ExtractionError::Superseded { .. }) => Err(e.into()),
            Err(e) => {
                self.state().session = ScanSession::empty();
                Err(e.into())
            }
        }
    }

    pub fn edit_current(
        &self,
        field: ExtractionField,
        value: Option<String>,
    ) -> Result<(), IntakeError> {
        let mut state = self.state();
        Self::ensure_editable(&state)?;
        state.session.edit_current(field, value);
        // candidates were computed from the previous values
        state.conflict = None;
        Ok(())
    }

    pub fn set_consent(&self, consent_given: bool) -> Result<(), IntakeError> {
        let mut state = self.state();
        Self::ensure_editable(&state)?;
        state.session.set_current_consent(consent_given);
        Ok(())
    }

    fn ensure_editable(state: &DeskState) -> Result<(), IntakeError> {
        if state.saving {
            return Err(IntakeError::Busy);
        }
        match state.session.current() {
            None => Err(IntakeError::NoSession),
            Some(entry) => match entry.saved_guest {
                Some(id) => Err(IntakeError::AlreadySaved(id)),
                None => Ok(()),
            },
        }
    }

    /// Commit the document under the cursor.
    ///
    /// Without `force_create` a duplicate match opens the conflict prompt
    /// instead of saving. With it the duplicate check is skipped.
    pub async fn save_current(&self, force_create: bool) -> Result<SaveOutcome, IntakeError> {
        if self.orchestrator.state() == ExtractionState::Extracting {
            return Err(IntakeError::Busy);
        }
        let (entry, epoch) = {
            let mut state = self.state();
            Self::ensure_editable(&state)?;
            let entry = state
                .session
                .current()
                .cloned()
                .ok_or(IntakeError::NoSession)?;
            state.saving = true;
            (entry, state.epoch)
        };

        let committed = commit_record(
            &self.resolver,
            self.persistence.as_ref(),
            &entry.original,
            &entry.current,
            entry.consent_given,
            force_create,
        )
        .await;

        let mut state = self.state();
        state.saving = false;
        let guest = match committed? {
            CommitOutcome::Conflict(candidates) => {
                if state.epoch == epoch {
                    state.conflict = Some(candidates.clone());
                }
                return Ok(SaveOutcome::Conflict(candidates));
            }
            CommitOutcome::Created(guest) => guest,
        };
        state.conflict = None;

        if self.mode == IntakeMode::Bulk {
            state
                .bulk
                .push(guest.id, entry.current.display_name(), Utc::now().naive_utc());
        }

        if state.epoch != epoch {
            warn!(guest_id = %guest.id, "Session reset while saving; guest kept");
            return Ok(SaveOutcome::Saved {
                guest,
                after: AfterSave::ReadyForCapture,
            });
        }

        let advance = state.session.mark_current_saved(guest.id);
        let after = match advance {
            Some(SessionAdvance::Advanced(index)) => AfterSave::Advanced(index),
            Some(SessionAdvance::Completed) | None => {
                state.epoch += 1;
                drop(state);
                self.orchestrator.reset();
                match self.mode {
                    IntakeMode::Single => AfterSave::NavigateToGuest(guest.id),
                    IntakeMode::Bulk => AfterSave::ReadyForCapture,
                }
            }
        };
        info!(guest_id = %guest.id, ?after, "Document saved");
        Ok(SaveOutcome::Saved { guest, after })
    }

    /// Two-step cancel: an open duplicate prompt is closed first; only the
    /// next cancel resets the session.
    pub fn cancel(&self) -> CancelOutcome {
        let mut state = self.state();
        if state.conflict.take().is_some() {
            return CancelOutcome::ConflictDismissed;
        }
        state.session = ScanSession::empty();
        state.epoch += 1;
        drop(state);
        self.orchestrator.reset();
        debug!("Session reset");
        CancelOutcome::SessionReset
    }

    /// Delete the most recently committed bulk guest.
    ///
    /// The desk is busy until the delete returns, so no commit can land in
    /// the queue meanwhile. A guest that is already gone still leaves the
    /// queue.
    pub async fn undo_last(&self) -> Result<BulkQueueEntry, IntakeError> {
        let last = {
            let mut state = self.state();
            if state.saving {
                return Err(IntakeError::Busy);
            }
            let last = state.bulk.last().cloned().ok_or(IntakeError::EmptyQueue)?;
            state.saving = true;
            last
        };

        let deleted = match self.persistence.delete_guest(last.guest_id).await {
            Err(PersistenceError::NotFound { .. }) => {
                warn!(guest_id = %last.guest_id, "Undone guest was already deleted");
                Ok(())
            }
            other => other,
        };

        let mut state = self.state();
        state.saving = false;
        deleted?;
        state.bulk.pop_last();
        info!(guest_id = %last.guest_id, position = last.position, "Bulk commit undone");
        Ok(last)
    }

    pub async fn execute(&self, command: Command) -> Result<CommandResult, IntakeError> {
        match command {
            Command::CommitCurrent { force_create } => {
                Ok(CommandResult::Saved(self.save_current(force_create).await?))
            }
            Command::Next => self.navigate(|s| {
                s.next();
            }),
            Command::Previous => self.navigate(|s| {
                s.previous();
            }),
            Command::JumpTo { index } => self.navigate(|s| {
                s.jump_to(index);
            }),
            Command::Reset => Ok(CommandResult::Cancelled(self.cancel())),
            Command::UndoLast => Ok(CommandResult::Undone(self.undo_last().await?)),
        }
    }

    fn navigate(&self, step: impl FnOnce(&mut ScanSession)) -> Result<CommandResult, IntakeError> {
        let mut state = self.state();
        if state.saving {
            return Err(IntakeError::Busy);
        }
        if state.session.is_empty() {
            return Err(IntakeError::NoSession);
        }
        step(&mut state.session);
        Ok(CommandResult::Navigated(state.session.cursor()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayError, MockRecognitionBackend, ProviderRegistry, SqliteGateway};
    use crate::models::{
        DocumentType, DuplicateQuery, ExtractionRecord, GuestUpdate, MatchConfidence, MatchType,
        NewGuest, ScanRecord, ScanStats,
    };
    use crate::pipeline::extraction::{ProviderId, QualityPolicy};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// SQLite gateway that counts duplicate queries and can slow down writes.
    struct CountingPersistence {
        inner: SqliteGateway,
        dedup_calls: AtomicUsize,
        write_delay: Option<Duration>,
    }

    impl CountingPersistence {
        fn new() -> Self {
            Self {
                inner: SqliteGateway::open_in_memory().unwrap(),
                dedup_calls: AtomicUsize::new(0),
                write_delay: None,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                write_delay: Some(delay),
                ..Self::new()
            }
        }

        fn dedup_calls(&self) -> usize {
            self.dedup_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl PersistenceGateway for CountingPersistence {
        async fn create_guest(&self, guest: NewGuest) -> Result<GuestRecord, PersistenceError> {
            if let Some(delay) = self.write_delay {
                tokio::time::sleep(delay).await;
            }
            self.inner.create_guest(guest).await
        }
        async fn get_guest(&self, id: Uuid) -> Result<GuestRecord, PersistenceError> {
            self.inner.get_guest(id).await
        }
        async fn update_guest(
            &self,
            id: Uuid,
            update: GuestUpdate,
        ) -> Result<GuestRecord, PersistenceError> {
            self.inner.update_guest(id, update).await
        }
        async fn check_in(&self, id: Uuid) -> Result<GuestRecord, PersistenceError> {
            self.inner.check_in(id).await
        }
        async fn check_out(&self, id: Uuid) -> Result<GuestRecord, PersistenceError> {
            self.inner.check_out(id).await
        }
        async fn delete_guest(&self, id: Uuid) -> Result<(), PersistenceError> {
            if let Some(delay) = self.write_delay {
                tokio::time::sleep(delay).await;
            }
            self.inner.delete_guest(id).await
        }
        async fn duplicate_candidates(
            &self,
            query: &DuplicateQuery,
        ) -> Result<Vec<DuplicateCandidate>, PersistenceError> {
            self.dedup_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.duplicate_candidates(query).await
        }
        async fn record_scan(&self, scan: ScanRecord) -> Result<(), PersistenceError> {
            self.inner.record_scan(scan).await
        }
        async fn scan_stats(&self) -> Result<ScanStats, PersistenceError> {
            self.inner.scan_stats().await
        }
    }

    fn person(given: &str, family: &str, id_number: &str) -> ExtractionRecord {
        let mut r = ExtractionRecord::empty(DocumentType::NationalId);
        r.given_name = Some(given.into());
        r.family_name = Some(family.into());
        r.id_number = Some(id_number.into());
        r.birth_date = Some("1979-11-30".into());
        r
    }

    fn image() -> CaptureImage {
        CaptureImage::from_bytes(vec![1, 2, 3, 4]).unwrap()
    }

    fn desk_with(
        documents: Vec<ExtractionRecord>,
        persistence: Arc<CountingPersistence>,
        mode: IntakeMode,
    ) -> IntakeDesk {
        let backend = Arc::new(MockRecognitionBackend::returning(documents));
        let registry = ProviderRegistry::new()
            .with(ProviderId::new("premium"), backend.clone())
            .with(ProviderId::new("offline"), backend);
        let orchestrator =
            ExtractionOrchestrator::new(registry, QualityPolicy::default(), Duration::from_secs(5));
        IntakeDesk::new(Arc::new(orchestrator), persistence, mode)
    }

    fn named() -> SubmitOptions {
        SubmitOptions::named(ProviderId::new("premium"))
    }

    #[tokio::test]
    async fn duplicate_id_number_then_force_create() {
        let persistence = Arc::new(CountingPersistence::new());
        let existing = person("Ali", "Veli", "12345678901");
        let g1 = persistence
            .create_guest(NewGuest::from_extraction(&existing, &existing, true))
            .await
            .unwrap();

        let desk = desk_with(
            vec![person("Ahmet", "Yildiz", "12345678901")],
            persistence.clone(),
            IntakeMode::Single,
        );
        desk.capture(&image(), named()).await.unwrap();

        let SaveOutcome::Conflict(candidates) = desk.save_current(false).await.unwrap() else {
            panic!("expected duplicate conflict");
        };
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].guest_id, g1.id);
        assert_eq!(candidates[0].match_type, MatchType::IdNumber);
        assert_eq!(candidates[0].match_confidence, MatchConfidence::High);
        assert!(desk.status().conflict_open);
        assert_eq!(persistence.dedup_calls(), 1);

        let SaveOutcome::Saved { guest, after } = desk.save_current(true).await.unwrap() else {
            panic!("expected forced save");
        };
        assert_ne!(guest.id, g1.id);
        assert_eq!(after, AfterSave::NavigateToGuest(guest.id));
        assert_eq!(persistence.dedup_calls(), 1, "force_create skips the check");
        assert!(!desk.status().conflict_open);
    }

    #[tokio::test]
    async fn two_document_capture_advances_then_resets() {
        let persistence = Arc::new(CountingPersistence::new());
        let desk = desk_with(
            vec![person("Jane", "Doe", "111"), person("John", "Doe", "222")],
            persistence,
            IntakeMode::Single,
        );
        let outcome = desk.capture(&image(), named()).await.unwrap();
        assert_eq!(outcome.document_count, 2);
        assert_eq!(desk.status().session_len, 2);

        let first = desk.save_current(false).await.unwrap();
        assert!(matches!(
            first,
            SaveOutcome::Saved { after: AfterSave::Advanced(1), .. }
        ));
        assert_eq!(desk.status().cursor, Some(1));

        let second = desk.save_current(false).await.unwrap();
        assert!(matches!(
            second,
            SaveOutcome::Saved { after: AfterSave::NavigateToGuest(_), .. }
        ));
        let status = desk.status();
        assert_eq!(status.session_len, 0);
        assert_eq!(status.extraction, ExtractionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn commit_disabled_while_saving() {
        let persistence = Arc::new(CountingPersistence::slow(Duration::from_secs(1)));
        let desk = desk_with(vec![person("Jane", "Doe", "111")], persistence, IntakeMode::Single);
        desk.capture(&image(), named()).await.unwrap();

        let (first, second) = tokio::join!(desk.save_current(false), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let status = desk.status();
            assert!(status.saving);
            assert!(!CommandPolicy::is_enabled(
                &Command::CommitCurrent { force_create: false },
                &status
            ));
            assert!(CommandPolicy::is_enabled(&Command::Reset, &status));
            desk.execute(Command::CommitCurrent { force_create: false }).await
        });

        assert!(matches!(first, Ok(SaveOutcome::Saved { .. })));
        assert_eq!(second.unwrap_err(), IntakeError::Busy);
    }

    #[tokio::test]
    async fn commit_disabled_on_saved_entry() {
        let persistence = Arc::new(CountingPersistence::new());
        let desk = desk_with(
            vec![person("Jane", "Doe", "111"), person("John", "Doe", "222")],
            persistence,
            IntakeMode::Single,
        );
        desk.capture(&image(), named()).await.unwrap();
        let commit = Command::CommitCurrent { force_create: false };
        assert!(CommandPolicy::is_enabled(&commit, &desk.status()));

        let SaveOutcome::Saved { guest, .. } = desk.save_current(false).await.unwrap() else {
            panic!("expected save");
        };
        desk.execute(Command::Previous).await.unwrap();
        let status = desk.status();
        assert_eq!(status.cursor, Some(0));
        assert!(status.current_saved);
        assert!(!CommandPolicy::is_enabled(&commit, &status));
        assert_eq!(
            desk.execute(commit).await.unwrap_err(),
            IntakeError::AlreadySaved(guest.id)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn commit_disabled_while_extracting() {
        let persistence = Arc::new(CountingPersistence::new());
        let backend = Arc::new(
            MockRecognitionBackend::returning(vec![person("Jane", "Doe", "111")])
                .with_delay(Duration::from_secs(2)),
        );
        let registry = ProviderRegistry::new().with(ProviderId::new("premium"), backend);
        let orchestrator = Arc::new(ExtractionOrchestrator::new(
            registry,
            QualityPolicy::default(),
            Duration::from_secs(5),
        ));
        let desk = IntakeDesk::new(orchestrator.clone(), persistence.clone(), IntakeMode::Single);
        desk.capture(&image(), named()).await.unwrap();

        let img = image();
        let (extracted, attempts) = tokio::join!(orchestrator.submit(&img, named()), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let status = desk.status();
            assert_eq!(status.extraction, ExtractionState::Extracting);
            assert_eq!(status.session_len, 1);
            assert!(status.busy());
            assert!(!CommandPolicy::is_enabled(
                &Command::CommitCurrent { force_create: false },
                &status
            ));
            let via_command = desk
                .execute(Command::CommitCurrent { force_create: false })
                .await;
            let forced = desk.save_current(true).await;
            (via_command, forced)
        });

        assert!(extracted.is_ok());
        assert_eq!(attempts.0.unwrap_err(), IntakeError::Busy);
        assert_eq!(attempts.1.unwrap_err(), IntakeError::Busy);
        assert_eq!(persistence.dedup_calls(), 0);
        assert!(persistence
            .inner
            .guests_with_status(crate::models::GuestStatus::Pending)
            .unwrap()
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn save_rejected_while_undo_in_flight() {
        let persistence = Arc::new(CountingPersistence::slow(Duration::from_secs(1)));
        let desk = desk_with(
            vec![
                person("A", "One", "1"),
                person("B", "Two", "2"),
                person("C", "Three", "3"),
            ],
            persistence.clone(),
            IntakeMode::Bulk,
        );
        desk.capture(&image(), named()).await.unwrap();
        desk.save_current(false).await.unwrap();
        desk.save_current(false).await.unwrap();
        assert_eq!(desk.bulk_queue().len(), 2);

        let (undone, save) = tokio::join!(desk.undo_last(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let status = desk.status();
            assert!(status.saving);
            assert!(!CommandPolicy::is_enabled(
                &Command::CommitCurrent { force_create: false },
                &status
            ));
            assert!(!CommandPolicy::is_enabled(&Command::UndoLast, &status));
            desk.save_current(false).await
        });

        let undone = undone.unwrap();
        assert_eq!(undone.position, 2);
        assert_eq!(save.unwrap_err(), IntakeError::Busy);
        assert_eq!(desk.bulk_queue().len(), 1);
        assert!(!desk.status().saving);

        assert_eq!(desk.undo_last().await.unwrap().position, 1);
        assert_eq!(desk.undo_last().await.unwrap_err(), IntakeError::EmptyQueue);
    }

    #[tokio::test]
    async fn undo_of_deleted_guest_clears_queue_entry() {
        let persistence = Arc::new(CountingPersistence::new());
        let desk = desk_with(
            vec![person("Jane", "Doe", "111")],
            persistence.clone(),
            IntakeMode::Bulk,
        );
        desk.capture(&image(), named()).await.unwrap();
        let SaveOutcome::Saved { guest, .. } = desk.save_current(false).await.unwrap() else {
            panic!("expected save");
        };
        persistence.delete_guest(guest.id).await.unwrap();

        let undone = desk.undo_last().await.unwrap();
        assert_eq!(undone.guest_id, guest.id);
        assert!(desk.bulk_queue().is_empty());
    }

    #[tokio::test]
    async fn cancel_closes_conflict_before_resetting() {
        let persistence = Arc::new(CountingPersistence::new());
        let existing = person("Jane", "Doe", "111");
        persistence
            .create_guest(NewGuest::from_extraction(&existing, &existing, true))
            .await
            .unwrap();
        let desk = desk_with(vec![existing], persistence, IntakeMode::Single);
        desk.capture(&image(), named()).await.unwrap();
        desk.save_current(false).await.unwrap();

        assert_eq!(desk.cancel(), CancelOutcome::ConflictDismissed);
        assert_eq!(desk.status().session_len, 1);
        assert_eq!(
            desk.execute(Command::Reset).await.unwrap(),
            CommandResult::Cancelled(CancelOutcome::SessionReset)
        );
        assert_eq!(desk.status().session_len, 0);
        assert_eq!(desk.save_current(false).await.unwrap_err(), IntakeError::NoSession);
    }

    #[tokio::test]
    async fn bulk_mode_queues_commits_and_undoes_last() {
        let persistence = Arc::new(CountingPersistence::new());
        let desk = desk_with(
            vec![person("Jane", "Doe", "111"), person("John", "Roe", "222")],
            persistence.clone(),
            IntakeMode::Bulk,
        );
        desk.capture(&image(), named()).await.unwrap();
        desk.save_current(false).await.unwrap();
        let last = desk.save_current(false).await.unwrap();
        assert!(matches!(
            last,
            SaveOutcome::Saved { after: AfterSave::ReadyForCapture, .. }
        ));

        let queue = desk.bulk_queue();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.entries()[1].display_name, "Roe, John");

        let CommandResult::Undone(undone) = desk.execute(Command::UndoLast).await.unwrap() else {
            panic!("expected undo");
        };
        assert_eq!(undone.position, 2);
        assert!(matches!(
            persistence.get_guest(undone.guest_id).await,
            Err(PersistenceError::NotFound { .. })
        ));
        assert_eq!(desk.bulk_queue().len(), 1);

        desk.undo_last().await.unwrap();
        assert_eq!(desk.undo_last().await.unwrap_err(), IntakeError::EmptyQueue);
    }

    #[tokio::test]
    async fn editing_reaches_committed_guest() {
        let persistence = Arc::new(CountingPersistence::new());
        let desk = desk_with(vec![person("Jane", "Doe", "111")], persistence, IntakeMode::Single);
        desk.capture(&image(), named()).await.unwrap();
        desk.edit_current(ExtractionField::GivenName, Some("Janet".into()))
            .unwrap();
        desk.set_consent(true).unwrap();

        let SaveOutcome::Saved { guest, .. } = desk.save_current(false).await.unwrap() else {
            panic!("expected save");
        };
        assert_eq!(guest.given_name.as_deref(), Some("Janet"));
        assert!(guest.consent_given);
        assert_eq!(guest.edited_fields.len(), 1);
        assert_eq!(
            guest.source_extraction.and_then(|r| r.given_name).as_deref(),
            Some("Jane")
        );
    }

    #[tokio::test]
    async fn navigation_through_commands() {
        let persistence = Arc::new(CountingPersistence::new());
        let desk = desk_with(
            vec![
                person("A", "One", "1"),
                person("B", "Two", "2"),
                person("C", "Three", "3"),
            ],
            persistence,
            IntakeMode::Single,
        );
        assert_eq!(desk.execute(Command::Next).await.unwrap_err(), IntakeError::NoSession);

        desk.capture(&image(), named()).await.unwrap();
        assert_eq!(
            desk.execute(Command::JumpTo { index: 2 }).await.unwrap(),
            CommandResult::Navigated(Some(2))
        );
        assert_eq!(
            desk.execute(Command::Next).await.unwrap(),
            CommandResult::Navigated(Some(2))
        );
        assert_eq!(
            desk.execute(Command::Previous).await.unwrap(),
            CommandResult::Navigated(Some(1))
        );
    }

    #[tokio::test]
    async fn failed_extraction_leaves_no_session() {
        let persistence = Arc::new(CountingPersistence::new());
        let backend = Arc::new(MockRecognitionBackend::failing(GatewayError::Connection(
            "down".into(),
        )));
        let registry = ProviderRegistry::new().with(ProviderId::new("offline"), backend);
        let orchestrator =
            ExtractionOrchestrator::new(registry, QualityPolicy::default(), Duration::from_secs(5));
        let desk = IntakeDesk::new(Arc::new(orchestrator), persistence, IntakeMode::Single);

        let err = desk.capture(&image(), SubmitOptions::offline()).await.unwrap_err();
        assert!(matches!(
            err,
            IntakeError::Extraction(ExtractionError::ExtractionFailed { .. })
        ));
        let status = desk.status();
        assert_eq!(status.session_len, 0);
        assert_eq!(status.extraction, ExtractionState::Failed);
    }
}
