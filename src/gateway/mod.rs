//! Collaborator boundaries of the intake pipeline.
//!
//! The pipeline talks to recognition, storage and room assignment only
//! through the traits below, so every orchestration path runs against
//! in-process mocks in tests and against `SqliteGateway` /
//! `HttpRecognitionBackend` in a deployment.

pub mod capture;
pub mod recognition;
pub mod sqlite;

pub use capture::CaptureImage;
pub use recognition::*;
pub use sqlite::SqliteGateway;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::*;
use crate::pipeline::extraction::ProviderId;

/// Recognition transport failures. Every variant counts as a provider
/// failure for the fallback rule.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Cannot reach recognition service at {0}")]
    Connection(String),

    #[error("Recognition request timed out after {0}s")]
    Timeout(u64),

    #[error("Recognition service returned {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Malformed recognition response: {0}")]
    Malformed(String),

    #[error("Provider reported failure: {0}")]
    ProviderFailure(String),

    #[error("Provider '{0}' is not registered")]
    UnknownProvider(String),
}

/// Storage failures, surfaced verbatim to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersistenceError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl PersistenceError {
    pub fn guest_not_found(id: &Uuid) -> Self {
        Self::NotFound {
            entity: "guest".into(),
            id: id.to_string(),
        }
    }
}

impl From<DatabaseError> for PersistenceError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, id } => Self::NotFound {
                entity: entity_type,
                id,
            },
            DatabaseError::ConstraintViolation(msg) => Self::Validation(msg),
            DatabaseError::Io(e) => Self::Unavailable(e.to_string()),
            other => Self::Storage(other.to_string()),
        }
    }
}

/// Answer of the recognition backend for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResponse {
    pub success: bool,
    #[serde(default)]
    pub documents: Vec<ExtractionRecord>,
    #[serde(default)]
    pub document_count: u32,
    #[serde(default)]
    pub image_quality: Option<u8>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Provider-side reason when `success` is false.
    #[serde(default)]
    pub error: Option<String>,
}

impl RecognitionResponse {
    pub fn with_documents(documents: Vec<ExtractionRecord>) -> Self {
        Self {
            success: true,
            document_count: documents.len() as u32,
            documents,
            image_quality: None,
            warnings: Vec::new(),
            error: None,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            documents: Vec::new(),
            document_count: 0,
            image_quality: None,
            warnings: Vec::new(),
            error: Some(reason.into()),
        }
    }
}

/// Black-box document recognition service.
#[async_trait]
pub trait RecognitionBackend: Send + Sync {
    async fn recognize(
        &self,
        provider: &ProviderId,
        image: &CaptureImage,
    ) -> Result<RecognitionResponse, GatewayError>;
}

/// Guest CRUD plus the duplicate query and scan audit.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn create_guest(&self, guest: NewGuest) -> Result<GuestRecord, PersistenceError>;

    async fn get_guest(&self, id: Uuid) -> Result<GuestRecord, PersistenceError>;

    async fn update_guest(
        &self,
        id: Uuid,
        update: GuestUpdate,
    ) -> Result<GuestRecord, PersistenceError>;

    /// `pending → checked_in`. Any other current status is a `Conflict`.
    async fn check_in(&self, id: Uuid) -> Result<GuestRecord, PersistenceError>;

    /// `checked_in → checked_out`. Any other current status is a `Conflict`.
    async fn check_out(&self, id: Uuid) -> Result<GuestRecord, PersistenceError>;

    async fn delete_guest(&self, id: Uuid) -> Result<(), PersistenceError>;

    /// Per-rule hits for the duplicate check. The same guest may appear once
    /// per matching rule; merging is the resolver's job.
    async fn duplicate_candidates(
        &self,
        query: &DuplicateQuery,
    ) -> Result<Vec<DuplicateCandidate>, PersistenceError>;

    async fn record_scan(&self, scan: ScanRecord) -> Result<(), PersistenceError>;

    async fn scan_stats(&self) -> Result<ScanStats, PersistenceError>;
}

/// Result of one room assignment step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentOutcome {
    pub success: bool,
    pub resource: Option<Room>,
    pub error: Option<String>,
}

impl AssignmentOutcome {
    pub fn assigned(resource: Room) -> Self {
        Self {
            success: true,
            resource: Some(resource),
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            resource: None,
            error: Some(error.into()),
        }
    }
}

/// Room assignment. One call assigns the room to every listed guest or to none.
#[async_trait]
pub trait ResourceAssignmentGateway: Send + Sync {
    async fn assign(&self, resource_id: &str, guest_ids: &[Uuid]) -> AssignmentOutcome;
}

/// Durable queue of captures taken while connectivity was degraded.
#[async_trait]
pub trait SyncStore: Send + Sync {
    async fn enqueue(&self, entry: SyncEntry) -> Result<(), PersistenceError>;

    async fn pending_entries(&self) -> Result<Vec<SyncEntry>, PersistenceError>;

    async fn get_entry(&self, id: Uuid) -> Result<SyncEntry, PersistenceError>;

    async fn mark_processed(&self, id: Uuid, guest_ids: &[Uuid])
        -> Result<SyncEntry, PersistenceError>;

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        guest_ids: &[Uuid],
    ) -> Result<SyncEntry, PersistenceError>;
}
