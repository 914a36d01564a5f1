//! Operator-facing intake: review the documents of one capture, resolve
//! duplicates, commit guests, and (in bulk mode) undo the last commit.

pub mod bulk;
pub mod commit;
pub mod desk;
pub mod duplicate;
pub mod session;

pub use bulk::*;
pub use commit::*;
pub use desk::*;
pub use duplicate::*;
pub use session::*;

use thiserror::Error;

use crate::gateway::PersistenceError;
use crate::pipeline::extraction::ExtractionError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntakeError {
    #[error("No document under review")]
    NoSession,

    #[error("A save or extraction is already in flight")]
    Busy,

    #[error("Document already saved as guest {0}")]
    AlreadySaved(uuid::Uuid),

    #[error("Bulk queue is empty")]
    EmptyQueue,

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
