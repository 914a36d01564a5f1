pub mod orchestrator;
pub mod policy;
pub mod quality;

pub use orchestrator::*;
pub use policy::*;
pub use quality::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of one recognition provider (a cost/accuracy tier or the
/// local OCR path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the provider for a capture is chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "provider", rename_all = "snake_case")]
pub enum ProviderMode {
    /// Quality policy decides.
    #[default]
    Auto,
    /// Operator picked a provider.
    Named(ProviderId),
    /// Local OCR only, no network.
    Offline,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("No identity document detected in the image")]
    NoDocumentDetected,

    #[error("Extraction failed: {primary}{}", fallback_suffix(.fallback))]
    ExtractionFailed {
        primary: String,
        fallback: Option<String>,
    },

    #[error("Extraction #{sequence} superseded by a newer capture")]
    Superseded { sequence: u64 },

    #[error("Invalid image: {0}")]
    InvalidImage(String),
}

fn fallback_suffix(fallback: &Option<String>) -> String {
    fallback
        .as_ref()
        .map(|f| format!("; offline fallback: {f}"))
        .unwrap_or_default()
}

impl ExtractionError {
    /// The operator has to take a new photograph.
    pub fn requires_recapture(&self) -> bool {
        matches!(self, Self::NoDocumentDetected | Self::InvalidImage(_))
    }
}
