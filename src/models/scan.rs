use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::SyncStatus;

/// Audit/cost record of one successful recognition call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: Uuid,
    pub provider: String,
    pub fallback_used: bool,
    pub document_count: u32,
    pub quality_score: Option<u8>,
    pub image_sha256: String,
    pub created_at: NaiveDateTime,
}

/// Per-provider scan totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub total: u32,
    pub fallbacks: u32,
    pub by_provider: Vec<(String, u32)>,
}

/// Capture queued while connectivity was degraded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEntry {
    pub id: Uuid,
    pub device_id: String,
    /// Image payload as a data URI.
    pub payload: String,
    pub status: SyncStatus,
    pub error: Option<String>,
    #[serde(default)]
    pub guest_ids: Vec<Uuid>,
    pub created_at: NaiveDateTime,
    pub processed_at: Option<NaiveDateTime>,
}
