use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{DocumentType, GuestStatus, MatchConfidence, MatchType, RoomStatus};
use super::extraction::{ExtractionRecord, FieldChange};
use crate::pipeline::normalize::{birth_date_key, parse_birth_date, parse_document_date};

/// Persisted guest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestRecord {
    pub id: Uuid,
    pub document_type: DocumentType,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub id_number: Option<String>,
    pub document_number: Option<String>,
    pub birth_date: Option<NaiveDate>,
    /// Birth date as printed, kept even when it could not be parsed.
    #[serde(default)]
    pub birth_date_raw: Option<String>,
    pub gender: Option<String>,
    pub nationality: Option<String>,
    pub birth_place: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub father_name: Option<String>,
    pub mother_name: Option<String>,
    pub status: GuestStatus,
    pub room_id: Option<String>,
    pub consent_given: bool,
    pub created_at: NaiveDateTime,
    pub checked_in_at: Option<NaiveDateTime>,
    pub checked_out_at: Option<NaiveDateTime>,
    /// Extraction exactly as the provider returned it.
    pub source_extraction: Option<ExtractionRecord>,
    /// Fields the operator edited before saving.
    #[serde(default)]
    pub edited_fields: Vec<FieldChange>,
}

/// Everything needed to create a guest. Built from a session entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGuest {
    pub document_type: DocumentType,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub id_number: Option<String>,
    pub document_number: Option<String>,
    pub birth_date: Option<NaiveDate>,
    /// Birth date as printed, kept even when it could not be parsed.
    #[serde(default)]
    pub birth_date_raw: Option<String>,
    pub gender: Option<String>,
    pub nationality: Option<String>,
    pub birth_place: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub father_name: Option<String>,
    pub mother_name: Option<String>,
    pub consent_given: bool,
    pub source_extraction: Option<ExtractionRecord>,
    #[serde(default)]
    pub edited_fields: Vec<FieldChange>,
}

/// Partial identity update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuestUpdate {
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub id_number: Option<String>,
    pub document_number: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub nationality: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

/// Existing guest flagged as a possible match for a new submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateCandidate {
    pub guest_id: Uuid,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub id_number: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub status: GuestStatus,
    pub room_id: Option<String>,
    pub created_at: NaiveDateTime,
    pub match_type: MatchType,
    pub match_confidence: MatchConfidence,
}

impl DuplicateCandidate {
    pub fn from_guest(guest: &GuestRecord, match_type: MatchType) -> Self {
        let match_confidence = match match_type {
            MatchType::IdNumber => MatchConfidence::High,
            MatchType::NameBirthDate => MatchConfidence::Medium,
        };
        Self {
            guest_id: guest.id,
            given_name: guest.given_name.clone(),
            family_name: guest.family_name.clone(),
            id_number: guest.id_number.clone(),
            birth_date: guest.birth_date,
            status: guest.status,
            room_id: guest.room_id.clone(),
            created_at: guest.created_at,
            match_type,
            match_confidence,
        }
    }
}

/// Assignable resource (a room).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub label: String,
    pub capacity: u32,
    pub status: RoomStatus,
    pub occupants: u32,
}

/// Identity fields used by the duplicate check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateQuery {
    pub id_number: Option<String>,
    pub family_name: Option<String>,
    pub given_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    /// Printed birth date; matched on when `birth_date` could not be parsed.
    #[serde(default)]
    pub birth_date_raw: Option<String>,
}

impl DuplicateQuery {
    pub fn from_record(record: &ExtractionRecord) -> Self {
        let today = Utc::now().date_naive();
        Self {
            id_number: record.id_number.clone(),
            family_name: record.family_name.clone(),
            given_name: record.given_name.clone(),
            birth_date: record
                .birth_date
                .as_deref()
                .and_then(|raw| parse_birth_date(raw, today)),
            birth_date_raw: record.birth_date.clone(),
        }
    }

    pub fn birth_key(&self) -> Option<String> {
        birth_date_key(self.birth_date, self.birth_date_raw.as_deref())
    }
}

impl GuestRecord {
    pub fn birth_key(&self) -> Option<String> {
        birth_date_key(self.birth_date, self.birth_date_raw.as_deref())
    }
}

impl NewGuest {
    /// Build a guest from the operator-approved extraction, keeping the
    /// provider's original output and the list of edits for audit.
    pub fn from_extraction(
        original: &ExtractionRecord,
        current: &ExtractionRecord,
        consent_given: bool,
    ) -> Self {
        let date = |raw: &Option<String>| raw.as_deref().and_then(parse_document_date);
        let today = Utc::now().date_naive();
        Self {
            document_type: current.document_type,
            given_name: current.given_name.clone(),
            family_name: current.family_name.clone(),
            id_number: current.id_number.clone(),
            document_number: current.document_number.clone(),
            birth_date: current
                .birth_date
                .as_deref()
                .and_then(|raw| parse_birth_date(raw, today)),
            birth_date_raw: current.birth_date.clone(),
            gender: current.gender.clone(),
            nationality: current.nationality.clone(),
            birth_place: current.birth_place.clone(),
            issue_date: date(&current.issue_date),
            expiry_date: date(&current.expiry_date),
            father_name: current.father_name.clone(),
            mother_name: current.mother_name.clone(),
            consent_given,
            source_extraction: Some(original.clone()),
            edited_fields: original.diff(current),
        }
    }
}
