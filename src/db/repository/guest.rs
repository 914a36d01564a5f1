use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::{
    format_datetime, parse_datetime, parse_optional_date, parse_optional_datetime, parse_uuid,
    OptionalRow,
};
use crate::db::DatabaseError;
use crate::models::*;
use crate::pipeline::normalize::{name_key, normalize_id_number};

const GUEST_COLUMNS: &str = "id, document_type, given_name, family_name, id_number,
    document_number, birth_date, gender, nationality, birth_place, issue_date, expiry_date,
    father_name, mother_name, status, room_id, consent_given, created_at, checked_in_at,
    checked_out_at, source_extraction, edited_fields, birth_date_raw";

pub fn insert_guest(conn: &Connection, guest: &GuestRecord) -> Result<(), DatabaseError> {
    let source_extraction = guest
        .source_extraction
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let edited_fields = serde_json::to_string(&guest.edited_fields)?;

    conn.execute(
        "INSERT INTO guests (id, document_type, given_name, family_name, id_number,
         document_number, birth_date, gender, nationality, birth_place, issue_date, expiry_date,
         father_name, mother_name, status, room_id, consent_given, created_at, checked_in_at,
         checked_out_at, source_extraction, edited_fields, id_number_key, name_key,
         birth_date_raw, birth_key)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
         ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26)",
        params![
            guest.id.to_string(),
            guest.document_type.as_str(),
            guest.given_name,
            guest.family_name,
            guest.id_number,
            guest.document_number,
            guest.birth_date.map(|d| d.to_string()),
            guest.gender,
            guest.nationality,
            guest.birth_place,
            guest.issue_date.map(|d| d.to_string()),
            guest.expiry_date.map(|d| d.to_string()),
            guest.father_name,
            guest.mother_name,
            guest.status.as_str(),
            guest.room_id,
            guest.consent_given as i32,
            format_datetime(&guest.created_at),
            guest.checked_in_at.as_ref().map(format_datetime),
            guest.checked_out_at.as_ref().map(format_datetime),
            source_extraction,
            edited_fields,
            guest.id_number.as_deref().and_then(normalize_id_number),
            name_key(guest.family_name.as_deref(), guest.given_name.as_deref()),
            guest.birth_date_raw,
            guest.birth_key(),
        ],
    )?;
    Ok(())
}

pub fn get_guest(conn: &Connection, id: &Uuid) -> Result<Option<GuestRecord>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {GUEST_COLUMNS} FROM guests WHERE id = ?1"),
            params![id.to_string()],
            read_guest_row,
        )
        .optional()?;
    row.map(GuestRow::into_guest).transpose()
}

/// Rewrite the identity fields of an existing guest and refresh its match keys.
pub fn update_guest_identity(conn: &Connection, guest: &GuestRecord) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE guests SET given_name = ?2, family_name = ?3, id_number = ?4,
         document_number = ?5, birth_date = ?6, nationality = ?7, expiry_date = ?8,
         id_number_key = ?9, name_key = ?10, birth_key = ?11
         WHERE id = ?1",
        params![
            guest.id.to_string(),
            guest.given_name,
            guest.family_name,
            guest.id_number,
            guest.document_number,
            guest.birth_date.map(|d| d.to_string()),
            guest.nationality,
            guest.expiry_date.map(|d| d.to_string()),
            guest.id_number.as_deref().and_then(normalize_id_number),
            name_key(guest.family_name.as_deref(), guest.given_name.as_deref()),
            guest.birth_key(),
        ],
    )?;
    Ok(changed > 0)
}

/// `pending → checked_in`. Returns false when the guest is missing or not pending.
pub fn mark_guest_checked_in(
    conn: &Connection,
    id: &Uuid,
    at: &NaiveDateTime,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE guests SET status = 'checked_in', checked_in_at = ?2
         WHERE id = ?1 AND status = 'pending'",
        params![id.to_string(), format_datetime(at)],
    )?;
    Ok(changed > 0)
}

/// `checked_in → checked_out`, releasing the room. Returns false when not checked in.
pub fn mark_guest_checked_out(
    conn: &Connection,
    id: &Uuid,
    at: &NaiveDateTime,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE guests SET status = 'checked_out', checked_out_at = ?2, room_id = NULL
         WHERE id = ?1 AND status = 'checked_in'",
        params![id.to_string(), format_datetime(at)],
    )?;
    Ok(changed > 0)
}

pub fn set_guest_room(
    conn: &Connection,
    id: &Uuid,
    room_id: Option<&str>,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE guests SET room_id = ?2 WHERE id = ?1",
        params![id.to_string(), room_id],
    )?;
    Ok(changed > 0)
}

pub fn delete_guest(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let changed = conn.execute("DELETE FROM guests WHERE id = ?1", params![id.to_string()])?;
    Ok(changed > 0)
}

/// Guests whose normalized id number equals `key`.
pub fn find_guests_by_id_number_key(
    conn: &Connection,
    key: &str,
) -> Result<Vec<GuestRecord>, DatabaseError> {
    query_guests(
        conn,
        &format!(
            "SELECT {GUEST_COLUMNS} FROM guests WHERE id_number_key = ?1
             ORDER BY created_at, rowid"
        ),
        params![key],
    )
}

/// Guests with the same normalized name key and birth date key
/// (see `normalize::birth_date_key`).
pub fn find_guests_by_name_birth(
    conn: &Connection,
    key: &str,
    birth_key: &str,
) -> Result<Vec<GuestRecord>, DatabaseError> {
    query_guests(
        conn,
        &format!(
            "SELECT {GUEST_COLUMNS} FROM guests WHERE name_key = ?1 AND birth_key = ?2
             ORDER BY created_at, rowid"
        ),
        params![key, birth_key],
    )
}

pub fn list_guests_by_status(
    conn: &Connection,
    status: GuestStatus,
) -> Result<Vec<GuestRecord>, DatabaseError> {
    query_guests(
        conn,
        &format!("SELECT {GUEST_COLUMNS} FROM guests WHERE status = ?1 ORDER BY created_at, rowid"),
        params![status.as_str()],
    )
}

fn query_guests(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<GuestRecord>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, read_guest_row)?;
    let mut guests = Vec::new();
    for row in rows {
        guests.push(row?.into_guest()?);
    }
    Ok(guests)
}

/// Raw column values, converted to a `GuestRecord` outside the rusqlite closure
/// so enum and JSON failures surface as `DatabaseError`.
struct GuestRow {
    id: String,
    document_type: String,
    given_name: Option<String>,
    family_name: Option<String>,
    id_number: Option<String>,
    document_number: Option<String>,
    birth_date: Option<String>,
    gender: Option<String>,
    nationality: Option<String>,
    birth_place: Option<String>,
    issue_date: Option<String>,
    expiry_date: Option<String>,
    father_name: Option<String>,
    mother_name: Option<String>,
    status: String,
    room_id: Option<String>,
    consent_given: i32,
    created_at: String,
    checked_in_at: Option<String>,
    checked_out_at: Option<String>,
    source_extraction: Option<String>,
    edited_fields: String,
    birth_date_raw: Option<String>,
}

fn read_guest_row(row: &Row<'_>) -> rusqlite::Result<GuestRow> {
    Ok(GuestRow {
        id: row.get(0)?,
        document_type: row.get(1)?,
        given_name: row.get(2)?,
        family_name: row.get(3)?,
        id_number: row.get(4)?,
        document_number: row.get(5)?,
        birth_date: row.get(6)?,
        gender: row.get(7)?,
        nationality: row.get(8)?,
        birth_place: row.get(9)?,
        issue_date: row.get(10)?,
        expiry_date: row.get(11)?,
        father_name: row.get(12)?,
        mother_name: row.get(13)?,
        status: row.get(14)?,
        room_id: row.get(15)?,
        consent_given: row.get(16)?,
        created_at: row.get(17)?,
        checked_in_at: row.get(18)?,
        checked_out_at: row.get(19)?,
        source_extraction: row.get(20)?,
        edited_fields: row.get(21)?,
        birth_date_raw: row.get(22)?,
    })
}

impl GuestRow {
    fn into_guest(self) -> Result<GuestRecord, DatabaseError> {
        let source_extraction = self
            .source_extraction
            .as_deref()
            .map(serde_json::from_str::<ExtractionRecord>)
            .transpose()?;
        Ok(GuestRecord {
            id: parse_uuid(&self.id)?,
            document_type: DocumentType::from_str(&self.document_type)?,
            given_name: self.given_name,
            family_name: self.family_name,
            id_number: self.id_number,
            document_number: self.document_number,
            birth_date: parse_optional_date(self.birth_date),
            birth_date_raw: self.birth_date_raw,
            gender: self.gender,
            nationality: self.nationality,
            birth_place: self.birth_place,
            issue_date: parse_optional_date(self.issue_date),
            expiry_date: parse_optional_date(self.expiry_date),
            father_name: self.father_name,
            mother_name: self.mother_name,
            status: GuestStatus::from_str(&self.status)?,
            room_id: self.room_id,
            consent_given: self.consent_given != 0,
            created_at: parse_datetime(&self.created_at)?,
            checked_in_at: parse_optional_datetime(self.checked_in_at)?,
            checked_out_at: parse_optional_datetime(self.checked_out_at)?,
            source_extraction,
            edited_fields: serde_json::from_str(&self.edited_fields)?,
        })
    }
}
