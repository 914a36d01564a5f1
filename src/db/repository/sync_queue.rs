use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_optional_datetime, parse_uuid, OptionalRow};
use crate::db::DatabaseError;
use crate::models::*;

const SYNC_COLUMNS: &str =
    "id, device_id, payload, status, error, guest_ids, created_at, processed_at";

pub fn insert_sync_entry(conn: &Connection, entry: &SyncEntry) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO sync_queue (id, device_id, payload, status, error, guest_ids, created_at,
         processed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.id.to_string(),
            entry.device_id,
            entry.payload,
            entry.status.as_str(),
            entry.error,
            serde_json::to_string(&entry.guest_ids)?,
            format_datetime(&entry.created_at),
            entry.processed_at.as_ref().map(format_datetime),
        ],
    )?;
    Ok(())
}

pub fn get_sync_entry(conn: &Connection, id: &Uuid) -> Result<Option<SyncEntry>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {SYNC_COLUMNS} FROM sync_queue WHERE id = ?1"),
            params![id.to_string()],
            read_sync_row,
        )
        .optional()?;
    row.map(SyncRow::into_entry).transpose()
}

/// Pending entries, oldest first.
pub fn list_pending_sync_entries(conn: &Connection) -> Result<Vec<SyncEntry>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SYNC_COLUMNS} FROM sync_queue WHERE status = 'pending'
         ORDER BY created_at, rowid"
    ))?;
    let rows = stmt.query_map([], read_sync_row)?;
    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?.into_entry()?);
    }
    Ok(entries)
}

/// `pending → processed`. Returns false when the entry is not pending.
pub fn mark_sync_processed(
    conn: &Connection,
    id: &Uuid,
    guest_ids: &[Uuid],
    at: &NaiveDateTime,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE sync_queue SET status = 'processed', guest_ids = ?2, processed_at = ?3,
         error = NULL
         WHERE id = ?1 AND status = 'pending'",
        params![
            id.to_string(),
            serde_json::to_string(guest_ids)?,
            format_datetime(at)
        ],
    )?;
    Ok(changed > 0)
}

/// `pending → failed`. Guests created before the failure are kept on the entry.
/// Returns false when the entry is not pending.
pub fn mark_sync_failed(
    conn: &Connection,
    id: &Uuid,
    error: &str,
    guest_ids: &[Uuid],
    at: &NaiveDateTime,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE sync_queue SET status = 'failed', error = ?2, guest_ids = ?3, processed_at = ?4
         WHERE id = ?1 AND status = 'pending'",
        params![
            id.to_string(),
            error,
            serde_json::to_string(guest_ids)?,
            format_datetime(at)
        ],
    )?;
    Ok(changed > 0)
}

struct SyncRow {
    id: String,
    device_id: String,
    payload: String,
    status: String,
    error: Option<String>,
    guest_ids: String,
    created_at: String,
    processed_at: Option<String>,
}

fn read_sync_row(row: &Row<'_>) -> rusqlite::Result<SyncRow> {
    Ok(SyncRow {
        id: row.get(0)?,
        device_id: row.get(1)?,
        payload: row.get(2)?,
        status: row.get(3)?,
        error: row.get(4)?,
        guest_ids: row.get(5)?,
        created_at: row.get(6)?,
        processed_at: row.get(7)?,
    })
}

impl SyncRow {
    fn into_entry(self) -> Result<SyncEntry, DatabaseError> {
        Ok(SyncEntry {
            id: parse_uuid(&self.id)?,
            device_id: self.device_id,
            payload: self.payload,
            status: SyncStatus::from_str(&self.status)?,
            error: self.error,
            guest_ids: serde_json::from_str(&self.guest_ids)?,
            created_at: parse_datetime(&self.created_at)?,
            processed_at: parse_optional_datetime(self.processed_at)?,
        })
    }
}
