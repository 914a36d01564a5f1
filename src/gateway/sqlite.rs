//! Reference persistence over one SQLite connection.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::{
    AssignmentOutcome, PersistenceError, PersistenceGateway, ResourceAssignmentGateway, SyncStore,
};
use crate::db::{self, DatabaseError};
use crate::models::*;
use crate::pipeline::normalize::{name_key, normalize_id_number};

/// Implements every storage-side gateway. The connection lock is only held
/// inside synchronous sections.
pub struct SqliteGateway {
    conn: Mutex<Connection>,
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn storage(err: rusqlite::Error) -> PersistenceError {
    DatabaseError::from(err).into()
}

impl SqliteGateway {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::new(db::open_database(path)?))
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::new(db::open_memory_database()?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, PersistenceError> {
        self.conn
            .lock()
            .map_err(|_| PersistenceError::Unavailable("database lock poisoned".into()))
    }

    pub fn add_room(&self, room: &Room) -> Result<(), PersistenceError> {
        let conn = self.lock()?;
        db::insert_room(&conn, room)?;
        Ok(())
    }

    pub fn rooms(&self) -> Result<Vec<Room>, PersistenceError> {
        let conn = self.lock()?;
        Ok(db::list_rooms(&conn)?)
    }

    pub fn guests_with_status(&self, status: GuestStatus) -> Result<Vec<GuestRecord>, PersistenceError> {
        let conn = self.lock()?;
        Ok(db::list_guests_by_status(&conn, status)?)
    }

    fn load_guest(conn: &Connection, id: &Uuid) -> Result<GuestRecord, PersistenceError> {
        db::get_guest(conn, id)?.ok_or_else(|| PersistenceError::guest_not_found(id))
    }

    fn load_sync_entry(conn: &Connection, id: &Uuid) -> Result<SyncEntry, PersistenceError> {
        db::get_sync_entry(conn, id)?.ok_or_else(|| PersistenceError::NotFound {
            entity: "sync entry".into(),
            id: id.to_string(),
        })
    }

    fn assign_in_tx(
        conn: &mut Connection,
        resource_id: &str,
        guest_ids: &[Uuid],
    ) -> Result<Result<Room, String>, PersistenceError> {
        let tx = conn.transaction().map_err(storage)?;

        let room = match db::get_room(&tx, resource_id)? {
            Some(room) => room,
            None => return Ok(Err(format!("room {resource_id} not found"))),
        };
        if room.status == RoomStatus::Maintenance {
            return Ok(Err(format!("room {resource_id} is under maintenance")));
        }

        let mut arriving = 0u32;
        for id in guest_ids {
            let guest = match db::get_guest(&tx, id)? {
                Some(guest) => guest,
                None => return Ok(Err(format!("guest {id} not found"))),
            };
            if guest.status != GuestStatus::CheckedIn {
                return Ok(Err(format!("guest {id} is not checked in")));
            }
            if guest.room_id.as_deref() != Some(resource_id) {
                arriving += 1;
            }
        }
        if room.occupants + arriving > room.capacity {
            return Ok(Err(format!(
                "room {resource_id} is full ({} of {} beds taken, {arriving} requested)",
                room.occupants, room.capacity
            )));
        }

        for id in guest_ids {
            db::set_guest_room(&tx, id, Some(resource_id))?;
        }
        db::set_room_status(&tx, resource_id, RoomStatus::Occupied)?;
        let updated = db::get_room(&tx, resource_id)?.ok_or_else(|| PersistenceError::NotFound {
            entity: "room".into(),
            id: resource_id.to_string(),
        })?;
        tx.commit().map_err(storage)?;
        Ok(Ok(updated))
    }
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn create_guest(&self, guest: NewGuest) -> Result<GuestRecord, PersistenceError> {
        if guest.given_name.is_none() && guest.family_name.is_none() && guest.id_number.is_none() {
            return Err(PersistenceError::Validation(
                "guest needs a name or an id number".into(),
            ));
        }
        let record = GuestRecord {
            id: Uuid::new_v4(),
            document_type: guest.document_type,
            given_name: guest.given_name,
            family_name: guest.family_name,
            id_number: guest.id_number,
            document_number: guest.document_number,
            birth_date: guest.birth_date,
            birth_date_raw: guest.birth_date_raw,
            gender: guest.gender,
            nationality: guest.nationality,
            birth_place: guest.birth_place,
            issue_date: guest.issue_date,
            expiry_date: guest.expiry_date,
            father_name: guest.father_name,
            mother_name: guest.mother_name,
            status: GuestStatus::Pending,
            room_id: None,
            consent_given: guest.consent_given,
            created_at: now(),
            checked_in_at: None,
            checked_out_at: None,
            source_extraction: guest.source_extraction,
            edited_fields: guest.edited_fields,
        };

        let conn = self.lock()?;
        db::insert_guest(&conn, &record)?;
        Self::load_guest(&conn, &record.id)
    }

    async fn get_guest(&self, id: Uuid) -> Result<GuestRecord, PersistenceError> {
        let conn = self.lock()?;
        Self::load_guest(&conn, &id)
    }

    async fn update_guest(
        &self,
        id: Uuid,
        update: GuestUpdate,
    ) -> Result<GuestRecord, PersistenceError> {
        let conn = self.lock()?;
        let mut guest = Self::load_guest(&conn, &id)?;

        if let Some(v) = update.given_name {
            guest.given_name = Some(v);
        }
        if let Some(v) = update.family_name {
            guest.family_name = Some(v);
        }
        if let Some(v) = update.id_number {
            guest.id_number = Some(v);
        }
        if let Some(v) = update.document_number {
            guest.document_number = Some(v);
        }
        if let Some(v) = update.birth_date {
            guest.birth_date = Some(v);
        }
        if let Some(v) = update.nationality {
            guest.nationality = Some(v);
        }
        if let Some(v) = update.expiry_date {
            guest.expiry_date = Some(v);
        }

        db::update_guest_identity(&conn, &guest)?;
        Self::load_guest(&conn, &id)
    }

    async fn check_in(&self, id: Uuid) -> Result<GuestRecord, PersistenceError> {
        let conn = self.lock()?;
        if !db::mark_guest_checked_in(&conn, &id, &now())? {
            let guest = Self::load_guest(&conn, &id)?;
            return Err(PersistenceError::Conflict(format!(
                "guest {id} is {}, expected pending",
                guest.status
            )));
        }
        Self::load_guest(&conn, &id)
    }

    async fn check_out(&self, id: Uuid) -> Result<GuestRecord, PersistenceError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(storage)?;
        let guest = Self::load_guest(&tx, &id)?;
        if !db::mark_guest_checked_out(&tx, &id, &now())? {
            return Err(PersistenceError::Conflict(format!(
                "guest {id} is {}, expected checked_in",
                guest.status
            )));
        }
        if let Some(room_id) = guest.room_id.as_deref() {
            let empty = db::get_room(&tx, room_id)?.is_some_and(|room| room.occupants == 0);
            if empty {
                db::set_room_status(&tx, room_id, RoomStatus::Available)?;
            }
        }
        let updated = Self::load_guest(&tx, &id)?;
        tx.commit().map_err(storage)?;
        Ok(updated)
    }

    async fn delete_guest(&self, id: Uuid) -> Result<(), PersistenceError> {
        let conn = self.lock()?;
        if db::delete_guest(&conn, &id)? {
            Ok(())
        } else {
            Err(PersistenceError::guest_not_found(&id))
        }
    }

    async fn duplicate_candidates(
        &self,
        query: &DuplicateQuery,
    ) -> Result<Vec<DuplicateCandidate>, PersistenceError> {
        let conn = self.lock()?;
        let mut candidates = Vec::new();

        if let Some(key) = query.id_number.as_deref().and_then(normalize_id_number) {
            for guest in db::find_guests_by_id_number_key(&conn, &key)? {
                candidates.push(DuplicateCandidate::from_guest(&guest, MatchType::IdNumber));
            }
        }
        if let (Some(key), Some(birth)) = (
            name_key(query.family_name.as_deref(), query.given_name.as_deref()),
            query.birth_key(),
        ) {
            for guest in db::find_guests_by_name_birth(&conn, &key, &birth)? {
                candidates.push(DuplicateCandidate::from_guest(&guest, MatchType::NameBirthDate));
            }
        }
        Ok(candidates)
    }

    async fn record_scan(&self, scan: ScanRecord) -> Result<(), PersistenceError> {
        let conn = self.lock()?;
        db::insert_scan_record(&conn, &scan)?;
        Ok(())
    }

    async fn scan_stats(&self) -> Result<ScanStats, PersistenceError> {
        let conn = self.lock()?;
        Ok(db::scan_stats(&conn)?)
    }
}

#[async_trait]
impl ResourceAssignmentGateway for SqliteGateway {
    async fn assign(&self, resource_id: &str, guest_ids: &[Uuid]) -> AssignmentOutcome {
        if guest_ids.is_empty() {
            return AssignmentOutcome::rejected("no guests to assign");
        }
        let result = self
            .lock()
            .and_then(|mut conn| Self::assign_in_tx(&mut conn, resource_id, guest_ids));
        match result {
            Ok(Ok(room)) => AssignmentOutcome::assigned(room),
            Ok(Err(reason)) => AssignmentOutcome::rejected(reason),
            Err(e) => AssignmentOutcome::rejected(e.to_string()),
        }
    }
}

#[async_trait]
impl SyncStore for SqliteGateway {
    async fn enqueue(&self, entry: SyncEntry) -> Result<(), PersistenceError> {
        let conn = self.lock()?;
        db::insert_sync_entry(&conn, &entry)?;
        Ok(())
    }

    async fn pending_entries(&self) -> Result<Vec<SyncEntry>, PersistenceError> {
        let conn = self.lock()?;
        Ok(db::list_pending_sync_entries(&conn)?)
    }

    async fn get_entry(&self, id: Uuid) -> Result<SyncEntry, PersistenceError> {
        let conn = self.lock()?;
        Self::load_sync_entry(&conn, &id)
    }

    async fn mark_processed(
        &self,
        id: Uuid,
        guest_ids: &[Uuid],
    ) -> Result<SyncEntry, PersistenceError> {
        let conn = self.lock()?;
        if !db::mark_sync_processed(&conn, &id, guest_ids, &now())? {
            let entry = Self::load_sync_entry(&conn, &id)?;
            return Err(PersistenceError::Conflict(format!(
                "sync entry {id} is already {}",
                entry.status
            )));
        }
        Self::load_sync_entry(&conn, &id)
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        guest_ids: &[Uuid],
    ) -> Result<SyncEntry, PersistenceError> {
        let conn = self.lock()?;
        if !db::mark_sync_failed(&conn, &id, error, guest_ids, &now())? {
            let entry = Self::load_sync_entry(&conn, &id)?;
            return Err(PersistenceError::Conflict(format!(
                "sync entry {id} is already {}",
                entry.status
            )));
        }
        Self::load_sync_entry(&conn, &id)
    }
}
