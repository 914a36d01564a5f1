use std::str::FromStr;

use rusqlite::{params, Connection};

use super::OptionalRow;
use crate::db::DatabaseError;
use crate::models::*;

/// Occupants are derived from checked-in guests, so `room.occupants` is ignored.
pub fn insert_room(conn: &Connection, room: &Room) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO rooms (id, label, capacity, status) VALUES (?1, ?2, ?3, ?4)",
        params![room.id, room.label, room.capacity, room.status.as_str()],
    )?;
    Ok(())
}

pub fn get_room(conn: &Connection, id: &str) -> Result<Option<Room>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT r.id, r.label, r.capacity, r.status,
             (SELECT COUNT(*) FROM guests g WHERE g.room_id = r.id AND g.status = 'checked_in')
             FROM rooms r WHERE r.id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, u32>(4)?,
                ))
            },
        )
        .optional()?;

    match row {
        Some((id, label, capacity, status, occupants)) => Ok(Some(Room {
            id,
            label,
            capacity,
            status: RoomStatus::from_str(&status)?,
            occupants,
        })),
        None => Ok(None),
    }
}

pub fn list_rooms(conn: &Connection) -> Result<Vec<Room>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT id FROM rooms ORDER BY id")?;
    let ids = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut rooms = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(room) = get_room(conn, &id)? {
            rooms.push(room);
        }
    }
    Ok(rooms)
}

pub fn set_room_status(
    conn: &Connection,
    id: &str,
    status: RoomStatus,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE rooms SET status = ?2 WHERE id = ?1",
        params![id, status.as_str()],
    )?;
    Ok(changed > 0)
}
