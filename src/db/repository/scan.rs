use rusqlite::{params, Connection};

use super::format_datetime;
use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_scan_record(conn: &Connection, scan: &ScanRecord) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO scan_records (id, provider, fallback_used, document_count, quality_score,
         image_sha256, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            scan.id.to_string(),
            scan.provider,
            scan.fallback_used as i32,
            scan.document_count,
            scan.quality_score,
            scan.image_sha256,
            format_datetime(&scan.created_at),
        ],
    )?;
    Ok(())
}

/// Totals for cost tracking. Providers sorted by scan count, then name.
pub fn scan_stats(conn: &Connection) -> Result<ScanStats, DatabaseError> {
    let (total, fallbacks) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(fallback_used), 0) FROM scan_records",
        [],
        |row| Ok((row.get::<_, u32>(0)?, row.get::<_, u32>(1)?)),
    )?;

    let mut stmt = conn.prepare(
        "SELECT provider, COUNT(*) AS n FROM scan_records
         GROUP BY provider ORDER BY n DESC, provider",
    )?;
    let by_provider = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ScanStats {
        total,
        fallbacks,
        by_provider,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use chrono::Utc;
    use uuid::Uuid;

    fn scan(provider: &str, fallback_used: bool) -> ScanRecord {
        ScanRecord {
            id: Uuid::new_v4(),
            provider: provider.into(),
            fallback_used,
            document_count: 1,
            quality_score: Some(72),
            image_sha256: "ab".repeat(32),
            created_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn empty_stats() {
        let conn = open_memory_database().unwrap();
        assert_eq!(scan_stats(&conn).unwrap(), ScanStats::default());
    }

    #[test]
    fn stats_group_by_provider() {
        let conn = open_memory_database().unwrap();
        insert_scan_record(&conn, &scan("economy", false)).unwrap();
        insert_scan_record(&conn, &scan("offline", true)).unwrap();
        insert_scan_record(&conn, &scan("offline", true)).unwrap();
        insert_scan_record(&conn, &scan("premium", false)).unwrap();

        let stats = scan_stats(&conn).unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.fallbacks, 2);
        assert_eq!(
            stats.by_provider,
            vec![
                ("offline".to_string(), 2),
                ("economy".to_string(), 1),
                ("premium".to_string(), 1),
            ]
        );
    }
}
