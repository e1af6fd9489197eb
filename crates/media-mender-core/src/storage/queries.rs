use super::models::AuditRecord;
use super::sqlite::Database;
use crate::error::Error;
use crate::model::{RepairOutcome, RepairStatus};
use rusqlite::{params, Result, Row};
use tracing::trace;

const SELECT_COLUMNS: &str =
    "SELECT path, file_type, status, checksum, timestamp, file_size, error_message FROM file_audit";

fn record_from_row(row: &Row<'_>) -> Result<AuditRecord> {
    Ok(AuditRecord {
        path: row.get(0)?,
        file_type: row.get(1)?,
        status: row.get(2)?,
        checksum: row.get(3)?,
        timestamp: row.get(4)?,
        file_size: row.get(5)?,
        error_message: row.get(6)?,
    })
}

impl Database {
    /// Insert or replace the audit row for the outcome's path.
    pub fn upsert(&self, outcome: &RepairOutcome) -> std::result::Result<(), Error> {
        let path = outcome.path.to_string_lossy().into_owned();
        self.connection()
            .execute(
                "INSERT INTO file_audit \
                 (path, file_type, status, checksum, timestamp, file_size, error_message) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                 ON CONFLICT(path) DO UPDATE SET \
                 file_type = excluded.file_type, status = excluded.status, \
                 checksum = excluded.checksum, timestamp = excluded.timestamp, \
                 file_size = excluded.file_size, error_message = excluded.error_message",
                params![
                    path,
                    outcome.media_kind.as_str(),
                    outcome.status.as_str(),
                    outcome.checksum,
                    outcome.timestamp,
                    outcome.file_size.map(|s| s as i64),
                    outcome.error_message,
                ],
            )
            .map_err(|e| Error::Persistence(format!("{}: {}", path, e)))?;
        trace!("Audit row upserted for {}", path);
        Ok(())
    }

    pub fn get_record(&self, path: &str) -> Result<Option<AuditRecord>> {
        let conn = self.connection();
        match conn.query_row(
            &format!("{} WHERE path = ?1", SELECT_COLUMNS),
            params![path],
            record_from_row,
        ) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// List audit rows ordered by path, optionally restricted to one status.
    pub fn list_records(
        &self,
        status: Option<RepairStatus>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AuditRecord>> {
        let conn = self.connection();
        match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE status = ?1 ORDER BY path LIMIT ?2 OFFSET ?3",
                    SELECT_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![status.as_str(), limit, offset], record_from_row)?
                    .collect::<Result<Vec<_>>>()?;
                Ok(rows)
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "{} ORDER BY path LIMIT ?1 OFFSET ?2",
                    SELECT_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![limit, offset], record_from_row)?
                    .collect::<Result<Vec<_>>>()?;
                Ok(rows)
            }
        }
    }

    pub fn count_records(&self) -> Result<i64> {
        self.connection()
            .query_row("SELECT COUNT(*) FROM file_audit", [], |row| row.get(0))
    }

    /// Row count per status, ordered by status name.
    pub fn status_counts(&self) -> Result<Vec<(String, i64)>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM file_audit GROUP BY status ORDER BY status",
        )?;
        let counts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>>>()?;
        Ok(counts)
    }

    pub fn delete_record(&self, path: &str) -> Result<bool> {
        let affected = self
            .connection()
            .execute("DELETE FROM file_audit WHERE path = ?1", params![path])?;
        Ok(affected > 0)
    }
}
