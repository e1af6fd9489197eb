use rusqlite::{Connection, Result};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Durable audit log backed by SQLite.
///
/// The connection sits behind a mutex: workers upsert concurrently and
/// every write is serialized here.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.configure_pragmas()?;
        db.migrate_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.configure_pragmas()?;
        db.migrate_schema()?;
        Ok(db)
    }

    fn configure_pragmas(&self) -> Result<()> {
        self.connection().execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        debug!("SQLite pragmas configured (WAL mode)");
        Ok(())
    }

    /// Check schema version and create the audit table if needed.
    fn migrate_schema(&self) -> Result<()> {
        let conn = self.connection();
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        conn.execute_batch(include_str!("schema.sql"))?;
        debug!("SQLite schema initialized (was version {}, now 1)", version);
        Ok(())
    }

    /// Lock the connection. A poisoned lock is recovered: the connection
    /// itself stays consistent because every statement is atomic.
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn truncate_all(&self) -> Result<()> {
        self.connection().execute_batch("DELETE FROM file_audit;")?;
        debug!("Audit table truncated");
        Ok(())
    }
}
