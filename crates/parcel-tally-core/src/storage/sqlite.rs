use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, Result};
use tracing::debug;

pub const SCHEMA_VERSION: i64 = 1;

/// SQLite-backed manifest store.
///
/// A single connection sits behind a mutex so the handle can be shared
/// between scan workers. Statements are short; the mutex is never held
/// across a caller's critical section.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        configure_pragmas(&conn)?;
        migrate_schema(&conn)?;
        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    pub fn truncate_all(&self) -> Result<()> {
        self.connection().execute_batch(
            "DELETE FROM manifest_item;
             DELETE FROM scan_session;",
        )?;
        debug!("All tables truncated");
        Ok(())
    }
}

fn configure_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    debug!("SQLite pragmas configured (WAL mode, foreign keys on)");
    Ok(())
}

fn migrate_schema(conn: &Connection) -> Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version == 0 {
        debug!("Fresh database, creating schema version {}", SCHEMA_VERSION);
    }

    conn.execute_batch(include_str!("schema.sql"))?;
    debug!("SQLite schema initialized (version {})", SCHEMA_VERSION);
    Ok(())
}
