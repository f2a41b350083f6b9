use super::models::*;
use super::sqlite::Database;
use crate::error::Error;
use crate::manifest::ManifestRecord;
use crate::stats::progress_percent;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::debug;

const SESSION_COLUMNS: &str = "id, name, created_by, is_active, created_at";

const ITEM_COLUMNS: &str = "id, session_id, tracking_id, recipient, product_name, \
                            status, scanned_at, scanned_by";

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        name: row.get(1)?,
        created_by: row.get(2)?,
        is_active: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        session_id: row.get(1)?,
        tracking_id: row.get(2)?,
        recipient: row.get(3)?,
        product_name: row.get(4)?,
        status: row.get(5)?,
        scanned_at: row.get(6)?,
        scanned_by: row.get(7)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn select_session(conn: &Connection, session_id: i64) -> rusqlite::Result<Option<Session>> {
    conn.query_row(
        &format!("SELECT {} FROM scan_session WHERE id = ?1", SESSION_COLUMNS),
        params![session_id],
        session_from_row,
    )
    .optional()
}

fn select_item(conn: &Connection, item_id: i64) -> rusqlite::Result<Option<Item>> {
    conn.query_row(
        &format!("SELECT {} FROM manifest_item WHERE id = ?1", ITEM_COLUMNS),
        params![item_id],
        item_from_row,
    )
    .optional()
}

/// Insert already validated records. A collision with an existing row of the
/// same session is reported as a validation error naming the tracking id.
fn insert_items(
    conn: &Connection,
    session_id: i64,
    records: &[ManifestRecord],
) -> Result<usize, Error> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO manifest_item (session_id, tracking_id, recipient, product_name, status) \
         VALUES (?1, ?2, ?3, ?4, 'UNSCANNED')",
    )?;

    let mut count = 0;
    for record in records {
        match stmt.execute(params![
            session_id,
            record.tracking_id,
            record.recipient,
            record.product_name
        ]) {
            Ok(rows) => count += rows,
            Err(e) if is_unique_violation(&e) => {
                return Err(Error::Validation(format!(
                    "tracking id '{}' already exists in session {}",
                    record.tracking_id, session_id
                )));
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(count)
}

impl Database {
    // ── Sessions ─────────────────────────────────────────────────

    /// Create a session and its whole manifest in one transaction.
    /// `records` must already be validated.
    pub fn create_session_with_manifest(
        &self,
        name: &str,
        created_by: &str,
        records: &[ManifestRecord],
    ) -> Result<Session, Error> {
        let mut conn = self.connection();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let now = Utc::now();
        tx.execute(
            "INSERT INTO scan_session (name, created_by, is_active, created_at) \
             VALUES (?1, ?2, 1, ?3)",
            params![name, created_by, now],
        )?;
        let session_id = tx.last_insert_rowid();

        let inserted = insert_items(&tx, session_id, records)?;
        tx.execute(
            "UPDATE scan_session SET total_count = ?1 WHERE id = ?2",
            params![inserted as i64, session_id],
        )?;

        let session = select_session(&tx, session_id)?
            .ok_or_else(|| Error::session_not_found(session_id))?;
        tx.commit()?;

        debug!("Created session {} with {} items", session_id, inserted);
        Ok(session)
    }

    /// Append validated records to an existing session. All or nothing.
    pub fn import_manifest(
        &self,
        session_id: i64,
        records: &[ManifestRecord],
    ) -> Result<usize, Error> {
        let mut conn = self.connection();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if select_session(&tx, session_id)?.is_none() {
            return Err(Error::session_not_found(session_id));
        }

        let inserted = insert_items(&tx, session_id, records)?;
        tx.execute(
            "UPDATE scan_session SET total_count = total_count + ?1 WHERE id = ?2",
            params![inserted as i64, session_id],
        )?;
        tx.commit()?;

        debug!("Imported {} items into session {}", inserted, session_id);
        Ok(inserted)
    }

    pub fn get_session(&self, session_id: i64) -> rusqlite::Result<Option<Session>> {
        select_session(&self.connection(), session_id)
    }

    /// Sessions newest first with their cached (total, scanned) counters.
    pub fn list_sessions(&self, active_only: bool) -> rusqlite::Result<Vec<(Session, i64, i64)>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, total_count, scanned_count FROM scan_session \
             WHERE (?1 = 0 OR is_active = 1) \
             ORDER BY created_at DESC, id DESC",
            SESSION_COLUMNS
        ))?;

        let sessions = stmt
            .query_map(params![active_only], |row| {
                Ok((session_from_row(row)?, row.get(5)?, row.get(6)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }

    pub fn update_session(
        &self,
        session_id: i64,
        update: &SessionUpdate,
    ) -> rusqlite::Result<Option<Session>> {
        let conn = self.connection();
        conn.execute(
            "UPDATE scan_session SET name = COALESCE(?1, name), \
             is_active = COALESCE(?2, is_active) WHERE id = ?3",
            params![update.name, update.is_active, session_id],
        )?;
        select_session(&conn, session_id)
    }

    /// Delete a session; its items go with it through the cascading foreign key.
    pub fn delete_session(&self, session_id: i64) -> rusqlite::Result<bool> {
        let deleted = self.connection().execute(
            "DELETE FROM scan_session WHERE id = ?1",
            params![session_id],
        )?;
        Ok(deleted > 0)
    }

    // ── Items ────────────────────────────────────────────────────

    pub fn find_item_by_tracking_id(
        &self,
        session_id: i64,
        tracking_id: &str,
    ) -> rusqlite::Result<Option<Item>> {
        self.connection()
            .query_row(
                &format!(
                    "SELECT {} FROM manifest_item WHERE session_id = ?1 AND tracking_id = ?2",
                    ITEM_COLUMNS
                ),
                params![session_id, tracking_id],
                item_from_row,
            )
            .optional()
    }

    pub fn get_item(&self, item_id: i64) -> rusqlite::Result<Option<Item>> {
        select_item(&self.connection(), item_id)
    }

    /// Items of a session in import order, optionally narrowed to one status.
    pub fn list_items(
        &self,
        session_id: i64,
        status: Option<ItemStatus>,
    ) -> rusqlite::Result<Vec<Item>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM manifest_item \
             WHERE session_id = ?1 AND (?2 IS NULL OR status = ?2) \
             ORDER BY id",
            ITEM_COLUMNS
        ))?;
        let items = stmt
            .query_map(params![session_id, status], item_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// Flip an item from UNSCANNED to SCANNED and bump its session's scanned
    /// counter in the same transaction.
    ///
    /// The update is conditional on the row still being UNSCANNED, so a
    /// concurrent writer that got there first (even from another process)
    /// makes this return `None` and nothing is changed.
    pub fn mark_scanned(
        &self,
        item_id: i64,
        operator_id: &str,
        scanned_at: DateTime<Utc>,
    ) -> Result<Option<Item>, Error> {
        let mut conn = self.connection();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let changed = tx.execute(
            "UPDATE manifest_item SET status = 'SCANNED', scanned_at = ?1, scanned_by = ?2 \
             WHERE id = ?3 AND status = 'UNSCANNED'",
            params![scanned_at, operator_id, item_id],
        )?;
        if changed == 0 {
            return Ok(None);
        }

        tx.execute(
            "UPDATE scan_session SET scanned_count = scanned_count + 1 \
             WHERE id = (SELECT session_id FROM manifest_item WHERE id = ?1)",
            params![item_id],
        )?;
        let item = select_item(&tx, item_id)?.ok_or_else(|| Error::item_not_found(item_id))?;
        tx.commit()?;

        Ok(Some(item))
    }

    /// Overwrite an item with `updated` and shift the session counters by the
    /// status transition, atomically. Caller resolves the new field values.
    pub fn replace_item(&self, updated: &Item) -> Result<Item, Error> {
        let mut conn = self.connection();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current =
            select_item(&tx, updated.id)?.ok_or_else(|| Error::item_not_found(updated.id))?;

        let result = tx.execute(
            "UPDATE manifest_item SET tracking_id = ?1, recipient = ?2, product_name = ?3, \
             status = ?4, scanned_at = ?5, scanned_by = ?6 WHERE id = ?7",
            params![
                updated.tracking_id,
                updated.recipient,
                updated.product_name,
                updated.status,
                updated.scanned_at,
                updated.scanned_by,
                updated.id
            ],
        );
        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(Error::Validation(format!(
                    "tracking id '{}' already exists in session {}",
                    updated.tracking_id, current.session_id
                )));
            }
            Err(e) => return Err(e.into()),
        }

        let delta: i64 = match (current.status, updated.status) {
            (ItemStatus::Unscanned, ItemStatus::Scanned) => 1,
            (ItemStatus::Scanned, ItemStatus::Unscanned) => -1,
            _ => 0,
        };
        if delta != 0 {
            tx.execute(
                "UPDATE scan_session SET scanned_count = scanned_count + ?1 WHERE id = ?2",
                params![delta, current.session_id],
            )?;
        }

        let item =
            select_item(&tx, updated.id)?.ok_or_else(|| Error::item_not_found(updated.id))?;
        tx.commit()?;
        Ok(item)
    }

    /// Remove an item and take it out of its session's counters.
    pub fn delete_item(&self, item_id: i64) -> Result<Item, Error> {
        let mut conn = self.connection();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let item = select_item(&tx, item_id)?.ok_or_else(|| Error::item_not_found(item_id))?;
        tx.execute("DELETE FROM manifest_item WHERE id = ?1", params![item_id])?;
        tx.execute(
            "UPDATE scan_session SET total_count = total_count - 1, \
             scanned_count = scanned_count - ?1 WHERE id = ?2",
            params![item.is_scanned() as i64, item.session_id],
        )?;
        tx.commit()?;

        debug!("Deleted item {} from session {}", item_id, item.session_id);
        Ok(item)
    }

    // ── Counters ─────────────────────────────────────────────────

    /// (total, scanned) counted from the item rows.
    pub fn count_items(&self, session_id: i64) -> Result<(i64, i64), Error> {
        let conn = self.connection();
        if select_session(&conn, session_id)?.is_none() {
            return Err(Error::session_not_found(session_id));
        }
        let counts = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(status = 'SCANNED'), 0) \
             FROM manifest_item WHERE session_id = ?1",
            params![session_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(counts)
    }

    /// (total, scanned) as cached on the session row.
    pub fn cached_counts(&self, session_id: i64) -> Result<(i64, i64), Error> {
        self.connection()
            .query_row(
                "SELECT total_count, scanned_count FROM scan_session WHERE id = ?1",
                params![session_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| Error::session_not_found(session_id))
    }

    /// Recount a session's items and overwrite the cached counters if they
    /// drifted. Read, recount and rewrite share one immediate transaction, so
    /// no scan can commit between them. Returns `(cached, recounted)`.
    pub fn recount_session(&self, session_id: i64) -> Result<((i64, i64), (i64, i64)), Error> {
        let mut conn = self.connection();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let cached: (i64, i64) = tx
            .query_row(
                "SELECT total_count, scanned_count FROM scan_session WHERE id = ?1",
                params![session_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| Error::session_not_found(session_id))?;
        let recounted: (i64, i64) = tx.query_row(
            "SELECT COUNT(*), COALESCE(SUM(status = 'SCANNED'), 0) \
             FROM manifest_item WHERE session_id = ?1",
            params![session_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        if cached != recounted {
            tx.execute(
                "UPDATE scan_session SET total_count = ?1, scanned_count = ?2 WHERE id = ?3",
                params![recounted.0, recounted.1, session_id],
            )?;
        }
        tx.commit()?;

        Ok((cached, recounted))
    }

    pub fn write_cached_counts(
        &self,
        session_id: i64,
        total: i64,
        scanned: i64,
    ) -> rusqlite::Result<()> {
        self.connection().execute(
            "UPDATE scan_session SET total_count = ?1, scanned_count = ?2 WHERE id = ?3",
            params![total, scanned, session_id],
        )?;
        Ok(())
    }

    // ── Dashboard ────────────────────────────────────────────────

    /// Figures for the warehouse dashboard. `since` marks the start of the
    /// reporting day.
    pub fn dashboard_stats(&self, since: DateTime<Utc>) -> rusqlite::Result<DashboardStats> {
        let conn = self.connection();

        let sessions_created: i64 = conn.query_row(
            "SELECT COUNT(*) FROM scan_session WHERE created_at >= ?1",
            params![since],
            |row| row.get(0),
        )?;
        let scanned_since: i64 = conn.query_row(
            "SELECT COUNT(*) FROM manifest_item WHERE status = 'SCANNED' AND scanned_at >= ?1",
            params![since],
            |row| row.get(0),
        )?;
        let active_sessions: i64 = conn.query_row(
            "SELECT COUNT(*) FROM scan_session WHERE is_active = 1",
            [],
            |row| row.get(0),
        )?;
        let (total, scanned): (i64, i64) = conn.query_row(
            "SELECT COUNT(mi.id), COALESCE(SUM(mi.status = 'SCANNED'), 0) \
             FROM manifest_item mi \
             JOIN scan_session s ON s.id = mi.session_id \
             WHERE s.is_active = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(DashboardStats {
            sessions_created,
            scanned_since,
            active_sessions,
            overall_progress: progress_percent(scanned, total),
        })
    }

    /// Most recently scanned items across all sessions, newest first.
    pub fn recent_scans(&self, limit: usize) -> rusqlite::Result<Vec<RecentScan>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(
            "SELECT mi.id, mi.session_id, s.name, mi.tracking_id, mi.product_name, \
                    mi.scanned_at, mi.scanned_by \
             FROM manifest_item mi \
             JOIN scan_session s ON s.id = mi.session_id \
             WHERE mi.status = 'SCANNED' AND mi.scanned_at IS NOT NULL \
             ORDER BY mi.scanned_at DESC, mi.id DESC \
             LIMIT ?1",
        )?;
        let scans = stmt
            .query_map(params![limit as i64], |row| {
                Ok(RecentScan {
                    item_id: row.get(0)?,
                    session_id: row.get(1)?,
                    session_name: row.get(2)?,
                    tracking_id: row.get(3)?,
                    product_name: row.get(4)?,
                    scanned_at: row.get(5)?,
                    scanned_by: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(scans)
    }
}
