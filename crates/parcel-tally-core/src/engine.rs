use crate::activity::{ActivitySink, ScanActivity, SilentSink};
use crate::config::{AppConfig, DEFAULT_RECENT_ACTIVITY_LIMIT};
use crate::error::Error;
use crate::guard::{ItemLockGuard, ItemLocks};
use crate::manifest::{self, ManifestRecord};
use crate::matcher::{self, Classification, ScanStatus};
use crate::stats::{self, SessionStats};
use crate::storage::models::{
    DashboardStats, Item, ItemFilter, ItemStatus, ItemUpdate, RecentScan, Session, SessionUpdate,
};
use crate::storage::Database;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Owns the manifests of all sessions and is the only path through which a
/// scan can change an item's status.
pub struct ScanEngine {
    db: Database,
    locks: ItemLocks,
    activity: Arc<dyn ActivitySink>,
    recent_activity_limit: usize,
}

/// Result of one scan: the classification, a human readable message, the
/// matched item (absent for INVALID) and the session stats after the scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutcome {
    pub status: ScanStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<Item>,
    pub stats: SessionStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: Session,
    pub items: Vec<Item>,
    pub stats: SessionStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    #[serde(flatten)]
    pub session: Session,
    pub stats: SessionStats,
}

impl ScanEngine {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            locks: ItemLocks::new(),
            activity: Arc::new(SilentSink),
            recent_activity_limit: DEFAULT_RECENT_ACTIVITY_LIMIT,
        }
    }

    pub fn open(config: &AppConfig) -> Result<Self, Error> {
        let db = Database::open(&config.database_path)?;
        debug!("Opened manifest database at {}", config.database_path);
        Ok(Self::new(db).with_recent_activity_limit(config.recent_activity_limit))
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    pub fn with_activity_sink(mut self, sink: Arc<dyn ActivitySink>) -> Self {
        self.activity = sink;
        self
    }

    pub fn with_recent_activity_limit(mut self, limit: usize) -> Self {
        self.recent_activity_limit = limit;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // ── Session lifecycle ────────────────────────────────────────

    /// Create a session with its full manifest. Validation happens before
    /// anything is written, and the write itself is one transaction, so a
    /// bad record leaves no trace.
    pub fn create_session(
        &self,
        name: &str,
        records: &[ManifestRecord],
        created_by: &str,
    ) -> Result<Session, Error> {
        let name = require_name(name)?;
        let records = manifest::validate_records(records)?;
        let session = self
            .db
            .create_session_with_manifest(name, created_by, &records)?;
        info!(
            session_id = session.id,
            items = records.len(),
            "Created session '{}'",
            session.name
        );
        Ok(session)
    }

    /// Append records to an existing session's manifest. All or nothing; a
    /// tracking id already present in the session rejects the batch.
    pub fn import_manifest(
        &self,
        session_id: i64,
        records: &[ManifestRecord],
    ) -> Result<usize, Error> {
        let records = manifest::validate_records(records)?;
        let count = self.db.import_manifest(session_id, &records)?;
        info!(session_id, items = count, "Imported manifest records");
        Ok(count)
    }

    /// Administrative creation of a single manifest item.
    pub fn add_item(&self, session_id: i64, record: ManifestRecord) -> Result<Item, Error> {
        let records = manifest::validate_records(std::slice::from_ref(&record))?;
        self.db.import_manifest(session_id, &records)?;
        self.db
            .find_item_by_tracking_id(session_id, &records[0].tracking_id)?
            .ok_or_else(|| {
                Error::InvariantViolation(format!(
                    "item '{}' missing right after insert",
                    records[0].tracking_id
                ))
            })
    }

    pub fn get_session(&self, session_id: i64) -> Result<Session, Error> {
        self.db
            .get_session(session_id)?
            .ok_or_else(|| Error::session_not_found(session_id))
    }

    /// Session with all its items. Stats are derived from the same item
    /// snapshot that is returned.
    pub fn get_session_detail(&self, session_id: i64) -> Result<SessionDetail, Error> {
        let session = self.get_session(session_id)?;
        let items = self.db.list_items(session_id, None)?;
        let scanned = items.iter().filter(|item| item.is_scanned()).count() as i64;
        let stats = SessionStats::from_counts(items.len() as i64, scanned)?;
        Ok(SessionDetail {
            session,
            items,
            stats,
        })
    }

    /// Current stats from the session's cached counters.
    pub fn session_stats(&self, session_id: i64) -> Result<SessionStats, Error> {
        let (total, scanned) = self.db.cached_counts(session_id)?;
        SessionStats::from_counts(total, scanned)
    }

    /// Sessions newest first, optionally only the active ones.
    pub fn list_sessions(&self, active_only: bool) -> Result<Vec<SessionSummary>, Error> {
        self.db
            .list_sessions(active_only)?
            .into_iter()
            .map(|(session, total, scanned)| {
                Ok(SessionSummary {
                    session,
                    stats: SessionStats::from_counts(total, scanned)?,
                })
            })
            .collect()
    }

    pub fn list_items(&self, session_id: i64, filter: &ItemFilter) -> Result<Vec<Item>, Error> {
        self.get_session(session_id)?;
        let items = self.db.list_items(session_id, filter.status)?;
        Ok(items.into_iter().filter(|item| filter.matches(item)).collect())
    }

    pub fn update_session(&self, session_id: i64, update: SessionUpdate) -> Result<Session, Error> {
        let update = SessionUpdate {
            name: update.name.as_deref().map(require_name).transpose()?.map(str::to_string),
            is_active: update.is_active,
        };
        let session = self
            .db
            .update_session(session_id, &update)?
            .ok_or_else(|| Error::session_not_found(session_id))?;
        info!(session_id, "Updated session");
        Ok(session)
    }

    pub fn delete_session(&self, session_id: i64) -> Result<(), Error> {
        if !self.db.delete_session(session_id)? {
            return Err(Error::session_not_found(session_id));
        }
        info!(session_id, "Deleted session and its manifest");
        Ok(())
    }

    // ── Scanning ─────────────────────────────────────────────────

    /// Classify one scan and, for a first scan of a manifest item, record it.
    ///
    /// Lookup, decision and mutation happen inside the critical section of
    /// `(session_id, tracking_id)`, so concurrent scans of the same code get
    /// exactly one SUCCESS. The activity sink is notified after the section
    /// is released.
    pub fn scan(
        &self,
        session_id: i64,
        raw: &str,
        operator_id: &str,
    ) -> Result<ScanOutcome, Error> {
        let tracking_id = matcher::normalize_tracking_id(raw)?;
        self.get_session(session_id)?;

        let outcome = self.locks.with_item(session_id, tracking_id, || {
            self.resolve_scan(session_id, tracking_id, operator_id)
        })?;

        debug!(
            session_id,
            tracking_id,
            operator_id,
            status = %outcome.status,
            "Scan classified"
        );

        if outcome.status.is_logged() {
            self.activity.on_scan(&ScanActivity {
                session_id,
                tracking_id: tracking_id.to_string(),
                status: outcome.status,
                operator_id: operator_id.to_string(),
                product_name: outcome.item.as_ref().and_then(|i| i.product_name.clone()),
            });
        }

        Ok(outcome)
    }

    /// Body of the critical section. Must only run under the item lock.
    fn resolve_scan(
        &self,
        session_id: i64,
        tracking_id: &str,
        operator_id: &str,
    ) -> Result<ScanOutcome, Error> {
        let (status, message, item) = loop {
            match matcher::classify(&self.db, session_id, tracking_id)? {
                Classification::Unknown => break invalid(),
                Classification::AlreadyScanned(item) => break duplicate(item),
                Classification::Unscanned(item) => {
                    let marked = self.db.mark_scanned(item.id, operator_id, Utc::now())?;
                    if let Some(scanned) = marked {
                        break (
                            ScanStatus::Success,
                            matcher::success_message(&scanned),
                            Some(scanned),
                        );
                    }
                    // Another writer on the same database file changed the row
                    // between lookup and update: classify it again.
                    debug!(session_id, tracking_id, "scan lost compare-and-set, reclassifying");
                }
            }
        };

        Ok(ScanOutcome {
            status,
            message,
            item,
            stats: self.session_stats(session_id)?,
        })
    }

    // ── Administrative item edits ────────────────────────────────

    /// Edit an item outside the scan path.
    ///
    /// Setting SCANNED on an unscanned item stamps the current time and
    /// `actor` as provenance unless the update carries its own; setting
    /// UNSCANNED clears both. Session counters move in the same transaction
    /// as the item.
    pub fn update_item(
        &self,
        item_id: i64,
        update: ItemUpdate,
        actor: &str,
    ) -> Result<Item, Error> {
        let new_tracking_id = update
            .tracking_id
            .as_deref()
            .map(matcher::normalize_tracking_id)
            .transpose()?;

        let (current, _guards) = self.lock_item(item_id, new_tracking_id)?;

        let mut updated = current.clone();
        if let Some(tracking_id) = new_tracking_id {
            updated.tracking_id = tracking_id.to_string();
        }
        if let Some(recipient) = update.recipient.as_deref() {
            updated.recipient = manifest::non_blank(Some(recipient));
        }
        if let Some(product_name) = update.product_name.as_deref() {
            updated.product_name = manifest::non_blank(Some(product_name));
        }
        match update.status {
            Some(ItemStatus::Scanned) if !current.is_scanned() => {
                updated.status = ItemStatus::Scanned;
                updated.scanned_at = Some(Utc::now());
                updated.scanned_by = Some(actor.to_string());
            }
            Some(ItemStatus::Unscanned) => {
                updated.status = ItemStatus::Unscanned;
                updated.scanned_at = None;
                updated.scanned_by = None;
            }
            _ => {}
        }
        if updated.is_scanned() {
            if let Some(scanned_at) = update.scanned_at {
                updated.scanned_at = Some(scanned_at);
            }
            if let Some(scanned_by) = manifest::non_blank(update.scanned_by.as_deref()) {
                updated.scanned_by = Some(scanned_by);
            }
        }

        let item = self.db.replace_item(&updated)?;
        info!(
            item_id,
            session_id = item.session_id,
            actor,
            status = %item.status,
            "Updated item {}",
            item.tracking_id
        );
        Ok(item)
    }

    pub fn delete_item(&self, item_id: i64) -> Result<Item, Error> {
        let (_, _guards) = self.lock_item(item_id, None)?;
        let item = self.db.delete_item(item_id)?;
        info!(item_id, session_id = item.session_id, "Deleted item {}", item.tracking_id);
        Ok(item)
    }

    /// Take the scan lock of an item (and of the tracking id it is about to
    /// get, if any) and return its state as read under that lock.
    fn lock_item(
        &self,
        item_id: i64,
        new_tracking_id: Option<&str>,
    ) -> Result<(Item, Vec<ItemLockGuard<'_>>), Error> {
        loop {
            let seen = self
                .db
                .get_item(item_id)?
                .ok_or_else(|| Error::item_not_found(item_id))?;

            let mut keys = vec![seen.tracking_id.as_str()];
            keys.extend(new_tracking_id);
            let guards = self.locks.lock_many(seen.session_id, &keys);

            let current = self
                .db
                .get_item(item_id)?
                .ok_or_else(|| Error::item_not_found(item_id))?;
            // Renamed between the read and the lock: retry with the new key.
            if current.tracking_id == seen.tracking_id {
                return Ok((current, guards));
            }
        }
    }

    // ── Aggregates ───────────────────────────────────────────────

    /// Rebuild a session's stats from its items and heal the cached counters.
    pub fn reconcile_stats(&self, session_id: i64) -> Result<SessionStats, Error> {
        stats::reconcile(&self.db, session_id)
    }

    pub fn dashboard_stats(&self, since: DateTime<Utc>) -> Result<DashboardStats, Error> {
        Ok(self.db.dashboard_stats(since)?)
    }

    /// Latest scans across sessions. `None` uses the configured limit.
    pub fn recent_activity(&self, limit: Option<usize>) -> Result<Vec<RecentScan>, Error> {
        Ok(self
            .db
            .recent_scans(limit.unwrap_or(self.recent_activity_limit))?)
    }
}

fn require_name(name: &str) -> Result<&str, Error> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Validation("session name is required".to_string()));
    }
    Ok(name)
}

fn invalid() -> (ScanStatus, String, Option<Item>) {
    (ScanStatus::Invalid, matcher::INVALID_MESSAGE.to_string(), None)
}

fn duplicate(item: Item) -> (ScanStatus, String, Option<Item>) {
    (ScanStatus::Duplicate, matcher::duplicate_message(&item), Some(item))
}
