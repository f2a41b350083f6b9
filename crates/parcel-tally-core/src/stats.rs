//! Session progress: total, scanned, missing and rounded percentage.
//!
//! The counters cached on `scan_session` are an optimisation. Everything here
//! can be rebuilt from the item rows, and [`reconcile`] does exactly that.

use crate::error::Error;
use crate::storage::Database;
use serde::Serialize;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub total: i64,
    pub scanned_count: i64,
    pub missing_count: i64,
    pub progress: i64,
}

impl SessionStats {
    pub fn from_counts(total: i64, scanned_count: i64) -> Result<Self, Error> {
        let missing_count = total - scanned_count;
        if total < 0 || scanned_count < 0 || missing_count < 0 {
            error!(
                total,
                scanned_count, "session counters are inconsistent with the manifest"
            );
            return Err(Error::InvariantViolation(format!(
                "scanned count {} exceeds total {}",
                scanned_count, total
            )));
        }

        Ok(Self {
            total,
            scanned_count,
            missing_count,
            progress: progress_percent(scanned_count, total),
        })
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.missing_count == 0
    }
}

/// `round(scanned / total * 100)`, ties away from zero, 0 for an empty manifest.
pub fn progress_percent(scanned: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    // (200s + t) / 2t == floor(100s/t + 0.5) for non-negative operands
    (200 * scanned + total) / (2 * total)
}

/// Stats derived from the item rows alone, ignoring the cached counters.
pub fn recompute(db: &Database, session_id: i64) -> Result<SessionStats, Error> {
    let (total, scanned) = db.count_items(session_id)?;
    SessionStats::from_counts(total, scanned)
}

/// Rebuild the stats from the item set and overwrite the cached counters if
/// they drifted. Returns the authoritative stats.
pub fn reconcile(db: &Database, session_id: i64) -> Result<SessionStats, Error> {
    let (cached, (total, scanned)) = db.recount_session(session_id)?;

    if cached != (total, scanned) {
        warn!(
            session_id,
            cached_total = cached.0,
            cached_scanned = cached.1,
            total,
            scanned,
            "cached session counters drifted, rewrote them from item set"
        );
    }

    SessionStats::from_counts(total, scanned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_empty_manifest() {
        assert_eq!(progress_percent(0, 0), 0);
        let stats = SessionStats::from_counts(0, 0).unwrap();
        assert_eq!(stats.progress, 0);
        assert!(!stats.is_complete());
    }

    #[test]
    fn test_progress_rounding() {
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 67);
        assert_eq!(progress_percent(1, 8), 13); // 12.5 rounds up
        assert_eq!(progress_percent(1, 200), 1); // 0.5 rounds up
        assert_eq!(progress_percent(3, 3), 100);
        assert_eq!(progress_percent(0, 5), 0);
    }

    #[test]
    fn test_from_counts_conservation() {
        let stats = SessionStats::from_counts(3, 1).unwrap();
        assert_eq!(stats.missing_count, 2);
        assert_eq!(stats.scanned_count + stats.missing_count, stats.total);
    }

    #[test]
    fn test_negative_missing_is_an_invariant_violation() {
        let err = SessionStats::from_counts(2, 3).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
    }

    #[test]
    fn test_stats_serialize_camel_case() {
        let json = serde_json::to_value(SessionStats::from_counts(3, 2).unwrap()).unwrap();
        assert_eq!(json["scannedCount"], 2);
        assert_eq!(json["missingCount"], 1);
        assert_eq!(json["progress"], 67);
    }
}
