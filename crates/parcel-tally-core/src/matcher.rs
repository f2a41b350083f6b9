//! Scan classification. Read-only: the guard calls [`classify`] inside its
//! critical section and performs any mutation itself.

use crate::error::Error;
use crate::storage::models::{Item, ItemStatus};
use crate::storage::Database;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const INVALID_MESSAGE: &str = "tracking ID not registered in this manifest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    Success,
    Duplicate,
    Invalid,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Success => "SUCCESS",
            ScanStatus::Duplicate => "DUPLICATE",
            ScanStatus::Invalid => "INVALID",
        }
    }

    /// Whether an outcome with this status is reported to the activity sink.
    pub fn is_logged(&self) -> bool {
        !matches!(self, ScanStatus::Invalid)
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the manifest says about a scanned code, before any mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// In the manifest and still waiting to be scanned.
    Unscanned(Item),
    /// In the manifest and already scanned.
    AlreadyScanned(Item),
    /// Not in this session's manifest.
    Unknown,
}

impl Classification {
    pub fn status(&self) -> ScanStatus {
        match self {
            Classification::Unscanned(_) => ScanStatus::Success,
            Classification::AlreadyScanned(_) => ScanStatus::Duplicate,
            Classification::Unknown => ScanStatus::Invalid,
        }
    }
}

/// Trim surrounding whitespace; an empty result is a validation error.
pub fn normalize_tracking_id(raw: &str) -> Result<&str, Error> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("tracking ID is required".to_string()));
    }
    Ok(trimmed)
}

/// Exact lookup of an already normalised tracking id.
pub fn classify(
    db: &Database,
    session_id: i64,
    tracking_id: &str,
) -> Result<Classification, Error> {
    let classification = match db.find_item_by_tracking_id(session_id, tracking_id)? {
        None => Classification::Unknown,
        Some(item) => match item.status {
            ItemStatus::Unscanned => Classification::Unscanned(item),
            ItemStatus::Scanned => Classification::AlreadyScanned(item),
        },
    };
    Ok(classification)
}

pub fn success_message(item: &Item) -> String {
    match item.product_name.as_deref() {
        Some(product) => format!("{} scanned: {}", item.tracking_id, product),
        None => format!("{} scanned", item.tracking_id),
    }
}

pub fn duplicate_message(item: &Item) -> String {
    let mut message = format!("{} was already scanned", item.tracking_id);
    if let Some(by) = item.scanned_by.as_deref() {
        message.push_str(&format!(" by {}", by));
    }
    if let Some(at) = item.scanned_at {
        message.push_str(&format!(" at {}", at.format("%Y-%m-%d %H:%M:%S UTC")));
    }
    message
}
