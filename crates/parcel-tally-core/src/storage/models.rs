use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scan state of a single manifest row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Unscanned,
    Scanned,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Unscanned => "UNSCANNED",
            ItemStatus::Scanned => "SCANNED",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UNSCANNED" => Ok(ItemStatus::Unscanned),
            "SCANNED" => Ok(ItemStatus::Scanned),
            other => Err(format!("unknown item status '{}'", other)),
        }
    }
}

impl ToSql for ItemStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ItemStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// A scanning session: one manifest plus its scan progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: i64,
    pub name: String,
    pub created_by: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// One manifest row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: i64,
    pub session_id: i64,
    pub tracking_id: String,
    pub recipient: Option<String>,
    pub product_name: Option<String>,
    pub status: ItemStatus,
    pub scanned_at: Option<DateTime<Utc>>,
    pub scanned_by: Option<String>,
}

impl Item {
    pub fn is_scanned(&self) -> bool {
        self.status == ItemStatus::Scanned
    }
}

/// Listing filter: optional status plus case-insensitive substring search
/// over tracking id, recipient and product name.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub status: Option<ItemStatus>,
    pub query: Option<String>,
}

impl ItemFilter {
    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn matches(&self, item: &Item) -> bool {
        if let Some(status) = self.status {
            if item.status != status {
                return false;
            }
        }

        let needle = match self.query.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => q.to_lowercase(),
            _ => return true,
        };

        [
            Some(item.tracking_id.as_str()),
            item.recipient.as_deref(),
            item.product_name.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&needle))
    }
}

/// Administrative edit of an item. `None` leaves a field untouched; an empty
/// string clears an optional text field.
///
/// `scanned_at` and `scanned_by` only apply to an item that is, or becomes,
/// SCANNED. When absent on a transition to SCANNED the engine stamps now and
/// the acting admin.
#[derive(Debug, Clone, Default)]
pub struct ItemUpdate {
    pub tracking_id: Option<String>,
    pub recipient: Option<String>,
    pub product_name: Option<String>,
    pub status: Option<ItemStatus>,
    pub scanned_at: Option<DateTime<Utc>>,
    pub scanned_by: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub name: Option<String>,
    pub is_active: Option<bool>,
}

/// A recently scanned item together with its session's name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentScan {
    pub item_id: i64,
    pub session_id: i64,
    pub session_name: String,
    pub tracking_id: String,
    pub product_name: Option<String>,
    pub scanned_at: DateTime<Utc>,
    pub scanned_by: Option<String>,
}

/// Warehouse dashboard figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub sessions_created: i64,
    pub scanned_since: i64,
    pub active_sessions: i64,
    pub overall_progress: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(tracking_id: &str, recipient: Option<&str>, product: Option<&str>) -> Item {
        Item {
            id: 1,
            session_id: 1,
            tracking_id: tracking_id.to_string(),
            recipient: recipient.map(str::to_string),
            product_name: product.map(str::to_string),
            status: ItemStatus::Unscanned,
            scanned_at: None,
            scanned_by: None,
        }
    }

    #[test]
    fn test_status_parse_and_display() {
        assert_eq!("scanned".parse::<ItemStatus>(), Ok(ItemStatus::Scanned));
        assert_eq!(ItemStatus::Unscanned.to_string(), "UNSCANNED");
        assert!("lost".parse::<ItemStatus>().is_err());
    }

    #[test]
    fn test_filter_free_text_is_case_insensitive() {
        let it = item("JNE-0042", Some("Budi Santoso"), Some("Rice Cooker"));
        assert!(ItemFilter::default().with_query("jne").matches(&it));
        assert!(ItemFilter::default().with_query("SANTOSO").matches(&it));
        assert!(ItemFilter::default().with_query("cooker").matches(&it));
        assert!(!ItemFilter::default().with_query("kettle").matches(&it));
        assert!(ItemFilter::default().with_query("   ").matches(&it));
    }

    #[test]
    fn test_filter_status_and_query_combine() {
        let it = item("A1", None, None);
        assert!(ItemFilter::default()
            .with_status(ItemStatus::Unscanned)
            .with_query("a1")
            .matches(&it));
        assert!(!ItemFilter::default()
            .with_status(ItemStatus::Scanned)
            .matches(&it));
    }
}
