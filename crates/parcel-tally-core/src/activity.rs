use crate::matcher::ScanStatus;
use serde::Serialize;
use tracing::info;

/// Audit record for one classified scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanActivity {
    pub session_id: i64,
    pub tracking_id: String,
    pub status: ScanStatus,
    pub operator_id: String,
    pub product_name: Option<String>,
}

/// Receiver for scan activity. Fire-and-forget: implementations must not
/// block the scan path and cannot fail it.
///
/// Only SUCCESS and DUPLICATE scans are delivered; INVALID scans are dropped
/// before they get here.
pub trait ActivitySink: Send + Sync {
    fn on_scan(&self, _activity: &ScanActivity) {}
}

/// No-op sink.
pub struct SilentSink;

impl ActivitySink for SilentSink {}

/// Writes each activity as a structured `tracing` event on the
/// `parcel_tally::activity` target.
pub struct TracingSink;

impl ActivitySink for TracingSink {
    fn on_scan(&self, activity: &ScanActivity) {
        info!(
            target: "parcel_tally::activity",
            session_id = activity.session_id,
            tracking_id = %activity.tracking_id,
            status = %activity.status,
            operator_id = %activity.operator_id,
            "SCAN_ITEM"
        );
    }
}
