use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One expected parcel as handed over by the import collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub tracking_id: String,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
}

impl ManifestRecord {
    pub fn new(tracking_id: impl Into<String>) -> Self {
        Self {
            tracking_id: tracking_id.into(),
            recipient: None,
            product_name: None,
        }
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn with_product_name(mut self, product_name: impl Into<String>) -> Self {
        self.product_name = Some(product_name.into());
        self
    }
}

/// Trim and check a batch of records before anything touches storage.
///
/// Tracking ids are trimmed the same way scanned text is, blank optional
/// fields collapse to `None`. The whole batch is rejected on the first empty
/// tracking id or on a tracking id repeated within the batch.
pub fn validate_records(records: &[ManifestRecord]) -> Result<Vec<ManifestRecord>, Error> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(records.len());
    let mut validated = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        let tracking_id = record.tracking_id.trim();
        if tracking_id.is_empty() {
            return Err(Error::Validation(format!(
                "record {} has an empty tracking id",
                index + 1
            )));
        }
        if !seen.insert(tracking_id) {
            return Err(Error::Validation(format!(
                "tracking id '{}' appears more than once in the manifest (record {})",
                tracking_id,
                index + 1
            )));
        }

        validated.push(ManifestRecord {
            tracking_id: tracking_id.to_string(),
            recipient: non_blank(record.recipient.as_deref()),
            product_name: non_blank(record.product_name.as_deref()),
        });
    }

    Ok(validated)
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
