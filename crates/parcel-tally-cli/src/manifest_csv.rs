use anyhow::{Context, Result};
use parcel_tally_core::ManifestRecord;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

/// One CSV row. Headers may use either snake_case or camelCase.
#[derive(Debug, Deserialize)]
struct ManifestRow {
    #[serde(alias = "trackingId", alias = "tracking")]
    tracking_id: String,
    #[serde(default)]
    recipient: Option<String>,
    #[serde(default, alias = "productName", alias = "product")]
    product_name: Option<String>,
}

pub fn read_manifest(path: &Path) -> Result<Vec<ManifestRecord>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open manifest {}", path.display()))?;
    parse_manifest(file).with_context(|| format!("failed to read manifest {}", path.display()))
}

/// Rows are not validated here; the engine rejects blank or repeated
/// tracking ids for the whole batch.
pub fn parse_manifest<R: Read>(input: R) -> Result<Vec<ManifestRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(input);

    reader
        .deserialize::<ManifestRow>()
        .enumerate()
        .map(|(index, row)| {
            // header is line 1
            let row = row.with_context(|| format!("malformed manifest line {}", index + 2))?;
            Ok(ManifestRecord {
                tracking_id: row.tracking_id,
                recipient: row.recipient,
                product_name: row.product_name,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_parse_snake_case_headers() {
        let csv = "tracking_id,recipient,product_name\n\
                   1Z001, Alice ,Lamp\n\
                   1Z002,,\n";
        let records = parse_manifest(csv.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tracking_id, "1Z001");
        assert_eq!(records[0].recipient.as_deref(), Some("Alice"));
        assert_eq!(records[0].product_name.as_deref(), Some("Lamp"));
        assert!(records[1].recipient.is_none());
        assert!(records[1].product_name.is_none());
    }

    #[test]
    fn test_parse_camel_case_headers_and_missing_columns() {
        let csv = "trackingId,productName\nA,Kettle\nB,\n";
        let records = parse_manifest(csv.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].product_name.as_deref(), Some("Kettle"));
        assert!(records[0].recipient.is_none());
    }

    #[test]
    fn test_missing_tracking_column_is_an_error() {
        let csv = "recipient,product_name\nAlice,Lamp\n";
        let err = parse_manifest(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_read_manifest_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.csv");
        fs::write(&path, "tracking_id\nA\nB\nC\n").unwrap();

        let records = read_manifest(&path).unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.tracking_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);

        assert!(read_manifest(&dir.path().join("missing.csv")).is_err());
    }
}
