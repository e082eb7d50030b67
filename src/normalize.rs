//! Raw index row → [`CanonicalRecord`].
//!
//! The index backend names the same attribute differently depending on the
//! partition and service version, so each canonical field is looked up by a
//! fixed list of candidate keys. Location falls back to scanning every key
//! for a location-like name, then to the [`LOCATION_UNKNOWN`] sentinel.
//! Rows without a file name are dropped; that is not an error.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::models::{CanonicalRecord, Partition, LOCATION_UNKNOWN};

const FILE_NAME_KEYS: &[&str] = &["FileName", "Name", "Title", "fileName", "name"];

const SHAREPOINT_LOCATION_KEYS: &[&str] = &["FileUrl", "FileSourceUrl", "Location", "Url"];

const ONEDRIVE_LOCATION_KEYS: &[&str] = &["FileUrl", "FileSourceUrl", "OneDriveUrl", "Location", "Url"];

const LAST_MODIFIED_KEYS: &[&str] = &[
    "LastModifiedTime",
    "LastModified",
    "lastModifiedDateTime",
    "Modified",
];

const AUTHOR_KEYS: &[&str] = &["Author", "CreatedBy", "LastModifiedBy", "ModifiedBy"];

/// Tokens that mark a key as location-like in the fallback scan.
const LOCATION_TOKENS: &[&str] = &["url", "link", "uri", "path"];

/// Normalize one raw index row.
///
/// Returns `None` for rows that are not objects or carry no file name.
/// Unmapped keys are discarded.
pub fn normalize_row(row: &Value, partition: Partition) -> Option<CanonicalRecord> {
    let fields = row.as_object()?;

    let file_name = first_string(fields, FILE_NAME_KEYS)?;

    let location_ref = first_string(fields, location_keys(partition))
        .or_else(|| scan_location(fields))
        .unwrap_or_else(|| LOCATION_UNKNOWN.to_string());

    let last_modified = first_string(fields, LAST_MODIFIED_KEYS).and_then(|s| parse_timestamp(&s));
    let author = first_string(fields, AUTHOR_KEYS);

    Some(CanonicalRecord {
        file_name,
        location_ref,
        partition,
        last_modified,
        author,
    })
}

fn location_keys(partition: Partition) -> &'static [&'static str] {
    match partition {
        Partition::SharePoint => SHAREPOINT_LOCATION_KEYS,
        Partition::OneDrive => ONEDRIVE_LOCATION_KEYS,
    }
}

/// First candidate key (case-insensitive) holding a non-empty string.
fn first_string(fields: &Map<String, Value>, candidates: &[&str]) -> Option<String> {
    candidates.iter().find_map(|candidate| {
        fields
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(candidate))
            .and_then(|(_, value)| non_empty_string(value))
    })
}

/// Any key whose name contains a location token, in key order.
fn scan_location(fields: &Map<String, Value>) -> Option<String> {
    fields.iter().find_map(|(key, value)| {
        let lower = key.to_ascii_lowercase();
        if LOCATION_TOKENS.iter().any(|token| lower.contains(token)) {
            non_empty_string(value)
        } else {
            None
        }
    })
}

fn non_empty_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Parse the timestamp formats the index service has been seen to emit.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%m/%d/%Y %H:%M:%S", "%m/%d/%Y %I:%M:%S %p"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn standard_keys_are_mapped() {
        let row = json!({
            "FileName": "Plan.docx",
            "FileUrl": "https://contoso.sharepoint.com/sites/hr/Shared Documents/Plan.docx",
            "LastModifiedTime": "2024-03-01T10:00:00Z",
            "Author": "Dana",
            "SensitivityLabel": "Confidential"
        });
        let rec = normalize_row(&row, Partition::SharePoint).unwrap();
        assert_eq!(rec.file_name, "Plan.docx");
        assert!(rec.location_ref.ends_with("/Plan.docx"));
        assert_eq!(rec.partition, Partition::SharePoint);
        assert_eq!(rec.author.as_deref(), Some("Dana"));
        assert_eq!(
            rec.last_modified.unwrap().to_rfc3339(),
            "2024-03-01T10:00:00+00:00"
        );
    }

    #[test]
    fn candidate_keys_follow_priority_order() {
        let row = json!({
            "Name": "second.docx",
            "FileName": "first.docx",
            "Url": "https://b",
            "FileUrl": "https://a"
        });
        let rec = normalize_row(&row, Partition::SharePoint).unwrap();
        assert_eq!(rec.file_name, "first.docx");
        assert_eq!(rec.location_ref, "https://a");
    }

    #[test]
    fn location_falls_back_to_pattern_scan() {
        let row = json!({
            "FileName": "Notes.docx",
            "DocumentLink": "https://contoso-my.sharepoint.com/personal/dana/Documents/Notes.docx"
        });
        let rec = normalize_row(&row, Partition::OneDrive).unwrap();
        assert_eq!(
            rec.location_ref,
            "https://contoso-my.sharepoint.com/personal/dana/Documents/Notes.docx"
        );
    }

    #[test]
    fn pattern_scan_is_case_insensitive() {
        let row = json!({ "FileName": "a.pdf", "SOURCEPATH": "/sites/x/a.pdf" });
        let rec = normalize_row(&row, Partition::SharePoint).unwrap();
        assert_eq!(rec.location_ref, "/sites/x/a.pdf");
    }

    #[test]
    fn missing_location_uses_sentinel() {
        let row = json!({ "FileName": "a.pdf", "Size": 12 });
        let rec = normalize_row(&row, Partition::SharePoint).unwrap();
        assert_eq!(rec.location_ref, LOCATION_UNKNOWN);
        assert!(!rec.has_location());
    }

    #[test]
    fn rows_without_file_name_are_dropped() {
        assert!(normalize_row(&json!({ "FileUrl": "https://a" }), Partition::SharePoint).is_none());
        assert!(normalize_row(&json!({ "FileName": "  " }), Partition::SharePoint).is_none());
        assert!(normalize_row(&json!("not an object"), Partition::SharePoint).is_none());
    }

    #[test]
    fn key_lookup_ignores_case() {
        let row = json!({ "filename": "lower.xlsx", "fileurl": "https://a" });
        let rec = normalize_row(&row, Partition::OneDrive).unwrap();
        assert_eq!(rec.file_name, "lower.xlsx");
        assert_eq!(rec.location_ref, "https://a");
    }

    #[test]
    fn us_style_timestamps_parse() {
        let row = json!({ "FileName": "a.docx", "Modified": "3/1/2024 10:00:00 AM" });
        let rec = normalize_row(&row, Partition::SharePoint).unwrap();
        assert_eq!(
            rec.last_modified.unwrap().to_rfc3339(),
            "2024-03-01T10:00:00+00:00"
        );
    }

    #[test]
    fn unparseable_timestamp_is_none() {
        let row = json!({ "FileName": "a.docx", "Modified": "yesterday" });
        assert!(normalize_row(&row, Partition::SharePoint)
            .unwrap()
            .last_modified
            .is_none());
    }
}
