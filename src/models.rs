//! Core data models used throughout the label migrator.
//!
//! These types represent the index records, live object handles, and
//! per-record outcomes that flow through the enumeration → resolution →
//! mutation pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A logical storage domain the index service can scope a query to.
///
/// Partitions are always processed in declaration order: SharePoint first,
/// then OneDrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Partition {
    SharePoint,
    OneDrive,
}

impl Partition {
    /// Workload name sent to the index service.
    pub fn workload(&self) -> &'static str {
        match self {
            Partition::SharePoint => "SharePoint",
            Partition::OneDrive => "OneDrive",
        }
    }

    /// Sort and de-duplicate a partition list into processing order.
    pub fn ordered(partitions: &[Partition]) -> Vec<Partition> {
        let mut out = partitions.to_vec();
        out.sort();
        out.dedup();
        out
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.workload())
    }
}

impl FromStr for Partition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sharepoint" | "a" => Ok(Partition::SharePoint),
            "onedrive" | "b" => Ok(Partition::OneDrive),
            other => Err(format!(
                "unknown partition '{}'. Must be SharePoint or OneDrive.",
                other
            )),
        }
    }
}

impl TryFrom<String> for Partition {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Sentinel location used when the index row carries no usable location.
pub const LOCATION_UNKNOWN: &str = "N/A";

/// One file known to carry the label, as seen by the (possibly stale) index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub file_name: String,
    /// Backend-specific path or URL; [`LOCATION_UNKNOWN`] when not determinable.
    pub location_ref: String,
    pub partition: Partition,
    pub last_modified: Option<DateTime<Utc>>,
    pub author: Option<String>,
}

impl CanonicalRecord {
    /// Lowercased file extension without the dot, if any.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.file_name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    pub fn has_location(&self) -> bool {
        !self.location_ref.trim().is_empty() && self.location_ref != LOCATION_UNKNOWN
    }
}

/// Continuation state returned by the index service after each page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageCursor {
    pub token: Option<String>,
    pub has_more: bool,
}

/// Live object identity obtained by resolving a `location_ref`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteHandle {
    pub store_id: String,
    pub item_id: String,
    pub display_name: String,
}

/// What was done to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    None,
    Replace,
    Skipped,
    Failed,
}

/// Final classification of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Status {
    #[default]
    Pending,
    WouldUpdate,
    Success,
    Failed,
    UnsupportedType,
    ResolveError,
    ReadError,
    AlreadyUpdated,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "Pending",
            Status::WouldUpdate => "WouldUpdate",
            Status::Success => "Success",
            Status::Failed => "Failed",
            Status::UnsupportedType => "UnsupportedType",
            Status::ResolveError => "ResolveError",
            Status::ReadError => "ReadError",
            Status::AlreadyUpdated => "AlreadyUpdated",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Status::Failed | Status::ResolveError | Status::ReadError)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Result of running one [`CanonicalRecord`] through the mutator.
///
/// Outcomes are append-only: once pushed to a run's outcome list they are
/// never revised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationOutcome {
    pub record: CanonicalRecord,
    pub action: Action,
    pub status: Status,
    pub error_detail: Option<String>,
    /// Handle ids, when resolution got that far.
    pub store_id: Option<String>,
    pub item_id: Option<String>,
    /// Live label id observed by the read gate.
    pub previous_label_id: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl MigrationOutcome {
    pub fn new(record: CanonicalRecord, action: Action, status: Status) -> Self {
        Self {
            record,
            action,
            status,
            error_detail: None,
            store_id: None,
            item_id: None,
            previous_label_id: None,
            processed_at: Utc::now(),
        }
    }

    pub fn with_error(mut self, detail: impl Into<String>) -> Self {
        self.error_detail = Some(detail.into());
        self
    }

    pub fn with_handle(mut self, handle: &RemoteHandle) -> Self {
        self.store_id = Some(handle.store_id.clone());
        self.item_id = Some(handle.item_id.clone());
        self
    }

    pub fn with_previous_label(mut self, label_id: Option<String>) -> Self {
        self.previous_label_id = label_id;
        self
    }
}

/// Aggregate counters for one run.
///
/// Only ever produced by folding over outcomes, so the counters always agree
/// with the per-record statuses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTally {
    pub found: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    /// Sub-count of `skipped`: records whose live label already matched.
    pub already_current: u64,
    pub would_update: u64,
}

impl RunTally {
    /// Fold outcomes into a tally. `found` counts every record pulled from
    /// the enumerator, processed or not.
    pub fn fold<'a>(found: u64, outcomes: impl IntoIterator<Item = &'a MigrationOutcome>) -> Self {
        outcomes
            .into_iter()
            .fold(RunTally { found, ..Default::default() }, |mut tally, outcome| {
                tally.processed += 1;
                match outcome.status {
                    s if s.is_failure() => tally.failed += 1,
                    Status::Success => tally.succeeded += 1,
                    Status::WouldUpdate => tally.would_update += 1,
                    Status::UnsupportedType => tally.skipped += 1,
                    Status::AlreadyUpdated => {
                        tally.skipped += 1;
                        tally.already_current += 1;
                    }
                    _ => {}
                }
                tally
            })
    }

    /// Sum of the terminal per-status sub-counts.
    pub fn classified(&self) -> u64 {
        self.succeeded + self.failed + self.skipped + self.would_update
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> CanonicalRecord {
        CanonicalRecord {
            file_name: name.to_string(),
            location_ref: LOCATION_UNKNOWN.to_string(),
            partition: Partition::SharePoint,
            last_modified: None,
            author: None,
        }
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(record("Budget.XLSX").extension().as_deref(), Some("xlsx"));
        assert_eq!(record("archive.tar.gz").extension().as_deref(), Some("gz"));
        assert_eq!(record("README").extension(), None);
        assert_eq!(record(".profile").extension(), None);
    }

    #[test]
    fn partitions_are_ordered_and_deduplicated() {
        let ordered = Partition::ordered(&[
            Partition::OneDrive,
            Partition::SharePoint,
            Partition::OneDrive,
        ]);
        assert_eq!(ordered, vec![Partition::SharePoint, Partition::OneDrive]);
    }

    #[test]
    fn partition_parses_workload_and_letter() {
        assert_eq!("sharepoint".parse::<Partition>(), Ok(Partition::SharePoint));
        assert_eq!("B".parse::<Partition>(), Ok(Partition::OneDrive));
        assert!("exchange".parse::<Partition>().is_err());
    }

    #[test]
    fn partition_deserializes_same_names_as_cli() {
        let parsed: Vec<Partition> = serde_json::from_str(r#"["a", "ONEDRIVE", "SharePoint"]"#).unwrap();
        assert_eq!(
            parsed,
            vec![Partition::SharePoint, Partition::OneDrive, Partition::SharePoint]
        );
        assert!(serde_json::from_str::<Partition>(r#""exchange""#).is_err());
        let json = serde_json::to_string(&Partition::OneDrive).unwrap();
        assert_eq!(serde_json::from_str::<Partition>(&json).unwrap(), Partition::OneDrive);
    }

    #[test]
    fn tally_sub_counts_sum_to_processed() {
        let statuses = [
            (Action::Replace, Status::Success),
            (Action::Skipped, Status::AlreadyUpdated),
            (Action::Skipped, Status::UnsupportedType),
            (Action::Failed, Status::ResolveError),
            (Action::Failed, Status::ReadError),
            (Action::Failed, Status::Failed),
            (Action::None, Status::WouldUpdate),
        ];
        let outcomes: Vec<_> = statuses
            .iter()
            .map(|(a, s)| MigrationOutcome::new(record("a.docx"), *a, *s))
            .collect();

        let tally = RunTally::fold(9, &outcomes);
        assert_eq!(tally.found, 9);
        assert_eq!(tally.processed, 7);
        assert_eq!(tally.succeeded, 1);
        assert_eq!(tally.failed, 3);
        assert_eq!(tally.skipped, 2);
        assert_eq!(tally.already_current, 1);
        assert_eq!(tally.would_update, 1);
        assert_eq!(tally.classified(), tally.processed);
    }
}
