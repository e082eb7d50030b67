//! Run orchestration.
//!
//! Drives partitions in fixed order, feeds every normalized record through
//! the [`Mutator`], and owns the run's outcome list. Two terminal reports:
//!
//! - [`DiscoveryReport`]: enumeration plus grouping by storage location, so
//!   an operator can pre-provision access before a live run. No mutation
//!   API is needed.
//! - [`MigrationReport`]: the full enumerate → resolve → read → write
//!   pipeline, with a [`RunTally`] folded from the outcomes.
//!
//! Records are processed strictly one at a time. The idempotency gate reads
//! the live label immediately before writing, and concurrent workers on the
//! same handle would reopen that race. Cancellation is checked between
//! records only; everything recorded before it stays in the report.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{RunMode, RunSettings};
use crate::enumerate::{EnumerationWarning, Enumerator};
use crate::error::ConfigError;
use crate::models::{CanonicalRecord, MigrationOutcome, Partition, RunTally, LOCATION_UNKNOWN};
use crate::mutate::{MutationMode, Mutator, MutatorSettings};
use crate::progress::{NoProgress, ProgressEvent, ProgressReporter};
use crate::traits::{IndexService, MutationApi, NullSink, RunSink};

/// File count for one storage location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationSummary {
    pub partition: Partition,
    pub location: String,
    pub file_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryReport {
    pub run_id: String,
    pub label: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub found: u64,
    pub dropped: u64,
    pub cancelled: bool,
    pub files: Vec<CanonicalRecord>,
    /// Sorted by file count descending, then location.
    pub locations: Vec<LocationSummary>,
    pub warnings: Vec<EnumerationWarning>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub run_id: String,
    pub mode: String,
    pub label: String,
    pub target_label_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tally: RunTally,
    pub dropped: u64,
    pub cancelled: bool,
    pub outcomes: Vec<MigrationOutcome>,
    pub warnings: Vec<EnumerationWarning>,
}

/// Either terminal report, depending on the run mode.
#[derive(Debug, Clone)]
pub enum RunReport {
    Discovery(DiscoveryReport),
    Migration(MigrationReport),
}

pub struct Coordinator<'a> {
    settings: RunSettings,
    index: &'a dyn IndexService,
    api: Option<&'a dyn MutationApi>,
    sink: &'a dyn RunSink,
    progress: &'a dyn ProgressReporter,
}

impl<'a> Coordinator<'a> {
    pub fn new(settings: RunSettings, index: &'a dyn IndexService) -> Self {
        Self {
            settings,
            index,
            api: None,
            sink: &NullSink,
            progress: &NoProgress,
        }
    }

    pub fn with_mutation_api(mut self, api: &'a dyn MutationApi) -> Self {
        self.api = Some(api);
        self
    }

    pub fn with_sink(mut self, sink: &'a dyn RunSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Run in the configured mode.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunReport> {
        match self.settings.mode {
            RunMode::Discovery => Ok(RunReport::Discovery(self.discover(cancel).await?)),
            RunMode::DryRun | RunMode::Live => Ok(RunReport::Migration(self.migrate(cancel).await?)),
        }
    }

    /// Enumerate and group by storage location. Nothing is resolved or
    /// mutated.
    pub async fn discover(&self, cancel: &CancellationToken) -> Result<DiscoveryReport> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(run_id = %run_id, label = %self.settings.label, "discovery started");
        self.audit("run", "start", &format!("discovery {} label={}", run_id, self.settings.label));

        let mut enumerator = self.enumerator()?;
        let mut files = Vec::new();
        let mut current = None;
        let mut cancelled = false;

        loop {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            if self.limit_reached(files.len()) {
                break;
            }
            self.note_partition(&enumerator, &mut current);
            let Some(record) = enumerator.next_record().await else {
                break;
            };
            files.push(record);
            if files.len() % 500 == 0 {
                self.progress.report(ProgressEvent::Discovered {
                    n: files.len() as u64,
                });
            }
        }

        let warnings = self.collect_warnings(&enumerator);
        let locations = group_by_location(&files);
        let report = DiscoveryReport {
            run_id,
            label: self.settings.label.clone(),
            started_at,
            finished_at: Utc::now(),
            found: files.len() as u64,
            dropped: enumerator.dropped(),
            cancelled,
            files,
            locations,
            warnings,
        };

        info!(
            found = report.found,
            locations = report.locations.len(),
            cancelled,
            "discovery finished"
        );
        self.audit(
            "run",
            if cancelled { "cancelled" } else { "finished" },
            &format!("found={} locations={}", report.found, report.locations.len()),
        );
        Ok(report)
    }

    /// Full pipeline. Outcomes are appended in processing order and
    /// streamed to the sink as they are recorded.
    pub async fn migrate(&self, cancel: &CancellationToken) -> Result<MigrationReport> {
        let mode = match self.settings.mode {
            RunMode::Live => MutationMode::Live,
            RunMode::DryRun | RunMode::Discovery => MutationMode::DryRun,
        };
        let target_label_id = self
            .settings
            .target_label_id
            .clone()
            .ok_or(ConfigError::MissingTargetLabel(self.settings.mode.as_str()))?;
        let api = self
            .api
            .ok_or(ConfigError::MissingEndpoint("mutation API", self.settings.mode.as_str()))?;

        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let mode_name = match mode {
            MutationMode::Live => RunMode::Live.as_str(),
            MutationMode::DryRun => RunMode::DryRun.as_str(),
        };
        info!(
            run_id = %run_id,
            mode = mode_name,
            label = %self.settings.label,
            target = %target_label_id,
            "migration started"
        );
        self.audit(
            "run",
            "start",
            &format!(
                "{} {} label={} target={}",
                mode_name, run_id, self.settings.label, target_label_id
            ),
        );

        let mut enumerator = self.enumerator()?;
        let mutator = Mutator::new(
            api,
            MutatorSettings {
                target_label_id: target_label_id.clone(),
                justification_text: self.settings.justification_text.clone(),
                mode,
                inter_record_delay: self.settings.inter_record_delay,
                supported_extensions: self.settings.supported_extensions.clone(),
            },
        );

        let mut outcomes: Vec<MigrationOutcome> = Vec::new();
        let mut found = 0u64;
        let mut current = None;
        let mut cancelled = false;

        loop {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            if self.limit_reached(found as usize) {
                break;
            }
            self.note_partition(&enumerator, &mut current);
            let Some(record) = enumerator.next_record().await else {
                break;
            };
            found += 1;

            let outcome = mutator.process(&record).await;
            self.record(&outcome);
            self.progress.report(ProgressEvent::Processed {
                n: found,
                file_name: outcome.record.file_name.clone(),
                status: outcome.status,
            });
            outcomes.push(outcome);
        }

        let warnings = self.collect_warnings(&enumerator);
        let tally = RunTally::fold(found, &outcomes);
        let report = MigrationReport {
            run_id,
            mode: mode_name.to_string(),
            label: self.settings.label.clone(),
            target_label_id,
            started_at,
            finished_at: Utc::now(),
            tally,
            dropped: enumerator.dropped(),
            cancelled,
            outcomes,
            warnings,
        };

        info!(
            processed = tally.processed,
            succeeded = tally.succeeded,
            failed = tally.failed,
            skipped = tally.skipped,
            already_current = tally.already_current,
            would_update = tally.would_update,
            cancelled,
            "migration finished"
        );
        self.audit(
            "run",
            if cancelled { "cancelled" } else { "finished" },
            &format!(
                "processed={} succeeded={} failed={} skipped={} would_update={}",
                tally.processed, tally.succeeded, tally.failed, tally.skipped, tally.would_update
            ),
        );
        Ok(report)
    }

    fn enumerator(&self) -> Result<Enumerator<'a>> {
        Ok(Enumerator::new(
            self.index,
            &self.settings.label,
            &self.settings.partitions,
            self.settings.page_size,
        )?)
    }

    fn limit_reached(&self, seen: usize) -> bool {
        self.settings.limit.is_some_and(|limit| seen >= limit)
    }

    fn note_partition(&self, enumerator: &Enumerator<'_>, current: &mut Option<Partition>) {
        let partition = enumerator.current_partition();
        if partition.is_some() && partition != *current {
            *current = partition;
            if let Some(partition) = partition {
                self.progress.report(ProgressEvent::Enumerating { partition });
            }
        }
    }

    fn collect_warnings(&self, enumerator: &Enumerator<'_>) -> Vec<EnumerationWarning> {
        enumerator
            .warnings()
            .iter()
            .map(|err| {
                let warning = EnumerationWarning::from(err);
                self.audit("enumerate", warning.kind, &warning.message);
                warning
            })
            .collect()
    }

    fn record(&self, outcome: &MigrationOutcome) {
        if let Err(e) = self.sink.emit(outcome) {
            warn!(file = %outcome.record.file_name, error = %format!("{:#}", e), "failed to emit result");
        }
        let mut message = format!("{} {}", outcome.record.file_name, outcome.record.location_ref);
        if let Some(detail) = &outcome.error_detail {
            message.push_str(" :: ");
            message.push_str(detail);
        }
        self.audit("record", outcome.status.as_str(), &message);
    }

    fn audit(&self, phase: &str, status: &str, message: &str) {
        if let Err(e) = self.sink.audit(phase, status, message) {
            warn!(error = %format!("{:#}", e), "failed to append audit line");
        }
    }
}

/// Group records by storage location and count files per location.
pub fn group_by_location(records: &[CanonicalRecord]) -> Vec<LocationSummary> {
    let mut counts: BTreeMap<(Partition, String), u64> = BTreeMap::new();
    for record in records {
        *counts
            .entry((record.partition, storage_location(record)))
            .or_default() += 1;
    }

    let mut summaries: Vec<LocationSummary> = counts
        .into_iter()
        .map(|((partition, location), file_count)| LocationSummary {
            partition,
            location,
            file_count,
        })
        .collect();
    summaries.sort_by(|a, b| {
        b.file_count
            .cmp(&a.file_count)
            .then_with(|| a.location.cmp(&b.location))
    });
    summaries
}

/// Site or personal-drive root a record lives under, derived without
/// contacting the mutation API.
///
/// `scheme://host/sites/<name>` and `scheme://host/teams/<name>` for
/// SharePoint, `scheme://host/personal/<user>` for OneDrive, otherwise
/// `scheme://host`. Unknown or unparseable references map to `"N/A"`.
pub fn storage_location(record: &CanonicalRecord) -> String {
    if !record.has_location() {
        return LOCATION_UNKNOWN.to_string();
    }
    let Ok(url) = reqwest::Url::parse(record.location_ref.trim()) else {
        return LOCATION_UNKNOWN.to_string();
    };
    let Some(host) = url.host_str() else {
        return LOCATION_UNKNOWN.to_string();
    };

    let root = format!("{}://{}", url.scheme(), host);
    let mut segments = url.path_segments().into_iter().flatten();
    let first = segments.next().unwrap_or_default();
    let collection = match record.partition {
        Partition::SharePoint => matches!(first.to_ascii_lowercase().as_str(), "sites" | "teams"),
        Partition::OneDrive => first.eq_ignore_ascii_case("personal"),
    };
    match segments.next() {
        Some(name) if collection && !name.is_empty() => format!("{}/{}/{}", root, first, name),
        _ => root,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(partition: Partition, location: &str) -> CanonicalRecord {
        CanonicalRecord {
            file_name: "a.docx".into(),
            location_ref: location.into(),
            partition,
            last_modified: None,
            author: None,
        }
    }

    #[test]
    fn sharepoint_locations_keep_site_root() {
        assert_eq!(
            storage_location(&rec(
                Partition::SharePoint,
                "https://contoso.sharepoint.com/sites/HR/Shared%20Documents/a.docx"
            )),
            "https://contoso.sharepoint.com/sites/HR"
        );
        assert_eq!(
            storage_location(&rec(
                Partition::SharePoint,
                "https://contoso.sharepoint.com/teams/ops/a.docx"
            )),
            "https://contoso.sharepoint.com/teams/ops"
        );
        assert_eq!(
            storage_location(&rec(
                Partition::SharePoint,
                "https://contoso.sharepoint.com/Shared Documents/a.docx"
            )),
            "https://contoso.sharepoint.com"
        );
    }

    #[test]
    fn onedrive_locations_keep_personal_root() {
        assert_eq!(
            storage_location(&rec(
                Partition::OneDrive,
                "https://contoso-my.sharepoint.com/personal/dana_contoso_com/Documents/a.docx"
            )),
            "https://contoso-my.sharepoint.com/personal/dana_contoso_com"
        );
    }

    #[test]
    fn unknown_locations_group_under_sentinel() {
        assert_eq!(storage_location(&rec(Partition::SharePoint, "N/A")), "N/A");
        assert_eq!(storage_location(&rec(Partition::SharePoint, "not a url")), "N/A");
    }

    #[test]
    fn grouping_counts_and_sorts() {
        let records = vec![
            rec(Partition::SharePoint, "https://c.sharepoint.com/sites/b/x.docx"),
            rec(Partition::SharePoint, "https://c.sharepoint.com/sites/a/x.docx"),
            rec(Partition::SharePoint, "https://c.sharepoint.com/sites/b/y.docx"),
            rec(Partition::OneDrive, "https://c-my.sharepoint.com/personal/u/z.docx"),
        ];
        let groups = group_by_location(&records);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].location, "https://c.sharepoint.com/sites/b");
        assert_eq!(groups[0].file_count, 2);
        assert_eq!(groups[1].location, "https://c-my.sharepoint.com/personal/u");
        assert_eq!(groups[2].location, "https://c.sharepoint.com/sites/a");
    }
}
