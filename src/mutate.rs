//! Per-record read-verify-mutate protocol.
//!
//! Each record passes a fixed sequence of gates; the first failing gate
//! decides the outcome:
//!
//! | Gate | Failure outcome |
//! |------|-----------------|
//! | supported extension | `UnsupportedType` / `Skipped` |
//! | resolve location → handle | `ResolveError` / `Failed` |
//! | read live label | `ReadError` / `Failed` |
//! | live label differs from target | `AlreadyUpdated` / `Skipped` |
//! | write (live mode only) | `Failed` / `Failed` |
//!
//! A passing record ends as `Success` / `Replace`, or `WouldUpdate` / `None`
//! in dry-run mode. The live read is mandatory before any write because the
//! index can lag reality by days.
//!
//! There are no retries here. After every attempted write, successful or
//! not, the mutator waits the configured inter-record delay.

use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::{Action, CanonicalRecord, MigrationOutcome, Status};
use crate::resolve::resolve;
use crate::traits::{LabelAssignment, MutationApi};

/// Whether the write gate is allowed to call the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationMode {
    DryRun,
    Live,
}

/// Everything the mutator needs besides the API itself.
#[derive(Debug, Clone)]
pub struct MutatorSettings {
    pub target_label_id: String,
    pub justification_text: String,
    pub mode: MutationMode,
    pub inter_record_delay: Duration,
    /// Lowercase extensions without the dot.
    pub supported_extensions: BTreeSet<String>,
}

pub struct Mutator<'a> {
    api: &'a dyn MutationApi,
    settings: MutatorSettings,
}

impl<'a> Mutator<'a> {
    pub fn new(api: &'a dyn MutationApi, settings: MutatorSettings) -> Self {
        Self { api, settings }
    }

    /// Run one record through every gate and classify the result.
    ///
    /// Never fails: every error becomes part of the returned outcome.
    pub async fn process(&self, record: &CanonicalRecord) -> MigrationOutcome {
        let supported = record
            .extension()
            .is_some_and(|ext| self.settings.supported_extensions.contains(&ext));
        if !supported {
            debug!(file = %record.file_name, "unsupported file type");
            return MigrationOutcome::new(record.clone(), Action::Skipped, Status::UnsupportedType);
        }

        let handle = match resolve(self.api, &record.location_ref).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(file = %record.file_name, error = %e, "resolve failed");
                return MigrationOutcome::new(record.clone(), Action::Failed, Status::ResolveError)
                    .with_error(e.to_string());
            }
        };

        let current = match self.api.read_label(&handle).await {
            Ok(current) => current,
            Err(e) => {
                warn!(
                    file = %record.file_name,
                    item = %handle.item_id,
                    error = %format!("{:#}", e),
                    "label read failed, not writing"
                );
                return MigrationOutcome::new(record.clone(), Action::Failed, Status::ReadError)
                    .with_handle(&handle)
                    .with_error(format!("{:#}", e));
            }
        };

        if current
            .as_deref()
            .is_some_and(|id| labels_match(id, &self.settings.target_label_id))
        {
            debug!(file = %record.file_name, "already carries target label");
            return MigrationOutcome::new(record.clone(), Action::Skipped, Status::AlreadyUpdated)
                .with_handle(&handle)
                .with_previous_label(current);
        }

        if self.settings.mode == MutationMode::DryRun {
            debug!(file = %record.file_name, current = ?current, "would update");
            return MigrationOutcome::new(record.clone(), Action::None, Status::WouldUpdate)
                .with_handle(&handle)
                .with_previous_label(current);
        }

        let assignment = LabelAssignment::privileged(
            &self.settings.target_label_id,
            &self.settings.justification_text,
        );
        let result = self.api.write_label(&handle, &assignment).await;
        self.pause().await;

        match result {
            Ok(()) => {
                info!(file = %record.file_name, item = %handle.item_id, "label updated");
                MigrationOutcome::new(record.clone(), Action::Replace, Status::Success)
                    .with_handle(&handle)
                    .with_previous_label(current)
            }
            Err(e) => {
                warn!(
                    file = %record.file_name,
                    item = %handle.item_id,
                    error = %format!("{:#}", e),
                    "label write failed"
                );
                MigrationOutcome::new(record.clone(), Action::Failed, Status::Failed)
                    .with_handle(&handle)
                    .with_previous_label(current)
                    .with_error(format!("{:#}", e))
            }
        }
    }

    async fn pause(&self) {
        if !self.settings.inter_record_delay.is_zero() {
            tokio::time::sleep(self.settings.inter_record_delay).await;
        }
    }
}

/// Label ids are GUIDs; compare without regard to case or braces.
fn labels_match(a: &str, b: &str) -> bool {
    let norm = |s: &str| s.trim().trim_matches(|c: char| c == '{' || c == '}').to_ascii_lowercase();
    norm(a) == norm(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Partition, RemoteHandle};
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;

    const TARGET: &str = "6f1c2b9e-0000-4000-8000-000000000001";

    #[derive(Default)]
    struct FakeApi {
        current: Mutex<Option<String>>,
        fail_resolve: bool,
        fail_read: bool,
        fail_write: bool,
        resolves: AtomicUsize,
        reads: AtomicUsize,
        writes: Mutex<Vec<LabelAssignment>>,
    }

    #[async_trait]
    impl MutationApi for FakeApi {
        async fn resolve_share(&self, _token: &str) -> Result<RemoteHandle> {
            self.resolves.fetch_add(1, Ordering::SeqCst);
            if self.fail_resolve {
                bail!("itemNotFound");
            }
            Ok(RemoteHandle {
                store_id: "b!drive".into(),
                item_id: "01ITEM".into(),
                display_name: "Plan.docx".into(),
            })
        }

        async fn read_label(&self, _handle: &RemoteHandle) -> Result<Option<String>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.fail_read {
                bail!("accessDenied");
            }
            Ok(self.current.lock().unwrap().clone())
        }

        async fn write_label(&self, _handle: &RemoteHandle, a: &LabelAssignment) -> Result<()> {
            self.writes.lock().unwrap().push(a.clone());
            if self.fail_write {
                bail!("HTTP 402: licensing required");
            }
            *self.current.lock().unwrap() = Some(a.sensitivity_label_id.clone());
            Ok(())
        }
    }

    fn settings(mode: MutationMode) -> MutatorSettings {
        MutatorSettings {
            target_label_id: TARGET.to_string(),
            justification_text: "label migration".to_string(),
            mode,
            inter_record_delay: Duration::ZERO,
            supported_extensions: ["docx", "xlsx", "pptx", "pdf"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    fn record(name: &str) -> CanonicalRecord {
        CanonicalRecord {
            file_name: name.to_string(),
            location_ref: format!("https://contoso.sharepoint.com/sites/hr/{}", name),
            partition: Partition::SharePoint,
            last_modified: None,
            author: None,
        }
    }

    #[tokio::test]
    async fn eligible_record_is_written_once() {
        let api = FakeApi {
            current: Mutex::new(Some("old-label".into())),
            ..Default::default()
        };
        let out = Mutator::new(&api, settings(MutationMode::Live))
            .process(&record("Plan.docx"))
            .await;

        assert_eq!((out.action, out.status), (Action::Replace, Status::Success));
        assert_eq!(out.previous_label_id.as_deref(), Some("old-label"));
        assert_eq!(out.item_id.as_deref(), Some("01ITEM"));
        let writes = api.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].sensitivity_label_id, TARGET);
        assert_eq!(writes[0].assignment_method, "privileged");
        assert_eq!(writes[0].justification_text, "label migration");
    }

    #[tokio::test]
    async fn unsupported_type_makes_no_calls() {
        let api = FakeApi::default();
        let out = Mutator::new(&api, settings(MutationMode::Live))
            .process(&record("Home.page"))
            .await;
        assert_eq!((out.action, out.status), (Action::Skipped, Status::UnsupportedType));
        assert_eq!(api.resolves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resolve_failure_skips_read_and_write() {
        let api = FakeApi { fail_resolve: true, ..Default::default() };
        let out = Mutator::new(&api, settings(MutationMode::Live))
            .process(&record("Plan.docx"))
            .await;
        assert_eq!((out.action, out.status), (Action::Failed, Status::ResolveError));
        assert!(out.error_detail.unwrap().contains("itemNotFound"));
        assert_eq!(api.reads.load(Ordering::SeqCst), 0);
        assert!(api.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_failure_prevents_write() {
        let api = FakeApi { fail_read: true, ..Default::default() };
        let out = Mutator::new(&api, settings(MutationMode::Live))
            .process(&record("Plan.docx"))
            .await;
        assert_eq!((out.action, out.status), (Action::Failed, Status::ReadError));
        assert!(api.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn matching_label_is_already_updated() {
        let api = FakeApi {
            current: Mutex::new(Some(format!("{{{}}}", TARGET.to_uppercase()))),
            ..Default::default()
        };
        let out = Mutator::new(&api, settings(MutationMode::Live))
            .process(&record("Plan.docx"))
            .await;
        assert_eq!((out.action, out.status), (Action::Skipped, Status::AlreadyUpdated));
        assert!(api.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unlabelled_file_is_eligible() {
        let api = FakeApi::default();
        let out = Mutator::new(&api, settings(MutationMode::Live))
            .process(&record("Sheet.XLSX"))
            .await;
        assert_eq!(out.status, Status::Success);
        assert_eq!(out.previous_label_id, None);
    }

    #[tokio::test]
    async fn dry_run_never_writes() {
        let api = FakeApi {
            current: Mutex::new(Some("old-label".into())),
            ..Default::default()
        };
        let out = Mutator::new(&api, settings(MutationMode::DryRun))
            .process(&record("Plan.docx"))
            .await;
        assert_eq!((out.action, out.status), (Action::None, Status::WouldUpdate));
        assert_eq!(api.reads.load(Ordering::SeqCst), 1);
        assert!(api.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_failure_is_recorded_with_detail() {
        let api = FakeApi { fail_write: true, ..Default::default() };
        let out = Mutator::new(&api, settings(MutationMode::Live))
            .process(&record("Plan.docx"))
            .await;
        assert_eq!((out.action, out.status), (Action::Failed, Status::Failed));
        assert!(out.error_detail.unwrap().contains("licensing required"));
        assert_eq!(api.writes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn second_pass_sees_already_updated() {
        let api = FakeApi::default();
        let mutator = Mutator::new(&api, settings(MutationMode::Live));
        assert_eq!(mutator.process(&record("Plan.docx")).await.status, Status::Success);
        assert_eq!(
            mutator.process(&record("Plan.docx")).await.status,
            Status::AlreadyUpdated
        );
        assert_eq!(api.writes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delay_applies_only_after_write_attempts() {
        let api = FakeApi::default();
        let mut s = settings(MutationMode::Live);
        s.inter_record_delay = Duration::from_millis(50);
        let mutator = Mutator::new(&api, s);

        let started = Instant::now();
        mutator.process(&record("Plan.docx")).await;
        assert!(started.elapsed() >= Duration::from_millis(50));

        let mut s = settings(MutationMode::Live);
        s.inter_record_delay = Duration::from_secs(30);
        let slow = Mutator::new(&api, s);
        let started = Instant::now();
        let out = slow.process(&record("Home.page")).await;
        assert_eq!(out.status, Status::UnsupportedType);
        let out = slow.process(&record("Plan.docx")).await;
        assert_eq!(out.status, Status::AlreadyUpdated);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn delay_also_follows_failed_writes() {
        let api = FakeApi { fail_write: true, ..Default::default() };
        let mut s = settings(MutationMode::Live);
        s.inter_record_delay = Duration::from_millis(80);
        let mutator = Mutator::new(&api, s);

        let started = Instant::now();
        let out = mutator.process(&record("Plan.docx")).await;
        assert_eq!((out.action, out.status), (Action::Failed, Status::Failed));
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[test]
    fn label_comparison_ignores_case_and_braces() {
        assert!(labels_match("{ABC-1}", "abc-1"));
        assert!(!labels_match("abc-1", "abc-2"));
    }
}
