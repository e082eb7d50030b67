//! Persisted run artifacts.
//!
//! Everything lands in the configured output directory:
//!
//! | File | Written |
//! |------|---------|
//! | `audit.log` | JSON lines, appended as the run proceeds |
//! | `results.jsonl` | one outcome per line, streamed as recorded |
//! | `discovery-files.json` | discovery report, at the end |
//! | `discovery-locations.json` | discovery report, at the end |
//! | `migration-report.json` | tally, outcomes and warnings, at the end |
//!
//! Streaming the audit log and results means an interrupted run still
//! leaves a usable partial record.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::coordinator::{DiscoveryReport, MigrationReport};
use crate::models::MigrationOutcome;
use crate::traits::RunSink;

pub const AUDIT_LOG: &str = "audit.log";
pub const RESULTS_STREAM: &str = "results.jsonl";
pub const DISCOVERY_FILES: &str = "discovery-files.json";
pub const DISCOVERY_LOCATIONS: &str = "discovery-locations.json";
pub const MIGRATION_REPORT: &str = "migration-report.json";

#[derive(Serialize)]
struct AuditEvent<'a> {
    at: String,
    phase: &'a str,
    status: &'a str,
    message: &'a str,
}

/// [`RunSink`] that appends to `audit.log` and `results.jsonl`.
pub struct FileSink {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileSink {
    /// Create the output directory if needed.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output dir {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn append_line(&self, file: &str, line: &str) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("output sink lock poisoned"))?;
        let path = self.dir.join(file);
        let mut handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        writeln!(handle, "{}", line).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

impl RunSink for FileSink {
    fn audit(&self, phase: &str, status: &str, message: &str) -> Result<()> {
        let event = AuditEvent {
            at: Utc::now().to_rfc3339(),
            phase,
            status,
            message,
        };
        self.append_line(AUDIT_LOG, &serde_json::to_string(&event)?)
    }

    fn emit(&self, outcome: &MigrationOutcome) -> Result<()> {
        self.append_line(RESULTS_STREAM, &serde_json::to_string(outcome)?)
    }
}

/// Write the discovery file list and location list. Returns the paths
/// written.
pub fn write_discovery_report(dir: &Path, report: &DiscoveryReport) -> Result<Vec<PathBuf>> {
    let files = dir.join(DISCOVERY_FILES);
    write_json(&files, &report.files)?;
    let locations = dir.join(DISCOVERY_LOCATIONS);
    write_json(&locations, &report.locations)?;
    Ok(vec![files, locations])
}

/// Write the full migration report.
pub fn write_migration_report(dir: &Path, report: &MigrationReport) -> Result<PathBuf> {
    let path = dir.join(MIGRATION_REPORT);
    write_json(&path, report)?;
    Ok(path)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
