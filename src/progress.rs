//! Run progress reporting.
//!
//! Reports observable progress during `lmig discover` and `lmig migrate` so
//! operators see which partition is being read and how many records have
//! been handled. Progress is emitted on **stderr** so stdout remains
//! parseable for scripts.

use std::io::Write;

use crate::models::{Partition, Status};

/// A single progress event.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    /// Pages are being read from this partition.
    Enumerating { partition: Partition },
    /// Discovery has seen `n` records so far.
    Discovered { n: u64 },
    /// Record number `n` finished with `status`.
    Processed {
        n: u64,
        file_name: String,
        status: Status,
    },
}

/// Reports run progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the coordinator between records.
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "migrate  1,234  Plan.docx  Success".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Enumerating { partition } => {
                format!("scan {}  enumerating...\n", partition)
            }
            ProgressEvent::Discovered { n } => {
                format!("discover  {} records\n", format_number(*n))
            }
            ProgressEvent::Processed {
                n,
                file_name,
                status,
            } => format!("migrate  {}  {}  {}\n", format_number(*n), file_name, status),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Enumerating { partition } => serde_json::json!({
                "event": "progress",
                "phase": "enumerating",
                "partition": partition,
            }),
            ProgressEvent::Discovered { n } => serde_json::json!({
                "event": "progress",
                "phase": "discovering",
                "n": n,
            }),
            ProgressEvent::Processed {
                n,
                file_name,
                status,
            } => serde_json::json!({
                "event": "progress",
                "phase": "processing",
                "n": n,
                "file": file_name,
                "status": status,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
