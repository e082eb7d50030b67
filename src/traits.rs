//! Collaborator seams.
//!
//! The migration core never talks to the network or the filesystem
//! directly. It consumes two remote services and one output sink through
//! the traits below, which keeps every component testable with in-memory
//! fakes and lets the HTTP clients in [`crate::index_client`] and
//! [`crate::graph_client`] be swapped out.
//!
//! ```text
//! ┌──────────────┐    ┌───────────────┐    ┌─────────────┐
//! │ IndexService │──▶ │  Coordinator  │──▶ │ MutationApi │
//! │ (paged scan) │    │ enum→resolve  │    │ resolve/    │
//! └──────────────┘    │ →read→write   │    │ read/write  │
//!                     └──────┬────────┘    └─────────────┘
//!                            ▼
//!                       ┌─────────┐
//!                       │ RunSink │  audit lines + per-record results
//!                       └─────────┘
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::models::{MigrationOutcome, Partition, RemoteHandle};

// ═══════════════════════════════════════════════════════════════════════
// Index service
// ═══════════════════════════════════════════════════════════════════════

/// One page request against the content index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexQuery {
    /// Always `"Sensitivity"`.
    pub tag_type: String,
    pub tag_name: String,
    pub workload: String,
    pub page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_cookie: Option<String>,
}

impl IndexQuery {
    pub fn new(label: &str, partition: Partition, page_size: u32, cursor: Option<String>) -> Self {
        Self {
            tag_type: "Sensitivity".to_string(),
            tag_name: label.to_string(),
            workload: partition.workload().to_string(),
            page_size,
            page_cookie: cursor,
        }
    }
}

/// The eventually-consistent content index.
///
/// # Returns
///
/// The raw result set for one page: `None` or an empty vector when there is
/// nothing more; otherwise the first element is page metadata
/// (`morePagesAvailable`, `pageCookie`) and the rest are data rows whose
/// field names vary by backend.
#[async_trait]
pub trait IndexService: Send + Sync {
    async fn fetch_page(&self, query: &IndexQuery) -> Result<Option<Vec<Value>>>;
}

// ═══════════════════════════════════════════════════════════════════════
// Mutation API
// ═══════════════════════════════════════════════════════════════════════

/// Body of a label write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelAssignment {
    pub sensitivity_label_id: String,
    /// Always `"privileged"` so the write overrides user-applied labels.
    pub assignment_method: String,
    pub justification_text: String,
}

impl LabelAssignment {
    pub fn privileged(label_id: &str, justification: &str) -> Self {
        Self {
            sensitivity_label_id: label_id.to_string(),
            assignment_method: "privileged".to_string(),
            justification_text: justification.to_string(),
        }
    }
}

/// The remote API that addresses files by identity rather than path.
#[async_trait]
pub trait MutationApi: Send + Sync {
    /// Look up an object by its encoded share token.
    async fn resolve_share(&self, share_token: &str) -> Result<RemoteHandle>;

    /// Current label id on the live object, `None` when unlabelled.
    async fn read_label(&self, handle: &RemoteHandle) -> Result<Option<String>>;

    /// Request a label change. Server-side completion may be asynchronous
    /// and is not awaited.
    async fn write_label(&self, handle: &RemoteHandle, assignment: &LabelAssignment) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════
// Output sink
// ═══════════════════════════════════════════════════════════════════════

/// Where the coordinator streams audit lines and per-record results.
///
/// Failures are reported back so the caller can log them, but a sink error
/// never stops a run.
pub trait RunSink: Send + Sync {
    /// Append one audit line.
    fn audit(&self, phase: &str, status: &str, message: &str) -> Result<()>;

    /// Emit one per-record result as soon as it is recorded.
    fn emit(&self, outcome: &MigrationOutcome) -> Result<()>;
}

/// Sink that discards everything.
pub struct NullSink;

impl RunSink for NullSink {
    fn audit(&self, _phase: &str, _status: &str, _message: &str) -> Result<()> {
        Ok(())
    }

    fn emit(&self, _outcome: &MigrationOutcome) -> Result<()> {
        Ok(())
    }
}
