//! Paginated enumeration over the content index.
//!
//! Drives the index service's cookie-based paging protocol and yields
//! [`CanonicalRecord`]s lazily, one partition after another.
//!
//! # Protocol (per partition)
//!
//! 1. Request a page with `{label, partition, page_size, cursor?}`.
//! 2. A null or empty result ends the partition.
//! 3. Otherwise the first element is page metadata and the rest are data
//!    rows, each passed through [`normalize_row`].
//! 4. `morePagesAvailable == false` or a missing cookie ends the partition.
//! 5. A cookie equal to the previous one ends the partition with a
//!    [`EnumerationError::LoopDetected`] warning.
//!
//! Service failures end only the affected partition; they are logged and
//! kept in [`Enumerator::warnings`] instead of being returned to the caller.

use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::error::EnumerationError;
use crate::models::{CanonicalRecord, PageCursor, Partition};
use crate::normalize::normalize_row;
use crate::traits::{IndexQuery, IndexService};

/// Largest page the index service accepts.
pub const MAX_PAGE_SIZE: u32 = 5000;

/// A non-fatal enumeration problem, in report form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumerationWarning {
    pub partition: Option<Partition>,
    pub kind: &'static str,
    pub message: String,
}

impl From<&EnumerationError> for EnumerationWarning {
    fn from(err: &EnumerationError) -> Self {
        let (partition, kind) = match err {
            EnumerationError::InvalidParameters(_) => (None, "invalid_parameters"),
            EnumerationError::Service { partition, .. } => (Some(*partition), "service"),
            EnumerationError::LoopDetected { partition, .. } => (Some(*partition), "loop_detected"),
        };
        Self {
            partition,
            kind,
            message: err.to_string(),
        }
    }
}

/// Lazy, single-pass record source over one or more partitions.
///
/// Restartable only from the beginning via [`Enumerator::restart`]; no
/// mid-sequence resume token is exposed.
pub struct Enumerator<'a> {
    index: &'a dyn IndexService,
    label: String,
    partitions: Vec<Partition>,
    page_size: u32,

    partition_idx: usize,
    cursor: Option<String>,
    page: u32,
    partition_done: bool,
    buffer: VecDeque<CanonicalRecord>,
    warnings: Vec<EnumerationError>,
    dropped: u64,
}

impl<'a> Enumerator<'a> {
    /// Create an enumerator. Partitions are visited in fixed order
    /// regardless of the order given.
    ///
    /// # Errors
    ///
    /// [`EnumerationError::InvalidParameters`] for an empty label, no
    /// partitions, or a page size outside `1..=MAX_PAGE_SIZE`.
    pub fn new(
        index: &'a dyn IndexService,
        label: &str,
        partitions: &[Partition],
        page_size: u32,
    ) -> Result<Self, EnumerationError> {
        if label.trim().is_empty() {
            return Err(EnumerationError::InvalidParameters(
                "label must not be empty".to_string(),
            ));
        }
        if partitions.is_empty() {
            return Err(EnumerationError::InvalidParameters(
                "at least one partition is required".to_string(),
            ));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(EnumerationError::InvalidParameters(format!(
                "page size must be in 1..={}, got {}",
                MAX_PAGE_SIZE, page_size
            )));
        }

        Ok(Self {
            index,
            label: label.to_string(),
            partitions: Partition::ordered(partitions),
            page_size,
            partition_idx: 0,
            cursor: None,
            page: 0,
            partition_done: false,
            buffer: VecDeque::new(),
            warnings: Vec::new(),
            dropped: 0,
        })
    }

    /// Next record, fetching pages as needed. `None` once every partition
    /// is exhausted.
    pub async fn next_record(&mut self) -> Option<CanonicalRecord> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Some(record);
            }
            let partition = *self.partitions.get(self.partition_idx)?;
            if self.partition_done {
                self.partition_idx += 1;
                self.cursor = None;
                self.page = 0;
                self.partition_done = false;
                continue;
            }
            self.fetch_page(partition).await;
        }
    }

    /// Partition currently being read, if any remain.
    pub fn current_partition(&self) -> Option<Partition> {
        self.partitions.get(self.partition_idx).copied()
    }

    /// Drain the remaining sequence.
    pub async fn collect_remaining(&mut self) -> Vec<CanonicalRecord> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record().await {
            records.push(record);
        }
        records
    }

    /// Rewind to the first page of the first partition.
    pub fn restart(&mut self) {
        self.partition_idx = 0;
        self.cursor = None;
        self.page = 0;
        self.partition_done = false;
        self.buffer.clear();
        self.warnings.clear();
        self.dropped = 0;
    }

    /// Partition failures and loop detections seen so far.
    pub fn warnings(&self) -> &[EnumerationError] {
        &self.warnings
    }

    /// Rows discarded by normalization (no file name).
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    async fn fetch_page(&mut self, partition: Partition) {
        let query = IndexQuery::new(&self.label, partition, self.page_size, self.cursor.clone());
        self.page += 1;
        debug!(
            partition = %partition,
            page = self.page,
            cursor = ?self.cursor,
            "requesting index page"
        );

        let rows = match self.index.fetch_page(&query).await {
            Ok(Some(rows)) if !rows.is_empty() => rows,
            Ok(_) => {
                debug!(partition = %partition, page = self.page, "empty page, partition complete");
                self.partition_done = true;
                return;
            }
            Err(e) => {
                let err = EnumerationError::Service {
                    partition,
                    detail: format!("{:#}", e),
                };
                warn!(partition = %partition, page = self.page, error = %err, "skipping rest of partition");
                self.warnings.push(err);
                self.partition_done = true;
                return;
            }
        };

        let mut rows = rows.into_iter();
        let meta = rows.next().map(|m| parse_page_metadata(&m)).unwrap_or_default();

        let mut kept = 0usize;
        for row in rows {
            match normalize_row(&row, partition) {
                Some(record) => {
                    self.buffer.push_back(record);
                    kept += 1;
                }
                None => self.dropped += 1,
            }
        }
        debug!(
            partition = %partition,
            page = self.page,
            records = kept,
            has_more = meta.has_more,
            "index page received"
        );

        if !meta.has_more {
            self.partition_done = true;
            return;
        }
        match meta.token {
            None => self.partition_done = true,
            Some(token) if self.cursor.as_deref() == Some(token.as_str()) => {
                let err = EnumerationError::LoopDetected {
                    partition,
                    page: self.page,
                    cursor: token,
                };
                warn!(partition = %partition, error = %err, "stopping enumeration of partition");
                self.warnings.push(err);
                self.partition_done = true;
            }
            Some(token) => self.cursor = Some(token),
        }
    }
}

/// Read `morePagesAvailable` / `pageCookie` from a metadata element.
///
/// Key names are matched case-insensitively; booleans may arrive as JSON
/// booleans or as `"True"`/`"False"` strings.
pub fn parse_page_metadata(meta: &Value) -> PageCursor {
    let Some(fields) = meta.as_object() else {
        return PageCursor::default();
    };
    let lookup = |name: &str| {
        fields
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    };

    let has_more = match lookup("morePagesAvailable") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };
    let token = match lookup("pageCookie") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    };

    PageCursor { token, has_more }
}
