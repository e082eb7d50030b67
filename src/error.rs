//! Typed errors for the places where callers branch on the failure kind.
//!
//! Everything else travels as `anyhow::Error` with context attached at the
//! I/O boundary.

use thiserror::Error;

use crate::models::Partition;

/// Invalid or incomplete configuration. The only error that aborts a run,
/// and it is always raised before any collaborator is contacted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("config file unreadable: {0}")]
    Unreadable(String),
    #[error("config file invalid: {0}")]
    Invalid(String),
    #[error("run.label must not be empty")]
    MissingLabel,
    #[error("run.target_label_id is required for {0} runs")]
    MissingTargetLabel(&'static str),
    #[error("run.partitions must name at least one of SharePoint, OneDrive")]
    NoPartitions,
    #[error("run.page_size must be in 1..={max}, got {got}")]
    PageSize { got: u32, max: u32 },
    #[error("run.supported_extensions must not be empty")]
    NoExtensions,
    #[error("{0} must be set for {1} runs")]
    MissingEndpoint(&'static str, &'static str),
}

/// Partition-scoped enumeration failure. Never fatal to the run except
/// for [`EnumerationError::InvalidParameters`], which is a programming error.
#[derive(Debug, Error)]
pub enum EnumerationError {
    #[error("invalid enumeration parameters: {0}")]
    InvalidParameters(String),
    #[error("index service failed for {partition}: {detail}")]
    Service { partition: Partition, detail: String },
    #[error("index cursor for {partition} did not advance after page {page} (cursor {cursor})")]
    LoopDetected {
        partition: Partition,
        page: u32,
        cursor: String,
    },
}

/// A location reference could not be turned into a live handle.
///
/// Deliberately a single variant: malformed, not found and access denied
/// all need the same remediation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("could not resolve '{location}': {detail}")]
pub struct ResolveError {
    pub location: String,
    pub detail: String,
}
