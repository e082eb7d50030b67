//! TOML configuration.
//!
//! ```toml
//! [run]
//! label = "Confidential"
//! target_label_id = "6f1c2b9e-..."
//! partitions = ["SharePoint", "OneDrive"]
//! page_size = 500
//! inter_record_delay_ms = 500
//! justification_text = "Label migration"
//! supported_extensions = ["docx", "xlsx", "pptx", "pdf"]
//!
//! [index]
//! endpoint = "https://index.example.net/contentExplorer"
//!
//! [graph]
//! base_url = "https://graph.microsoft.com/v1.0"
//!
//! [output]
//! dir = "./lmig-out"
//! ```
//!
//! Values given on the command line override the file through
//! [`Overrides`]. Mode-dependent requirements are checked by
//! [`Config::run_settings`] before any service is contacted.

use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::enumerate::MAX_PAGE_SIZE;
use crate::error::ConfigError;
use crate::models::Partition;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RunConfig {
    /// Label to search the index for (name or id).
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub target_label_id: Option<String>,
    #[serde(default = "default_partitions")]
    pub partitions: Vec<Partition>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_delay_ms")]
    pub inter_record_delay_ms: u64,
    #[serde(default = "default_justification")]
    pub justification_text: String,
    #[serde(default = "default_extensions")]
    pub supported_extensions: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            label: String::new(),
            target_label_id: None,
            partitions: default_partitions(),
            page_size: default_page_size(),
            inter_record_delay_ms: default_delay_ms(),
            justification_text: default_justification(),
            supported_extensions: default_extensions(),
        }
    }
}

fn default_partitions() -> Vec<Partition> {
    vec![Partition::SharePoint, Partition::OneDrive]
}
fn default_page_size() -> u32 {
    500
}
fn default_delay_ms() -> u64 {
    500
}
fn default_justification() -> String {
    "Sensitivity label migration".to_string()
}
fn default_extensions() -> Vec<String> {
    ["docx", "xlsx", "pptx", "pdf"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_index_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            token_env: default_index_token_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_index_token_env() -> String {
    "LMIG_INDEX_TOKEN".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GraphConfig {
    #[serde(default = "default_graph_base_url")]
    pub base_url: String,
    #[serde(default = "default_graph_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: default_graph_base_url(),
            token_env: default_graph_token_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_graph_base_url() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}
fn default_graph_token_env() -> String {
    "LMIG_GRAPH_TOKEN".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./lmig-out")
}

/// Mutually exclusive run modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Enumeration and location grouping only; no mutation API needed.
    Discovery,
    /// Full pipeline through the idempotency gate, no writes.
    DryRun,
    /// Full pipeline.
    Live,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Discovery => "discovery",
            RunMode::DryRun => "dry-run",
            RunMode::Live => "live",
        }
    }

    pub fn needs_mutation_api(&self) -> bool {
        !matches!(self, RunMode::Discovery)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub label: Option<String>,
    pub target_label_id: Option<String>,
    pub partitions: Vec<Partition>,
    pub page_size: Option<u32>,
    pub inter_record_delay_ms: Option<u64>,
    pub output_dir: Option<PathBuf>,
}

/// Validated, mode-specific settings handed to the coordinator.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub mode: RunMode,
    pub label: String,
    /// Always `Some` outside discovery.
    pub target_label_id: Option<String>,
    /// In processing order, de-duplicated.
    pub partitions: Vec<Partition>,
    pub page_size: u32,
    pub inter_record_delay: Duration,
    pub justification_text: String,
    /// Lowercase, without leading dots.
    pub supported_extensions: BTreeSet<String>,
    /// Stop after this many records have been pulled from the index.
    pub limit: Option<usize>,
}

impl Config {
    /// Apply command-line overrides on top of file values.
    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(label) = overrides.label {
            self.run.label = label;
        }
        if let Some(target) = overrides.target_label_id {
            self.run.target_label_id = Some(target);
        }
        if !overrides.partitions.is_empty() {
            self.run.partitions = overrides.partitions;
        }
        if let Some(page_size) = overrides.page_size {
            self.run.page_size = page_size;
        }
        if let Some(delay) = overrides.inter_record_delay_ms {
            self.run.inter_record_delay_ms = delay;
        }
        if let Some(dir) = overrides.output_dir {
            self.output.dir = dir;
        }
    }

    /// Check everything a run in `mode` requires and build its settings.
    pub fn run_settings(&self, mode: RunMode, limit: Option<usize>) -> Result<RunSettings, ConfigError> {
        let run = &self.run;

        if run.label.trim().is_empty() {
            return Err(ConfigError::MissingLabel);
        }
        if run.partitions.is_empty() {
            return Err(ConfigError::NoPartitions);
        }
        if run.page_size == 0 || run.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::PageSize {
                got: run.page_size,
                max: MAX_PAGE_SIZE,
            });
        }

        let supported_extensions: BTreeSet<String> = run
            .supported_extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        if supported_extensions.is_empty() {
            return Err(ConfigError::NoExtensions);
        }

        let target_label_id = run
            .target_label_id
            .as_ref()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        if mode.needs_mutation_api() && target_label_id.is_none() {
            return Err(ConfigError::MissingTargetLabel(mode.as_str()));
        }

        Ok(RunSettings {
            mode,
            label: run.label.trim().to_string(),
            target_label_id,
            partitions: Partition::ordered(&run.partitions),
            page_size: run.page_size,
            inter_record_delay: Duration::from_millis(run.inter_record_delay_ms),
            justification_text: run.justification_text.clone(),
            supported_extensions,
            limit,
        })
    }

    /// Endpoint checks for the HTTP collaborators used by `lmig`.
    pub fn check_endpoints(&self, mode: RunMode) -> Result<(), ConfigError> {
        let index_set = self
            .index
            .endpoint
            .as_deref()
            .is_some_and(|e| !e.trim().is_empty());
        if !index_set {
            return Err(ConfigError::MissingEndpoint("index.endpoint", mode.as_str()));
        }
        if mode.needs_mutation_api() && self.graph.base_url.trim().is_empty() {
            return Err(ConfigError::MissingEndpoint("graph.base_url", mode.as_str()));
        }
        Ok(())
    }
}

/// Read and parse a config file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Unreadable(format!("{}: {}", path.display(), e)))?;
    parse_config(&content)
}

/// Parse config text.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::Invalid(e.to_string()))
}
