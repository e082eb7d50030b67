//! HTTP content-index client.
//!
//! Posts one page request per call to the configured endpoint and returns
//! the raw result set untouched; interpreting the metadata element and the
//! data rows is the enumerator's job.
//!
//! # Configuration
//!
//! ```toml
//! [index]
//! endpoint = "https://index.example.net/contentExplorer"
//! token_env = "LMIG_INDEX_TOKEN"   # default
//! timeout_secs = 30
//! ```
//!
//! The bearer token is issued out of band and read from the named
//! environment variable.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::config::IndexConfig;
use crate::traits::{IndexQuery, IndexService};

pub struct HttpIndexService {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl HttpIndexService {
    /// Build a client from configuration and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `index.endpoint` is unset or the token variable
    /// is missing.
    pub fn from_config(config: &IndexConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("index.endpoint is not configured"))?;
        let token = std::env::var(&config.token_env)
            .with_context(|| format!("{} environment variable not set", config.token_env))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            token,
        })
    }
}

#[async_trait]
impl IndexService for HttpIndexService {
    async fn fetch_page(&self, query: &IndexQuery) -> Result<Option<Vec<Value>>> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(query)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "index request failed for {} (tag '{}'): {}",
                    query.workload,
                    query.tag_name,
                    e
                )
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "index service returned HTTP {}: {}",
                status,
                body.chars().take(500).collect::<String>()
            );
        }

        let body: Value = resp.json().await.context("index response is not JSON")?;
        parse_result_set(body)
    }
}

/// Accept `null`, a bare array, or an object wrapping the array in `value`.
fn parse_result_set(body: Value) -> Result<Option<Vec<Value>>> {
    match body {
        Value::Null => Ok(None),
        Value::Array(rows) => Ok(Some(rows)),
        Value::Object(mut obj) => match obj.remove("value") {
            Some(Value::Array(rows)) => Ok(Some(rows)),
            Some(Value::Null) | None => Ok(None),
            Some(other) => bail!("unexpected index response 'value': {}", other),
        },
        other => bail!("unexpected index response: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn result_set_shapes() {
        assert_eq!(parse_result_set(json!(null)).unwrap(), None);
        assert_eq!(parse_result_set(json!([])).unwrap(), Some(vec![]));
        assert_eq!(
            parse_result_set(json!({ "value": [{ "MorePagesAvailable": false }] }))
                .unwrap()
                .map(|rows| rows.len()),
            Some(1)
        );
        assert_eq!(parse_result_set(json!({})).unwrap(), None);
        assert!(parse_result_set(json!("oops")).is_err());
    }

    #[test]
    fn missing_endpoint_is_an_error() {
        let err = HttpIndexService::from_config(&IndexConfig::default()).err().unwrap();
        assert!(err.to_string().contains("index.endpoint"));
    }
}
