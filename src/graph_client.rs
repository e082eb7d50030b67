//! Microsoft Graph mutation client.
//!
//! Implements [`MutationApi`] against the drive-item endpoints:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | resolve | `GET /shares/{token}/driveItem` |
//! | read | `POST /drives/{drive}/items/{item}/extractSensitivityLabels` |
//! | write | `POST /drives/{drive}/items/{item}/assignSensitivityLabel` |
//!
//! The write returns `202 Accepted` and completes server-side; the client
//! does not poll for completion. Non-2xx responses become errors carrying
//! the status and the start of the body. No retries.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::GraphConfig;
use crate::models::RemoteHandle;
use crate::traits::{LabelAssignment, MutationApi};

pub struct GraphMutationApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveItem {
    id: String,
    #[serde(default)]
    name: String,
    parent_reference: Option<ParentReference>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParentReference {
    drive_id: Option<String>,
}

#[derive(Deserialize)]
struct ExtractLabelsResult {
    #[serde(default)]
    labels: Vec<SensitivityLabelAssignment>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SensitivityLabelAssignment {
    sensitivity_label_id: Option<String>,
}

impl GraphMutationApi {
    /// Build a client from configuration and the environment.
    pub fn from_config(config: &GraphConfig) -> Result<Self> {
        let token = std::env::var(&config.token_env)
            .with_context(|| format!("{} environment variable not set", config.token_env))?;
        Self::new(&config.base_url, token, Duration::from_secs(config.timeout_secs))
    }

    pub fn new(base_url: &str, token: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn item_url(&self, handle: &RemoteHandle, action: &str) -> String {
        format!(
            "{}/drives/{}/items/{}/{}",
            self.base_url, handle.store_id, handle.item_id, action
        )
    }
}

/// Fail with status and a body excerpt on non-2xx.
async fn check(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    bail!(
        "{} failed (HTTP {}): {}",
        what,
        status,
        body.chars().take(500).collect::<String>()
    );
}

#[async_trait]
impl MutationApi for GraphMutationApi {
    async fn resolve_share(&self, share_token: &str) -> Result<RemoteHandle> {
        let url = format!(
            "{}/shares/{}/driveItem?$select=id,name,parentReference",
            self.base_url, share_token
        );
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .context("share lookup request failed")?;
        let item: DriveItem = check(resp, "share lookup")
            .await?
            .json()
            .await
            .context("share lookup returned unexpected JSON")?;

        let store_id = item
            .parent_reference
            .and_then(|p| p.drive_id)
            .ok_or_else(|| anyhow::anyhow!("drive item {} has no parent drive id", item.id))?;
        Ok(RemoteHandle {
            store_id,
            item_id: item.id,
            display_name: item.name,
        })
    }

    async fn read_label(&self, handle: &RemoteHandle) -> Result<Option<String>> {
        let resp = self
            .client
            .post(self.item_url(handle, "extractSensitivityLabels"))
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_LENGTH, 0)
            .send()
            .await
            .context("label read request failed")?;
        let result: ExtractLabelsResult = check(resp, "label read")
            .await?
            .json()
            .await
            .context("label read returned unexpected JSON")?;

        Ok(result
            .labels
            .into_iter()
            .find_map(|l| l.sensitivity_label_id.filter(|id| !id.is_empty())))
    }

    async fn write_label(&self, handle: &RemoteHandle, assignment: &LabelAssignment) -> Result<()> {
        let resp = self
            .client
            .post(self.item_url(handle, "assignSensitivityLabel"))
            .bearer_auth(&self.token)
            .json(assignment)
            .send()
            .await
            .context("label write request failed")?;
        check(resp, "label write").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_urls_are_built_from_handle() {
        let api = GraphMutationApi::new(
            "https://graph.microsoft.com/v1.0/",
            "t".into(),
            Duration::from_secs(5),
        )
        .unwrap();
        let handle = RemoteHandle {
            store_id: "b!abc".into(),
            item_id: "01XYZ".into(),
            display_name: "a.docx".into(),
        };
        assert_eq!(
            api.item_url(&handle, "assignSensitivityLabel"),
            "https://graph.microsoft.com/v1.0/drives/b!abc/items/01XYZ/assignSensitivityLabel"
        );
    }

    #[test]
    fn label_extraction_payload_parses() {
        let parsed: ExtractLabelsResult = serde_json::from_str(
            r#"{"labels":[{"sensitivityLabelId":"abc","assignmentMethod":"standard","tenantId":"t"}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.labels[0].sensitivity_label_id.as_deref(), Some("abc"));

        let empty: ExtractLabelsResult = serde_json::from_str("{}").unwrap();
        assert!(empty.labels.is_empty());
    }

    #[test]
    fn drive_item_payload_parses() {
        let item: DriveItem = serde_json::from_str(
            r#"{"id":"01XYZ","name":"a.docx","parentReference":{"driveId":"b!abc","id":"01PARENT"}}"#,
        )
        .unwrap();
        assert_eq!(item.id, "01XYZ");
        assert_eq!(item.parent_reference.unwrap().drive_id.as_deref(), Some("b!abc"));
    }
}
