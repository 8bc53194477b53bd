//! Hugging Face Hub dataset sink

use super::{CommitMessage, RemoteSink, UploadReceipt};
use crate::config::{HubConfig, Secret};
use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Commits files to a Hub dataset repository through the commit API
///
/// Each upload is a single commit on `main` carrying one file, sent as
/// NDJSON: a header line with the commit message, then a file line with the
/// base64-encoded content.
pub struct HubSink {
    client: reqwest::Client,
    endpoint: String,
    repo_id: String,
    token: Secret,
}

#[derive(Serialize)]
#[serde(tag = "key", content = "value", rename_all = "lowercase")]
enum CommitLine<'a> {
    Header {
        summary: &'a str,
        description: &'a str,
    },
    File {
        content: String,
        path: &'a str,
        encoding: &'static str,
    },
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitResponse {
    #[serde(default)]
    commit_url: Option<String>,
}

impl HubSink {
    /// Create a sink from configuration
    pub fn new(client: reqwest::Client, config: &HubConfig) -> Self {
        Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            repo_id: config.repo_id.clone(),
            token: config.token.clone(),
        }
    }

    fn commit_url(&self) -> String {
        format!("{}/api/datasets/{}/commit/main", self.endpoint, self.repo_id)
    }

    fn commit_body(destination: &str, content: &[u8], message: &CommitMessage) -> Result<String> {
        let header = CommitLine::Header {
            summary: &message.title,
            description: &message.description,
        };
        let file = CommitLine::File {
            content: STANDARD.encode(content),
            path: destination,
            encoding: "base64",
        };
        Ok(format!(
            "{}\n{}\n",
            serde_json::to_string(&header)?,
            serde_json::to_string(&file)?
        ))
    }
}

#[async_trait]
impl RemoteSink for HubSink {
    async fn upload(
        &self,
        destination: &str,
        content: &[u8],
        message: &CommitMessage,
    ) -> Result<UploadReceipt> {
        info!(
            repo_id = %self.repo_id,
            path = destination,
            size_bytes = content.len(),
            "Uploading buffer to Hub dataset"
        );

        let response = self
            .client
            .post(self.commit_url())
            .bearer_auth(self.token.expose())
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(Self::commit_body(destination, content, message)?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Sink {
                status: status.as_u16(),
                message: if message.is_empty() {
                    status.canonical_reason().unwrap_or_default().to_string()
                } else {
                    message
                },
            });
        }

        // The commit landed; an unexpected body only costs us the link
        let body = response.text().await.unwrap_or_default();
        let parsed: CommitResponse = serde_json::from_str(&body).unwrap_or_default();

        info!(
            repo_id = %self.repo_id,
            commit_url = parsed.commit_url.as_deref().unwrap_or(""),
            "Upload committed"
        );
        Ok(UploadReceipt {
            commit_url: parsed.commit_url,
        })
    }
}
