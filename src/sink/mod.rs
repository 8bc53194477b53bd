//! Remote sink for flushed buffers
//!
//! The sink is treated as atomic: an upload either lands completely and is
//! acknowledged, or fails and changes nothing remotely.

mod hub;

pub use hub::HubSink;

use crate::error::Result;
use crate::types::iso_timestamp;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Destination for buffer contents
#[async_trait]
pub trait RemoteSink: Send + Sync {
    /// Write `content` to `destination`, replacing what was there
    async fn upload(
        &self,
        destination: &str,
        content: &[u8],
        message: &CommitMessage,
    ) -> Result<UploadReceipt>;
}

/// Commit title and description attached to an upload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitMessage {
    /// Short summary line
    pub title: String,
    /// Longer description
    pub description: String,
}

impl CommitMessage {
    /// Message for an automated upload made at `at`
    pub fn automated(at: DateTime<Utc>) -> Self {
        let at = iso_timestamp(at);
        Self {
            title: format!("Automated metrics upload {at}"),
            description: format!("Upload metrics data collected up to {at}."),
        }
    }
}

/// Acknowledgement from the sink
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Link to the resulting commit, if the sink reports one
    pub commit_url: Option<String>,
}
