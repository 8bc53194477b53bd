//! Buffer flushing
//!
//! A flush reads the buffer, uploads it, and clears it only once the sink has
//! acknowledged the upload. A failed upload leaves the buffer exactly as it
//! was, so flushing can always be attempted again later. The opposite failure,
//! an upload that lands followed by a clear that does not, is surfaced as
//! [`Error::BufferClear`](crate::Error::BufferClear) and will cause the same
//! rows to be uploaded again on the next flush.

use crate::buffer::BufferStore;
use crate::config::RetryConfig;
use crate::error::Result;
use crate::retry::with_retry;
use crate::sink::{CommitMessage, RemoteSink};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};

/// Moves buffered rows to the remote sink
pub struct FlushCoordinator {
    buffer: BufferStore,
    sink: Arc<dyn RemoteSink>,
    destination: String,
    retry: RetryConfig,
}

impl FlushCoordinator {
    /// Create a coordinator that uploads `buffer` to `destination` on `sink`
    pub fn new(
        buffer: BufferStore,
        sink: Arc<dyn RemoteSink>,
        destination: impl Into<String>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            buffer,
            sink,
            destination: destination.into(),
            retry,
        }
    }

    /// Upload and clear the buffer
    ///
    /// Returns `Ok(true)` if rows were uploaded and cleared, `Ok(false)` if
    /// there was nothing to upload or the upload failed. The only error is a
    /// failed clear after a successful upload.
    pub async fn flush(&self) -> Result<bool> {
        let Some(content) = self.buffer.read_all().await else {
            info!("Buffer is empty, skipping upload");
            return Ok(false);
        };

        let message = CommitMessage::automated(Utc::now());
        let upload = with_retry(&self.retry, || {
            self.sink
                .upload(&self.destination, content.as_bytes(), &message)
        })
        .await;

        match upload {
            Ok(receipt) => {
                info!(
                    destination = %self.destination,
                    commit_url = receipt.commit_url.as_deref().unwrap_or(""),
                    bytes = content.len(),
                    "Buffer uploaded"
                );
                self.buffer.clear().await?;
                Ok(true)
            }
            Err(e) => {
                error!(
                    destination = %self.destination,
                    error = %e,
                    error_code = e.error_code(),
                    "Failed to upload buffer, keeping rows for the next flush"
                );
                Ok(false)
            }
        }
    }
}
