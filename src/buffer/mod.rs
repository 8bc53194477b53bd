//! Local CSV buffer
//!
//! Outcomes are appended to a CSV file between flushes. The file always
//! begins with the canonical header; rows are only ever removed by
//! [`BufferStore::clear`], which the flush path calls after the remote sink
//! has confirmed an upload.
//!
//! The store performs no locking of its own. Callers must not run two
//! mutating operations concurrently; the orchestrator's overlap guard
//! provides that.

mod row;

pub use row::{CSV_COLUMNS, CSV_HEADER, encode_row, encode_rows, header_line};

use crate::error::{Error, Result};
use crate::types::CallOutcome;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

/// Append-only CSV buffer on the local filesystem
#[derive(Clone, Debug)]
pub struct BufferStore {
    path: PathBuf,
}

impl BufferStore {
    /// Create a store for the given file; nothing is touched until first use
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the buffer file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Make sure the file exists and starts with the canonical header
    ///
    /// A missing file is created. A file whose first line is not the header
    /// is rewritten to contain only the header. Idempotent.
    pub async fn ensure_shape(&self) -> Result<()> {
        match tokio::fs::read(&self.path).await {
            Ok(contents) if starts_with_header(&contents) => Ok(()),
            Ok(_) => {
                warn!(
                    path = %self.path.display(),
                    "Buffer file has a missing or incorrect header, rewriting header"
                );
                tokio::fs::write(&self.path, header_line()).await?;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "Buffer file not found, creating with header");
                tokio::fs::write(&self.path, header_line()).await?;
                Ok(())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Append outcomes as rows, after ensuring the header
    ///
    /// An empty batch does not touch the file.
    pub async fn append(&self, outcomes: &[CallOutcome]) -> Result<()> {
        if outcomes.is_empty() {
            debug!("No outcomes to append to buffer");
            return Ok(());
        }

        self.ensure_shape().await?;

        let rows = encode_rows(outcomes);
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(rows.as_bytes()).await?;
        file.flush().await?;

        info!(
            path = %self.path.display(),
            rows = outcomes.len(),
            "Appended outcomes to buffer"
        );
        Ok(())
    }

    /// Full buffer contents, or `None` if there are no data rows
    ///
    /// A missing or unreadable file also reads as `None`, so a broken buffer
    /// never turns into an upload.
    pub async fn read_all(&self) -> Option<String> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "Buffer file not found, nothing to read");
                return None;
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "Failed to read buffer file");
                return None;
            }
        };

        if data_rows(&contents).trim().is_empty() {
            info!(path = %self.path.display(), "Buffer contains no data rows");
            return None;
        }
        Some(contents)
    }

    /// Reset the buffer to the header alone
    ///
    /// Failure is [`Error::BufferClear`]: the caller has usually just
    /// uploaded these rows, and leaving them in place means they will be
    /// uploaded again.
    pub async fn clear(&self) -> Result<()> {
        info!(path = %self.path.display(), "Clearing buffer");
        tokio::fs::write(&self.path, header_line())
            .await
            .map_err(|source| Error::BufferClear {
                path: self.path.clone(),
                source,
            })
    }
}

fn starts_with_header(contents: &[u8]) -> bool {
    let first_line = contents
        .split(|b| *b == b'\n')
        .next()
        .unwrap_or_default();
    let first_line = first_line.strip_suffix(b"\r").unwrap_or(first_line);
    first_line == CSV_HEADER.as_bytes()
}

// Everything after the first line
fn data_rows(contents: &str) -> &str {
    contents.split_once('\n').map_or("", |(_, rest)| rest)
}
