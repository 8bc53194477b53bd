//! Core types for provider-pulse

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Header name/value pairs after sanitising, ordered by name
pub type HeaderPairs = BTreeMap<String, String>;

/// Sequence number of an accepted cycle (the first cycle is 1)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CycleId(pub u64);

impl CycleId {
    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }

    /// Whether this cycle lands on a flush boundary
    ///
    /// A zero interval never flushes.
    pub fn is_flush_cycle(&self, push_interval_cycles: u64) -> bool {
        push_interval_cycles != 0 && self.0 % push_interval_cycles == 0
    }
}

impl std::fmt::Display for CycleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One (model, provider) pair to probe in a cycle
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    /// Hub model identifier, e.g. "meta-llama/Llama-3.3-70B-Instruct"
    pub model_id: String,
    /// Provider name as reported by discovery, e.g. "together"
    pub provider_name: String,
    /// The provider's own identifier for the model
    pub provider_model_id: String,
}

impl WorkItem {
    /// Create a new work item
    pub fn new(
        model_id: impl Into<String>,
        provider_name: impl Into<String>,
        provider_model_id: impl Into<String>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            provider_name: provider_name.into(),
            provider_model_id: provider_model_id.into(),
        }
    }
}

/// How a single provider call ended
///
/// Every attempt resolves to exactly one variant, so callers never have to
/// tell an HTTP error response apart from a transport failure after the fact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeResponse {
    /// 2xx response
    Success {
        /// HTTP status code
        status: u16,
        /// Sanitised response headers
        headers: HeaderPairs,
        /// Raw response body
        body: String,
    },
    /// Non-2xx response, after retries were exhausted or not permitted
    HttpFailure {
        /// HTTP status code
        status: u16,
        /// Canonical reason phrase for the status, if any
        reason: String,
        /// Sanitised response headers
        headers: HeaderPairs,
        /// Raw response body, or a diagnostic note if it could not be read
        body: String,
    },
    /// No HTTP response was obtained (DNS, connect, timeout, body read)
    TransportFailure {
        /// Description of the failure
        message: String,
    },
}

impl ProbeResponse {
    /// Status code recorded when no HTTP response exists
    pub const NO_STATUS: i32 = -1;

    /// Status code in its serialized form ([`Self::NO_STATUS`] for transport failures)
    pub fn status_code(&self) -> i32 {
        match self {
            ProbeResponse::Success { status, .. } | ProbeResponse::HttpFailure { status, .. } => {
                i32::from(*status)
            }
            ProbeResponse::TransportFailure { .. } => Self::NO_STATUS,
        }
    }

    /// Sanitised response headers, if a response was received
    pub fn headers(&self) -> Option<&HeaderPairs> {
        match self {
            ProbeResponse::Success { headers, .. } | ProbeResponse::HttpFailure { headers, .. } => {
                Some(headers)
            }
            ProbeResponse::TransportFailure { .. } => None,
        }
    }

    /// Body text as stored in the buffer
    pub fn body(&self) -> Cow<'_, str> {
        match self {
            ProbeResponse::Success { body, .. } | ProbeResponse::HttpFailure { body, .. } => {
                Cow::Borrowed(body)
            }
            ProbeResponse::TransportFailure { message } => {
                Cow::Owned(format!("[Fetch Error: {message}]"))
            }
        }
    }

    /// Human-readable failure summary; empty for a success
    pub fn error_message(&self) -> String {
        match self {
            ProbeResponse::Success { .. } => String::new(),
            ProbeResponse::HttpFailure { status, reason, .. } => {
                format!("HTTP error {status}: {reason}")
            }
            ProbeResponse::TransportFailure { message } => message.clone(),
        }
    }

    /// Whether the call succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeResponse::Success { .. })
    }
}

/// One buffered row: the normalised result of probing one work item
///
/// Field order mirrors the buffer's column order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOutcome {
    /// Timestamp shared by every outcome of the cycle (ISO-8601)
    pub cycle_timestamp: String,
    /// Hub model identifier
    pub model_id: String,
    /// Provider name
    pub provider_name: String,
    /// Provider-specific model identifier
    pub provider_model_id: String,
    /// Resolved endpoint URL
    pub request_url: String,
    /// Serialized JSON request body
    pub request_body: String,
    /// Serialized JSON object of sanitised request headers
    pub request_headers_sanitized: String,
    /// When the first attempt started (ISO-8601)
    pub request_start: String,
    /// When the final attempt finished (ISO-8601)
    pub response_end: String,
    /// Wall-clock time across all attempts, in whole milliseconds
    pub duration_ms: i64,
    /// HTTP status, or -1 when no response was received
    pub response_status_code: i32,
    /// Raw response body or diagnostic placeholder
    pub response_body_raw: String,
    /// Serialized JSON object of sanitised response headers
    pub response_headers_sanitized: String,
    /// Empty on success
    pub error_message: String,
}

/// Format a timestamp the way every buffer column stores it
///
/// Millisecond precision with a `Z` suffix, e.g. `2024-05-01T12:00:00.000Z`.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
