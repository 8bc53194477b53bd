//! Provider probing
//!
//! A probe sends one chat completion request for one [`WorkItem`], retries
//! transient failures, and records the result as a [`CallOutcome`]. Probing
//! never fails: an HTTP error or a dropped connection is data, not an error.
//! The only case that produces no outcome is a provider with no mapped
//! endpoint, which is skipped.

mod request;

pub use request::{
    ChatMessage, ChatRequest, MASKED_AUTHORIZATION, PROBE_PROMPT, headers_json, request_headers,
    sanitize_header_map, sanitize_headers,
};

use crate::config::{ProbeConfig, RetryConfig, Secret};
use crate::discovery::EndpointMap;
use crate::error::Result;
use crate::retry::{IsRetryable, with_retry};
use crate::types::{CallOutcome, HeaderPairs, ProbeResponse, WorkItem, iso_timestamp};
use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Something that can turn a work item into a buffered outcome
///
/// Implementations must not panic; `None` means the item was deliberately skipped.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Probe one work item, stamping the outcome with the cycle timestamp
    async fn probe(&self, item: &WorkItem, cycle_timestamp: &str) -> Option<CallOutcome>;
}

/// Failure of a single HTTP attempt
#[derive(Debug, Error)]
pub enum CallError {
    /// The provider answered with a non-2xx status
    #[error("HTTP error {status}: {reason}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Canonical reason phrase
        reason: String,
        /// Sanitised response headers
        headers: HeaderPairs,
        /// Response body, or a note explaining why it could not be read
        body: String,
    },

    /// No usable response (DNS, connect, timeout, body read)
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl IsRetryable for CallError {
    fn is_retryable(&self) -> bool {
        match self {
            CallError::Http { status, .. } => (500..=599).contains(status),
            CallError::Transport(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
            }
        }
    }
}

impl From<CallError> for ProbeResponse {
    fn from(error: CallError) -> Self {
        match error {
            CallError::Http {
                status,
                reason,
                headers,
                body,
            } => ProbeResponse::HttpFailure {
                status,
                reason,
                headers,
                body,
            },
            CallError::Transport(e) => ProbeResponse::TransportFailure {
                message: e.to_string(),
            },
        }
    }
}

/// Calls provider endpoints over HTTP
pub struct ProviderCaller {
    client: reqwest::Client,
    endpoints: EndpointMap,
    token: Secret,
    max_tokens: u32,
    retry: RetryConfig,
}

impl ProviderCaller {
    /// Create a caller with its own HTTP client
    ///
    /// The client applies `request_timeout` to each attempt.
    pub fn new(config: &ProbeConfig, endpoints: EndpointMap) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_client(client, config, endpoints))
    }

    /// Create a caller around an existing HTTP client
    pub fn with_client(client: reqwest::Client, config: &ProbeConfig, endpoints: EndpointMap) -> Self {
        Self {
            client,
            endpoints,
            token: config.token.clone(),
            max_tokens: config.max_tokens,
            retry: config.retry.clone(),
        }
    }

    /// Probe one work item
    ///
    /// Returns `None` if the provider has no mapped endpoint. Otherwise the
    /// request is retried per the configured policy and the final response,
    /// whatever it was, is recorded.
    pub async fn call(&self, item: &WorkItem, cycle_timestamp: &str) -> Option<CallOutcome> {
        let Some(url) = self.endpoints.resolve(&item.provider_name) else {
            warn!(
                model_id = %item.model_id,
                provider = %item.provider_name,
                "No endpoint mapping for provider, skipping"
            );
            return None;
        };

        let request_body =
            match serde_json::to_string(&ChatRequest::probe(&item.provider_model_id, self.max_tokens)) {
                Ok(body) => body,
                Err(e) => {
                    warn!(model_id = %item.model_id, error = %e, "Failed to serialize request body");
                    return None;
                }
            };

        let outbound = request_headers(self.token.expose());
        let sanitized = sanitize_headers(outbound.iter().map(|(k, v)| (*k, v.as_str())));

        debug!(
            model_id = %item.model_id,
            provider = %item.provider_name,
            url = %url,
            "Initiating inference call"
        );

        let request_start = Utc::now();
        let response = match with_retry(&self.retry, || self.attempt(url, &outbound, &request_body)).await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    model_id = %item.model_id,
                    provider = %item.provider_name,
                    error = %e,
                    "Inference call failed"
                );
                ProbeResponse::from(e)
            }
        };
        let response_end = Utc::now();
        let duration_ms = (response_end - request_start).num_milliseconds();

        info!(
            model_id = %item.model_id,
            provider = %item.provider_name,
            status = response.status_code(),
            success = response.is_success(),
            duration_ms,
            "Inference call completed"
        );

        Some(CallOutcome {
            cycle_timestamp: cycle_timestamp.to_string(),
            model_id: item.model_id.clone(),
            provider_name: item.provider_name.clone(),
            provider_model_id: item.provider_model_id.clone(),
            request_url: url.to_string(),
            request_body,
            request_headers_sanitized: headers_json(&sanitized),
            request_start: iso_timestamp(request_start),
            response_end: iso_timestamp(response_end),
            duration_ms,
            response_status_code: response.status_code(),
            response_body_raw: response.body().into_owned(),
            response_headers_sanitized: headers_json(
                response.headers().unwrap_or(&HeaderPairs::new()),
            ),
            error_message: response.error_message(),
        })
    }

    /// One HTTP attempt; any non-2xx status is returned as [`CallError::Http`]
    async fn attempt(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
        body: &str,
    ) -> std::result::Result<ProbeResponse, CallError> {
        let mut request = self.client.post(url).body(body.to_string());
        for (name, value) in headers {
            request = request.header(*name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = sanitize_header_map(response.headers());

        if status.is_success() {
            let body = response.text().await?;
            return Ok(ProbeResponse::Success {
                status: status.as_u16(),
                headers,
                body,
            });
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => format!("[Could not read error response body: {e}]"),
        };
        Err(CallError::Http {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

#[async_trait]
impl Probe for ProviderCaller {
    async fn probe(&self, item: &WorkItem, cycle_timestamp: &str) -> Option<CallOutcome> {
        self.call(item, cycle_timestamp).await
    }
}
