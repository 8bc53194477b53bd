//! Request construction and header sanitising for provider probes

use crate::types::HeaderPairs;
use reqwest::header::HeaderMap;
use serde::Serialize;

/// Prompt sent to every provider so latencies are comparable
pub const PROBE_PROMPT: &str = "Solve this: 123/2*3.2*9";

/// Value recorded in place of any `Authorization` header
pub const MASKED_AUTHORIZATION: &str = "Bearer [MASKED]";

/// Chat completion request body
///
/// Field order is the serialized order.
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    /// Conversation, always a single user message
    pub messages: [ChatMessage<'a>; 1],
    /// Completion token limit
    pub max_tokens: u32,
    /// Provider-specific model identifier
    pub model: &'a str,
    /// Always false; probes time the full response
    pub stream: bool,
}

/// One chat message
#[derive(Debug, Serialize)]
pub struct ChatMessage<'a> {
    /// Speaker role
    pub role: &'a str,
    /// Message text
    pub content: &'a str,
}

impl<'a> ChatRequest<'a> {
    /// Build the canonical probe request for a provider model
    pub fn probe(provider_model_id: &'a str, max_tokens: u32) -> Self {
        Self {
            messages: [ChatMessage {
                role: "user",
                content: PROBE_PROMPT,
            }],
            max_tokens,
            model: provider_model_id,
            stream: false,
        }
    }
}

/// Headers sent with every probe, including the real bearer token
pub fn request_headers(token: &str) -> Vec<(&'static str, String)> {
    vec![
        ("Authorization", format!("Bearer {token}")),
        ("Content-Type", "application/json".to_string()),
    ]
}

/// Copy headers, masking any `Authorization` value
pub fn sanitize_headers<'a, I>(headers: I) -> HeaderPairs
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    headers
        .into_iter()
        .map(|(name, value)| {
            let value = if name.eq_ignore_ascii_case("authorization") {
                MASKED_AUTHORIZATION.to_string()
            } else {
                value.to_string()
            };
            (name.to_string(), value)
        })
        .collect()
}

/// Sanitised copy of a response header map
///
/// Repeated headers are joined with `", "`; values that are not valid UTF-8
/// are converted lossily.
pub fn sanitize_header_map(headers: &HeaderMap) -> HeaderPairs {
    let mut pairs = HeaderPairs::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        pairs
            .entry(name.as_str().to_string())
            .and_modify(|existing: &mut String| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.to_string());
    }
    sanitize_headers(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
}

/// Serialize sanitised headers as a JSON object string
pub fn headers_json(headers: &HeaderPairs) -> String {
    serde_json::to_string(headers).unwrap_or_else(|_| "{}".to_string())
}
