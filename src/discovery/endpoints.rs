//! Provider name to inference endpoint mapping

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Maps lowercase provider names to the URL each provider is probed at
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EndpointMap {
    endpoints: HashMap<String, String>,
}

impl EndpointMap {
    /// Build a map from (provider, url) pairs; provider names are lowercased
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            endpoints: entries
                .into_iter()
                .map(|(provider, url)| (provider.as_ref().to_lowercase(), url.into()))
                .collect(),
        }
    }

    /// Load the mapping from a JSON object file
    ///
    /// A missing file yields an empty map, so every provider is skipped until
    /// the file exists. Malformed JSON or a non-URL value is a configuration error.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    path = %path.display(),
                    "Provider mapping file not found, using empty mapping"
                );
                return Ok(Self::default());
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let entries: HashMap<String, String> = serde_json::from_str(&raw).map_err(|e| {
            Error::config(
                "PROVIDER_ENDPOINT_MAPPING_PATH",
                format!("invalid provider mapping in {}: {e}", path.display()),
            )
        })?;

        for (provider, endpoint) in &entries {
            url::Url::parse(endpoint).map_err(|e| {
                Error::config(
                    "PROVIDER_ENDPOINT_MAPPING_PATH",
                    format!("invalid endpoint URL for provider '{provider}': {e}"),
                )
            })?;
        }

        let map = Self::new(entries);
        info!(path = %path.display(), providers = map.len(), "Loaded provider endpoint mapping");
        Ok(map)
    }

    /// Endpoint for a provider, matched case-insensitively
    pub fn resolve(&self, provider: &str) -> Option<&str> {
        self.endpoints
            .get(&provider.to_lowercase())
            .map(String::as_str)
    }

    /// Number of mapped providers
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether no provider is mapped
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
