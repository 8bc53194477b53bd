//! Discovery backed by the Hub's models listing endpoint.

use super::{AcceptAll, Discovery, LiveStatusFilter, ProviderFilter};
use crate::config::DiscoveryConfig;
use crate::error::{Error, Result};
use crate::types::WorkItem;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Top-level models listing response
#[derive(Clone, Debug, Deserialize)]
pub struct ModelsListing {
    /// Models, in the order the endpoint ranks them
    pub models: Vec<ModelListing>,
}

/// One model in the listing
#[derive(Clone, Debug, Deserialize)]
pub struct ModelListing {
    /// Hub model identifier
    pub id: String,
    /// Providers serving this model
    #[serde(default, rename = "availableInferenceProviders")]
    pub providers: Vec<ProviderListing>,
}

/// One provider entry for a model
///
/// The provider name has been observed under both `provider` and `name`,
/// and the status fields are not always present.
#[derive(Clone, Debug, Deserialize)]
pub struct ProviderListing {
    /// Provider name
    #[serde(alias = "name")]
    pub provider: String,
    /// The provider's own identifier for the model
    #[serde(rename = "providerId")]
    pub provider_id: String,
    /// Provider-level status, e.g. "live"
    #[serde(default, rename = "providerStatus")]
    pub provider_status: Option<String>,
    /// Status of this model on this provider, e.g. "live" or "staging"
    #[serde(default, rename = "modelStatus")]
    pub model_status: Option<String>,
}

/// Fetches trending models and expands them into (model, provider) work items
pub struct ModelsApiDiscovery {
    client: reqwest::Client,
    url: String,
    models_to_fetch: usize,
    filter: Arc<dyn ProviderFilter>,
}

impl ModelsApiDiscovery {
    /// Create a discovery source from configuration
    ///
    /// Uses [`LiveStatusFilter`] when `require_live_providers` is set, otherwise [`AcceptAll`].
    pub fn new(client: reqwest::Client, config: &DiscoveryConfig) -> Self {
        let filter: Arc<dyn ProviderFilter> = if config.require_live_providers {
            Arc::new(LiveStatusFilter)
        } else {
            Arc::new(AcceptAll)
        };
        Self {
            client,
            url: config.models_api_url.clone(),
            models_to_fetch: config.models_to_fetch,
            filter,
        }
    }

    /// Replace the provider liveness predicate
    pub fn with_filter(mut self, filter: Arc<dyn ProviderFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Expand a listing into work items
    ///
    /// Only the first `models_to_fetch` models are considered. Models left with
    /// no accepted provider contribute nothing.
    pub fn work_items_from_listing(&self, listing: ModelsListing) -> Vec<WorkItem> {
        let total = listing.models.len();
        let mut items = Vec::new();
        let mut models_kept = 0usize;

        for model in listing.models.into_iter().take(self.models_to_fetch) {
            let accepted: Vec<&ProviderListing> = model
                .providers
                .iter()
                .filter(|p| self.filter.accepts(p))
                .collect();

            if accepted.is_empty() {
                warn!(model_id = %model.id, "Model has no live providers after filtering");
                continue;
            }

            debug!(
                model_id = %model.id,
                provider_count = accepted.len(),
                "Found live providers for model"
            );
            models_kept += 1;
            items.extend(accepted.into_iter().map(|p| {
                WorkItem::new(model.id.clone(), p.provider.clone(), p.provider_id.clone())
            }));
        }

        info!(
            received = total,
            models = models_kept,
            work_items = items.len(),
            "Expanded models listing into work items"
        );
        items
    }
}

#[async_trait]
impl Discovery for ModelsApiDiscovery {
    async fn fetch_work_items(&self) -> Result<Vec<WorkItem>> {
        info!(url = %self.url, limit = self.models_to_fetch, "Fetching top models");

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::Discovery(format!("failed to fetch models: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Discovery(format!(
                "failed to fetch models: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Discovery(format!("failed to read models response: {e}")))?;
        let listing: ModelsListing = serde_json::from_str(&body).map_err(|e| {
            Error::Discovery(format!("invalid models API response structure: {e}"))
        })?;

        Ok(self.work_items_from_listing(listing))
    }
}
