//! Work item discovery
//!
//! Decides which (model, provider) pairs are probed each cycle, and where each
//! provider's inference endpoint lives.
//!
//! - [`Discovery`] - the per-cycle source of [`WorkItem`]s
//! - [`ModelsApiDiscovery`] - the Hub models listing implementation
//! - [`ProviderFilter`] - liveness predicate applied to provider listings
//! - [`EndpointMap`] - provider name to endpoint URL mapping

mod endpoints;
mod models_api;

pub use endpoints::EndpointMap;
pub use models_api::{ModelListing, ModelsApiDiscovery, ModelsListing, ProviderListing};

use crate::error::Result;
use crate::types::WorkItem;
use async_trait::async_trait;

/// Source of work items for a cycle
///
/// Called once per cycle. An empty list is a valid answer; an error aborts
/// the cycle.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Produce this cycle's work items
    async fn fetch_work_items(&self) -> Result<Vec<WorkItem>>;
}

/// Predicate deciding whether a listed provider should be probed
pub trait ProviderFilter: Send + Sync {
    /// Returns true if the provider should be probed
    fn accepts(&self, listing: &ProviderListing) -> bool;
}

impl<F> ProviderFilter for F
where
    F: Fn(&ProviderListing) -> bool + Send + Sync,
{
    fn accepts(&self, listing: &ProviderListing) -> bool {
        self(listing)
    }
}

/// Accepts a provider unless it reports a status other than `live`
///
/// Status fields are optional in the listing; an absent field is treated as live.
#[derive(Clone, Copy, Debug, Default)]
pub struct LiveStatusFilter;

impl ProviderFilter for LiveStatusFilter {
    fn accepts(&self, listing: &ProviderListing) -> bool {
        let is_live = |status: &Option<String>| {
            status
                .as_deref()
                .is_none_or(|s| s.eq_ignore_ascii_case("live"))
        };
        is_live(&listing.provider_status) && is_live(&listing.model_status)
    }
}

/// Accepts every provider
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAll;

impl ProviderFilter for AcceptAll {
    fn accepts(&self, _listing: &ProviderListing) -> bool {
        true
    }
}
