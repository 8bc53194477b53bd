//! Config and mock-server fixtures

use provider_pulse::config::{Config, RetryConfig, Secret};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Path the mock models API is served at
pub const MODELS_PATH: &str = "/models-json";

/// Models listing with one model served by the given (provider, providerId) pairs
pub fn models_listing(model_id: &str, providers: &[(&str, &str)]) -> serde_json::Value {
    let providers: Vec<_> = providers
        .iter()
        .map(|(name, provider_id)| {
            serde_json::json!({
                "provider": name,
                "providerId": provider_id,
                "providerStatus": "live",
                "modelStatus": "live"
            })
        })
        .collect();
    serde_json::json!({
        "models": [{ "id": model_id, "availableInferenceProviders": providers }]
    })
}

/// Serve `listing` from the models API path
pub async fn mount_models(server: &MockServer, listing: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(MODELS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing))
        .mount(server)
        .await;
}

/// Configuration pointing every collaborator at mock servers
///
/// Writes the endpoint mapping into `dir`. Provider retries use the
/// production policy unless the caller overrides `config.probe.retry`.
pub fn test_config(
    dir: &Path,
    server: &MockServer,
    mapping: serde_json::Value,
    push_interval_cycles: u64,
) -> Config {
    let mapping_path = dir.join("provider_mapping.json");
    std::fs::write(&mapping_path, mapping.to_string()).expect("write mapping");

    let mut config = Config::default();
    config.probe.token = Secret::new("hf_test_provider_token");
    config.probe.endpoint_mapping_path = mapping_path;
    config.discovery.models_api_url = format!("{}{MODELS_PATH}", server.uri());
    config.buffer.path = dir.join("metrics_buffer.csv");
    config.hub.token = Secret::new("hf_test_hub_token");
    config.hub.endpoint = server.uri();
    config.hub.repo_id = "acme/provider-latency".to_string();
    config.schedule.push_interval_cycles = push_interval_cycles;
    config
}

/// Fast retry policy for tests that do not measure backoff
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 2,
        initial_delay: std::time::Duration::from_millis(10),
        max_delay: std::time::Duration::from_millis(50),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

/// Responds with each status in turn (repeating the last) and records arrival times
#[derive(Clone)]
pub struct StatusSequence {
    statuses: Vec<u16>,
    hits: Arc<Mutex<Vec<Instant>>>,
}

impl StatusSequence {
    /// Create a responder for the given statuses
    pub fn new(statuses: &[u16]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            hits: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Arrival time of every request so far
    pub fn hits(&self) -> Vec<Instant> {
        self.hits.lock().expect("hits lock").clone()
    }
}

impl Respond for StatusSequence {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let mut hits = self.hits.lock().expect("hits lock");
        hits.push(Instant::now());
        let index = (hits.len() - 1).min(self.statuses.len() - 1);
        let status = self.statuses[index];
        ResponseTemplate::new(status).set_body_string(format!(r#"{{"attempt":{}}}"#, hits.len()))
    }
}
