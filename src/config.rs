//! Configuration types for provider-pulse

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

/// Default source of work items: trending text-generation models with inference providers
pub const DEFAULT_MODELS_API_URL: &str = "https://huggingface.co/models-json?inference_provider=all&pipeline_tag=text-generation&sort=trending&withCount=true";

/// A credential that never shows up in `Debug` output or serialized config
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap a credential
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw credential for building an outbound request
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether no credential was provided
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([MASKED])")
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (default: 2, so at most 3 attempts)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry (default: 1000 ms)
    #[serde(default = "default_initial_delay", with = "duration_ms_serde")]
    pub initial_delay: Duration,

    /// Ceiling for any single backoff delay (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_ms_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// A policy that makes exactly one attempt
    pub fn single_attempt() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// Cycle cadence
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Time between cycle starts (default: 30 minutes)
    #[serde(default = "default_schedule_interval", with = "duration_serde")]
    pub interval: Duration,

    /// Flush the buffer every N cycles (default: 6)
    #[serde(default = "default_push_interval_cycles")]
    pub push_interval_cycles: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval: default_schedule_interval(),
            push_interval_cycles: default_push_interval_cycles(),
        }
    }
}

/// Per-call probe settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Bearer token sent to inference providers
    #[serde(default, skip_serializing)]
    pub token: Secret,

    /// `max_tokens` value placed in every request body (default: 4096)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Timeout for a single HTTP attempt (default: 120 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// JSON file mapping lowercase provider names to endpoint URLs
    #[serde(default = "default_endpoint_mapping_path")]
    pub endpoint_mapping_path: PathBuf,

    /// Retry policy for each provider call
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            token: Secret::default(),
            max_tokens: default_max_tokens(),
            request_timeout: default_request_timeout(),
            endpoint_mapping_path: default_endpoint_mapping_path(),
            retry: RetryConfig::default(),
        }
    }
}

/// Work item discovery settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Models listing endpoint
    #[serde(default = "default_models_api_url")]
    pub models_api_url: String,

    /// Number of models probed per cycle (default: 5)
    #[serde(default = "default_models_to_fetch")]
    pub models_to_fetch: usize,

    /// Drop providers whose reported status is not `live` (default: true)
    #[serde(default = "default_true")]
    pub require_live_providers: bool,

    /// Timeout for the models listing request (default: 30 seconds)
    #[serde(default = "default_discovery_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            models_api_url: default_models_api_url(),
            models_to_fetch: default_models_to_fetch(),
            require_live_providers: true,
            request_timeout: default_discovery_timeout(),
        }
    }
}

/// Local buffer settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Path of the CSV buffer file (default: "./metrics_buffer.csv")
    #[serde(default = "default_buffer_path")]
    pub path: PathBuf,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            path: default_buffer_path(),
        }
    }
}

/// Remote sink (Hugging Face Hub dataset) settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HubConfig {
    /// Token authorised to commit to the dataset
    #[serde(default, skip_serializing)]
    pub token: Secret,

    /// Hub base URL (default: "https://huggingface.co")
    #[serde(default = "default_hub_endpoint")]
    pub endpoint: String,

    /// Dataset repository, e.g. "org/provider-latency"
    #[serde(default)]
    pub repo_id: String,

    /// File name the buffer is committed as (default: "metrics.csv")
    #[serde(default = "default_target_filename")]
    pub target_filename: String,

    /// Timeout for one commit request (default: 120 seconds)
    #[serde(default = "default_hub_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Retry policy wrapped around each upload (default: single attempt)
    #[serde(default = "RetryConfig::single_attempt")]
    pub retry: RetryConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            token: Secret::default(),
            endpoint: default_hub_endpoint(),
            repo_id: String::new(),
            target_filename: default_target_filename(),
            request_timeout: default_hub_timeout(),
            retry: RetryConfig::single_attempt(),
        }
    }
}

/// Main configuration
///
/// Grouped into sub-configs, one per component:
/// - [`schedule`](ScheduleConfig): poll interval and flush cadence
/// - [`probe`](ProbeConfig): provider call settings
/// - [`discovery`](DiscoveryConfig): which models are probed
/// - [`buffer`](BufferConfig): local staging file
/// - [`hub`](HubConfig): remote dataset
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Cycle cadence
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Provider call settings
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Work item discovery settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Local buffer settings
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Remote sink settings
    #[serde(default)]
    pub hub: HubConfig,

    /// Default log filter when `RUST_LOG` is unset (default: "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schedule: ScheduleConfig::default(),
            probe: ProbeConfig::default(),
            discovery: DiscoveryConfig::default(),
            buffer: BufferConfig::default(),
            hub: HubConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    ///
    /// A `.env` file in the working directory is loaded first if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// `HF_TOKEN`, `HF_HUB_TOKEN` and `HF_DATASET_REPO_ID` are required; every
    /// other variable falls back to its default. The result is validated.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let config = Config {
            schedule: ScheduleConfig {
                interval: Duration::from_secs(parse_or(
                    &lookup,
                    "SCHEDULE_INTERVAL_SECONDS",
                    defaults.schedule.interval.as_secs(),
                )?),
                push_interval_cycles: parse_or(
                    &lookup,
                    "PUSH_INTERVAL_CYCLES",
                    defaults.schedule.push_interval_cycles,
                )?,
            },
            probe: ProbeConfig {
                token: Secret::new(required(&lookup, "HF_TOKEN")?),
                max_tokens: parse_or(&lookup, "MAX_TOKENS_DEFAULT", defaults.probe.max_tokens)?,
                request_timeout: Duration::from_secs(parse_or(
                    &lookup,
                    "REQUEST_TIMEOUT_SECONDS",
                    defaults.probe.request_timeout.as_secs(),
                )?),
                endpoint_mapping_path: lookup("PROVIDER_ENDPOINT_MAPPING_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.probe.endpoint_mapping_path),
                retry: defaults.probe.retry,
            },
            discovery: DiscoveryConfig {
                models_api_url: lookup("MODELS_API_URL")
                    .unwrap_or(defaults.discovery.models_api_url),
                models_to_fetch: parse_or(
                    &lookup,
                    "MODELS_TO_FETCH",
                    defaults.discovery.models_to_fetch,
                )?,
                require_live_providers: parse_bool_or(
                    &lookup,
                    "REQUIRE_LIVE_PROVIDERS",
                    defaults.discovery.require_live_providers,
                )?,
                request_timeout: Duration::from_secs(parse_or(
                    &lookup,
                    "DISCOVERY_TIMEOUT_SECONDS",
                    defaults.discovery.request_timeout.as_secs(),
                )?),
            },
            buffer: BufferConfig {
                path: lookup("LOCAL_CSV_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.buffer.path),
            },
            hub: HubConfig {
                token: Secret::new(required(&lookup, "HF_HUB_TOKEN")?),
                endpoint: lookup("HF_HUB_ENDPOINT").unwrap_or(defaults.hub.endpoint),
                repo_id: required(&lookup, "HF_DATASET_REPO_ID")?,
                target_filename: lookup("HF_DATASET_TARGET_FILENAME")
                    .unwrap_or(defaults.hub.target_filename),
                request_timeout: Duration::from_secs(parse_or(
                    &lookup,
                    "HUB_TIMEOUT_SECONDS",
                    defaults.hub.request_timeout.as_secs(),
                )?),
                retry: defaults.hub.retry,
            },
            log_level: lookup("LOG_LEVEL")
                .map(|level| level.to_lowercase())
                .unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the orchestrator relies on
    pub fn validate(&self) -> Result<()> {
        if self.schedule.interval.is_zero() {
            return Err(Error::config(
                "SCHEDULE_INTERVAL_SECONDS",
                "SCHEDULE_INTERVAL_SECONDS must be positive",
            ));
        }
        if self.schedule.push_interval_cycles == 0 {
            return Err(Error::config(
                "PUSH_INTERVAL_CYCLES",
                "PUSH_INTERVAL_CYCLES must be positive",
            ));
        }
        if self.discovery.models_to_fetch == 0 {
            return Err(Error::config(
                "MODELS_TO_FETCH",
                "MODELS_TO_FETCH must be positive",
            ));
        }
        if self.hub.repo_id.trim().is_empty() {
            return Err(Error::config(
                "HF_DATASET_REPO_ID",
                "HF_DATASET_REPO_ID must not be empty",
            ));
        }
        if self.probe.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "probe.retry.backoff_multiplier",
                "backoff multiplier must be at least 1.0",
            ));
        }
        Ok(())
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).ok_or_else(|| {
        Error::config(key, format!("missing required environment variable: {key}"))
    })
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            Error::config(
                key,
                format!("invalid integer value for environment variable {key}: {raw}"),
            )
        }),
        None => Ok(default),
    }
}

fn parse_bool_or<F>(lookup: &F, key: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|raw| raw.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(raw) => match raw.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(Error::config(
                key,
                format!("invalid boolean value for environment variable {key}: {raw}"),
            )),
        },
    }
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    2
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_schedule_interval() -> Duration {
    Duration::from_secs(1800)
}

fn default_push_interval_cycles() -> u64 {
    6
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_discovery_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_hub_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_endpoint_mapping_path() -> PathBuf {
    PathBuf::from("./provider_mapping.json")
}

fn default_models_api_url() -> String {
    DEFAULT_MODELS_API_URL.to_string()
}

fn default_models_to_fetch() -> usize {
    5
}

fn default_buffer_path() -> PathBuf {
    PathBuf::from("./metrics_buffer.csv")
}

fn default_hub_endpoint() -> String {
    "https://huggingface.co".to_string()
}

fn default_target_filename() -> String {
    "metrics.csv".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds, for backoff delays)
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
