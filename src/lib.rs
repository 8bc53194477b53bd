//! # provider-pulse
//!
//! Periodic latency and availability sampling of hosted inference providers.
//!
//! Every cycle the trending models are fetched, each (model, provider) pair is
//! sent the same small chat completion request, and the timing and response
//! of every call are appended to a local CSV buffer. Every N cycles the buffer
//! is committed to a Hugging Face Hub dataset and cleared.
//!
//! ## Guarantees
//!
//! - **No overlapping cycles** - a tick that arrives while a cycle is running is skipped
//! - **Per-call isolation** - a failing or panicking provider call only loses its own row
//! - **No silent data loss** - the buffer is cleared only after the sink confirms an upload
//!
//! ## Quick Start
//!
//! ```no_run
//! use provider_pulse::{Config, build_orchestrator, run_with_shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let orchestrator = build_orchestrator(&config)?;
//!
//!     // Runs until SIGTERM/SIGINT, then attempts a final upload
//!     run_with_shutdown(orchestrator, config.schedule.interval).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Local CSV buffer
pub mod buffer;
/// Configuration types
pub mod config;
/// Work item discovery and endpoint mapping
pub mod discovery;
/// Error types
pub mod error;
/// Concurrent per-cycle probing
pub mod fan_out;
/// Upload-then-clear buffer flushing
pub mod flush;
/// Cycle scheduling and overlap control
pub mod orchestrator;
/// Provider calls
pub mod probe;
/// Retry logic with exponential backoff
pub mod retry;
/// Remote sink
pub mod sink;
/// Core types
pub mod types;

// Re-export commonly used types
pub use buffer::BufferStore;
pub use config::{Config, RetryConfig};
pub use discovery::{Discovery, EndpointMap, ModelsApiDiscovery, ProviderFilter};
pub use error::{Error, Result};
pub use fan_out::FanOutRunner;
pub use flush::FlushCoordinator;
pub use orchestrator::{CycleOrchestrator, CycleReport, CycleRun, CycleState};
pub use probe::{Probe, ProviderCaller};
pub use sink::{CommitMessage, HubSink, RemoteSink, UploadReceipt};
pub use types::{CallOutcome, CycleId, ProbeResponse, WorkItem};

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How long shutdown waits for an in-flight cycle before the final upload
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Build the production orchestrator from configuration
///
/// Loads the endpoint mapping and creates the HTTP clients. Discovery,
/// provider calls and the sink each get a client with their own timeout, so
/// a request that never gets an answer cannot hold a cycle open.
pub fn build_orchestrator(config: &Config) -> Result<Arc<CycleOrchestrator>> {
    let endpoints = EndpointMap::load(&config.probe.endpoint_mapping_path)?;
    if endpoints.is_empty() {
        tracing::warn!("Provider endpoint mapping is empty; every provider will be skipped");
    }

    let discovery_client = reqwest::Client::builder()
        .timeout(config.discovery.request_timeout)
        .build()?;
    let hub_client = reqwest::Client::builder()
        .timeout(config.hub.request_timeout)
        .build()?;

    let discovery = ModelsApiDiscovery::new(discovery_client, &config.discovery);
    let caller = ProviderCaller::new(&config.probe, endpoints)?;
    let buffer = BufferStore::new(config.buffer.path.clone());
    let sink = HubSink::new(hub_client, &config.hub);
    let flush = FlushCoordinator::new(
        buffer.clone(),
        Arc::new(sink),
        config.hub.target_filename.clone(),
        config.hub.retry.clone(),
    );

    Ok(Arc::new(CycleOrchestrator::new(
        Arc::new(discovery),
        FanOutRunner::new(Arc::new(caller)),
        buffer,
        flush,
        config.schedule.push_interval_cycles,
    )))
}

/// Helper function to run the orchestrator with graceful signal handling.
///
/// Starts the scheduler (first cycle immediately), waits for a termination
/// signal, stops the scheduler and then calls the orchestrator's `shutdown()`
/// method. A cycle that is already running gets up to [`SHUTDOWN_GRACE`] to
/// finish. After that the final upload is skipped and the cycle task is
/// dropped with the runtime at its next await point, which can leave a
/// partially appended row in the buffer.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(
    orchestrator: Arc<CycleOrchestrator>,
    interval: Duration,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let scheduler = tokio::spawn(Arc::clone(&orchestrator).run(interval, cancel.clone()));

    wait_for_signal().await;
    tracing::info!("Shutting down gracefully");

    cancel.cancel();
    if let Err(e) = scheduler.await {
        tracing::error!(error = %e, "Scheduler task ended abnormally");
    }

    if !orchestrator.wait_idle(SHUTDOWN_GRACE).await {
        tracing::warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "Cycle still running after grace period, it will be cut off mid-flight"
        );
    }

    orchestrator.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
