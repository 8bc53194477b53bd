use provider_pulse::{Config, build_orchestrator, run_with_shutdown};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Configuration errors are reported before logging exists, so they go to stderr
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("provider-pulse: {e}");
            return ExitCode::FAILURE;
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("provider_pulse={}", config.log_level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(
        interval_secs = config.schedule.interval.as_secs(),
        push_interval_cycles = config.schedule.push_interval_cycles,
        models_to_fetch = config.discovery.models_to_fetch,
        buffer = %config.buffer.path.display(),
        repo_id = %config.hub.repo_id,
        "Configuration loaded"
    );

    let orchestrator = match build_orchestrator(&config) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            tracing::error!(error = %e, error_code = e.error_code(), "Failed to start");
            return ExitCode::FAILURE;
        }
    };

    match run_with_shutdown(orchestrator, config.schedule.interval).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Exited with error");
            ExitCode::FAILURE
        }
    }
}
