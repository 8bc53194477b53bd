//! End-to-end cycle tests
//!
//! Every collaborator is real except the network: the models API, provider
//! endpoints and the Hub commit API are served by wiremock, and the buffer
//! lives in a temporary directory.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{
    StatusSequence, buffer_rows, fast_retry, models_listing, mount_models, test_config,
};
use provider_pulse::{BufferStore, CycleRun, build_orchestrator};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COMMIT_PATH: &str = "/api/datasets/acme/provider-latency/commit/main";

#[tokio::test]
async fn mapped_provider_is_recorded_and_unmapped_is_skipped() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_models(
        &server,
        models_listing(
            "meta-llama/Llama-3.3-70B-Instruct",
            &[
                ("provider-a", "llama-3.3-70b-a"),
                ("provider-b", "llama-3.3-70b-b"),
            ],
        ),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/provider-a/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"choices":[{"message":{"content":"553.5"}}]}"#))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config(
        dir.path(),
        &server,
        serde_json::json!({
            "provider-a": format!("{}/provider-a/v1/chat/completions", server.uri())
        }),
        6,
    );
    config.probe.retry = fast_retry();
    let orchestrator = build_orchestrator(&config).unwrap();
    let buffer = BufferStore::new(config.buffer.path.clone());

    let CycleRun::Completed(report) = orchestrator.run_cycle().await else {
        panic!("cycle should complete");
    };

    assert_eq!(report.work_items, 2);
    assert_eq!(report.outcomes, 1);
    assert_eq!(report.flushed, None);

    let rows = buffer_rows(&buffer.read_all().await.unwrap());
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row["provider_name"], "provider-a");
    assert_eq!(row["provider_model_id"], "llama-3.3-70b-a");
    assert_eq!(row["response_status_code"], "200");
    assert_eq!(row["error_message"], "");
    assert_eq!(row["cycle_timestamp_iso"], report.cycle_timestamp);
    assert_eq!(
        row["request_headers_sanitized"],
        r#"{"Authorization":"Bearer [MASKED]","Content-Type":"application/json"}"#
    );
    assert!(row["response_body_raw"].contains("553.5"));
}

#[tokio::test]
async fn server_errors_are_retried_with_doubling_backoff() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_models(
        &server,
        models_listing("Qwen/Qwen2.5-72B-Instruct", &[("flaky", "qwen-72b")]),
    )
    .await;
    let responder = StatusSequence::new(&[503, 503, 200]);
    Mock::given(method("POST"))
        .and(path("/flaky/v1/chat/completions"))
        .respond_with(responder.clone())
        .mount(&server)
        .await;

    // Production retry policy: 2 retries starting at one second
    let config = test_config(
        dir.path(),
        &server,
        serde_json::json!({
            "flaky": format!("{}/flaky/v1/chat/completions", server.uri())
        }),
        6,
    );
    let orchestrator = build_orchestrator(&config).unwrap();
    let buffer = BufferStore::new(config.buffer.path.clone());

    let run = orchestrator.run_cycle().await;
    assert!(matches!(run, CycleRun::Completed(_)), "got {run:?}");

    let hits = responder.hits();
    assert_eq!(hits.len(), 3, "initial attempt plus two retries");
    let first_gap = hits[1].duration_since(hits[0]);
    let second_gap = hits[2].duration_since(hits[1]);
    assert!(
        first_gap >= Duration::from_millis(950) && first_gap < Duration::from_millis(1600),
        "first backoff ~1000ms, was {first_gap:?}"
    );
    assert!(
        second_gap >= Duration::from_millis(1950) && second_gap < Duration::from_millis(2800),
        "second backoff ~2000ms, was {second_gap:?}"
    );

    let rows = buffer_rows(&buffer.read_all().await.unwrap());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["response_status_code"], "200");
    assert_eq!(rows[0]["error_message"], "");
    let duration_ms: i64 = rows[0]["duration_ms"].parse().unwrap();
    assert!(duration_ms >= 2900, "duration spans all attempts, was {duration_ms}");
}

#[tokio::test]
async fn failing_provider_is_recorded_with_error_details() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_models(
        &server,
        models_listing(
            "deepseek-ai/DeepSeek-R1",
            &[("healthy", "r1-healthy"), ("forbidden", "r1-forbidden")],
        ),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/healthy"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/forbidden"))
        .respond_with(ResponseTemplate::new(403).set_body_string(r#"{"error":"no access"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config(
        dir.path(),
        &server,
        serde_json::json!({
            "healthy": format!("{}/healthy", server.uri()),
            "forbidden": format!("{}/forbidden", server.uri())
        }),
        6,
    );
    config.probe.retry = fast_retry();
    let orchestrator = build_orchestrator(&config).unwrap();
    let buffer = BufferStore::new(config.buffer.path.clone());

    orchestrator.run_cycle().await;

    let rows = buffer_rows(&buffer.read_all().await.unwrap());
    assert_eq!(rows.len(), 2);
    let forbidden = rows
        .iter()
        .find(|r| r["provider_name"] == "forbidden")
        .unwrap();
    assert_eq!(forbidden["response_status_code"], "403");
    assert_eq!(forbidden["error_message"], "HTTP error 403: Forbidden");
    assert_eq!(forbidden["response_body_raw"], r#"{"error":"no access"}"#);
    assert!(rows.iter().any(|r| r["provider_name"] == "healthy" && r["error_message"].is_empty()));
}

#[tokio::test]
async fn flush_cycle_commits_buffer_and_clears_it() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_models(&server, models_listing("m", &[("p", "m-on-p")])).await;
    Mock::given(method("POST"))
        .and(path("/p"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMMIT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "commitUrl": "https://huggingface.co/datasets/acme/provider-latency/commit/1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config(
        dir.path(),
        &server,
        serde_json::json!({ "p": format!("{}/p", server.uri()) }),
        2,
    );
    config.probe.retry = fast_retry();
    let orchestrator = build_orchestrator(&config).unwrap();
    let buffer = BufferStore::new(config.buffer.path.clone());

    let CycleRun::Completed(first) = orchestrator.run_cycle().await else {
        panic!("first cycle should complete");
    };
    assert_eq!(first.flushed, None);
    assert_eq!(buffer_rows(&buffer.read_all().await.unwrap()).len(), 1);

    let CycleRun::Completed(second) = orchestrator.run_cycle().await else {
        panic!("second cycle should complete");
    };
    assert_eq!(second.flushed, Some(true));
    assert!(buffer.read_all().await.is_none(), "buffer is header-only after commit");
}

#[tokio::test]
async fn rejected_commit_leaves_buffer_untouched() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_models(&server, models_listing("m", &[("p", "m-on-p")])).await;
    Mock::given(method("POST"))
        .and(path("/p"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMMIT_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;

    let mut config = test_config(
        dir.path(),
        &server,
        serde_json::json!({ "p": format!("{}/p", server.uri()) }),
        1,
    );
    config.probe.retry = fast_retry();
    let orchestrator = build_orchestrator(&config).unwrap();

    let CycleRun::Completed(report) = orchestrator.run_cycle().await else {
        panic!("a rejected upload does not fail the cycle");
    };
    assert_eq!(report.flushed, Some(false));

    let before = tokio::fs::read(&config.buffer.path).await.unwrap();
    orchestrator.shutdown().await;
    let after = tokio::fs::read(&config.buffer.path).await.unwrap();
    assert_eq!(before, after);
    assert_eq!(buffer_rows(&String::from_utf8(after).unwrap()).len(), 1);
}

#[tokio::test]
async fn models_api_outage_fails_cycle_but_not_the_next_one() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path(common::MODELS_PATH))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_models(&server, models_listing("m", &[("p", "m-on-p")])).await;
    Mock::given(method("POST"))
        .and(path("/p"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    let mut config = test_config(
        dir.path(),
        &server,
        serde_json::json!({ "p": format!("{}/p", server.uri()) }),
        6,
    );
    config.probe.retry = fast_retry();
    let orchestrator = build_orchestrator(&config).unwrap();

    assert!(matches!(orchestrator.run_cycle().await, CycleRun::Failed { .. }));
    assert!(matches!(orchestrator.run_cycle().await, CycleRun::Completed(_)));
    assert_eq!(orchestrator.state().cycles_started(), 2);
}

#[tokio::test]
async fn stalled_models_api_times_out_and_frees_the_next_tick() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path(common::MODELS_PATH))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3600)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_models(&server, models_listing("m", &[("p", "m-on-p")])).await;
    Mock::given(method("POST"))
        .and(path("/p"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    let mut config = test_config(
        dir.path(),
        &server,
        serde_json::json!({ "p": format!("{}/p", server.uri()) }),
        6,
    );
    config.probe.retry = fast_retry();
    config.discovery.request_timeout = Duration::from_millis(300);
    let orchestrator = build_orchestrator(&config).unwrap();

    let first = tokio::time::timeout(Duration::from_secs(10), orchestrator.run_cycle())
        .await
        .expect("stalled discovery must not hold the cycle open");
    assert!(matches!(first, CycleRun::Failed { .. }), "got {first:?}");
    assert!(!orchestrator.state().is_running());

    let next = orchestrator.run_cycle().await;
    assert!(matches!(next, CycleRun::Completed(_)), "got {next:?}");
    assert_eq!(orchestrator.state().cycles_started(), 2);
}

#[tokio::test]
async fn stalled_commit_times_out_and_keeps_the_buffer() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_models(&server, models_listing("m", &[("p", "m-on-p")])).await;
    Mock::given(method("POST"))
        .and(path("/p"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMMIT_PATH))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3600)))
        .mount(&server)
        .await;

    let mut config = test_config(
        dir.path(),
        &server,
        serde_json::json!({ "p": format!("{}/p", server.uri()) }),
        1,
    );
    config.probe.retry = fast_retry();
    config.hub.request_timeout = Duration::from_millis(300);
    let orchestrator = build_orchestrator(&config).unwrap();
    let buffer = BufferStore::new(config.buffer.path.clone());

    let run = tokio::time::timeout(Duration::from_secs(10), orchestrator.run_cycle())
        .await
        .expect("stalled upload must not hold the cycle open");
    let CycleRun::Completed(report) = run else {
        panic!("a timed-out upload does not fail the cycle, got {run:?}");
    };
    assert_eq!(report.flushed, Some(false));
    assert!(!orchestrator.state().is_running());
    assert_eq!(buffer_rows(&buffer.read_all().await.unwrap()).len(), 1);
}
