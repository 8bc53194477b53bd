//! Concurrent execution of a cycle's work items

use crate::probe::Probe;
use crate::types::{CallOutcome, WorkItem};
use futures::future::join_all;
use std::sync::Arc;

/// Runs one probe task per work item and gathers the outcomes
///
/// Every task is spawned onto the runtime, so a probe that panics only loses
/// its own outcome. The runner always waits for every task to finish.
#[derive(Clone)]
pub struct FanOutRunner {
    probe: Arc<dyn Probe>,
}

impl FanOutRunner {
    /// Create a runner around a probe
    pub fn new(probe: Arc<dyn Probe>) -> Self {
        Self { probe }
    }

    /// Probe every work item concurrently
    ///
    /// Output order is unspecified. Duplicate items are probed independently.
    pub async fn run(&self, items: Vec<WorkItem>, cycle_timestamp: &str) -> Vec<CallOutcome> {
        let total = items.len();
        let cycle_timestamp: Arc<str> = Arc::from(cycle_timestamp);

        let handles = items.into_iter().map(|item| {
            let probe = Arc::clone(&self.probe);
            let cycle_timestamp = Arc::clone(&cycle_timestamp);
            let model_id = item.model_id.clone();
            let provider = item.provider_name.clone();
            let handle =
                tokio::spawn(async move { probe.probe(&item, &cycle_timestamp).await });
            async move { (model_id, provider, handle.await) }
        });

        let mut outcomes = Vec::with_capacity(total);
        let mut skipped = 0usize;
        let mut panicked = 0usize;

        for (model_id, provider, joined) in join_all(handles).await {
            match joined {
                Ok(Some(outcome)) => outcomes.push(outcome),
                Ok(None) => skipped += 1,
                Err(e) => {
                    panicked += 1;
                    tracing::error!(
                        model_id = %model_id,
                        provider = %provider,
                        error = %e,
                        "Probe task failed unexpectedly"
                    );
                }
            }
        }

        tracing::info!(
            work_items = total,
            outcomes = outcomes.len(),
            skipped,
            panicked,
            "Fan-out complete"
        );
        outcomes
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn outcome_for(item: &WorkItem, cycle_timestamp: &str) -> CallOutcome {
        CallOutcome {
            cycle_timestamp: cycle_timestamp.to_string(),
            model_id: item.model_id.clone(),
            provider_name: item.provider_name.clone(),
            provider_model_id: item.provider_model_id.clone(),
            request_url: format!("https://{}.example/v1", item.provider_name),
            request_body: "{}".into(),
            request_headers_sanitized: "{}".into(),
            request_start: cycle_timestamp.to_string(),
            response_end: cycle_timestamp.to_string(),
            duration_ms: 5,
            response_status_code: 200,
            response_body_raw: "ok".into(),
            response_headers_sanitized: "{}".into(),
            error_message: String::new(),
        }
    }

    /// Panics for one provider, skips another, answers the rest
    struct ScriptedProbe {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Probe for ScriptedProbe {
        async fn probe(&self, item: &WorkItem, cycle_timestamp: &str) -> Option<CallOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match item.provider_name.as_str() {
                "exploding" => panic!("probe blew up"),
                "unmapped" => None,
                _ => {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Some(outcome_for(item, cycle_timestamp))
                }
            }
        }
    }

    fn runner() -> (FanOutRunner, Arc<ScriptedProbe>) {
        let probe = Arc::new(ScriptedProbe {
            calls: AtomicUsize::new(0),
        });
        (FanOutRunner::new(probe.clone()), probe)
    }

    #[tokio::test]
    async fn panicking_probe_loses_only_its_own_outcome() {
        let (runner, probe) = runner();
        let items = vec![
            WorkItem::new("m1", "together", "m1"),
            WorkItem::new("m2", "exploding", "m2"),
            WorkItem::new("m3", "nebius", "m3"),
            WorkItem::new("m4", "fireworks-ai", "m4"),
        ];

        let outcomes = runner.run(items, "2024-05-01T12:00:00.000Z").await;

        assert_eq!(probe.calls.load(Ordering::SeqCst), 4);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| o.provider_name != "exploding"));
        assert!(
            outcomes
                .iter()
                .all(|o| o.cycle_timestamp == "2024-05-01T12:00:00.000Z")
        );
    }

    #[tokio::test]
    async fn skipped_items_produce_no_outcome() {
        let (runner, _) = runner();
        let items = vec![
            WorkItem::new("m1", "together", "m1"),
            WorkItem::new("m1", "unmapped", "m1"),
        ];

        let outcomes = runner.run(items, "ts").await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].provider_name, "together");
    }

    #[tokio::test]
    async fn duplicate_items_are_probed_independently() {
        let (runner, probe) = runner();
        let item = WorkItem::new("m1", "together", "m1");

        let outcomes = runner.run(vec![item.clone(), item], "ts").await;

        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
        assert_eq!(outcomes.len(), 2);
    }

    #[tokio::test]
    async fn empty_input_yields_empty_output() {
        let (runner, probe) = runner();
        assert!(runner.run(Vec::new(), "ts").await.is_empty());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }
}
