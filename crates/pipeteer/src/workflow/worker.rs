//! Workflow worker loop: the replay engine itself
//!
//! Each poll cycle claims a batch of in-flight instances of one workflow
//! type, rebuilds each instance's resolved step history from its results
//! list, and replays the coordinator against that history. A completion
//! delivers its output to whoever called it and retires the instance; a
//! suspension dispatches whichever sub-calls aren't already outstanding and
//! re-arms the instance for the next poll.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::backend::Backend;
use crate::queue::list::ListQueue;
use crate::queue::routed::{ReplyTo, ResultEnvelope, Routed};
use crate::queue::{Queue, QueueStore};
use crate::workflow::definition::{PipelineRegistry, ReplayOutcome};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Run the replay engine for `pipeline_id` until `shutdown` fires.
///
/// `reserve` bounds how long a claimed instance is hidden from other
/// workers of the same type while this one replays it; it should comfortably
/// exceed one replay pass, since replaying a coordinator does no I/O of its
/// own and is expected to be fast.
#[tracing::instrument(skip(registry, backend, shutdown), fields(pipeline_id))]
pub async fn run_workflow_worker<S: QueueStore>(
    pipeline_id: &'static str,
    registry: Arc<PipelineRegistry>,
    backend: Backend<S>,
    reserve: Duration,
    mut shutdown: Option<watch::Receiver<bool>>,
) {
    let input: Queue<S, Routed<Value>> = backend.queue(format!("{pipeline_id}-in"));
    let results: ListQueue<S, ResultEnvelope> = backend.list_queue(format!("{pipeline_id}-results"));
    let own_results_path = results.path().flattened();

    loop {
        if let Some(rx) = &shutdown {
            if *rx.borrow() {
                info!(pipeline_id, "workflow worker shutting down");
                return;
            }
        }

        let batch = match input.items(Some(reserve), None).await {
            Ok(batch) => batch,
            Err(e) => {
                error!(pipeline_id, error = %e, "failed to claim workflow instances");
                sleep_or_shutdown(&mut shutdown).await;
                continue;
            }
        };

        if batch.is_empty() {
            sleep_or_shutdown(&mut shutdown).await;
            continue;
        }

        for (instance_id, routed) in batch {
            if let Err(e) = replay_one(
                pipeline_id,
                &registry,
                &backend,
                &input,
                &results,
                &own_results_path,
                &instance_id,
                routed,
            )
            .await
            {
                error!(pipeline_id, instance = instance_id, error = %e, "replay failed, leaving reserved to retry");
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn replay_one<S: QueueStore>(
    pipeline_id: &'static str,
    registry: &PipelineRegistry,
    backend: &Backend<S>,
    input: &Queue<S, Routed<Value>>,
    results: &ListQueue<S, ResultEnvelope>,
    own_results_path: &str,
    instance_id: &str,
    routed: Routed<Value>,
) -> Result<(), crate::error::Error> {
    let states: BTreeMap<usize, Value> =
        results.read(instance_id).await.unwrap_or_default().into_iter().collect();

    let outcome = match registry.replay(pipeline_id, routed.value.clone(), states) {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(pipeline_id, instance = instance_id, error = %e, "pipeline replay error");
            return Ok(());
        }
    };

    match outcome {
        ReplayOutcome::Completed(output) => {
            debug!(pipeline_id, instance = instance_id, "workflow instance completed");
            let reply_list: ListQueue<S, ResultEnvelope> =
                ListQueue::new(input.store(), crate::queue::QueuePath::from(routed.reply.path.as_str()));
            // `results` is a `ListQueue` view of the same path/store `input` uses for
            // its own states; stage its removal through a bare `Queue` view since
            // `Transaction::pop` only needs the path, not the list element type.
            let results_as_queue: Queue<S, ResultEnvelope> =
                Queue::new(results.store(), results.path().clone());
            let mut txn = input.begin();
            txn.append(&reply_list, &routed.reply.key, (routed.step, output))?;
            txn.pop(input, instance_id);
            txn.pop(&results_as_queue, instance_id);
            txn.commit().await?;
            info!(pipeline_id, instance = instance_id, "workflow result delivered");
        }
        ReplayOutcome::Suspended(pending) => {
            let mut txn = input.begin();
            for call in pending {
                let target: Queue<S, Routed<Value>> = backend.queue(format!("{}-in", call.pipeline_id));
                let key = format!("{instance_id}:{}", call.step);
                if !target.has(&key).await? {
                    let sub_routed = Routed {
                        reply: ReplyTo { path: own_results_path.to_string(), key: instance_id.to_string() },
                        step: call.step,
                        value: call.input,
                    };
                    txn.push(&target, &key, sub_routed)?;
                    debug!(pipeline_id, instance = instance_id, sub_pipeline = call.pipeline_id, step = call.step, "dispatched sub-call");
                }
            }
            // Re-arm in the same commit: a `push` clears the reservation
            // this cycle took, so the next poll can pick the instance up
            // again without waiting out the lease.
            txn.push(input, instance_id, routed)?;
            txn.commit().await?;
        }
    }
    Ok(())
}

async fn sleep_or_shutdown(shutdown: &mut Option<watch::Receiver<bool>>) {
    if let Some(rx) = shutdown.as_mut() {
        tokio::select! {
            _ = tokio::time::sleep(DEFAULT_POLL_INTERVAL) => {}
            _ = rx.changed() => {}
        }
    } else {
        tokio::time::sleep(DEFAULT_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::memory::InMemoryStore;
    use crate::workflow::context::{Suspended, WkfContext};
    use crate::workflow::definition::Workflow;

    struct Double;

    impl Workflow for Double {
        const TYPE: &'static str = "double";
        type Input = i64;
        type Output = i64;

        fn run(input: i64, _ctx: &mut WkfContext) -> Result<i64, Suspended> {
            Ok(input * 2)
        }
    }

    struct ChainsTwoCalls;

    impl Workflow for ChainsTwoCalls {
        const TYPE: &'static str = "chains_two";
        type Input = i64;
        type Output = i64;

        fn run(input: i64, ctx: &mut WkfContext) -> Result<i64, Suspended> {
            let a: i64 = ctx.call("double", input)?;
            let b: i64 = ctx.call("double", a)?;
            Ok(b)
        }
    }

    #[tokio::test]
    async fn leaf_workflow_with_no_sub_calls_delivers_its_reply_directly() {
        let backend = Backend::new(InMemoryStore::new());
        let mut registry = PipelineRegistry::new();
        registry.register::<Double>();
        let registry = Arc::new(registry);

        let input: Queue<InMemoryStore, Routed<Value>> = backend.queue("double-in");
        let caller_results: ListQueue<InMemoryStore, ResultEnvelope> = backend.list_queue("caller-results");

        input
            .push(
                "inst-1",
                Routed {
                    reply: ReplyTo { path: caller_results.path().flattened(), key: "caller-1".to_string() },
                    step: 0,
                    value: serde_json::json!(21),
                },
            )
            .await
            .unwrap();

        let (tx, rx) = watch::channel(false);
        let worker = tokio::spawn(run_workflow_worker(
            "double",
            registry,
            backend.clone(),
            Duration::from_secs(30),
            Some(rx),
        ));

        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if caller_results.has("caller-1").await.unwrap() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("reply delivered");

        let delivered = caller_results.read("caller-1").await.unwrap();
        assert_eq!(delivered, vec![(0usize, serde_json::json!(42))]);
        assert!(!input.has("inst-1").await.unwrap());

        tx.send(true).unwrap();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn workflow_with_sub_calls_dispatches_them_and_completes_once_they_resolve() {
        let backend = Backend::new(InMemoryStore::new());
        let mut registry = PipelineRegistry::new();
        registry.register::<ChainsTwoCalls>();
        let registry = Arc::new(registry);

        let input: Queue<InMemoryStore, Routed<Value>> = backend.queue("chains_two-in");
        let caller_results: ListQueue<InMemoryStore, ResultEnvelope> = backend.list_queue("caller-results");

        input
            .push(
                "inst-1",
                Routed {
                    reply: ReplyTo { path: caller_results.path().flattened(), key: "caller-1".to_string() },
                    step: 0,
                    value: serde_json::json!(5),
                },
            )
            .await
            .unwrap();

        let (tx, rx) = watch::channel(false);
        let worker = tokio::spawn(run_workflow_worker(
            "chains_two",
            registry,
            backend.clone(),
            Duration::from_millis(200),
            Some(rx),
        ));

        let double_in: Queue<InMemoryStore, Routed<i64>> = backend.queue("double-in");
        let double_results: ListQueue<InMemoryStore, ResultEnvelope> = backend.list_queue("chains_two-results");

        // First sub-call ("double" of 5) appears.
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if double_in.has("inst-1:0").await.unwrap() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("first sub-call dispatched");

        double_results.append("inst-1", (0usize, serde_json::json!(10))).await.unwrap();
        double_in.pop("inst-1:0").await.unwrap();

        // Second sub-call ("double" of 10) appears once the first resolves.
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if double_in.has("inst-1:1").await.unwrap() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("second sub-call dispatched");

        double_results.append("inst-1", (1usize, serde_json::json!(20))).await.unwrap();
        double_in.pop("inst-1:1").await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if caller_results.has("caller-1").await.unwrap() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("final reply delivered");

        assert_eq!(
            caller_results.read("caller-1").await.unwrap(),
            vec![(0usize, serde_json::json!(20))]
        );
        assert!(!double_results.has("inst-1").await.unwrap());

        tx.send(true).unwrap();
        worker.await.unwrap();
    }
}
