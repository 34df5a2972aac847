//! Activity worker loop
//!
//! Pops one input, executes the activity, and atomically pushes the result
//! while popping the input — the same claim/execute/complete shape as the
//! teacher's `WorkerPool`, minus heartbeat and cancellation machinery the
//! queue model here has no place for (there is only the reservation
//! lease). A failed execution simply returns without committing anything:
//! the input stays reserved until the lease expires, then `wait_any` serves
//! it to whichever worker polls next. At-least-once, never deduplicated.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::activity::definition::Activity;
use crate::error::Error;
use crate::queue::list::ListQueue;
use crate::queue::routed::{ResultEnvelope, Routed};
use crate::queue::{Queue, QueuePath, QueueStore};

/// Run `activity` against `input`, pushing results to `output`, until
/// `shutdown` fires (or forever, if `None`).
///
/// `reserve` is the lease duration applied when an input is claimed; it
/// should comfortably exceed the activity's expected execution time, since
/// a lease expiring mid-execution causes a duplicate concurrent attempt.
#[tracing::instrument(skip(activity, input, output, shutdown), fields(activity_type = A::TYPE))]
pub async fn run_activity_worker<A, S>(
    activity: A,
    input: Queue<S, A::Input>,
    output: Queue<S, A::Output>,
    reserve: Duration,
    mut shutdown: Option<watch::Receiver<bool>>,
) where
    A: Activity,
    S: QueueStore,
{
    loop {
        if let Some(rx) = &shutdown {
            if *rx.borrow() {
                info!("activity worker shutting down");
                return;
            }
        }

        let (key, value) = match wait_for_item(&input, reserve, &mut shutdown).await {
            Some(item) => item,
            None => return,
        };

        debug!(key, "claimed activity input");
        match activity.execute(value).await {
            Ok(result) => {
                let mut txn = input.begin();
                if let Err(e) = txn.push(&output, &key, result) {
                    error!(key, error = %e, "failed to encode activity result");
                    continue;
                }
                txn.pop(&input, &key);
                match txn.commit().await {
                    Ok(()) => info!(key, "activity completed"),
                    Err(e) => error!(key, error = %e, "failed to commit activity result"),
                }
            }
            Err(e) => {
                warn!(key, error = %e, "activity failed, leaving reserved to retry");
            }
        }
    }
}

/// Run `activity` as a workflow sub-pipeline: input arrives wrapped in
/// [`Routed`] and the result is delivered by appending `(step, output)` onto
/// whichever results [`ListQueue`] the caller named in `reply`, rather than
/// onto a fixed output queue known at construction time.
#[tracing::instrument(skip(activity, input, shutdown), fields(activity_type = A::TYPE))]
pub async fn run_routed_activity_worker<A, S>(
    activity: A,
    input: Queue<S, Routed<A::Input>>,
    reserve: Duration,
    mut shutdown: Option<watch::Receiver<bool>>,
) where
    A: Activity,
    S: QueueStore,
{
    loop {
        if let Some(rx) = &shutdown {
            if *rx.borrow() {
                info!("routed activity worker shutting down");
                return;
            }
        }

        let (key, routed) = match wait_for_item(&input, reserve, &mut shutdown).await {
            Some(item) => item,
            None => return,
        };
        let Routed { reply, step, value } = routed;

        debug!(key, step, "claimed routed activity input");
        match activity.execute(value).await {
            Ok(result) => {
                let replies: ListQueue<S, ResultEnvelope> =
                    ListQueue::new(input.store(), QueuePath::from(reply.path.as_str()));
                let result = match serde_json::to_value(result) {
                    Ok(v) => v,
                    Err(e) => {
                        error!(key, error = %e, "failed to encode routed activity result");
                        continue;
                    }
                };

                let mut txn = input.begin();
                if let Err(e) = txn.append(&replies, &reply.key, (step, result)) {
                    error!(key, error = %e, "failed to stage routed activity reply");
                    continue;
                }
                txn.pop(&input, &key);
                match txn.commit().await {
                    Ok(()) => info!(key, step, "routed activity completed"),
                    Err(e) => error!(key, error = %e, "failed to commit routed activity reply"),
                }
            }
            Err(e) => {
                warn!(key, error = %e, "routed activity failed, leaving reserved to retry");
            }
        }
    }
}

async fn wait_for_item<S, T>(
    queue: &Queue<S, T>,
    reserve: Duration,
    shutdown: &mut Option<watch::Receiver<bool>>,
) -> Option<(String, T)>
where
    S: QueueStore,
    T: serde::Serialize + serde::de::DeserializeOwned + Send + Sync,
{
    loop {
        match queue.read_any(Some(reserve)).await {
            Ok(item) => return Some(item),
            Err(Error::InexistentItem(_)) => {
                if let Some(rx) = shutdown.as_mut() {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                        _ = rx.changed() => {
                            if *rx.borrow() {
                                return None;
                            }
                        }
                    }
                } else {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
            Err(e) => {
                error!(error = %e, "activity worker poll failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::definition::ActivityError;
    use crate::backend::Backend;
    use crate::queue::memory::InMemoryStore;
    use async_trait::async_trait;

    struct Double;

    #[async_trait]
    impl Activity for Double {
        const TYPE: &'static str = "double";
        type Input = i64;
        type Output = i64;

        async fn execute(&self, input: i64) -> Result<i64, ActivityError> {
            Ok(input * 2)
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl Activity for AlwaysFails {
        const TYPE: &'static str = "fails";
        type Input = i64;
        type Output = i64;

        async fn execute(&self, _input: i64) -> Result<i64, ActivityError> {
            Err(ActivityError::new("boom"))
        }
    }

    #[tokio::test]
    async fn successful_execution_pushes_result_and_pops_input() {
        let backend = Backend::new(InMemoryStore::new());
        let input: Queue<InMemoryStore, i64> = backend.queue("double-in");
        let output: Queue<InMemoryStore, i64> = backend.queue("double-out");
        input.push("a", 21).await.unwrap();

        let (tx, rx) = watch::channel(false);
        let worker = tokio::spawn(run_activity_worker(
            Double,
            input.clone(),
            output.clone(),
            Duration::from_secs(30),
            Some(rx),
        ));

        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if output.has("a").await.unwrap() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("activity result appeared");

        assert_eq!(output.read("a", None).await.unwrap(), 42);
        assert!(!input.has("a").await.unwrap());

        tx.send(true).unwrap();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn failure_leaves_input_reserved_for_retry() {
        let backend = Backend::new(InMemoryStore::new());
        let input: Queue<InMemoryStore, i64> = backend.queue("fails-in");
        let output: Queue<InMemoryStore, i64> = backend.queue("fails-out");
        input.push("a", 1).await.unwrap();

        let (tx, rx) = watch::channel(false);
        let worker = tokio::spawn(run_activity_worker(
            AlwaysFails,
            input.clone(),
            output.clone(),
            Duration::from_millis(50),
            Some(rx),
        ));

        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(true).unwrap();
        worker.await.unwrap();

        // The item is still there (never popped) and was re-claimed at
        // least once after its lease expired.
        assert!(input.has("a").await.unwrap());
        assert!(!output.has("a").await.unwrap());
    }
}
