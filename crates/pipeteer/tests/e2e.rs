//! End-to-end scenarios against the in-memory backend, exercising the full
//! activity + workflow worker stack together rather than one module at a
//! time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;

use pipeteer::activity::{run_routed_activity_worker, Activity, ActivityError};
use pipeteer::backend::Backend;
use pipeteer::queue::list::ListQueue;
use pipeteer::queue::memory::InMemoryStore;
use pipeteer::queue::routed::{ReplyTo, ResultEnvelope, Routed};
use pipeteer::queue::Queue;
use pipeteer::workflow::context::{Suspended, WkfContext};
use pipeteer::workflow::{run_workflow_worker, PipelineRegistry, Workflow};

struct DoubleActivity;

#[async_trait]
impl Activity for DoubleActivity {
    const TYPE: &'static str = "double";
    type Input = i64;
    type Output = i64;

    async fn execute(&self, input: i64) -> Result<i64, ActivityError> {
        Ok(input * 2)
    }
}

struct IncActivity;

#[async_trait]
impl Activity for IncActivity {
    const TYPE: &'static str = "inc";
    type Input = i64;
    type Output = i64;

    async fn execute(&self, input: i64) -> Result<i64, ActivityError> {
        Ok(input + 1)
    }
}

struct LinearWorkflow;

impl Workflow for LinearWorkflow {
    const TYPE: &'static str = "linear";
    type Input = i64;
    type Output = i64;

    fn run(input: i64, ctx: &mut WkfContext) -> Result<i64, Suspended> {
        let doubled: i64 = ctx.call("double", input)?;
        let incremented: i64 = ctx.call("inc", doubled)?;
        Ok(incremented)
    }
}

struct ParallelWorkflow;

impl Workflow for ParallelWorkflow {
    const TYPE: &'static str = "parallel";
    type Input = i64;
    type Output = (i64, i64);

    fn run(input: i64, ctx: &mut WkfContext) -> Result<(i64, i64), Suspended> {
        let results: Vec<i64> = ctx.all(vec![
            ("double", serde_json::json!(input)),
            ("inc", serde_json::json!(input)),
        ])?;
        Ok((results[0], results[1]))
    }
}

fn spawn_routed_activity<A: Activity>(
    backend: &Backend<InMemoryStore>,
    activity: A,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    let input: Queue<InMemoryStore, Routed<A::Input>> = backend.queue(format!("{}-in", A::TYPE));
    tokio::spawn(run_routed_activity_worker(activity, input, Duration::from_secs(30), Some(shutdown)))
}

fn spawn_workflow_worker(
    pipeline_id: &'static str,
    registry: Arc<PipelineRegistry>,
    backend: Backend<InMemoryStore>,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run_workflow_worker(pipeline_id, registry, backend, Duration::from_millis(200), Some(shutdown)))
}

async fn wait_for_reply(
    results: &ListQueue<InMemoryStore, ResultEnvelope>,
    key: &str,
) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if results.has(key).await.unwrap() {
                return results.read(key).await.unwrap()[0].1.clone();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("reply delivered within timeout")
}

#[tokio::test]
async fn linear_workflow_composes_double_then_inc() {
    let backend = Backend::new(InMemoryStore::new());
    let mut registry = PipelineRegistry::new();
    registry.register::<LinearWorkflow>();
    let registry = Arc::new(registry);

    let (tx, rx) = watch::channel(false);
    let _double = spawn_routed_activity(&backend, DoubleActivity, rx.clone());
    let _inc = spawn_routed_activity(&backend, IncActivity, rx.clone());
    let _linear = spawn_workflow_worker("linear", registry, backend.clone(), rx.clone());

    let linear_in: Queue<InMemoryStore, Routed<Value>> = backend.queue("linear-in");
    let caller_out: ListQueue<InMemoryStore, ResultEnvelope> = backend.list_queue("caller-out");

    linear_in
        .push(
            "a",
            Routed {
                reply: ReplyTo { path: caller_out.path().flattened(), key: "a".to_string() },
                step: 0,
                value: serde_json::json!(3),
            },
        )
        .await
        .unwrap();

    let result = wait_for_reply(&caller_out, "a").await;
    assert_eq!(result, serde_json::json!(7));

    tx.send(true).unwrap();
}

#[tokio::test]
async fn parallel_ctx_all_resolves_both_branches() {
    let backend = Backend::new(InMemoryStore::new());
    let mut registry = PipelineRegistry::new();
    registry.register::<ParallelWorkflow>();
    let registry = Arc::new(registry);

    let (tx, rx) = watch::channel(false);
    let _double = spawn_routed_activity(&backend, DoubleActivity, rx.clone());
    let _inc = spawn_routed_activity(&backend, IncActivity, rx.clone());
    let _parallel = spawn_workflow_worker("parallel", registry, backend.clone(), rx.clone());

    let parallel_in: Queue<InMemoryStore, Routed<Value>> = backend.queue("parallel-in");
    let caller_out: ListQueue<InMemoryStore, ResultEnvelope> = backend.list_queue("caller-out-parallel");

    parallel_in
        .push(
            "x",
            Routed {
                reply: ReplyTo { path: caller_out.path().flattened(), key: "x".to_string() },
                step: 0,
                value: serde_json::json!(4),
            },
        )
        .await
        .unwrap();

    let result = wait_for_reply(&caller_out, "x").await;
    assert_eq!(result, serde_json::json!([8, 5]));

    tx.send(true).unwrap();
}

#[tokio::test]
async fn nested_workflow_sums_linear_results_over_a_list() {
    struct SeriesWorkflow;

    impl Workflow for SeriesWorkflow {
        const TYPE: &'static str = "series";
        type Input = Vec<i64>;
        type Output = i64;

        fn run(input: Vec<i64>, ctx: &mut WkfContext) -> Result<i64, Suspended> {
            let calls = input.iter().map(|x| ("linear", serde_json::json!(x))).collect();
            let parts: Vec<i64> = ctx.all(calls)?;
            Ok(parts.into_iter().sum())
        }
    }

    let backend = Backend::new(InMemoryStore::new());
    let mut registry = PipelineRegistry::new();
    registry.register::<LinearWorkflow>();
    registry.register::<SeriesWorkflow>();
    let registry = Arc::new(registry);

    let (tx, rx) = watch::channel(false);
    let _double = spawn_routed_activity(&backend, DoubleActivity, rx.clone());
    let _inc = spawn_routed_activity(&backend, IncActivity, rx.clone());
    let _linear = spawn_workflow_worker("linear", registry.clone(), backend.clone(), rx.clone());
    let _series = spawn_workflow_worker("series", registry, backend.clone(), rx.clone());

    let series_in: Queue<InMemoryStore, Routed<Value>> = backend.queue("series-in");
    let caller_out: ListQueue<InMemoryStore, ResultEnvelope> = backend.list_queue("caller-out-series");

    series_in
        .push(
            "s",
            Routed {
                reply: ReplyTo { path: caller_out.path().flattened(), key: "s".to_string() },
                step: 0,
                value: serde_json::json!([1, 2, 3]),
            },
        )
        .await
        .unwrap();

    // linear(1) = inc(double(1)) = 3, linear(2) = 5, linear(3) = 7; sum = 15.
    let result = wait_for_reply(&caller_out, "s").await;
    assert_eq!(result, serde_json::json!(15));

    tx.send(true).unwrap();
}

#[tokio::test]
async fn duplicate_activity_output_under_concurrent_reservation_expiry_is_tolerated() {
    let backend = Backend::new(InMemoryStore::new());
    let input: Queue<InMemoryStore, i64> = backend.queue("slow-in");
    let output: Queue<InMemoryStore, i64> = backend.queue("slow-out");
    input.push("a", 5).await.unwrap();

    struct Slow;

    #[async_trait]
    impl Activity for Slow {
        const TYPE: &'static str = "slow";
        type Input = i64;
        type Output = i64;

        async fn execute(&self, input: i64) -> Result<i64, ActivityError> {
            tokio::time::sleep(Duration::from_millis(150)).await;
            Ok(input)
        }
    }

    let (tx, rx) = watch::channel(false);
    let worker_a = tokio::spawn(pipeteer::activity::run_activity_worker(
        Slow,
        input.clone(),
        output.clone(),
        Duration::from_millis(50),
        Some(rx.clone()),
    ));
    let worker_b = tokio::spawn(pipeteer::activity::run_activity_worker(
        Slow,
        input.clone(),
        output.clone(),
        Duration::from_millis(50),
        Some(rx.clone()),
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
    .expect("item was eventually processed despite the short lease");

    assert_eq!(output.read("a", None).await.unwrap(), 5);

    tx.send(true).unwrap();
    worker_a.await.unwrap();
    worker_b.await.unwrap();
}

#[tokio::test]
async fn replace_semantics_on_same_key_push() {
    let backend = Backend::new(InMemoryStore::new());
    let q: Queue<InMemoryStore, i64> = backend.queue("replace");

    q.push("k", 1).await.unwrap();
    q.push("k", 2).await.unwrap();

    assert_eq!(q.read("k", None).await.unwrap(), 2);
}
