//! Runner / artifact tree: spawns and supervises a pipeline graph's worker
//! loops as a flat set of OS-level tasks
//!
//! There is no central supervisor beyond the join at the end of [`run_all`]:
//! each artifact, once started, is an independent unit that restarts only by
//! process restart, matching the outer/inner scheduling split workers follow
//! throughout this engine (one poll loop per leaf, no cooperative
//! cancellation of in-flight work).

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::activity::worker::{run_activity_worker, run_routed_activity_worker};
use crate::activity::Activity;
use crate::backend::Backend;
use crate::queue::routed::Routed;
use crate::queue::{Queue, QueueStore};
use crate::workflow::worker::run_workflow_worker;
use crate::workflow::PipelineRegistry;

/// One leaf's runtime behavior: called once to produce the future the
/// runner drives to completion (normally: forever, until shutdown).
pub type Artifact = Box<dyn FnOnce() -> Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send>;

/// A nested map from component name to either a runnable leaf or another
/// tree, mirroring a workflow's declared sub-pipelines under its own name.
pub enum ArtifactTree {
    Leaf(Artifact),
    Node(BTreeMap<String, ArtifactTree>),
}

impl ArtifactTree {
    pub fn leaf(artifact: Artifact) -> Self {
        ArtifactTree::Leaf(artifact)
    }

    pub fn node(children: impl IntoIterator<Item = (String, ArtifactTree)>) -> Self {
        ArtifactTree::Node(children.into_iter().collect())
    }

    /// Flatten into `(dotted.path, artifact)` pairs, depth-first.
    fn into_leaves(self, prefix: &str, out: &mut Vec<(String, Artifact)>) {
        match self {
            ArtifactTree::Leaf(artifact) => out.push((prefix.to_string(), artifact)),
            ArtifactTree::Node(children) => {
                for (name, child) in children {
                    let path = if prefix.is_empty() { name } else { format!("{prefix}.{name}") };
                    child.into_leaves(&path, out);
                }
            }
        }
    }
}

/// One node of a pipeline graph: a pipeline that can materialise its own
/// worker artifact and declares zero or more sub-pipelines nested under it,
/// mirroring the original `Workflow.pipelines` recursion.
pub trait PipelineNode: Send {
    /// This node's name — the key it's filed under in the artifact tree.
    fn name(&self) -> String;

    /// Consume the node into its own artifact plus its declared children.
    fn into_parts(self: Box<Self>) -> (Artifact, Vec<Box<dyn PipelineNode>>);
}

fn pipeline_subtree(node: Box<dyn PipelineNode>) -> ArtifactTree {
    let (artifact, children) = node.into_parts();
    let mut map = BTreeMap::new();
    map.insert("self".to_string(), ArtifactTree::Leaf(artifact));
    for child in children {
        map.insert(child.name(), pipeline_subtree(child));
    }
    ArtifactTree::Node(map)
}

/// Build a pipeline's full worker tree: its own artifact under `"self"`,
/// plus one subtree per declared sub-pipeline under its name, the whole
/// thing filed under the root node's own name — the Rust equivalent of
/// `Workflow.run(Qout, ctx, prefix) -> { self.name: { "_root": ..., ... } }`.
pub fn build_pipeline_tree(root: Box<dyn PipelineNode>) -> ArtifactTree {
    let name = root.name();
    ArtifactTree::node([(name, pipeline_subtree(root))])
}

/// An [`Activity`] as a pipeline node reading from a fixed input queue and
/// writing to a fixed output queue — the non-workflow, top-level case.
pub struct ActivityNode<S: QueueStore, A: Activity> {
    activity: A,
    input: Queue<S, A::Input>,
    output: Queue<S, A::Output>,
    reserve: Duration,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<S: QueueStore, A: Activity> ActivityNode<S, A> {
    pub fn new(
        activity: A,
        input: Queue<S, A::Input>,
        output: Queue<S, A::Output>,
        reserve: Duration,
        shutdown: Option<watch::Receiver<bool>>,
    ) -> Self {
        ActivityNode { activity, input, output, reserve, shutdown }
    }
}

impl<S: QueueStore + 'static, A: Activity> PipelineNode for ActivityNode<S, A> {
    fn name(&self) -> String {
        A::TYPE.to_string()
    }

    fn into_parts(self: Box<Self>) -> (Artifact, Vec<Box<dyn PipelineNode>>) {
        let ActivityNode { activity, input, output, reserve, shutdown } = *self;
        let artifact: Artifact =
            Box::new(move || Box::pin(run_activity_worker(activity, input, output, reserve, shutdown)));
        (artifact, Vec::new())
    }
}

/// An [`Activity`] run as a workflow's sub-pipeline: input arrives wrapped
/// in [`Routed`] and the result is delivered to whichever caller dispatched
/// it, rather than to a queue fixed at construction time.
pub struct RoutedActivityNode<S: QueueStore, A: Activity> {
    activity: A,
    input: Queue<S, Routed<A::Input>>,
    reserve: Duration,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<S: QueueStore, A: Activity> RoutedActivityNode<S, A> {
    pub fn new(
        activity: A,
        input: Queue<S, Routed<A::Input>>,
        reserve: Duration,
        shutdown: Option<watch::Receiver<bool>>,
    ) -> Self {
        RoutedActivityNode { activity, input, reserve, shutdown }
    }
}

impl<S: QueueStore + 'static, A: Activity> PipelineNode for RoutedActivityNode<S, A> {
    fn name(&self) -> String {
        A::TYPE.to_string()
    }

    fn into_parts(self: Box<Self>) -> (Artifact, Vec<Box<dyn PipelineNode>>) {
        let RoutedActivityNode { activity, input, reserve, shutdown } = *self;
        let artifact: Artifact =
            Box::new(move || Box::pin(run_routed_activity_worker(activity, input, reserve, shutdown)));
        (artifact, Vec::new())
    }
}

/// A [`Workflow`](crate::workflow::Workflow) pipeline's replay worker, plus
/// whichever sub-pipelines it declares (each a node in its own right,
/// dispatched to by `ctx.call`/`ctx.all`).
pub struct WorkflowNode<S: QueueStore> {
    pipeline_id: &'static str,
    registry: Arc<PipelineRegistry>,
    backend: Backend<S>,
    reserve: Duration,
    shutdown: Option<watch::Receiver<bool>>,
    children: Vec<Box<dyn PipelineNode>>,
}

impl<S: QueueStore> WorkflowNode<S> {
    pub fn new(
        pipeline_id: &'static str,
        registry: Arc<PipelineRegistry>,
        backend: Backend<S>,
        reserve: Duration,
        shutdown: Option<watch::Receiver<bool>>,
        children: Vec<Box<dyn PipelineNode>>,
    ) -> Self {
        WorkflowNode { pipeline_id, registry, backend, reserve, shutdown, children }
    }
}

impl<S: QueueStore + 'static> PipelineNode for WorkflowNode<S> {
    fn name(&self) -> String {
        self.pipeline_id.to_string()
    }

    fn into_parts(self: Box<Self>) -> (Artifact, Vec<Box<dyn PipelineNode>>) {
        let WorkflowNode { pipeline_id, registry, backend, reserve, shutdown, children } = *self;
        let artifact: Artifact =
            Box::new(move || Box::pin(run_workflow_worker(pipeline_id, registry, backend, reserve, shutdown)));
        (artifact, children)
    }
}

/// Materialise every leaf via `executor` (default: `tokio::spawn` on the
/// future the artifact produces), start them all, then join them.
///
/// The default executor assumes every artifact is a bare thunk; a custom
/// executor is the only place a task's non-process artifact (e.g. an HTTP
/// app needing its own listener setup) gets converted into a process.
pub async fn run_all<E>(tree: ArtifactTree, executor: E)
where
    E: Fn(Artifact) -> JoinHandle<()>,
{
    let mut leaves = Vec::new();
    tree.into_leaves("", &mut leaves);

    info!(count = leaves.len(), "starting pipeline worker tree");
    let mut handles = Vec::with_capacity(leaves.len());
    for (path, artifact) in leaves {
        handles.push((path, executor(artifact)));
    }

    for (path, handle) in handles {
        if let Err(e) = handle.await {
            error!(path, error = %e, "pipeline worker task panicked");
        }
    }
}

/// Convenience wrapper over [`run_all`] using the default `tokio::spawn`
/// executor.
pub async fn run(tree: ArtifactTree) {
    run_all(tree, |artifact| tokio::spawn(artifact())).await;
}
