//! Workflow coordinators and the type-erased registry that replays them
//!
//! A [`Workflow`] is a pure function of its input and the step results
//! accumulated so far: unlike an activity, it never touches I/O directly —
//! it only asks [`WkfContext`] for the result of a named sub-call and
//! returns `Err(Suspended)` (via `?`) the moment one isn't available yet.
//! Re-running that same function against a longer history is what "replay"
//! means here; there is no persisted workflow struct, only the history.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::workflow::context::{PendingCall, Suspended, WkfContext};

/// A durable coordinator: `run` replays from scratch on every invocation,
/// using `ctx` to recover prior sub-call results or register new ones.
pub trait Workflow: Send + Sync + 'static {
    /// Identifier used to route calls to this workflow, and as the prefix
    /// of its input/state/result queue names.
    const TYPE: &'static str;
    type Input: Serialize + DeserializeOwned + Send + Sync;
    type Output: Serialize + DeserializeOwned + Send + Sync;

    fn run(input: Self::Input, ctx: &mut WkfContext) -> Result<Self::Output, Suspended>;
}

/// Outcome of replaying a registered pipeline once against a given history.
pub enum ReplayOutcome {
    Completed(Value),
    Suspended(Vec<PendingCall>),
}

/// Type-erased interface over a registered [`Workflow`], so the engine can
/// replay a coordinator by name without knowing its concrete type.
trait AnyWorkflow: Send + Sync {
    fn pipeline_id(&self) -> &'static str;

    fn replay(
        &self,
        input: Value,
        states: BTreeMap<usize, Value>,
    ) -> Result<ReplayOutcome, serde_json::Error>;
}

struct WorkflowWrapper<W>(PhantomData<fn() -> W>);

impl<W: Workflow> AnyWorkflow for WorkflowWrapper<W> {
    fn pipeline_id(&self) -> &'static str {
        W::TYPE
    }

    fn replay(
        &self,
        input: Value,
        states: BTreeMap<usize, Value>,
    ) -> Result<ReplayOutcome, serde_json::Error> {
        let input: W::Input = serde_json::from_value(input)?;
        let mut ctx = WkfContext::new(states);
        match W::run(input, &mut ctx) {
            Ok(output) => Ok(ReplayOutcome::Completed(serde_json::to_value(output)?)),
            Err(Suspended) => Ok(ReplayOutcome::Suspended(ctx.pending)),
        }
    }
}

/// Maps pipeline ids to the workflows they replay.
///
/// Only workflow coordinators are registered here — activities are plain
/// values the caller wires up directly as workers, since they don't need
/// replay dispatch.
#[derive(Default)]
pub struct PipelineRegistry {
    workflows: HashMap<String, Box<dyn AnyWorkflow>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        PipelineRegistry { workflows: HashMap::new() }
    }

    pub fn register<W: Workflow>(&mut self) -> &mut Self {
        self.workflows.insert(W::TYPE.to_string(), Box::new(WorkflowWrapper::<W>(PhantomData)));
        self
    }

    pub fn contains(&self, pipeline_id: &str) -> bool {
        self.workflows.contains_key(pipeline_id)
    }

    pub fn pipeline_ids(&self) -> impl Iterator<Item = &str> {
        self.workflows.keys().map(|s| s.as_str())
    }

    pub fn replay(
        &self,
        pipeline_id: &str,
        input: Value,
        states: BTreeMap<usize, Value>,
    ) -> Result<ReplayOutcome, RegistryError> {
        let workflow = self
            .workflows
            .get(pipeline_id)
            .ok_or_else(|| RegistryError::UnknownPipeline(pipeline_id.to_string()))?;
        workflow.replay(input, states).map_err(RegistryError::Deserialization)
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown pipeline: {0}")]
    UnknownPipeline(String),
    #[error("failed to (de)serialize pipeline value: {0}")]
    Deserialization(#[source] serde_json::Error),
}
