//! Tasks: user-supplied artifacts that aren't poll-driven workers
//!
//! A [`Task`] plugs a non-polling producer/consumer (a webhook receiver, a
//! manual-review UI, a long-lived HTTP server) into the same queue
//! substrate activities and workflows use, without pretending it's an
//! activity. `run` doesn't execute anything itself — it hands back an
//! [`Artifact`] describing how to execute, which the runner (`runner.rs`)
//! decides when and how to materialise.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::queue::{Queue, QueueStore};
use crate::runner::Artifact;

/// An opaque unit of work parameterised over its input/output queues.
///
/// Unlike [`Activity`](crate::activity::Activity), a task is never driven by
/// a generic poll loop the engine owns — the artifact it returns *is* its
/// entire runtime behavior.
pub trait Task<S: QueueStore>: Send + Sync + 'static {
    const TYPE: &'static str;
    type Input: Serialize + DeserializeOwned + Send + Sync;
    type Output: Serialize + DeserializeOwned + Send + Sync;

    fn run(&self, input: Queue<S, Self::Input>, output: Queue<S, Self::Output>) -> Artifact;
}

/// Merges the artifacts of several sub-tasks into a single artifact — for
/// example, mounting several queue-backed HTTP handlers onto one server.
pub struct MultiTask {
    artifacts: Vec<Artifact>,
    merge: Box<dyn FnOnce(Vec<Artifact>) -> Artifact + Send>,
}

impl MultiTask {
    pub fn new(
        artifacts: Vec<Artifact>,
        merge: impl FnOnce(Vec<Artifact>) -> Artifact + Send + 'static,
    ) -> Self {
        MultiTask { artifacts, merge: Box::new(merge) }
    }

    /// Run the merge function, producing the one combined artifact.
    pub fn run(self) -> Artifact {
        (self.merge)(self.artifacts)
    }
}
