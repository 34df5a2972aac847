//! Workflows: durable coordinators replayed against accumulated step results

pub mod context;
pub mod definition;
pub mod worker;

pub use context::{Suspended, WkfContext};
pub use definition::{PipelineRegistry, ReplayOutcome, Workflow};
pub use worker::run_workflow_worker;
