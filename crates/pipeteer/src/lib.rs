//! # Pipeteer
//!
//! A durable, replay-based workflow engine: a directed graph of activities
//! and workflows running against a persistent backend of durable queues,
//! surviving process restarts by reconstructing interrupted workflow
//! instances from their persisted history.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Backend<S>                            │
//! │   constructs typed Queue/ListQueue handles over one store   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        QueueStore                             │
//! │      (in-memory for tests, Postgres for production)          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              ┌───────────────┴───────────────┐
//!              ▼                               ▼
//! ┌───────────────────────────┐   ┌───────────────────────────┐
//! │      Activity worker       │   │     Workflow worker        │
//! │  pop → execute → push      │   │  replay states → suspend   │
//! │  (result + input atomic)   │   │  or resolve, via ctx.call  │
//! └───────────────────────────┘   └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use pipeteer::prelude::*;
//!
//! struct Double;
//! #[async_trait::async_trait]
//! impl Activity for Double {
//!     const TYPE: &'static str = "double";
//!     type Input = i64;
//!     type Output = i64;
//!
//!     async fn execute(&self, input: i64) -> Result<i64, ActivityError> {
//!         Ok(input * 2)
//!     }
//! }
//! ```

pub mod activity;
pub mod backend;
pub mod error;
pub mod http;
pub mod notify;
pub mod queue;
pub mod runner;
pub mod task;
pub mod workflow;

/// Re-exports of the most commonly used types.
pub mod prelude {
    pub use crate::activity::{Activity, ActivityError};
    pub use crate::backend::{new_instance_id, Backend};
    pub use crate::error::Error;
    pub use crate::notify::{run_proxy, NotifyPublisher};
    pub use crate::queue::list::ListQueue;
    pub use crate::queue::memory::InMemoryStore;
    pub use crate::queue::postgres::PostgresStore;
    pub use crate::queue::transaction::Transaction;
    pub use crate::queue::{Queue, QueuePath, QueueStore};
    pub use crate::runner::{
        build_pipeline_tree, ActivityNode, Artifact, ArtifactTree, PipelineNode,
        RoutedActivityNode, WorkflowNode,
    };
    pub use crate::task::{MultiTask, Task};
    pub use crate::workflow::context::{Suspended, WkfContext};
    pub use crate::workflow::{PipelineRegistry, Workflow};
}

pub use error::Error;
