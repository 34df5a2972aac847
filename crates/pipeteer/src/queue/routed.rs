//! Routed values: the envelope that lets a sub-pipeline call reply to
//! whoever invoked it without either side knowing the other's concrete type
//!
//! Every pipeline (activity or workflow) that can be called as a
//! sub-pipeline from a workflow's `ctx.call`/`ctx.all` accepts its input
//! wrapped in a `Routed<T>` rather than bare `T`. On completion it appends
//! `(step, result)` onto the `ListQueue` named by `reply.path`, keyed by
//! `reply.key` — the same mailbox a workflow instance's own completion
//! reports to, so a caller never needs to distinguish "an activity answered
//! me" from "a nested workflow answered me".

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where (and under what key) to deliver a sub-pipeline's result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplyTo {
    /// Flattened path of the results `ListQueue` to append to.
    pub path: String,
    /// Key within that list queue (typically the calling instance id).
    pub key: String,
}

/// One step index's worth of result, as it lands in a results list queue.
pub type ResultEnvelope = (usize, Value);

/// An input value plus the reply address its result should be delivered to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Routed<T> {
    pub reply: ReplyTo,
    /// The calling instance's step index for this call, echoed back in the
    /// result envelope so out-of-order completions can be placed correctly.
    pub step: usize,
    pub value: T,
}
