//! `WkfContext`: the replay context threaded through a workflow coordinator
//!
//! Suspension is realized as `Result`'s `Err` arm instead of the source
//! system's exception-based `Stop` signal: `ctx.call`/`ctx.all` return
//! `Result<T, Suspended>`, and a coordinator body uses the ordinary `?`
//! operator to propagate a suspend exactly where the source would unwind.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Returned by `ctx.call`/`ctx.all` (and propagated by `Workflow::run` via
/// `?`) when a sub-call's result isn't in history yet. The coordinator must
/// be re-run from the start on the next replay once it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Suspended;

/// A sub-call the coordinator made that has no resolved result yet.
#[derive(Debug, Clone)]
pub(crate) struct PendingCall {
    pub step: usize,
    pub pipeline_id: String,
    pub input: Value,
}

/// Threaded through one replay of a workflow coordinator.
///
/// `states` holds every step index whose result has already been persisted
/// (sparse, since `ctx.all` can resolve its members out of order); `step`
/// is the next step index the coordinator will assign.
pub struct WkfContext {
    states: BTreeMap<usize, Value>,
    step: usize,
    pub(crate) pending: Vec<PendingCall>,
}

impl WkfContext {
    pub(crate) fn new(states: BTreeMap<usize, Value>) -> Self {
        WkfContext { states, step: 0, pending: Vec::new() }
    }

    /// Call `pipeline_id` with `input`, returning its result if already
    /// resolved in history, or registering the call and suspending.
    pub fn call<In, Out>(&mut self, pipeline_id: &str, input: In) -> Result<Out, Suspended>
    where
        In: Serialize,
        Out: DeserializeOwned,
    {
        let step = self.step;
        self.step += 1;

        if let Some(value) = self.states.get(&step) {
            return Ok(serde_json::from_value(value.clone())
                .expect("replayed value no longer matches the caller's expected type"));
        }

        self.pending.push(PendingCall {
            step,
            pipeline_id: pipeline_id.to_string(),
            input: serde_json::to_value(input).expect("workflow call input must serialize"),
        });
        Err(Suspended)
    }

    /// Call each of `calls` in parallel, returning all results once every
    /// one has resolved, or suspending (enqueueing only whichever members
    /// haven't resolved yet) otherwise.
    pub fn all<Out>(&mut self, calls: Vec<(&str, Value)>) -> Result<Vec<Out>, Suspended>
    where
        Out: DeserializeOwned,
    {
        let start = self.step;
        let n = calls.len();
        self.step += n;

        let all_resolved = (start..start + n).all(|i| self.states.contains_key(&i));
        if all_resolved {
            let results = (start..start + n)
                .map(|i| {
                    serde_json::from_value(self.states[&i].clone())
                        .expect("replayed value no longer matches the caller's expected type")
                })
                .collect();
            return Ok(results);
        }

        for (offset, (pipeline_id, input)) in calls.into_iter().enumerate() {
            let step = start + offset;
            if !self.states.contains_key(&step) {
                self.pending.push(PendingCall { step, pipeline_id: pipeline_id.to_string(), input });
            }
        }
        Err(Suspended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_suspends_and_records_a_pending_call() {
        let mut ctx = WkfContext::new(BTreeMap::new());
        let result: Result<i64, Suspended> = ctx.call("double", 21);
        assert_eq!(result, Err(Suspended));
        assert_eq!(ctx.pending.len(), 1);
        assert_eq!(ctx.pending[0].step, 0);
        assert_eq!(ctx.pending[0].pipeline_id, "double");
    }

    #[test]
    fn resolved_call_returns_its_value_without_suspending() {
        let mut states = BTreeMap::new();
        states.insert(0, serde_json::json!(42));
        let mut ctx = WkfContext::new(states);
        let result: Result<i64, Suspended> = ctx.call("double", 21);
        assert_eq!(result, Ok(42));
        assert!(ctx.pending.is_empty());
    }

    #[test]
    fn second_call_only_resolves_once_first_is_present() {
        let mut states = BTreeMap::new();
        states.insert(0, serde_json::json!(42));
        let mut ctx = WkfContext::new(states);

        let first: Result<i64, Suspended> = ctx.call("double", 21);
        assert_eq!(first, Ok(42));

        let second: Result<i64, Suspended> = ctx.call("inc", 42);
        assert_eq!(second, Err(Suspended));
        assert_eq!(ctx.pending.len(), 1);
        assert_eq!(ctx.pending[0].step, 1);
    }

    #[test]
    fn all_fires_every_call_on_first_traversal() {
        let mut ctx = WkfContext::new(BTreeMap::new());
        let calls = vec![("a", serde_json::json!(1)), ("b", serde_json::json!(2))];
        let result: Result<Vec<i64>, Suspended> = ctx.all(calls);
        assert_eq!(result, Err(Suspended));
        assert_eq!(ctx.pending.len(), 2);
    }

    #[test]
    fn all_does_not_reenqueue_already_resolved_members() {
        let mut states = BTreeMap::new();
        states.insert(0, serde_json::json!(10));
        let mut ctx = WkfContext::new(states);
        let calls = vec![("a", serde_json::json!(1)), ("b", serde_json::json!(2))];
        let result: Result<Vec<i64>, Suspended> = ctx.all(calls);
        assert_eq!(result, Err(Suspended));
        assert_eq!(ctx.pending.len(), 1);
        assert_eq!(ctx.pending[0].step, 1);
    }

    #[test]
    fn all_resolves_once_every_member_is_present() {
        let mut states = BTreeMap::new();
        states.insert(0, serde_json::json!(10));
        states.insert(1, serde_json::json!(20));
        let mut ctx = WkfContext::new(states);
        let calls = vec![("a", serde_json::json!(1)), ("b", serde_json::json!(2))];
        let result: Result<Vec<i64>, Suspended> = ctx.all(calls);
        assert_eq!(result, Ok(vec![10, 20]));
    }
}
