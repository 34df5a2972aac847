//! Activity trait definition

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Error from an activity body
///
/// Unlike a task-queue retry policy, an activity failure here has only one
/// outcome: the item stays reserved, the reservation expires, and the
/// activity worker picks it up again. There is no retryable/non-retryable
/// distinction and no attempt ceiling — see the queue's reservation lease.
#[derive(Debug, Clone)]
pub struct ActivityError {
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ActivityError {
    pub fn new(message: impl Into<String>) -> Self {
        ActivityError { message: message.into(), details: None }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for ActivityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ActivityError {}

impl From<anyhow::Error> for ActivityError {
    fn from(err: anyhow::Error) -> Self {
        ActivityError::new(err.to_string())
    }
}

/// A unit of work run by an activity worker: a plain `(Input) -> Output`
/// function, with no knowledge of the queue it was read from or pushed to.
///
/// # Example
///
/// ```ignore
/// struct Double;
///
/// #[async_trait::async_trait]
/// impl Activity for Double {
///     const TYPE: &'static str = "double";
///     type Input = i64;
///     type Output = i64;
///
///     async fn execute(&self, input: i64) -> Result<i64, ActivityError> {
///         Ok(input * 2)
///     }
/// }
/// ```
#[async_trait]
pub trait Activity: Send + Sync + 'static {
    /// Unique type identifier, also the name of its input/output queues.
    const TYPE: &'static str;

    type Input: Serialize + DeserializeOwned + Send + Sync;
    type Output: Serialize + DeserializeOwned + Send + Sync;

    async fn execute(&self, input: Self::Input) -> Result<Self::Output, ActivityError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_error_carries_a_message() {
        let err = ActivityError::new("boom");
        assert_eq!(err.to_string(), "boom");
        assert!(err.details.is_none());
    }

    #[test]
    fn activity_error_can_attach_details() {
        let err = ActivityError::new("boom").with_details(serde_json::json!({"code": 1}));
        assert_eq!(err.details, Some(serde_json::json!({"code": 1})));
    }
}
