//! Crate-wide error type
//!
//! Mirrors the taxonomy every backend and worker loop reports through: a
//! missing keyed item, an infrastructure fault from the underlying store or
//! transport, or a protocol-level fault from the remote queue HTTP surface.

/// Error returned by queue, backend, activity, and workflow operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No item is present (or visible) for the given key.
    #[error("no item for key {0:?}")]
    InexistentItem(String),

    /// The underlying storage backend failed.
    #[error("infrastructure error: {0}")]
    Infra(String),

    /// The remote queue HTTP protocol returned something unexpected.
    #[error("queue protocol error: {0}")]
    Protocol(String),
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Infra(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Infra(format!("serialization: {e}"))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Protocol(e.to_string())
    }
}
