//! HTTP queue protocol: a thin transport adapter over `QueueStore`
//!
//! Remote backends are exposed over this protocol so a `Backend::queue_at`
//! handle in one process can push to a queue owned by another. The wire
//! format and transport are intentionally minimal — the protocol exists to
//! let Pipeteer's runner topology span multiple OS processes, not to be a
//! general-purpose message bus.

pub mod client;
pub mod server;
