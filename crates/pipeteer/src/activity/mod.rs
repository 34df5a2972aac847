//! Activities: user-supplied `(Input) -> Output` functions run by workers

pub mod definition;
pub mod worker;

pub use definition::{Activity, ActivityError};
pub use worker::{run_activity_worker, run_routed_activity_worker};
