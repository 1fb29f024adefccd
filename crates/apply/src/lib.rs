//! Tron apply: reconciles rendered manifests against the cluster (create/update/upsert/delete),
//! with conflict retry, workload field preservation, and orphaned route cleanup.

#![forbid(unsafe_code)]

pub mod engine;
pub mod kinds;
pub mod retry;

pub use engine::{ApplyReport, Engine};
pub use kinds::{plural_for, KindRegistry};
pub use retry::{RecordingSleeper, RetryPolicy, Sleeper, TokioSleeper};
