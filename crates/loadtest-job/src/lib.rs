//! LoadTest worker Jobs
//!
//! Turns a `LoadTest` into a Kubernetes batch Job running one indexed worker
//! pod per requested worker, and reconciles that Job into existence:
//! - `job` builds the Job spec and derives LoadTest status from it
//! - `controller` creates the Job exactly once and keeps status in sync
//! - `defaults`, `labels`, `resources` and `telemetry` hold the operator-wide
//!   settings merged into every Job

#![deny(missing_docs)]

pub mod controller;
pub mod defaults;
pub mod error;
pub mod job;
pub mod labels;
pub mod resources;
pub mod telemetry;

pub use controller::{error_policy, reconcile, LoadTestContext};
pub use defaults::WorkerDefaults;
pub use error::JobError;
pub use job::build_job;
pub use labels::LabelScheme;
pub use telemetry::WorkerTelemetry;
