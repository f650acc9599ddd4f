//! Run execution: step processes, per-run scheduling, and the worker pool

pub mod executor;
pub mod scheduler;
pub mod worker;

pub use executor::StepExecutor;
pub use scheduler::PipelineScheduler;
pub use worker::{ConfigurationLocks, WorkerPool};
