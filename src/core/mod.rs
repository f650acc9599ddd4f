//! Core domain: configuration, build model, runs, dependency graph

pub mod build;
pub mod config;
pub mod error;
pub mod graph;
pub mod run;
pub mod secrets;

pub use build::{
    BuildConfiguration, DependencyEdge, DependencyPolicy, ExecutionMode, FailureConditions, Step,
};
pub use config::ProjectConfig;
pub use error::OrchestratorError;
pub use graph::DependencyGraph;
pub use run::{BuildRun, CommitRef, RunStatus, StepOutcome, StepResult};
pub use secrets::{EnvSecretResolver, SecretResolver, StaticSecretResolver};
