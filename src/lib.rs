//! conveyor - a declarative CI/CD pipeline orchestrator
//!
//! Projects are described in a single YAML file: build configurations with
//! shell steps, snapshot dependencies, VCS triggers, and an optional deploy
//! hook fired after a successful run. The orchestrator validates the
//! dependency graph at load time and walks it upstream-first when a
//! pipeline is launched.

pub mod cli;
pub mod core;
pub mod deploy;
pub mod execution;
pub mod history;
pub mod notify;
pub mod orchestrator;
pub mod trigger;

// Re-export commonly used types
pub use crate::core::{
    BuildConfiguration, BuildRun, CommitRef, DependencyGraph, OrchestratorError, ProjectConfig,
    RunStatus, StepOutcome, StepResult,
};
pub use crate::core::{EnvSecretResolver, SecretResolver, StaticSecretResolver};
pub use deploy::{DeployOutcome, DeploymentDispatcher};
pub use execution::{PipelineScheduler, StepExecutor};
pub use history::{InMemoryHistory, RunHistory};
pub use notify::{BuildNotification, LogNotifier, NotificationKind, Notifier};
pub use orchestrator::{Orchestrator, OrchestratorEvent};
pub use trigger::{BranchFilter, TriggerEngine, TriggerFire, TriggerPolicy};
