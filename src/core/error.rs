//! Error types for configuration load and run execution

use thiserror::Error;

/// Errors surfaced by the orchestrator
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A step exited with a non-zero code
    #[error("step '{step}' failed with exit code {exit_code}")]
    ScriptFailure { step: String, exit_code: i32 },

    /// A step exceeded its timeout and was killed
    #[error("step '{step}' timed out after {timeout_secs} seconds")]
    Timeout { step: String, timeout_secs: u64 },

    /// The dependency relation between build configurations is not acyclic.
    /// Raised at configuration-load time; aborts the load.
    #[error("dependency cycle detected: {}", cycle.join(" -> "))]
    CycleDetected { cycle: Vec<String> },

    /// A fail-to-start upstream did not succeed; the run was skipped
    #[error("upstream '{upstream}' of '{configuration}' did not succeed")]
    DependencyNotSatisfied {
        configuration: String,
        upstream: String,
    },

    /// The deploy hook could not be reached or returned a non-2xx status.
    /// Fatal for the run; the hook is never retried.
    #[error("deploy hook unreachable: {0}")]
    DeployHookUnreachable(String),

    /// The deploy hook accepted the request but its response carried no
    /// parseable deployment identifier. Non-fatal; the deployment still
    /// counts as triggered.
    #[error("deploy hook response for '{0}' had no parseable deployment id")]
    MalformedDeployResponse(String),

    /// A secret reference could not be resolved
    #[error("secret '{0}' is not available")]
    SecretNotFound(String),

    /// A build configuration id that is not in the registry
    #[error("unknown build configuration '{0}'")]
    UnknownConfiguration(String),

    /// The run's child process could not be spawned or managed
    #[error("process error for step '{step}': {message}")]
    Process { step: String, message: String },
}
