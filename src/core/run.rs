//! Build run state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::OrchestratorError;

/// Overall status of a build run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run is queued but has not started
    Pending,
    /// Run is currently executing steps
    Running,
    /// All effective steps succeeded
    Success,
    /// A step failed fatally, the deploy hook failed, or the run was cancelled
    Failed,
    /// The run exceeded its execution timeout
    TimedOut,
    /// The run never started because a fail-to-start upstream did not succeed
    Skipped,
}

impl RunStatus {
    /// Whether the run has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Success | RunStatus::Failed | RunStatus::TimedOut | RunStatus::Skipped
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::TimedOut => "timed-out",
            RunStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Reference to the commit that triggered a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    /// Revision hash
    pub revision: String,

    /// Full ref name, e.g. `refs/heads/main`
    pub branch: String,

    /// Committer identity
    pub committer: String,
}

/// How a single step resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepOutcome {
    /// Exit code zero
    Succeeded,
    /// Non-zero exit code
    Failed { exit_code: i32 },
    /// Killed after exceeding the step timeout
    TimedOut { timeout_secs: u64 },
    /// Killed by operator cancellation or run teardown
    Cancelled,
    /// Never executed (earlier fatal failure, or on-failure-only with no failure)
    NotRun { reason: String },
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Succeeded)
    }
}

/// Result of one step within a run, log included
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_name: String,
    pub outcome: StepOutcome,

    /// Combined stdout/stderr; partial output is preserved on kill
    pub log: String,

    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StepResult {
    /// A result for a step that never executed
    pub fn not_run(step_name: &str, reason: &str) -> Self {
        StepResult {
            step_name: step_name.to_string(),
            outcome: StepOutcome::NotRun {
                reason: reason.to_string(),
            },
            log: String::new(),
            started_at: None,
            finished_at: None,
        }
    }

    /// The typed error for a failed outcome, if this step failed
    pub fn error(&self) -> Option<OrchestratorError> {
        match &self.outcome {
            StepOutcome::Failed { exit_code } => Some(OrchestratorError::ScriptFailure {
                step: self.step_name.clone(),
                exit_code: *exit_code,
            }),
            StepOutcome::TimedOut { timeout_secs } => Some(OrchestratorError::Timeout {
                step: self.step_name.clone(),
                timeout_secs: *timeout_secs,
            }),
            _ => None,
        }
    }
}

/// One execution instance of a build configuration.
///
/// Created when a trigger fires (or a pipeline is launched manually);
/// terminal once all steps resolve or one fails fatally. Never left
/// `Pending` after a cancel or timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRun {
    /// Unique run id
    pub id: Uuid,

    /// Id of the configuration this run executes
    pub configuration_id: String,

    /// Per-configuration monotonic build number
    pub build_number: u64,

    /// Current status
    pub status: RunStatus,

    /// Commit that triggered the run, if any
    pub commit: Option<CommitRef>,

    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Per-step results in declared order
    pub step_results: Vec<StepResult>,

    /// Deployment identifier extracted from the deploy hook response
    pub deployment_id: Option<String>,
}

impl BuildRun {
    /// Create a pending run
    pub fn new(configuration_id: &str, build_number: u64, commit: Option<CommitRef>) -> Self {
        BuildRun {
            id: Uuid::new_v4(),
            configuration_id: configuration_id.to_string(),
            build_number,
            status: RunStatus::Pending,
            commit,
            started_at: None,
            finished_at: None,
            step_results: Vec::new(),
            deployment_id: None,
        }
    }

    /// Create a run that is skipped before it ever starts
    pub fn skipped(configuration_id: &str, build_number: u64, commit: Option<CommitRef>) -> Self {
        let mut run = Self::new(configuration_id, build_number, commit);
        run.status = RunStatus::Skipped;
        run.finished_at = Some(Utc::now());
        run
    }

    /// Mark the run as started
    pub fn start(&mut self) {
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Mark the run as finished with a terminal status
    pub fn finish(&mut self, status: RunStatus) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    /// Duration of the run, if it has both timestamps
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// The typed error of the step that decided a failed run
    pub fn failure(&self) -> Option<OrchestratorError> {
        if !matches!(self.status, RunStatus::Failed | RunStatus::TimedOut) {
            return None;
        }
        self.step_results.iter().find_map(|r| r.error())
    }
}
