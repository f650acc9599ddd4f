//! Pipeline scheduler - drives the steps of one build run
//!
//! State machine per run: Pending -> Running -> {Success, Failed, TimedOut,
//! Skipped}. Steps execute strictly in declared order; there is no
//! intra-run parallelism. `always` steps are skipped once the run has
//! failed fatally, while `on-failure-only` steps execute exactly then, so
//! diagnostics and cleanup still run on a broken build.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::{info, warn};

use crate::core::build::{BuildConfiguration, ExecutionMode};
use crate::core::run::{BuildRun, RunStatus, StepOutcome, StepResult};
use crate::execution::executor::StepExecutor;

/// Drives step execution for build runs
#[derive(Debug, Clone, Default)]
pub struct PipelineScheduler {
    executor: StepExecutor,
}

impl PipelineScheduler {
    pub fn new(executor: StepExecutor) -> Self {
        Self { executor }
    }

    /// Execute all steps of `config` for `run`, leaving `run` in a terminal
    /// state. The whole run is bounded by the configuration's execution
    /// timeout; exceeding it tears down the active process group and marks
    /// the run TimedOut.
    pub async fn execute_run(
        &self,
        config: &BuildConfiguration,
        run: &mut BuildRun,
        env: &HashMap<String, String>,
        workdir: &Path,
        cancelled: Arc<AtomicBool>,
    ) {
        run.start();
        info!(
            "Run #{} of '{}' started ({} steps)",
            run.build_number,
            config.id,
            config.steps.len()
        );

        let deadline =
            tokio::time::Instant::now() + config.failure_conditions.execution_timeout;

        // A fatal failure stops `always` steps but enables on-failure-only ones
        let mut failed = false;
        let mut timed_out = false;
        let mut was_cancelled = false;

        for step in &config.steps {
            if timed_out || was_cancelled {
                run.step_results
                    .push(StepResult::not_run(&step.name, "run was torn down"));
                continue;
            }

            match step.mode {
                ExecutionMode::Always if failed => {
                    run.step_results
                        .push(StepResult::not_run(&step.name, "earlier step failed"));
                    continue;
                }
                ExecutionMode::OnFailureOnly if !failed => {
                    run.step_results
                        .push(StepResult::not_run(&step.name, "no prior failure"));
                    continue;
                }
                _ => {}
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                timed_out = true;
                run.step_results
                    .push(StepResult::not_run(&step.name, "run execution timeout"));
                continue;
            }
            let budget = deadline - now;

            let result = self
                .executor
                .execute(step, workdir, env, cancelled.clone(), Some(budget))
                .await;

            match &result.outcome {
                StepOutcome::Succeeded => {}
                StepOutcome::Failed { exit_code } => match step.mode {
                    ExecutionMode::OnFailureOnly => {
                        // Diagnostic steps may fail without changing the verdict
                        warn!(
                            "Diagnostic step '{}' exited with code {}",
                            step.name, exit_code
                        );
                    }
                    ExecutionMode::Always => {
                        if config.failure_conditions.non_zero_exit_code {
                            failed = true;
                        } else {
                            warn!(
                                "Step '{}' exited with code {} (tolerated by configuration)",
                                step.name, exit_code
                            );
                        }
                    }
                },
                StepOutcome::TimedOut { .. } => {
                    // Distinguish a step's own timeout from run-budget exhaustion
                    if budget < step.timeout {
                        timed_out = true;
                    } else {
                        failed = true;
                    }
                }
                StepOutcome::Cancelled => {
                    was_cancelled = true;
                }
                StepOutcome::NotRun { .. } => {}
            }

            run.step_results.push(result);
        }

        let status = if timed_out {
            RunStatus::TimedOut
        } else if was_cancelled || failed {
            RunStatus::Failed
        } else {
            RunStatus::Success
        };

        run.finish(status);
        info!(
            "Run #{} of '{}' finished: {}",
            run.build_number, config.id, run.status
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::build::{FailureConditions, NotificationRules, Step};
    use std::time::Duration;

    fn config_with(steps: Vec<Step>, non_zero_fails: bool, timeout: Duration) -> BuildConfiguration {
        BuildConfiguration {
            id: "cfg".into(),
            name: "Config".into(),
            steps,
            dependencies: vec![],
            trigger: None,
            params: Default::default(),
            secret_params: Default::default(),
            deploy_hook_secret: None,
            failure_conditions: FailureConditions {
                execution_timeout: timeout,
                non_zero_exit_code: non_zero_fails,
            },
            notifications: NotificationRules::default(),
            allow_concurrent_runs: false,
        }
    }

    fn step(name: &str, script: &str, mode: ExecutionMode) -> Step {
        Step {
            name: name.into(),
            script: script.into(),
            mode,
            timeout: Duration::from_secs(30),
        }
    }

    fn no_cancel() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    async fn run_to_end(config: &BuildConfiguration) -> BuildRun {
        let scheduler = PipelineScheduler::default();
        let mut run = BuildRun::new(&config.id, 1, None);
        scheduler
            .execute_run(
                config,
                &mut run,
                &HashMap::new(),
                &std::env::temp_dir(),
                no_cancel(),
            )
            .await;
        run
    }

    #[tokio::test]
    async fn test_all_steps_succeed() {
        let config = config_with(
            vec![
                step("one", "echo one", ExecutionMode::Always),
                step("two", "echo two", ExecutionMode::Always),
            ],
            true,
            Duration::from_secs(60),
        );

        let run = run_to_end(&config).await;
        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(run.step_results.len(), 2);
        assert!(run.step_results.iter().all(|r| r.outcome.is_success()));
    }

    #[tokio::test]
    async fn test_failure_skips_later_always_steps() {
        let config = config_with(
            vec![
                step("break", "exit 1", ExecutionMode::Always),
                step("after", "echo after", ExecutionMode::Always),
            ],
            true,
            Duration::from_secs(60),
        );

        let run = run_to_end(&config).await;
        assert_eq!(run.status, RunStatus::Failed);
        assert!(matches!(
            run.step_results[1].outcome,
            StepOutcome::NotRun { .. }
        ));
    }

    #[tokio::test]
    async fn test_on_failure_only_runs_after_failure() {
        let config = config_with(
            vec![
                step("break", "exit 1", ExecutionMode::Always),
                step("diagnose", "echo collecting logs", ExecutionMode::OnFailureOnly),
            ],
            true,
            Duration::from_secs(60),
        );

        let run = run_to_end(&config).await;
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.step_results[1].outcome.is_success());
        assert!(run.step_results[1].log.contains("collecting logs"));
    }

    #[tokio::test]
    async fn test_on_failure_only_skipped_on_success() {
        let config = config_with(
            vec![
                step("ok", "echo fine", ExecutionMode::Always),
                step("diagnose", "echo should not run", ExecutionMode::OnFailureOnly),
            ],
            true,
            Duration::from_secs(60),
        );

        let run = run_to_end(&config).await;
        assert_eq!(run.status, RunStatus::Success);
        assert!(matches!(
            run.step_results[1].outcome,
            StepOutcome::NotRun { .. }
        ));
    }

    #[tokio::test]
    async fn test_tolerated_non_zero_exit_keeps_run_green() {
        let config = config_with(
            vec![
                step("flaky", "exit 2", ExecutionMode::Always),
                step("after", "echo still running", ExecutionMode::Always),
            ],
            false, // nonZeroExitCode tolerated
            Duration::from_secs(60),
        );

        let run = run_to_end(&config).await;
        assert_eq!(run.status, RunStatus::Success);
        assert!(matches!(
            run.step_results[0].outcome,
            StepOutcome::Failed { exit_code: 2 }
        ));
        assert!(run.step_results[1].outcome.is_success());
    }

    #[tokio::test]
    async fn test_run_execution_timeout_marks_timed_out() {
        let config = config_with(
            vec![
                step("slow", "sleep 30", ExecutionMode::Always),
                step("after", "echo never", ExecutionMode::Always),
            ],
            true,
            Duration::from_secs(1),
        );

        let begun = std::time::Instant::now();
        let run = run_to_end(&config).await;

        assert!(begun.elapsed() < Duration::from_secs(10));
        assert_eq!(run.status, RunStatus::TimedOut);
        assert!(matches!(
            run.step_results[1].outcome,
            StepOutcome::NotRun { .. }
        ));
        assert!(run.finished_at.is_some(), "run must never stay pending");
    }

    #[tokio::test]
    async fn test_step_timeout_marks_run_failed() {
        let mut slow = step("slow", "sleep 30", ExecutionMode::Always);
        slow.timeout = Duration::from_secs(1);
        let config = config_with(vec![slow], true, Duration::from_secs(600));

        let run = run_to_end(&config).await;
        assert_eq!(run.status, RunStatus::Failed);
        assert!(matches!(
            run.step_results[0].outcome,
            StepOutcome::TimedOut { .. }
        ));
    }

    #[tokio::test]
    async fn test_cancelled_run_is_failed_not_pending() {
        let config = config_with(
            vec![step("slow", "sleep 30", ExecutionMode::Always)],
            true,
            Duration::from_secs(600),
        );

        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        });

        let scheduler = PipelineScheduler::default();
        let mut run = BuildRun::new("cfg", 1, None);
        scheduler
            .execute_run(
                &config,
                &mut run,
                &HashMap::new(),
                &std::env::temp_dir(),
                cancelled,
            )
            .await;

        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.status.is_terminal());
    }
}
