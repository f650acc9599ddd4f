//! Step executor - runs a single shell script as a child process
//!
//! The child is spawned into its own process group so that a timeout or
//! cancellation kills the whole tree, including anything the script put in
//! the background (a smoke-tested application server, for example). Partial
//! output captured before the kill is preserved in the step result.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::build::Step;
use crate::core::error::OrchestratorError;
use crate::core::run::{StepOutcome, StepResult};

/// How often the executor checks the cancellation flag while waiting
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Executes a single step
#[derive(Debug, Clone)]
pub struct StepExecutor {
    /// Shell used to run script bodies
    shell: String,
}

impl Default for StepExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl StepExecutor {
    pub fn new() -> Self {
        Self {
            shell: "/bin/bash".to_string(),
        }
    }

    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    /// Execute a step and return its result.
    ///
    /// `budget` caps the effective timeout below the step's own timeout;
    /// the scheduler passes the remaining run budget here. `cancelled` is
    /// checked before and during execution; a set flag kills the process
    /// group immediately.
    pub async fn execute(
        &self,
        step: &Step,
        workdir: &Path,
        env: &HashMap<String, String>,
        cancelled: Arc<AtomicBool>,
        budget: Option<Duration>,
    ) -> StepResult {
        info!("Executing step: {}", step.name);

        if cancelled.load(Ordering::SeqCst) {
            return StepResult {
                step_name: step.name.clone(),
                outcome: StepOutcome::Cancelled,
                log: String::new(),
                started_at: None,
                finished_at: None,
            };
        }

        let effective_timeout = match budget {
            Some(budget) => step.timeout.min(budget),
            None => step.timeout,
        };

        let started_at = Utc::now();

        let mut command = Command::new(&self.shell);
        command
            .arg("-c")
            .arg(&step.script)
            .current_dir(workdir)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let err = OrchestratorError::Process {
                    step: step.name.clone(),
                    message: e.to_string(),
                };
                error!("{err}");
                return StepResult {
                    step_name: step.name.clone(),
                    outcome: StepOutcome::Failed { exit_code: -1 },
                    log: err.to_string(),
                    started_at: Some(started_at),
                    finished_at: Some(Utc::now()),
                };
            }
        };

        let log = Arc::new(Mutex::new(String::new()));
        let stdout_task = child.stdout.take().map(|out| capture(out, log.clone()));
        let stderr_task = child.stderr.take().map(|err| capture(err, log.clone()));

        let deadline = tokio::time::Instant::now() + effective_timeout;
        let mut outcome = loop {
            if cancelled.load(Ordering::SeqCst) {
                warn!("Step '{}' cancelled, killing process group", step.name);
                terminate(&mut child).await;
                break StepOutcome::Cancelled;
            }
            if tokio::time::Instant::now() >= deadline {
                error!(
                    "Step '{}' exceeded timeout of {}s, killing process group",
                    step.name,
                    effective_timeout.as_secs()
                );
                terminate(&mut child).await;
                break StepOutcome::TimedOut {
                    timeout_secs: effective_timeout.as_secs(),
                };
            }

            // Child::wait is cancel safe, so re-polling it each round is fine
            tokio::select! {
                status = child.wait() => {
                    break match status {
                        Ok(status) if status.success() => StepOutcome::Succeeded,
                        Ok(status) => StepOutcome::Failed {
                            exit_code: status.code().unwrap_or(-1),
                        },
                        Err(e) => {
                            error!("Failed to wait on step '{}': {}", step.name, e);
                            StepOutcome::Failed { exit_code: -1 }
                        }
                    };
                }
                _ = tokio::time::sleep(CANCEL_POLL_INTERVAL) => {}
            }
        };

        // Readers finish at pipe EOF, which the kill guarantees. Bound the
        // join anyway so a blocked pipe cannot wedge the run.
        for task in [stdout_task, stderr_task].into_iter().flatten() {
            if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
                warn!("Output capture for step '{}' did not drain", step.name);
            }
        }

        let log = log.lock().await.clone();
        if let StepOutcome::Failed { exit_code } = outcome {
            debug!("Step '{}' exited with code {}", step.name, exit_code);
        }
        if matches!(outcome, StepOutcome::Succeeded) {
            info!("Step '{}' completed successfully", step.name);
        }

        // A cancel racing a normal exit still counts as cancelled
        if cancelled.load(Ordering::SeqCst) && matches!(outcome, StepOutcome::Succeeded) {
            outcome = StepOutcome::Cancelled;
        }

        StepResult {
            step_name: step.name.clone(),
            outcome,
            log,
            started_at: Some(started_at),
            finished_at: Some(Utc::now()),
        }
    }
}

/// Append lines from a child pipe into the shared combined log
fn capture<R>(reader: R, log: Arc<Mutex<String>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut log = log.lock().await;
            log.push_str(&line);
            log.push('\n');
        }
    })
}

/// Kill the child's whole process group, then reap the child
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // The child is its own group leader (process_group(0) at spawn)
        unsafe {
            libc::killpg(pid as i32, libc::SIGKILL);
        }
    }
    let _ = child.start_kill();
    let _ = child.wait().await;
}
