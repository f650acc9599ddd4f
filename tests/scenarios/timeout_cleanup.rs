//! Timeout teardown kills the whole process tree

use std::time::Duration;

use conveyor::{RunStatus, StepOutcome};
use tempfile::tempdir;

use crate::helpers::orchestrator;

#[tokio::test]
async fn timed_out_step_leaves_no_orphan_processes() {
    let workdir = tempdir().unwrap();
    // The step backgrounds a child that would write a marker after the
    // timeout. Killing the process group must take the child down too.
    let orch = orchestrator(
        r#"
name: "Teardown"
configurations:
  - id: "smoke"
    name: "Smoke Test"
    steps:
      - name: "serve and hang"
        script: |
          touch started.txt
          (sleep 3; touch orphan.txt) &
          sleep 30
        timeout_secs: 1
"#,
        workdir.path(),
    );

    let begun = std::time::Instant::now();
    let runs = orch.run_pipeline("smoke", None).await.unwrap();

    assert!(begun.elapsed() < Duration::from_secs(10));
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(matches!(
        runs[0].step_results[0].outcome,
        StepOutcome::TimedOut { timeout_secs: 1 }
    ));

    // The step did start
    assert!(workdir.path().join("started.txt").exists());

    // Give a surviving orphan time to prove itself, then check it died
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(
        !workdir.path().join("orphan.txt").exists(),
        "backgrounded child survived the process-group kill"
    );
}

#[tokio::test]
async fn run_budget_exhaustion_marks_run_timed_out() {
    let workdir = tempdir().unwrap();
    let orch = orchestrator(
        r#"
name: "Budget"
configurations:
  - id: "slow"
    name: "Slow"
    failure_conditions:
      execution_timeout_secs: 1
    steps:
      - name: "first"
        script: "sleep 30"
      - name: "second"
        script: "echo never"
"#,
        workdir.path(),
    );

    let runs = orch.run_pipeline("slow", None).await.unwrap();

    assert_eq!(runs[0].status, RunStatus::TimedOut);
    assert!(runs[0].finished_at.is_some(), "run must reach a terminal state");
    assert!(matches!(
        runs[0].step_results[1].outcome,
        StepOutcome::NotRun { .. }
    ));
}
