//! VCS change events through the trigger pump

use std::time::Duration;

use conveyor::{CommitRef, RunStatus};
use tempfile::tempdir;
use tokio::sync::mpsc;

use crate::helpers::orchestrator;

fn commit(revision: &str, branch: &str, committer: &str) -> CommitRef {
    CommitRef {
        revision: revision.to_string(),
        branch: branch.to_string(),
        committer: committer.to_string(),
    }
}

async fn wait_for_runs(
    orch: &conveyor::Orchestrator,
    configuration_id: &str,
    expected: usize,
) -> Vec<conveyor::BuildRun> {
    for _ in 0..100 {
        let runs = orch.history().list(configuration_id).await.unwrap();
        if runs.len() >= expected && runs.iter().all(|r| r.status.is_terminal()) {
            return runs;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    orch.history().list(configuration_id).await.unwrap()
}

#[tokio::test]
async fn commits_in_one_debounce_window_produce_one_run() {
    let workdir = tempdir().unwrap();
    let orch = orchestrator(
        r#"
name: "Debounced"
configurations:
  - id: "test"
    name: "Run Tests"
    trigger:
      branch_filter: "+:refs/heads/main"
      per_checkin: true
      group_by_committer: true
      debounce_secs: 1
    steps:
      - name: "run"
        script: "echo tested"
"#,
        workdir.path(),
    );

    let (tx, rx) = mpsc::channel(8);
    let pump = tokio::spawn(orch.clone().watch_changes(rx));

    tx.send(commit("a1", "refs/heads/main", "alice")).await.unwrap();
    tx.send(commit("a2", "refs/heads/main", "alice")).await.unwrap();
    drop(tx);

    // The pump drains the open window before stopping
    pump.await.unwrap();
    let runs = wait_for_runs(&orch, "test", 1).await;

    assert_eq!(runs.len(), 1, "two commits in one window must coalesce");
    assert_eq!(runs[0].status, RunStatus::Success);
    // The run is attributed to the most recent commit
    assert_eq!(runs[0].commit.as_ref().unwrap().revision, "a2");
}

#[tokio::test]
async fn committers_are_grouped_separately() {
    let workdir = tempdir().unwrap();
    let orch = orchestrator(
        r#"
name: "Grouped"
configurations:
  - id: "test"
    name: "Run Tests"
    trigger:
      branch_filter: "+:refs/heads/main"
      group_by_committer: true
      debounce_secs: 1
    steps:
      - name: "run"
        script: "echo tested"
"#,
        workdir.path(),
    );

    let (tx, rx) = mpsc::channel(8);
    let pump = tokio::spawn(orch.clone().watch_changes(rx));

    tx.send(commit("a1", "refs/heads/main", "alice")).await.unwrap();
    tx.send(commit("b1", "refs/heads/main", "bob")).await.unwrap();
    drop(tx);
    pump.await.unwrap();

    let runs = wait_for_runs(&orch, "test", 2).await;
    assert_eq!(runs.len(), 2, "one run per committer");

    let mut committers: Vec<String> = runs
        .iter()
        .map(|r| r.commit.as_ref().unwrap().committer.clone())
        .collect();
    committers.sort();
    assert_eq!(committers, vec!["alice", "bob"]);
}

#[tokio::test]
async fn off_branch_commits_never_trigger() {
    let workdir = tempdir().unwrap();
    let orch = orchestrator(
        r#"
name: "Filtered"
configurations:
  - id: "test"
    name: "Run Tests"
    trigger:
      branch_filter: "+:refs/heads/main"
      per_checkin: true
    steps:
      - name: "run"
        script: "echo tested"
"#,
        workdir.path(),
    );

    let (tx, rx) = mpsc::channel(8);
    let pump = tokio::spawn(orch.clone().watch_changes(rx));

    tx.send(commit("d1", "refs/heads/develop", "alice")).await.unwrap();
    tx.send(commit("t1", "refs/tags/v1.0", "alice")).await.unwrap();
    drop(tx);
    pump.await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(orch.history().list("test").await.unwrap().is_empty());
}
