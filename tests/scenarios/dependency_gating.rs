//! Snapshot dependency gating across a pipeline walk

use conveyor::RunStatus;
use tempfile::tempdir;

use crate::helpers::orchestrator;

#[tokio::test]
async fn failed_upstream_skips_the_whole_downstream_chain() {
    let workdir = tempdir().unwrap();
    let orch = orchestrator(
        r#"
name: "Chain"
configurations:
  - id: "test"
    name: "Run Tests"
    steps:
      - name: "run"
        script: "exit 1"
  - id: "package"
    name: "Package"
    depends_on: [{ id: "test" }]
    steps:
      - name: "pack"
        script: "touch packaged.txt"
  - id: "deploy"
    name: "Deploy"
    depends_on: [{ id: "package" }]
    steps:
      - name: "ship"
        script: "touch shipped.txt"
"#,
        workdir.path(),
    );

    let runs = orch.run_pipeline("deploy", None).await.unwrap();

    assert_eq!(runs[0].status, RunStatus::Failed);
    assert_eq!(runs[1].status, RunStatus::Skipped);
    assert_eq!(runs[2].status, RunStatus::Skipped);

    // Skipped configurations executed nothing
    assert!(!workdir.path().join("packaged.txt").exists());
    assert!(!workdir.path().join("shipped.txt").exists());

    // Skipped runs are recorded with build numbers of their own
    let recorded = orch.history().latest("deploy").await.unwrap().unwrap();
    assert_eq!(recorded.status, RunStatus::Skipped);
    assert_eq!(recorded.build_number, 1);
}

#[tokio::test]
async fn allow_continue_edge_does_not_gate() {
    let workdir = tempdir().unwrap();
    let orch = orchestrator(
        r#"
name: "Mixed"
configurations:
  - id: "lint"
    name: "Lint"
    steps:
      - name: "run"
        script: "exit 1"
  - id: "test"
    name: "Run Tests"
    steps:
      - name: "run"
        script: "echo ok"
  - id: "package"
    name: "Package"
    depends_on:
      - id: "lint"
        on_failure: allow-continue
      - id: "test"
    steps:
      - name: "pack"
        script: "touch packaged.txt"
"#,
        workdir.path(),
    );

    let runs = orch.run_pipeline("package", None).await.unwrap();
    let by_id = |id: &str| runs.iter().find(|r| r.configuration_id == id).unwrap();

    assert_eq!(by_id("lint").status, RunStatus::Failed);
    assert_eq!(by_id("test").status, RunStatus::Success);
    // Lint is advisory; the fail-to-start edge to test is satisfied
    assert_eq!(by_id("package").status, RunStatus::Success);
    assert!(workdir.path().join("packaged.txt").exists());
}

#[tokio::test]
async fn diamond_runs_shared_upstream_once() {
    let workdir = tempdir().unwrap();
    let orch = orchestrator(
        r#"
name: "Diamond"
configurations:
  - id: "base"
    name: "Base"
    steps:
      - name: "run"
        script: "echo base >> base.txt"
  - id: "left"
    name: "Left"
    depends_on: [{ id: "base" }]
    steps:
      - name: "run"
        script: "echo left"
  - id: "right"
    name: "Right"
    depends_on: [{ id: "base" }]
    steps:
      - name: "run"
        script: "echo right"
  - id: "join"
    name: "Join"
    depends_on: [{ id: "left" }, { id: "right" }]
    steps:
      - name: "run"
        script: "echo join"
"#,
        workdir.path(),
    );

    let runs = orch.run_pipeline("join", None).await.unwrap();
    assert_eq!(runs.len(), 4);
    assert!(runs.iter().all(|r| r.status == RunStatus::Success));

    let base = std::fs::read_to_string(workdir.path().join("base.txt")).unwrap();
    assert_eq!(base, "base\n");
}
