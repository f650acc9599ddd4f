//! The five-stage pipeline: setup, tests, smoke test, package, deploy

use conveyor::{RunStatus, StaticSecretResolver};
use tempfile::tempdir;

use crate::helpers::orchestrator_with_secrets;

const FIVE_STAGE: &str = r#"
name: "Webapp"
configurations:
  - id: "setup"
    name: "Install Dependencies"
    steps:
      - name: "install"
        script: "echo installing > setup.txt"
  - id: "test"
    name: "Run Tests"
    depends_on: [{ id: "setup" }]
    steps:
      - name: "pytest"
        script: "echo testing build $BUILD_NUMBER > test.txt"
      - name: "collect logs"
        script: "echo diagnostics > diagnostics.txt"
        mode: on-failure-only
  - id: "smoke"
    name: "Smoke Test"
    depends_on: [{ id: "test" }]
    steps:
      - name: "probe"
        script: "test -f test.txt"
  - id: "package"
    name: "Package"
    depends_on: [{ id: "smoke" }]
    params:
      DIST_DIR: "dist"
    steps:
      - name: "archive"
        script: "mkdir -p $DIST_DIR && echo artifact > $DIST_DIR/webapp-$BUILD_NUMBER.txt"
  - id: "deploy"
    name: "Deploy"
    depends_on: [{ id: "package" }]
    deploy:
      hook_secret: DEPLOY_HOOK
    steps:
      - name: "verify artifact"
        script: "test -f dist/webapp-$BUILD_NUMBER.txt"
"#;

#[tokio::test]
async fn five_stage_pipeline_deploys_on_success() {
    let mut server = mockito::Server::new_async().await;
    let hook = server
        .mock("POST", "/deploy/srv-1?key=secret")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": "dep-001"}"#)
        .create_async()
        .await;

    let workdir = tempdir().unwrap();
    let secrets = StaticSecretResolver::new()
        .with_secret("DEPLOY_HOOK", format!("{}/deploy/srv-1?key=secret", server.url()));
    let orch = orchestrator_with_secrets(FIVE_STAGE, secrets, workdir.path());

    let runs = orch.run_pipeline("deploy", None).await.unwrap();

    let order: Vec<&str> = runs.iter().map(|r| r.configuration_id.as_str()).collect();
    assert_eq!(order, vec!["setup", "test", "smoke", "package", "deploy"]);
    assert!(runs.iter().all(|r| r.status == RunStatus::Success));

    // The deploy hook fired exactly once and yielded a deployment id
    hook.assert_async().await;
    assert_eq!(runs[4].deployment_id.as_deref(), Some("dep-001"));

    // Steps saw BUILD_NUMBER and shared the working directory
    assert!(workdir.path().join("dist/webapp-1.txt").exists());

    // The diagnostic step never ran on a green build
    assert!(!workdir.path().join("diagnostics.txt").exists());
    assert!(matches!(
        runs[1].step_results[1].outcome,
        conveyor::StepOutcome::NotRun { .. }
    ));
}

#[tokio::test]
async fn second_launch_increments_build_numbers() {
    let workdir = tempdir().unwrap();
    let orch = crate::helpers::orchestrator(
        r#"
name: "Counting"
configurations:
  - id: "test"
    name: "Run Tests"
    steps:
      - name: "run"
        script: "echo $BUILD_NUMBER >> numbers.txt"
"#,
        workdir.path(),
    );

    orch.run_pipeline("test", None).await.unwrap();
    orch.run_pipeline("test", None).await.unwrap();

    let numbers = std::fs::read_to_string(workdir.path().join("numbers.txt")).unwrap();
    assert_eq!(numbers, "1\n2\n");
}
