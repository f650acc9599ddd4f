//! Deploy hook dispatch at the end of a pipeline

use conveyor::{RunStatus, StaticSecretResolver};
use tempfile::tempdir;

use crate::helpers::orchestrator_with_secrets;

fn deploy_chain(hook_url: &str) -> (String, StaticSecretResolver) {
    let yaml = r#"
name: "Shipping"
configurations:
  - id: "package"
    name: "Package"
    steps:
      - name: "pack"
        script: "echo packaged"
  - id: "deploy"
    name: "Deploy"
    depends_on: [{ id: "package" }]
    deploy:
      hook_secret: DEPLOY_HOOK
    steps:
      - name: "final check"
        script: "echo ready"
"#;
    let secrets = StaticSecretResolver::new().with_secret("DEPLOY_HOOK", hook_url);
    (yaml.to_string(), secrets)
}

#[tokio::test]
async fn hook_failure_fails_an_otherwise_green_run() {
    let mut server = mockito::Server::new_async().await;
    let hook = server
        .mock("POST", "/deploy")
        .with_status(503)
        .expect(1) // no retry
        .create_async()
        .await;

    let workdir = tempdir().unwrap();
    let (yaml, secrets) = deploy_chain(&format!("{}/deploy", server.url()));
    let orch = orchestrator_with_secrets(&yaml, secrets, workdir.path());

    let runs = orch.run_pipeline("deploy", None).await.unwrap();

    assert_eq!(runs[0].status, RunStatus::Success);
    // Every step of deploy succeeded; the hook is what failed it
    assert_eq!(runs[1].status, RunStatus::Failed);
    assert!(runs[1].step_results[0].outcome.is_success());
    assert!(runs[1].deployment_id.is_none());
    hook.assert_async().await;
}

#[tokio::test]
async fn hook_is_not_dispatched_for_failed_runs() {
    let mut server = mockito::Server::new_async().await;
    let hook = server
        .mock("POST", "/deploy")
        .expect(0)
        .create_async()
        .await;

    let yaml = r#"
name: "Broken"
configurations:
  - id: "deploy"
    name: "Deploy"
    deploy:
      hook_secret: DEPLOY_HOOK
    steps:
      - name: "check"
        script: "exit 1"
"#;
    let workdir = tempdir().unwrap();
    let secrets =
        StaticSecretResolver::new().with_secret("DEPLOY_HOOK", format!("{}/deploy", server.url()));
    let orch = orchestrator_with_secrets(yaml, secrets, workdir.path());

    let runs = orch.run_pipeline("deploy", None).await.unwrap();
    assert_eq!(runs[0].status, RunStatus::Failed);
    hook.assert_async().await;
}

#[tokio::test]
async fn unresolvable_hook_secret_fails_the_run() {
    let yaml = r#"
name: "Misconfigured"
configurations:
  - id: "deploy"
    name: "Deploy"
    deploy:
      hook_secret: NOT_PROVIDED
    steps:
      - name: "check"
        script: "echo ready"
"#;
    let workdir = tempdir().unwrap();
    let orch = orchestrator_with_secrets(yaml, StaticSecretResolver::new(), workdir.path());

    let runs = orch.run_pipeline("deploy", None).await.unwrap();
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0].deployment_id.is_none());
}
