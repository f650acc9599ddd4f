//! Shared scenario helpers

use std::path::Path;
use std::sync::Arc;

use conveyor::{Orchestrator, ProjectConfig, StaticSecretResolver};

/// Build an orchestrator for a YAML project with fixed secrets
pub fn orchestrator_with_secrets(
    yaml: &str,
    secrets: StaticSecretResolver,
    workdir: &Path,
) -> Arc<Orchestrator> {
    let project = ProjectConfig::from_yaml(yaml).expect("project config should be valid");
    Arc::new(
        Orchestrator::new(&project, Arc::new(secrets), workdir)
            .expect("orchestrator should build from a validated project"),
    )
}

/// Build an orchestrator with no secrets
pub fn orchestrator(yaml: &str, workdir: &Path) -> Arc<Orchestrator> {
    orchestrator_with_secrets(yaml, StaticSecretResolver::new(), workdir)
}
