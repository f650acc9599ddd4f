//! Declarative project configuration from YAML
//!
//! A project file names its build configurations, their shell steps,
//! trigger rules, snapshot dependencies and parameters. The file is the
//! whole runtime surface: there is no mutable pipeline state outside the
//! registry built from it.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::core::build::BuildConfiguration;
use crate::core::graph::DependencyGraph;

/// Project-wide defaults applied to steps that do not override them
#[derive(Debug, Clone)]
pub struct StepDefaults {
    /// Per-step timeout in seconds
    pub timeout_secs: u64,

    /// Whole-run execution timeout in seconds
    pub execution_timeout_secs: u64,
}

impl Default for StepDefaults {
    fn default() -> Self {
        Self {
            timeout_secs: 300,            // 5 minutes
            execution_timeout_secs: 2700, // 45 minutes
        }
    }
}

/// Top-level project configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// VCS root this project watches
    #[serde(default)]
    pub vcs: Option<VcsRootConfig>,

    /// Build configurations
    pub configurations: Vec<BuildConfigurationConfig>,

    /// Default per-step timeout (seconds)
    #[serde(default)]
    pub default_step_timeout_secs: Option<u64>,

    /// Default whole-run timeout (seconds)
    #[serde(default)]
    pub default_execution_timeout_secs: Option<u64>,

    /// Maximum number of concurrently executing runs
    #[serde(default)]
    pub max_concurrent_runs: Option<usize>,
}

/// VCS root description. Connection details only; polling/webhook delivery
/// belongs to the external VCS collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VcsRootConfig {
    pub url: String,

    /// Default branch ref, e.g. `refs/heads/main`
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_branch() -> String {
    "refs/heads/main".to_string()
}

/// One build configuration as written in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfigurationConfig {
    /// Unique configuration id
    pub id: String,

    /// Human-readable name
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Ordered shell steps
    pub steps: Vec<StepConfig>,

    /// Snapshot dependencies on other configurations
    #[serde(default)]
    pub depends_on: Vec<DependencyConfig>,

    /// VCS trigger rule
    #[serde(default)]
    pub trigger: Option<TriggerConfig>,

    /// Plain parameters, injected as environment variables
    #[serde(default)]
    pub params: HashMap<String, String>,

    /// Secret parameters: env var name -> secret key resolved at run time
    #[serde(default)]
    pub secrets: HashMap<String, String>,

    /// Deployment dispatch at the end of a successful run
    #[serde(default)]
    pub deploy: Option<DeployConfig>,

    #[serde(default)]
    pub failure_conditions: Option<FailureConditionsConfig>,

    #[serde(default)]
    pub notifications: Option<NotificationsConfig>,

    /// Allow overlapping runs of this configuration
    #[serde(default)]
    pub allow_concurrent_runs: bool,
}

/// A shell step as written in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Step name, unique within its configuration
    pub name: String,

    /// Shell script body
    pub script: String,

    /// Execution mode
    #[serde(default)]
    pub mode: ExecutionModeConfig,

    /// Timeout override for this step (seconds)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Execution mode as written in YAML
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionModeConfig {
    #[default]
    Always,
    OnFailureOnly,
}

/// Snapshot dependency as written in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyConfig {
    /// Upstream configuration id
    pub id: String,

    /// Failure-propagation policy
    #[serde(default)]
    pub on_failure: DependencyPolicyConfig,
}

/// Dependency policy as written in YAML
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyPolicyConfig {
    #[default]
    FailToStart,
    AllowContinue,
}

/// VCS trigger rule as written in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Branch filter rules, e.g. `+:refs/heads/main` or `+:* -:refs/heads/wip-*`
    #[serde(default = "default_branch_filter")]
    pub branch_filter: String,

    /// One run per check-in (no coalescing)
    #[serde(default = "default_true")]
    pub per_checkin: bool,

    /// Coalesce check-ins from the same committer within the debounce window
    #[serde(default)]
    pub group_by_committer: bool,

    /// Debounce window in seconds, used when coalescing
    #[serde(default = "default_debounce")]
    pub debounce_secs: u64,
}

fn default_branch_filter() -> String {
    "+:*".to_string()
}

fn default_true() -> bool {
    true
}

fn default_debounce() -> u64 {
    60
}

/// Deployment dispatch as written in YAML. The hook URL itself is a secret
/// reference, never a literal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Secret key whose value is the deploy hook URL
    pub hook_secret: String,
}

/// Failure conditions as written in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureConditionsConfig {
    /// Whole-run execution timeout (seconds)
    #[serde(default)]
    pub execution_timeout_secs: Option<u64>,

    /// When false, non-zero step exits are tolerated
    #[serde(default = "default_true")]
    pub non_zero_exit_code: bool,
}

/// Notification rules as written in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub recipients: Vec<String>,

    #[serde(default)]
    pub on_start: bool,

    #[serde(default = "default_true")]
    pub on_success: bool,

    #[serde(default = "default_true")]
    pub on_failure: bool,
}

impl ProjectConfig {
    /// Load project configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse project configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ProjectConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the project configuration. The dependency relation is also
    /// checked for cycles here so a cyclic project fails at load, not at
    /// trigger time.
    pub fn validate(&self) -> Result<()> {
        if self.configurations.is_empty() {
            anyhow::bail!("Project '{}' defines no build configurations", self.name);
        }

        // Unique configuration ids
        let mut seen_ids = std::collections::HashSet::new();
        for config in &self.configurations {
            if !seen_ids.insert(&config.id) {
                anyhow::bail!("Duplicate build configuration id: {}", config.id);
            }
        }

        let ids: std::collections::HashSet<_> =
            self.configurations.iter().map(|c| &c.id).collect();

        for config in &self.configurations {
            if config.steps.is_empty() {
                anyhow::bail!("Build configuration '{}' has no steps", config.id);
            }

            // Unique step names within a configuration
            let mut seen_steps = std::collections::HashSet::new();
            for step in &config.steps {
                if !seen_steps.insert(&step.name) {
                    anyhow::bail!(
                        "Build configuration '{}' has duplicate step name '{}'",
                        config.id,
                        step.name
                    );
                }
                if step.script.trim().is_empty() {
                    anyhow::bail!(
                        "Step '{}' of configuration '{}' has an empty script",
                        step.name,
                        config.id
                    );
                }
            }

            // Dependencies must reference existing configurations
            for dep in &config.depends_on {
                if !ids.contains(&dep.id) {
                    anyhow::bail!(
                        "Configuration '{}' depends on non-existent configuration '{}'",
                        config.id,
                        dep.id
                    );
                }
            }

            // A deploy hook is a secret reference; a plain parameter of the
            // same name would put the URL back into version control.
            if let Some(deploy) = &config.deploy {
                if config.params.contains_key(&deploy.hook_secret) {
                    anyhow::bail!(
                        "Configuration '{}': deploy hook secret '{}' collides with a plain parameter; \
                         deploy hooks must not be stored as plaintext parameters",
                        config.id,
                        deploy.hook_secret
                    );
                }
            }
        }

        // Cycle check over the snapshot dependency relation
        self.build_registry()?;

        Ok(())
    }

    /// Build the immutable domain registry: configurations plus the
    /// validated dependency graph.
    pub fn build_registry(&self) -> Result<(Vec<BuildConfiguration>, DependencyGraph)> {
        let defaults = StepDefaults {
            timeout_secs: self
                .default_step_timeout_secs
                .unwrap_or_else(|| StepDefaults::default().timeout_secs),
            execution_timeout_secs: self
                .default_execution_timeout_secs
                .unwrap_or_else(|| StepDefaults::default().execution_timeout_secs),
        };

        let configurations: Vec<BuildConfiguration> = self
            .configurations
            .iter()
            .map(|c| BuildConfiguration::from_config(c, &defaults))
            .collect();

        let graph = DependencyGraph::new(&configurations)?;
        Ok((configurations, graph))
    }
}
