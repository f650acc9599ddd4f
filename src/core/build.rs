//! Build configuration and step domain models

use std::collections::HashMap;
use std::time::Duration;

use crate::core::config::{
    BuildConfigurationConfig, DependencyPolicyConfig, ExecutionModeConfig, StepDefaults,
};
use crate::trigger::TriggerPolicy;

/// How a step participates in the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Runs unconditionally (as long as no earlier fatal failure occurred)
    Always,
    /// Runs only after a prior step has failed; used for diagnostics/cleanup
    OnFailureOnly,
}

/// A single shell step in a build configuration
#[derive(Debug, Clone)]
pub struct Step {
    /// Human-readable step name, unique within its configuration
    pub name: String,

    /// Shell script body executed by the step executor
    pub script: String,

    /// Execution mode (always | on-failure-only)
    pub mode: ExecutionMode,

    /// Per-step timeout
    pub timeout: Duration,
}

/// Failure-propagation policy of a dependency edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyPolicy {
    /// Downstream never starts if the upstream did not succeed
    FailToStart,
    /// Downstream starts regardless of the upstream result
    AllowContinue,
}

/// An edge from a downstream configuration to one of its upstreams
#[derive(Debug, Clone)]
pub struct DependencyEdge {
    /// Upstream configuration id
    pub upstream: String,

    /// What to do when the upstream did not succeed
    pub policy: DependencyPolicy,
}

/// Failure conditions for a whole run
#[derive(Debug, Clone)]
pub struct FailureConditions {
    /// Bound on total run execution time
    pub execution_timeout: Duration,

    /// When false, non-zero step exits are recorded but do not fail the run
    pub non_zero_exit_code: bool,
}

/// Notification settings for a configuration
#[derive(Debug, Clone, Default)]
pub struct NotificationRules {
    pub recipients: Vec<String>,
    pub on_start: bool,
    pub on_success: bool,
    pub on_failure: bool,
}

/// A named, ordered pipeline definition. Immutable after configuration load.
#[derive(Debug, Clone)]
pub struct BuildConfiguration {
    /// Unique configuration id
    pub id: String,

    /// Display name
    pub name: String,

    /// Ordered steps
    pub steps: Vec<Step>,

    /// Upstream dependencies with failure policies
    pub dependencies: Vec<DependencyEdge>,

    /// Trigger policy, if this configuration is triggered by VCS changes
    pub trigger: Option<TriggerPolicy>,

    /// Plain build parameters, injected as environment variables
    pub params: HashMap<String, String>,

    /// Secret references (env var name -> secret key), resolved at run time
    pub secret_params: HashMap<String, String>,

    /// Deploy hook secret key, when this configuration ends in a deployment
    pub deploy_hook_secret: Option<String>,

    /// Run-level failure conditions
    pub failure_conditions: FailureConditions,

    /// Notification rules
    pub notifications: NotificationRules,

    /// Allow more than one active run of this configuration at a time
    pub allow_concurrent_runs: bool,
}

impl BuildConfiguration {
    /// Create a configuration from its config block
    pub fn from_config(config: &BuildConfigurationConfig, defaults: &StepDefaults) -> Self {
        let steps = config
            .steps
            .iter()
            .map(|s| Step {
                name: s.name.clone(),
                script: s.script.clone(),
                mode: match s.mode {
                    ExecutionModeConfig::Always => ExecutionMode::Always,
                    ExecutionModeConfig::OnFailureOnly => ExecutionMode::OnFailureOnly,
                },
                timeout: Duration::from_secs(s.timeout_secs.unwrap_or(defaults.timeout_secs)),
            })
            .collect();

        let dependencies = config
            .depends_on
            .iter()
            .map(|d| DependencyEdge {
                upstream: d.id.clone(),
                policy: match d.on_failure {
                    DependencyPolicyConfig::FailToStart => DependencyPolicy::FailToStart,
                    DependencyPolicyConfig::AllowContinue => DependencyPolicy::AllowContinue,
                },
            })
            .collect();

        let failure_conditions = FailureConditions {
            execution_timeout: Duration::from_secs(
                config
                    .failure_conditions
                    .as_ref()
                    .and_then(|f| f.execution_timeout_secs)
                    .unwrap_or(defaults.execution_timeout_secs),
            ),
            non_zero_exit_code: config
                .failure_conditions
                .as_ref()
                .map(|f| f.non_zero_exit_code)
                .unwrap_or(true),
        };

        let notifications = config
            .notifications
            .as_ref()
            .map(|n| NotificationRules {
                recipients: n.recipients.clone(),
                on_start: n.on_start,
                on_success: n.on_success,
                on_failure: n.on_failure,
            })
            .unwrap_or_default();

        BuildConfiguration {
            id: config.id.clone(),
            name: config.name.clone(),
            steps,
            dependencies,
            trigger: config.trigger.as_ref().map(TriggerPolicy::from_config),
            params: config.params.clone(),
            secret_params: config.secrets.clone(),
            deploy_hook_secret: config.deploy.as_ref().map(|d| d.hook_secret.clone()),
            failure_conditions,
            notifications,
            allow_concurrent_runs: config.allow_concurrent_runs,
        }
    }

    /// Assemble the environment for a step of this configuration.
    ///
    /// Plain parameters come first so that `BUILD_NUMBER` and resolved
    /// secrets always win over a parameter of the same name.
    pub fn step_env(
        &self,
        build_number: u64,
        resolved_secrets: &HashMap<String, String>,
    ) -> HashMap<String, String> {
        let mut env = self.params.clone();
        env.extend(resolved_secrets.clone());
        env.insert("BUILD_NUMBER".to_string(), build_number.to_string());
        env
    }

    /// Look up a step by name
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }
}
