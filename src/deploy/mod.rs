//! Deployment dispatcher
//!
//! Fires a deploy webhook after a successful pipeline run. The hook URL is
//! a secret resolved at dispatch time and is redacted in every log line,
//! since deploy hooks commonly embed an access key in the URL itself.
//!
//! A non-2xx response or a network error is fatal for the run and the hook
//! is never retried: deploy endpoints are not assumed idempotent.

use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::core::error::OrchestratorError;

const DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Body shape of a deploy hook response, all fields optional
#[derive(Debug, Deserialize)]
struct HookResponse {
    id: Option<String>,
}

/// Result of an accepted deploy dispatch
#[derive(Debug)]
pub struct DeployOutcome {
    /// Deployment identifier from the hook response, when the endpoint
    /// provides one
    pub deployment_id: Option<String>,

    /// Non-fatal problem with the accepted response, reported as
    /// `MalformedDeployResponse`
    pub warning: Option<OrchestratorError>,
}

/// Sends deployment webhook requests
#[derive(Debug, Clone)]
pub struct DeploymentDispatcher {
    client: reqwest::Client,
}

impl Default for DeploymentDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl DeploymentDispatcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(DISPATCH_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    /// POST to the resolved hook URL. An accepted request always yields an
    /// outcome; an unparseable 2xx body is a warning on it, not an error.
    pub async fn dispatch(
        &self,
        configuration_id: &str,
        hook_url: &str,
    ) -> Result<DeployOutcome, OrchestratorError> {
        info!("Dispatching deploy hook for '{}'", configuration_id);

        let response = self
            .client
            .post(hook_url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                // The error is stringified without the URL to keep the
                // secret out of logs
                OrchestratorError::DeployHookUnreachable(format!(
                    "request for '{configuration_id}' failed: {}",
                    e.without_url()
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(OrchestratorError::DeployHookUnreachable(format!(
                "hook for '{configuration_id}' returned {status}"
            )));
        }

        // A deployment id is useful but optional; endpoints that return
        // plain text or no body still count as accepted.
        match response.json::<HookResponse>().await {
            Ok(HookResponse { id: Some(id) }) => {
                info!("Deployment accepted for '{}': {}", configuration_id, id);
                Ok(DeployOutcome {
                    deployment_id: Some(id),
                    warning: None,
                })
            }
            Ok(HookResponse { id: None }) => {
                info!("Deployment accepted for '{}'", configuration_id);
                Ok(DeployOutcome {
                    deployment_id: None,
                    warning: None,
                })
            }
            Err(_) => {
                let warning =
                    OrchestratorError::MalformedDeployResponse(configuration_id.to_string());
                warn!("{warning}");
                Ok(DeployOutcome {
                    deployment_id: None,
                    warning: Some(warning),
                })
            }
        }
    }
}
