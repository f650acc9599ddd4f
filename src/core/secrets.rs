//! Secret resolution
//!
//! Configuration files carry secret *references*, never secret values.
//! References are resolved at execution time through a `SecretResolver`,
//! so deploy-hook URLs and access keys stay out of version control.

use std::collections::HashMap;

use crate::core::error::OrchestratorError;

/// Resolves secret references to their values at execution time
pub trait SecretResolver: Send + Sync {
    fn resolve(&self, key: &str) -> Result<String, OrchestratorError>;
}

/// Resolves secrets from process environment variables
#[derive(Debug, Default)]
pub struct EnvSecretResolver;

impl SecretResolver for EnvSecretResolver {
    fn resolve(&self, key: &str) -> Result<String, OrchestratorError> {
        std::env::var(key).map_err(|_| OrchestratorError::SecretNotFound(key.to_string()))
    }
}

/// Fixed in-memory secrets, for tests and demos
#[derive(Debug, Default)]
pub struct StaticSecretResolver {
    secrets: HashMap<String, String>,
}

impl StaticSecretResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(key.into(), value.into());
        self
    }
}

impl SecretResolver for StaticSecretResolver {
    fn resolve(&self, key: &str) -> Result<String, OrchestratorError> {
        self.secrets
            .get(key)
            .cloned()
            .ok_or_else(|| OrchestratorError::SecretNotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_resolver() {
        let resolver = StaticSecretResolver::new().with_secret("HOOK", "https://example/deploy");
        assert_eq!(resolver.resolve("HOOK").unwrap(), "https://example/deploy");
        assert!(matches!(
            resolver.resolve("MISSING"),
            Err(OrchestratorError::SecretNotFound(_))
        ));
    }

    #[test]
    fn test_env_resolver() {
        std::env::set_var("CONVEYOR_TEST_SECRET", "value");
        let resolver = EnvSecretResolver;
        assert_eq!(resolver.resolve("CONVEYOR_TEST_SECRET").unwrap(), "value");
        assert!(resolver.resolve("CONVEYOR_TEST_SECRET_MISSING").is_err());
    }
}
