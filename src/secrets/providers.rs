//! Built-in secret providers.
//!
//! `env` reads the (injectable) environment. `aws`, `gcp` and `vault` have no
//! built-in client; [`UnsupportedSecretProvider`] stands in for them so a
//! declaration using those sources degrades to "not found" with a warning.
//! Real clients plug in through [`SecretsResolver::with_provider`].
//!
//! [`SecretsResolver::with_provider`]: super::SecretsResolver::with_provider

use super::types::{SecretProvider, SecretResolution};
use crate::agent::SecretSource;
use crate::env::SharedEnv;
use async_trait::async_trait;
use tracing::warn;

/// Resolves secrets from environment variables.
pub struct EnvSecretProvider {
    env: SharedEnv,
}

impl EnvSecretProvider {
    pub fn new(env: SharedEnv) -> Self {
        Self { env }
    }
}

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    fn source(&self) -> SecretSource {
        SecretSource::Env
    }

    fn name(&self) -> &str {
        "env"
    }

    async fn resolve(&self, key: &str) -> SecretResolution {
        match self.env.var(key) {
            Some(value) if !value.is_empty() => SecretResolution::Resolved(value),
            Some(_) => SecretResolution::NotFound(format!(
                "Environment variable '{key}' is set but empty"
            )),
            None => SecretResolution::NotFound(format!(
                "Environment variable '{key}' is not set"
            )),
        }
    }
}

/// Placeholder for a remote secret store without a built-in client.
pub struct UnsupportedSecretProvider {
    source: SecretSource,
}

impl UnsupportedSecretProvider {
    pub fn new(source: SecretSource) -> Self {
        Self { source }
    }
}

#[async_trait]
impl SecretProvider for UnsupportedSecretProvider {
    fn source(&self) -> SecretSource {
        self.source
    }

    fn name(&self) -> &str {
        self.source.as_str()
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn resolve(&self, key: &str) -> SecretResolution {
        warn!(
            "Secret source '{}' is not implemented; treating '{}' as not found",
            self.source, key
        );
        SecretResolution::Failed(format!("secret source '{}' is not implemented", self.source))
    }
}
