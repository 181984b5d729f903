mod defaults;
mod types;
mod validation;

pub use defaults::*;
pub use types::*;
pub use validation::*;

use crate::env::EnvSource;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level agentflow configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub http: HttpConfig,
    /// OpenAI-compatible providers keyed by the name steps use.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl EngineConfig {
    /// Load configuration from file, environment, and defaults.
    pub fn load(path: Option<&str>, env: &dyn EnvSource) -> Result<Self> {
        let config_path = path.map(PathBuf::from).or_else(find_config_file);

        let mut config = match config_path {
            Some(path) if path.exists() => {
                info!("Loading config from {}", path.display());
                load_config_file(&path)?
            }
            Some(path) => anyhow::bail!("Config file '{}' does not exist", path.display()),
            None => {
                info!("No config file found, using defaults");
                EngineConfig::default()
            }
        };

        config.apply_env_overrides(env);
        Ok(config)
    }

    /// Write default configuration to a file.
    pub fn write_default(path: &str) -> Result<()> {
        let config = EngineConfig::default();
        let json = serde_json::to_string_pretty(&config)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self, env: &dyn EnvSource) {
        if let Some(path) = env.var("AGENTFLOW_SECRETS_STORE") {
            self.secrets.store_path = Some(PathBuf::from(path));
        }

        if let Some(delay) = env.var("AGENTFLOW_RETRY_BASE_DELAY_MS") {
            if let Ok(delay) = delay.parse() {
                self.retry.base_delay_ms = delay;
            }
        }

        if let Some(secs) = env.var("AGENTFLOW_HTTP_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                self.http.timeout_secs = Some(secs);
            }
        }
    }

    /// Location of the local secret store.
    pub fn secrets_store_path(&self, env: &dyn EnvSource) -> PathBuf {
        self.secrets
            .store_path
            .clone()
            .unwrap_or_else(|| resolve_state_dir(env).join(DEFAULT_SECRETS_FILE))
    }
}

/// Find the configuration file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    let candidates = [
        PathBuf::from("agentflow.json"),
        PathBuf::from("agentflow.yaml"),
        PathBuf::from("agentflow.yml"),
        PathBuf::from("agentflow.toml"),
    ];

    for path in &candidates {
        if path.exists() {
            return Some(path.clone());
        }
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(".agentflow").join("config.json");
        if home_config.exists() {
            return Some(home_config);
        }
    }

    None
}

/// Resolve the state directory for persistent data.
pub fn resolve_state_dir(env: &dyn EnvSource) -> PathBuf {
    if let Some(dir) = env.var("AGENTFLOW_STATE_DIR") {
        return PathBuf::from(dir);
    }

    dirs::home_dir()
        .map(|h| h.join(".agentflow"))
        .unwrap_or_else(|| PathBuf::from(".agentflow"))
}

/// Load configuration from a file path.
fn load_config_file(path: &Path) -> Result<EngineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;

    let config = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
        Some("toml") => toml::from_str(&content)?,
        _ => json5::from_str(&content).or_else(|_| serde_json::from_str(&content))?,
    };

    Ok(config)
}
