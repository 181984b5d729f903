use super::defaults::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Secrets
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretsConfig {
    /// Local store file. Defaults to `<state dir>/secrets.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
    /// Environment variable holding the store key.
    #[serde(default = "default_key_env")]
    pub key_env: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            key_env: default_key_env(),
        }
    }
}

fn default_key_env() -> String {
    DEFAULT_SECRETS_KEY_ENV.to_string()
}

// ============================================================================
// Retry
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_RETRY_BASE_DELAY_MS
}

// ============================================================================
// HTTP
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    /// Per-request timeout. Unset means no timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            user_agent: default_user_agent(),
        }
    }
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

// ============================================================================
// Providers
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub base_url: String,
    /// Secret alias holding the API key. Defaults to the provider name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_secret: Option<String>,
}
