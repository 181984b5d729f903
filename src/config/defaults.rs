//! Default configuration constants used across the system.

/// Environment variable holding the local secret store key.
pub const DEFAULT_SECRETS_KEY_ENV: &str = "AGENTFLOW_SECRETS_KEY";

/// Secret store file name inside the state directory.
pub const DEFAULT_SECRETS_FILE: &str = "secrets.json";

/// Delay before the first retry; doubles on each further attempt.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;

/// User agent for outbound HTTP steps.
pub const DEFAULT_USER_AGENT: &str = concat!("agentflow/", env!("CARGO_PKG_VERSION"));
