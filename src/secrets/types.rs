//! Core types for secret resolution.

use crate::agent::SecretSource;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Suffixes tried, in order, when a declared source yields nothing.
pub const CONVENTIONAL_SUFFIXES: &[&str] = &["_API_KEY", "_KEY", "_TOKEN", "_SECRET"];

// ============================================================================
// Resolution
// ============================================================================

/// Result of resolving a single secret through one source.
#[derive(Debug, Clone)]
pub enum SecretResolution {
    /// Successfully resolved to a value.
    Resolved(String),
    /// Source failed (misconfigured, unreachable, unimplemented).
    Failed(String),
    /// Source was reachable but had no value.
    NotFound(String),
}

impl SecretResolution {
    pub fn is_resolved(&self) -> bool {
        matches!(self, SecretResolution::Resolved(_))
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            SecretResolution::Resolved(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<String> {
        match self {
            SecretResolution::Resolved(v) => Some(v),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            SecretResolution::Failed(msg) | SecretResolution::NotFound(msg) => Some(msg),
            SecretResolution::Resolved(_) => None,
        }
    }
}

/// Outcome of checking a resolved secret map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretValidation {
    pub valid: bool,
    /// Aliases that resolved to nothing, sorted.
    pub missing: Vec<String>,
}

// ============================================================================
// Provider Trait
// ============================================================================

/// A secret source.
///
/// Each provider serves one [`SecretSource`]. Providers never fail the run;
/// problems come back as [`SecretResolution::Failed`] and are treated as
/// "not found" by the resolver.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// The declared source this provider serves.
    fn source(&self) -> SecretSource;

    /// Display name for logging.
    fn name(&self) -> &str;

    /// Resolve a source-specific key to its value.
    async fn resolve(&self, key: &str) -> SecretResolution;

    /// Check if the provider can be used at all.
    fn is_available(&self) -> bool {
        true
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Environment variable names tried for an alias, in priority order.
///
/// The alias is upper-cased and any character that cannot appear in a
/// portable variable name becomes `_`.
pub fn conventional_env_names(alias: &str) -> Vec<String> {
    let base: String = alias
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    CONVENTIONAL_SUFFIXES
        .iter()
        .map(|suffix| format!("{base}{suffix}"))
        .collect()
}

/// Redact a secret value for display (show first 2 and last 2 chars).
pub fn redact_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 6 {
        return "***".to_string();
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}…{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conventional_names_in_order() {
        assert_eq!(
            conventional_env_names("openai"),
            vec!["OPENAI_API_KEY", "OPENAI_KEY", "OPENAI_TOKEN", "OPENAI_SECRET"]
        );
    }

    #[test]
    fn conventional_names_sanitize_alias() {
        assert_eq!(conventional_env_names("my-svc")[0], "MY_SVC_API_KEY");
        assert_eq!(conventional_env_names("acme.io")[3], "ACME_IO_SECRET");
    }

    #[test]
    fn redact_short_value() {
        assert_eq!(redact_secret("abc"), "***");
    }

    #[test]
    fn redact_long_value() {
        let redacted = redact_secret("sk-ant-api03-1234567890");
        assert!(redacted.starts_with("sk"));
        assert!(redacted.ends_with("90"));
        assert!(redacted.contains('…'));
    }

    #[test]
    fn secret_resolution_helpers() {
        let ok = SecretResolution::Resolved("value".into());
        assert!(ok.is_resolved());
        assert_eq!(ok.value(), Some("value"));
        assert!(ok.error_message().is_none());

        let fail = SecretResolution::Failed("timeout".into());
        assert!(!fail.is_resolved());
        assert!(fail.value().is_none());
        assert_eq!(fail.error_message(), Some("timeout"));
        assert!(fail.into_value().is_none());
    }
}
