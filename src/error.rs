//! Error types shared across the engine, definition loader and secret store.

use thiserror::Error;

/// Failure of a single step attempt.
///
/// Only [`StepError::Transient`] is retried; the other kinds end the run on
/// the first attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StepError {
    /// Missing required field, unknown provider, unknown step kind.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Provider or network failure.
    #[error("{0}")]
    Transient(String),
    /// Capability the engine does not provide (function steps).
    #[error("not implemented: {0}")]
    Unsupported(String),
}

impl StepError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StepError::Transient(_))
    }

    pub(crate) fn transient(err: anyhow::Error) -> Self {
        StepError::Transient(format!("{err:#}"))
    }
}

/// Failure that aborts an entire run.
#[derive(Debug, Error)]
#[error("step '{step_id}' ({kind}) failed after {attempts} attempt(s): {source}")]
pub struct ExecutionError {
    pub step_id: String,
    pub kind: &'static str,
    /// Attempts made, including the failing one.
    pub attempts: u32,
    #[source]
    pub source: StepError,
}

/// Problems with the shape of an agent definition.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("failed to read agent definition '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse agent definition: {0}")]
    Parse(String),
    #[error("step #{index} has an empty id")]
    EmptyStepId { index: usize },
    #[error("duplicate step id '{0}'")]
    DuplicateStepId(String),
    #[error("step '{step_id}': {message}")]
    InvalidStep { step_id: String, message: String },
}

/// Local secret store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("secret store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("secret store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("failed to decrypt secret '{alias}'")]
    Decryption { alias: String },
    #[error("failed to persist secret store: {0}")]
    Persist(String),
    #[error("timed out waiting for secret store lock '{0}'")]
    Locked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_is_retryable() {
        assert!(StepError::Transient("timeout".into()).is_retryable());
        assert!(!StepError::Configuration("missing url".into()).is_retryable());
        assert!(!StepError::Unsupported("function".into()).is_retryable());
    }

    #[test]
    fn step_failure_carries_context() {
        let err = ExecutionError {
            step_id: "fetch".into(),
            kind: "http",
            attempts: 3,
            source: StepError::Transient("HTTP 503".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("fetch"));
        assert!(msg.contains("http"));
        assert!(msg.contains("3 attempt"));
        assert!(msg.contains("HTTP 503"));
    }
}
