//! Environment variable access.
//!
//! Everything that reads the process environment (secret lookup, `env`
//! variables, `env.`-prefixed placeholders) goes through an [`EnvSource`] so
//! runs can be given an isolated environment.

use std::collections::HashMap;
use std::sync::Arc;

/// Read-only view of environment variables.
pub trait EnvSource: Send + Sync {
    /// Look up a variable. Unset and non-unicode values are both `None`.
    fn var(&self, name: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// A fixed in-memory environment.
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapEnv {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl EnvSource for MapEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

/// Shared handle used by the engine and resolvers.
pub type SharedEnv = Arc<dyn EnvSource>;

/// Shared handle to the process environment.
pub fn process_env() -> SharedEnv {
    Arc::new(ProcessEnv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_env_lookup() {
        let env = MapEnv::new().with("A", "1");
        assert_eq!(env.var("A").as_deref(), Some("1"));
        assert!(env.var("B").is_none());
    }

    #[test]
    fn map_env_from_iter() {
        let env: MapEnv = [("X", "y")].into_iter().collect();
        assert_eq!(env.var("X").as_deref(), Some("y"));
    }

    #[test]
    fn process_env_reads_path() {
        assert!(ProcessEnv.var("PATH").is_some());
    }
}
