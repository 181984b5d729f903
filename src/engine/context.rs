use crate::env::{process_env, SharedEnv};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Mutable record of one in-flight run.
///
/// `vars` are written once during variable resolution, `state` is written by
/// steps with a `save` target (last write wins), `secrets` holds one entry per
/// declared alias with `None` for unresolved ones.
pub struct ExecutionContext {
    input: Value,
    vars: HashMap<String, Value>,
    state: HashMap<String, Value>,
    secrets: BTreeMap<String, Option<String>>,
    env: SharedEnv,
}

impl ExecutionContext {
    pub fn new(input: Value) -> Self {
        Self {
            input,
            vars: HashMap::new(),
            state: HashMap::new(),
            secrets: BTreeMap::new(),
            env: process_env(),
        }
    }

    pub fn with_env(mut self, env: SharedEnv) -> Self {
        self.env = env;
        self
    }

    pub fn with_secrets(mut self, secrets: BTreeMap<String, Option<String>>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn input(&self) -> &Value {
        &self.input
    }

    pub fn vars(&self) -> &HashMap<String, Value> {
        &self.vars
    }

    pub fn state(&self) -> &HashMap<String, Value> {
        &self.state
    }

    pub fn secrets(&self) -> &BTreeMap<String, Option<String>> {
        &self.secrets
    }

    /// Resolved value of a secret alias.
    pub fn secret(&self, alias: &str) -> Option<&str> {
        self.secrets.get(alias).and_then(|v| v.as_deref())
    }

    pub fn env(&self) -> &SharedEnv {
        &self.env
    }

    /// Set a run variable. Returns `false` (leaving the old value) if the
    /// name is already bound.
    pub(crate) fn set_var(&mut self, name: impl Into<String>, value: Value) -> bool {
        let name = name.into();
        if self.vars.contains_key(&name) {
            return false;
        }
        self.vars.insert(name, value);
        true
    }

    /// Record a step result, returning whatever it shadowed.
    pub(crate) fn save_state(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.state.insert(name.into(), value)
    }

    pub(crate) fn into_state(self) -> HashMap<String, Value> {
        self.state
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secrets: BTreeMap<&str, bool> = self
            .secrets
            .iter()
            .map(|(alias, value)| (alias.as_str(), value.is_some()))
            .collect();
        f.debug_struct("ExecutionContext")
            .field("input", &self.input)
            .field("vars", &self.vars)
            .field("state", &self.state)
            .field("secrets_resolved", &secrets)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn vars_are_write_once() {
        let mut ctx = ExecutionContext::new(json!({}));
        assert!(ctx.set_var("a", json!(1)));
        assert!(!ctx.set_var("a", json!(2)));
        assert_eq!(ctx.vars()["a"], json!(1));
    }

    #[test]
    fn state_is_last_write_wins() {
        let mut ctx = ExecutionContext::new(json!({}));
        assert!(ctx.save_state("out", json!("first")).is_none());
        assert_eq!(ctx.save_state("out", json!("second")), Some(json!("first")));
        assert_eq!(ctx.state()["out"], json!("second"));
    }

    #[test]
    fn debug_output_hides_secret_values() {
        let mut secrets = BTreeMap::new();
        secrets.insert("openai".to_string(), Some("sk-very-secret".to_string()));
        let ctx = ExecutionContext::new(json!({})).with_secrets(secrets);
        let dbg = format!("{ctx:?}");
        assert!(dbg.contains("openai"));
        assert!(!dbg.contains("sk-very-secret"));
        assert_eq!(ctx.secret("openai"), Some("sk-very-secret"));
    }
}
