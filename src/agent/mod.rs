//! Agent definition model.
//!
//! An [`AgentDefinition`] is produced once per run (usually by
//! [`AgentDefinition::from_path`]) and is never mutated by the engine.

mod loader;

pub use loader::*;

use crate::error::DefinitionError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

// ============================================================================
// Definition
// ============================================================================

/// A declarative agent pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefinition {
    pub id: String,
    #[serde(default)]
    pub version: String,
    /// Run variables, resolved once into the `vars` scope.
    #[serde(default, rename = "vars", alias = "variables")]
    pub variable_declarations: BTreeMap<String, VariableSpec>,
    /// Secrets keyed by alias.
    #[serde(default, rename = "secrets")]
    pub secret_declarations: BTreeMap<String, SecretSpec>,
    #[serde(default)]
    pub steps: Vec<StepSpec>,
    /// Template rendered against the final context.
    #[serde(default, rename = "output", alias = "outputTemplate")]
    pub output_template: serde_json::Value,
}

/// How a run variable obtains its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VariableSpec {
    /// Dotted path into the runtime input.
    Input { path: String },
    /// Environment variable name (no nesting).
    Env { path: String },
    /// Declared constant.
    Literal { value: serde_json::Value },
}

/// Where a secret is looked up first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretSource {
    Env,
    Local,
    Aws,
    Gcp,
    Vault,
}

impl SecretSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretSource::Env => "env",
            SecretSource::Local => "local",
            SecretSource::Aws => "aws",
            SecretSource::Gcp => "gcp",
            SecretSource::Vault => "vault",
        }
    }
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared secret. The alias is the key it is declared under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretSpec {
    #[serde(rename = "type")]
    pub source: SecretSource,
    /// Source-specific key (env var name, local store alias, remote path).
    #[serde(default)]
    pub value: String,
}

// ============================================================================
// Steps
// ============================================================================

/// One unit of work in the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    pub id: String,
    /// Guard template; a falsy rendering skips the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    #[serde(default)]
    pub retries: u32,
    /// `state` key the step result is written under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save: Option<String>,
    #[serde(flatten)]
    pub action: StepAction,
}

impl StepSpec {
    /// Total attempts allowed (`retries + 1`).
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    pub fn kind(&self) -> &'static str {
        self.action.kind()
    }
}

/// Step payload, keyed by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StepAction {
    Llm(LlmStep),
    Http(HttpStep),
    Function(FunctionStep),
}

impl StepAction {
    pub fn kind(&self) -> &'static str {
        match self {
            StepAction::Llm(_) => "llm",
            StepAction::Http(_) => "http",
            StepAction::Function(_) => "function",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmStep {
    pub provider: String,
    pub model: String,
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpStep {
    pub url: String,
    /// HTTP method; `GET` when absent.
    #[serde(
        default,
        rename = "action",
        alias = "method",
        skip_serializing_if = "Option::is_none"
    )]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

impl HttpStep {
    pub fn method(&self) -> String {
        self.method
            .as_deref()
            .map(|m| m.trim().to_uppercase())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "GET".to_string())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<serde_json::Value>,
}

/// Methods an HTTP step may use.
pub const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

// ============================================================================
// Validation
// ============================================================================

impl AgentDefinition {
    /// Structural checks that can be made before a run starts.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        let mut seen = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            if step.id.trim().is_empty() {
                return Err(DefinitionError::EmptyStepId { index });
            }
            if !seen.insert(step.id.as_str()) {
                return Err(DefinitionError::DuplicateStepId(step.id.clone()));
            }
            if let Some(message) = step_problem(&step.action) {
                return Err(DefinitionError::InvalidStep {
                    step_id: step.id.clone(),
                    message,
                });
            }
        }
        Ok(())
    }
}

/// First problem with a step's required fields, if any.
pub(crate) fn step_problem(action: &StepAction) -> Option<String> {
    match action {
        StepAction::Llm(llm) => {
            for (field, value) in [
                ("provider", &llm.provider),
                ("model", &llm.model),
                ("prompt", &llm.prompt),
            ] {
                if value.trim().is_empty() {
                    return Some(format!("llm step requires '{field}'"));
                }
            }
            None
        }
        StepAction::Http(http) => {
            if http.url.trim().is_empty() {
                return Some("http step requires 'url'".to_string());
            }
            let method = http.method();
            if !HTTP_METHODS.contains(&method.as_str()) {
                return Some(format!("unsupported HTTP method '{method}'"));
            }
            None
        }
        StepAction::Function(_) => None,
    }
}
