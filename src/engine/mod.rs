//! Agent pipeline execution.
//!
//! A run moves through variable resolution, the sequential step loop and
//! output rendering. Steps never run concurrently; a step whose attempts are
//! exhausted (or that fails with a non-retryable error) aborts the run.

mod context;
mod observer;
mod retry;
mod step;

pub use context::ExecutionContext;
pub use observer::{ExecutionEvent, ExecutionObserver, SharedObserver, TracingObserver};
pub use retry::RetryPolicy;

use crate::agent::{AgentDefinition, StepSpec, VariableSpec};
use crate::config::EngineConfig;
use crate::env::{process_env, SharedEnv};
use crate::error::ExecutionError;
use crate::http::{HttpTransport, ReqwestTransport};
use crate::providers::ProviderRegistry;
use crate::secrets::{LocalSecretStore, SecretsResolver, StoreKey};
use crate::template::{is_truthy, lookup_path, render_object, render_str};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub run_id: String,
    pub output: Value,
    /// Steps that were dispatched at least once.
    pub steps_executed: usize,
    /// Steps whose `when` guard was falsy.
    pub steps_skipped: usize,
    /// Final `state` scope.
    pub state: HashMap<String, Value>,
}

/// Executes agent definitions. One engine can serve many concurrent runs;
/// each run gets its own [`ExecutionContext`].
pub struct Engine {
    providers: ProviderRegistry,
    transport: Arc<dyn HttpTransport>,
    secrets: SecretsResolver,
    observer: SharedObserver,
    retry: RetryPolicy,
    env: SharedEnv,
}

impl Engine {
    pub fn new(secrets: SecretsResolver) -> Self {
        Self {
            providers: ProviderRegistry::new(),
            transport: Arc::new(ReqwestTransport::new()),
            secrets,
            observer: Arc::new(TracingObserver),
            retry: RetryPolicy::default(),
            env: process_env(),
        }
    }

    /// Wire an engine from configuration: local store, OpenAI-compatible
    /// providers, HTTP client settings and retry policy.
    pub fn from_config(config: &EngineConfig, env: SharedEnv) -> anyhow::Result<Self> {
        let key = StoreKey::from_env(env.as_ref(), &config.secrets.key_env);
        let store = LocalSecretStore::new(config.secrets_store_path(env.as_ref()), key);
        let secrets = SecretsResolver::new(env.clone()).with_store(Arc::new(store));

        Ok(Self::new(secrets)
            .with_providers(ProviderRegistry::from_config(&config.providers))
            .with_transport(Arc::new(ReqwestTransport::from_config(&config.http)?))
            .with_retry_policy(RetryPolicy::from_config(&config.retry))
            .with_env(env))
    }

    pub fn with_providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = providers;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Environment used for `env` variables and `env.` placeholders.
    pub fn with_env(mut self, env: SharedEnv) -> Self {
        self.env = env;
        self
    }

    pub fn secrets(&self) -> &SecretsResolver {
        &self.secrets
    }

    /// Run `agent` against `input` and return the rendered output.
    pub async fn execute(
        &self,
        agent: &AgentDefinition,
        input: Value,
    ) -> Result<Value, ExecutionError> {
        self.execute_with_report(agent, input)
            .await
            .map(|report| report.output)
    }

    /// Like [`Engine::execute`], with run statistics and the final state.
    pub async fn execute_with_report(
        &self,
        agent: &AgentDefinition,
        input: Value,
    ) -> Result<ExecutionReport, ExecutionError> {
        let run_id = Uuid::new_v4().to_string();
        self.observer.on_event(&ExecutionEvent::RunStarted {
            run_id: &run_id,
            agent_id: &agent.id,
            steps: agent.steps.len(),
        });

        let secrets = self
            .secrets
            .resolve_secrets(&agent.secret_declarations)
            .await;
        let mut ctx = ExecutionContext::new(input)
            .with_env(self.env.clone())
            .with_secrets(secrets);
        resolve_variables(agent, &mut ctx);

        let mut steps_executed = 0;
        let mut steps_skipped = 0;

        for step in &agent.steps {
            if let Some(guard) = &step.when {
                if !is_truthy(&render_str(guard, &ctx)) {
                    steps_skipped += 1;
                    self.observer.on_event(&ExecutionEvent::StepSkipped {
                        run_id: &run_id,
                        step_id: &step.id,
                    });
                    continue;
                }
            }

            steps_executed += 1;
            self.observer.on_event(&ExecutionEvent::StepStarted {
                run_id: &run_id,
                step_id: &step.id,
                kind: step.kind(),
                number: steps_executed,
            });

            let result = match self.run_with_retry(&run_id, step, &ctx).await {
                Ok(result) => result,
                Err(err) => {
                    self.observer.on_event(&ExecutionEvent::RunFailed {
                        run_id: &run_id,
                        error: &err,
                    });
                    return Err(err);
                }
            };

            if let Some(target) = &step.save {
                if result.is_null() {
                    debug!("Step '{}' produced no value; '{}' left as is", step.id, target);
                } else if ctx.save_state(target.clone(), result).is_some() {
                    debug!("Step '{}' overwrote state '{}'", step.id, target);
                }
            }
        }

        let output = render_object(&agent.output_template, &ctx);
        self.observer.on_event(&ExecutionEvent::RunFinished {
            run_id: &run_id,
            steps_executed,
            steps_skipped,
        });

        Ok(ExecutionReport {
            run_id,
            output,
            steps_executed,
            steps_skipped,
            state: ctx.into_state(),
        })
    }

    async fn run_with_retry(
        &self,
        run_id: &str,
        step: &StepSpec,
        ctx: &ExecutionContext,
    ) -> Result<Value, ExecutionError> {
        let max_attempts = step.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.dispatch(&step.action, ctx).await {
                Ok(value) => {
                    self.observer.on_event(&ExecutionEvent::StepSucceeded {
                        run_id,
                        step_id: &step.id,
                        attempts: attempt,
                    });
                    return Ok(value);
                }
                Err(err) => {
                    let retry_in = (err.is_retryable() && attempt < max_attempts)
                        .then(|| self.retry.delay_for(attempt));
                    self.observer.on_event(&ExecutionEvent::AttemptFailed {
                        run_id,
                        step_id: &step.id,
                        attempt,
                        max_attempts,
                        error: &err,
                        retry_in,
                    });

                    match retry_in {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => {
                            return Err(ExecutionError {
                                step_id: step.id.clone(),
                                kind: step.kind(),
                                attempts: attempt,
                                source: err,
                            })
                        }
                    }
                }
            }
        }
    }
}

/// Bind every declared variable. Variables that resolve to nothing are bound
/// to `null`.
fn resolve_variables(agent: &AgentDefinition, ctx: &mut ExecutionContext) {
    for (name, spec) in &agent.variable_declarations {
        let value = match spec {
            VariableSpec::Input { path } => lookup_path(ctx.input(), path).cloned(),
            VariableSpec::Env { path } => ctx.env().var(path).map(Value::String),
            VariableSpec::Literal { value } => Some(value.clone()),
        };
        if value.is_none() {
            debug!("Variable '{name}' did not resolve");
        }
        ctx.set_var(name.clone(), value.unwrap_or(Value::Null));
    }
}
