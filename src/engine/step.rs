use super::{Engine, ExecutionContext};
use crate::agent::{step_problem, HttpStep, LlmStep, StepAction};
use crate::error::StepError;
use crate::http::HttpRequest;
use crate::template::{render_object, render_string, stringify};
use serde_json::Value;
use tracing::debug;

/// Methods that carry a request body.
const BODY_METHODS: &[&str] = &["POST", "PUT", "PATCH"];

impl Engine {
    /// Run one attempt of a step's action.
    pub(super) async fn dispatch(
        &self,
        action: &StepAction,
        ctx: &ExecutionContext,
    ) -> Result<Value, StepError> {
        if let Some(problem) = step_problem(action) {
            return Err(StepError::Configuration(problem));
        }

        match action {
            StepAction::Llm(llm) => self.run_llm(llm, ctx).await,
            StepAction::Http(http) => self.run_http(http, ctx).await,
            StepAction::Function(function) => Err(StepError::Unsupported(format!(
                "function step '{}' cannot run: function steps are not supported",
                function.function.as_deref().unwrap_or("<unnamed>")
            ))),
        }
    }

    async fn run_llm(&self, llm: &LlmStep, ctx: &ExecutionContext) -> Result<Value, StepError> {
        let provider = self.providers.get(&llm.provider).ok_or_else(|| {
            StepError::Configuration(format!("unknown provider '{}'", llm.provider))
        })?;

        let prompt = render_string(&llm.prompt, ctx);
        debug!(
            "Invoking provider '{}' model '{}' ({} chars)",
            llm.provider,
            llm.model,
            prompt.len()
        );
        provider
            .invoke(&llm.model, &prompt, ctx)
            .await
            .map_err(StepError::transient)
    }

    async fn run_http(&self, http: &HttpStep, ctx: &ExecutionContext) -> Result<Value, StepError> {
        let method = http.method();
        let url = render_string(&http.url, ctx);

        let headers = match &http.headers {
            None | Some(Value::Null) => Vec::new(),
            Some(template @ Value::Object(_)) => match render_object(template, ctx) {
                Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), stringify(v))).collect(),
                _ => Vec::new(),
            },
            Some(_) => {
                return Err(StepError::Configuration(
                    "http step 'headers' must be an object".to_string(),
                ))
            }
        };

        let body = match &http.body {
            Some(body) if !body.is_null() && BODY_METHODS.contains(&method.as_str()) => {
                Some(render_object(body, ctx))
            }
            _ => None,
        };

        let response = self
            .transport
            .send(HttpRequest {
                method: method.clone(),
                url: url.clone(),
                headers,
                body,
            })
            .await
            .map_err(StepError::transient)?;

        if !response.is_success() {
            return Err(StepError::Transient(format!(
                "{method} {url} returned HTTP {}",
                response.status
            )));
        }

        response.into_value().map_err(StepError::transient)
    }
}
