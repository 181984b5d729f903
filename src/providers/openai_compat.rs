//! Provider for OpenAI-compatible chat completion APIs.
//!
//! Sends the rendered prompt as a single user message and returns the first
//! choice's text. The API key is read from the run's resolved secrets.

use super::LlmProvider;
use crate::engine::ExecutionContext;
use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key_secret: String,
    client: Client,
}

impl OpenAiCompatProvider {
    pub fn new(name: String, base_url: String, api_key_secret: String) -> Self {
        Self {
            name,
            base_url,
            api_key_secret,
            client: Client::new(),
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

// ============================================================================
// OpenAI-Compatible API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(default)]
    content: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

// ============================================================================
// LlmProvider Implementation
// ============================================================================

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn invoke(
        &self,
        model: &str,
        prompt: &str,
        context: &ExecutionContext,
    ) -> Result<serde_json::Value> {
        let Some(api_key) = context.secret(&self.api_key_secret) else {
            bail!(
                "provider '{}' has no API key: secret '{}' is unresolved",
                self.name,
                self.api_key_secret
            );
        };

        let body = OpenAiRequest {
            model,
            messages: vec![OpenAiMessage {
                role: "user".to_string(),
                content: serde_json::Value::String(prompt.to_string()),
            }],
        };

        debug!("Invoking provider '{}' with model '{}'", self.name, model);
        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("{} API error {}: {}", self.name, status, text);
        }

        let api_resp: OpenAiResponse = response.json().await?;
        let choice = api_resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No choices in response"))?;

        Ok(match choice.message.content {
            serde_json::Value::Null => serde_json::Value::String(String::new()),
            other => other,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ctx_with_key(alias: &str, key: Option<&str>) -> ExecutionContext {
        let mut secrets = BTreeMap::new();
        secrets.insert(alias.to_string(), key.map(String::from));
        ExecutionContext::new(json!({})).with_secrets(secrets)
    }

    #[tokio::test]
    async fn sends_prompt_and_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "messages": [{ "role": "user", "content": "Say hi" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "hi" } }]
            })))
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new(
            "openai".into(),
            format!("{}/v1/", server.uri()),
            "openai".into(),
        );
        let out = provider
            .invoke("gpt-4o-mini", "Say hi", &ctx_with_key("openai", Some("sk-test")))
            .await
            .unwrap();
        assert_eq!(out, json!("hi"));
    }

    #[tokio::test]
    async fn missing_key_fails() {
        let provider = OpenAiCompatProvider::new(
            "openai".into(),
            "http://127.0.0.1:9".into(),
            "openai".into(),
        );
        let err = provider
            .invoke("m", "p", &ctx_with_key("openai", None))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unresolved"));
    }

    #[tokio::test]
    async fn api_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let provider =
            OpenAiCompatProvider::new("groq".into(), server.uri(), "groq".into());
        let err = provider
            .invoke("m", "p", &ctx_with_key("groq", Some("k")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("429"));
    }
}
