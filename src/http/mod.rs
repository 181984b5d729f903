//! Outbound HTTP for `http` steps.

use crate::config::HttpConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// A fully rendered request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Serialized as JSON when present.
    pub body: Option<serde_json::Value>,
}

/// A buffered response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lower-case.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether the response declares a JSON content type.
    pub fn is_json(&self) -> bool {
        self.header("content-type")
            .map(|ct| {
                let mime = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
                mime == "application/json" || mime.ends_with("+json")
            })
            .unwrap_or(false)
    }

    /// Body as JSON for JSON responses, otherwise as a string.
    pub fn into_value(self) -> Result<serde_json::Value> {
        if self.is_json() {
            serde_json::from_str(&self.body).context("response declared JSON but failed to parse")
        } else {
            Ok(serde_json::Value::String(self.body))
        }
    }
}

/// Fetch-style transport used by the engine.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// [`HttpTransport`] backed by `reqwest`.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub fn from_config(config: &HttpConfig) -> Result<Self> {
        let mut builder = Client::builder().user_agent(config.user_agent.clone());
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = Method::from_str(&request.method)
            .with_context(|| format!("invalid HTTP method '{}'", request.method))?;

        let mut header_map = HeaderMap::new();
        for (key, value) in &request.headers {
            match (HeaderName::from_str(key), HeaderValue::from_str(value)) {
                (Ok(name), Ok(val)) => {
                    header_map.insert(name, val);
                }
                _ => warn!("Skipping invalid request header '{key}'"),
            }
        }

        debug!("HTTP {} {}", method, request.url);
        let mut builder = self
            .client
            .request(method, &request.url)
            .headers(header_map);
        if let Some(body) = &request.body {
            if !builder_has_content_type(&request.headers) {
                builder = builder.header(CONTENT_TYPE, "application/json");
            }
            builder = builder.body(serde_json::to_vec(body)?);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.text().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn builder_has_content_type(headers: &[(String, String)]) -> bool {
    headers
        .iter()
        .any(|(k, _)| k.eq_ignore_ascii_case("content-type"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn response(content_type: Option<&str>, body: &str) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: content_type
                .map(|ct| vec![("content-type".to_string(), ct.to_string())])
                .unwrap_or_default(),
            body: body.to_string(),
        }
    }

    #[test]
    fn json_content_types() {
        assert!(response(Some("application/json"), "{}").is_json());
        assert!(response(Some("application/json; charset=utf-8"), "{}").is_json());
        assert!(response(Some("application/problem+json"), "{}").is_json());
        assert!(!response(Some("text/plain"), "{}").is_json());
        assert!(!response(None, "{}").is_json());
    }

    #[test]
    fn into_value_by_content_type() {
        assert_eq!(
            response(Some("application/json"), r#"{"a":1}"#).into_value().unwrap(),
            json!({ "a": 1 })
        );
        assert_eq!(
            response(Some("text/plain"), r#"{"a":1}"#).into_value().unwrap(),
            json!(r#"{"a":1}"#)
        );
        assert!(response(Some("application/json"), "nope").into_value().is_err());
    }

    #[tokio::test]
    async fn sends_method_headers_and_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/items"))
            .and(header("x-api-key", "k-1"))
            .and(body_json(json!({ "name": "Ada" })))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_raw(r#"{"id":7}"#, "application/json"),
            )
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new();
        let response = transport
            .send(HttpRequest {
                method: "POST".into(),
                url: format!("{}/items", server.uri()),
                headers: vec![("x-api-key".into(), "k-1".into())],
                body: Some(json!({ "name": "Ada" })),
            })
            .await
            .unwrap();

        assert_eq!(response.status, 201);
        assert!(response.is_success());
        assert_eq!(response.into_value().unwrap(), json!({ "id": 7 }));
    }

    #[tokio::test]
    async fn non_success_status_is_returned() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let response = ReqwestTransport::new()
            .send(HttpRequest {
                method: "GET".into(),
                url: server.uri(),
                headers: vec![],
                body: None,
            })
            .await
            .unwrap();
        assert_eq!(response.status, 503);
        assert!(!response.is_success());
    }
}
