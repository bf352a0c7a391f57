//! Anthropic Messages API transport.

use async_trait::async_trait;
use llm_bench_core::TokenUsage;
use reqwest::{header, Client, StatusCode};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::client::{InferenceClient, InferenceRequest, InferenceResponse};
use crate::config::ClientConfig;
use crate::error::{InferenceError, InferenceResult};

const MESSAGES_PATH: &str = "/v1/messages";

#[derive(Debug, Clone)]
pub struct MessagesClient {
    client: Client,
    config: Arc<ClientConfig>,
}

impl MessagesClient {
    pub fn new(config: ClientConfig) -> InferenceResult<Self> {
        config.validate()?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        let version = header::HeaderValue::try_from(config.api_version.as_str())
            .map_err(|e| InferenceError::InvalidRequest(format!("Invalid API version: {}", e)))?;
        headers.insert("anthropic-version", version);

        if let Some(key) = &config.api_key {
            let mut value = header::HeaderValue::try_from(key.as_str())
                .map_err(|_| InferenceError::AuthFailure("API key is not a valid header value".to_string()))?;
            value.set_sensitive(true);
            headers.insert("x-api-key", value);
        }

        for (name, value) in &config.custom_headers {
            if let (Ok(name), Ok(value)) = (
                header::HeaderName::try_from(name.as_str()),
                header::HeaderValue::try_from(value.as_str()),
            ) {
                headers.insert(name, value);
            }
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| InferenceError::InvalidRequest(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// JSON body for a request. With thinking on, `temperature` is omitted
    /// because the endpoint only accepts its default in that mode.
    pub fn request_body(request: &InferenceRequest) -> Value {
        let mut body = Map::new();
        body.insert("model".into(), json!(request.model_id));
        body.insert("max_tokens".into(), json!(request.max_tokens));
        body.insert(
            "messages".into(),
            json!([{ "role": "user", "content": request.prompt }]),
        );
        if let Some(system) = &request.system_instructions {
            body.insert("system".into(), json!(system));
        }
        match request.thinking {
            Some(thinking) => {
                body.insert(
                    "thinking".into(),
                    json!({ "type": "enabled", "budget_tokens": thinking.budget_tokens }),
                );
            }
            None => {
                body.insert("temperature".into(), json!(request.temperature));
            }
        }
        Value::Object(body)
    }

    /// Pull text, reasoning and usage out of a success body.
    pub fn parse_response(body: &Value) -> InferenceResult<InferenceResponse> {
        let blocks = body
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| InferenceError::Transient("response has no content blocks".to_string()))?;

        let mut text = String::new();
        let mut reasoning = String::new();
        for block in blocks {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    if let Some(t) = block.get("text").and_then(Value::as_str) {
                        text.push_str(t);
                    }
                }
                Some("thinking") => {
                    if let Some(t) = block.get("thinking").and_then(Value::as_str) {
                        if !reasoning.is_empty() {
                            reasoning.push('\n');
                        }
                        reasoning.push_str(t);
                    }
                }
                _ => {}
            }
        }

        let usage = body.get("usage").map(|u| TokenUsage {
            input_tokens: u.get("input_tokens").and_then(Value::as_u64).unwrap_or(0),
            output_tokens: u.get("output_tokens").and_then(Value::as_u64).unwrap_or(0),
        });

        Ok(InferenceResponse {
            text,
            reasoning: (!reasoning.is_empty()).then_some(reasoning),
            usage,
            stop_reason: body
                .get("stop_reason")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

fn retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl InferenceClient for MessagesClient {
    async fn complete(&self, request: &InferenceRequest) -> InferenceResult<InferenceResponse> {
        let url = self.config.url(MESSAGES_PATH);
        let body = Self::request_body(request);

        if self.config.enable_logging {
            debug!("Request: POST {}", url);
            debug!("Request body: {}", body);
        }

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        let retry_after = retry_after(response.headers());
        let text = response.text().await?;

        if status != StatusCode::OK {
            return Err(InferenceError::from_response(status.as_u16(), &text, retry_after));
        }

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| InferenceError::Transient(format!("malformed response body: {}", e)))?;
        Self::parse_response(&parsed)
    }
}
