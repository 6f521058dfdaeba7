use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{AiError, VisionProvider, VisionQuery};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI chat-completions vision client.
///
/// Sends a system persona plus a user message combining a text part and the
/// frame as a data-URL image part, and expects exactly one completion.
pub struct OpenAiVisionClient {
    endpoint: String,
    api_key: String,
    model: String,
    client: Client,
}

impl OpenAiVisionClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: OPENAI_API_URL.into(),
            api_key: api_key.into(),
            model: model.into(),
            client: Client::new(),
        }
    }

    /// Override the endpoint (OpenAI-compatible proxies, tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

fn build_request_body(model: &str, query: &VisionQuery) -> Value {
    json!({
        "model": model,
        "max_tokens": query.max_tokens,
        "messages": [
            {
                "role": "system",
                "content": query.persona
            },
            {
                "role": "user",
                "content": [
                    { "type": "text", "text": query.user_text },
                    {
                        "type": "image_url",
                        "image_url": {
                            "url": format!("data:image/jpeg;base64,{}", query.image_base64)
                        }
                    }
                ]
            }
        ]
    })
}

/// Extract the first choice's message content from a chat-completions
/// response body. Whitespace is trimmed; an absent field is an error,
/// an empty completion is not (the caller decides what empty means).
fn parse_completion(body: &Value) -> Result<String, AiError> {
    body.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|c| c.trim().to_string())
        .ok_or_else(|| AiError::InvalidResponse("no message content in completion".into()))
}

#[async_trait]
impl VisionProvider for OpenAiVisionClient {
    async fn complete(&self, query: &VisionQuery) -> Result<String, AiError> {
        let body = build_request_body(&self.model, query);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AiError::ConnectionError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".into());

            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(AiError::AuthError(error_body));
            }
            if status.as_u16() == 429 {
                return Err(AiError::RateLimited {
                    retry_after_ms: 1000,
                });
            }
            if status.is_server_error() {
                return Err(AiError::ModelError(format!("HTTP {}: {}", status, error_body)));
            }
            return Err(AiError::ConnectionError(format!(
                "HTTP {}: {}",
                status, error_body
            )));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| AiError::InvalidResponse(format!("bad JSON: {e}")))?;

        parse_completion(&parsed)
    }

    fn name(&self) -> &str {
        "openai-vision"
    }
}
