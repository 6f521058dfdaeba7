use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{AiError, SpeechProvider};

const OPENAI_SPEECH_URL: &str = "https://api.openai.com/v1/audio/speech";

/// OpenAI text-to-speech client. One fixed model/voice pair per instance;
/// the response body is the complete encoded audio (MP3).
pub struct OpenAiSpeechClient {
    endpoint: String,
    api_key: String,
    model: String,
    voice: String,
    client: Client,
}

impl OpenAiSpeechClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: OPENAI_SPEECH_URL.into(),
            api_key: api_key.into(),
            model: model.into(),
            voice: voice.into(),
            client: Client::new(),
        }
    }

    /// Override the endpoint (OpenAI-compatible proxies, tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

fn build_request_body(model: &str, voice: &str, input: &str) -> Value {
    json!({
        "model": model,
        "voice": voice,
        "input": input
    })
}

#[async_trait]
impl SpeechProvider for OpenAiSpeechClient {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, AiError> {
        let body = build_request_body(&self.model, &self.voice, text);

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
            return Err(AiError::ModelError(format!(
                "HTTP {}: {}",
                status, error_body
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AiError::ConnectionError(format!("audio body read: {e}")))?;

        if bytes.is_empty() {
            return Err(AiError::InvalidResponse("empty audio payload".into()));
        }

        Ok(bytes.to_vec())
    }

    fn name(&self) -> &str {
        "openai-tts"
    }
}
