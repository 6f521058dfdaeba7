use serde::{Deserialize, Serialize};

/// Error type for AI provider operations
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("Connection failed: {0}")]
    ConnectionError(String),
    #[error("Authentication failed: {0}")]
    AuthError(String),
    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("Model error: {0}")]
    ModelError(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl AiError {
    /// True when the failure is on the model's side (overload, bad output)
    /// rather than on the connection path to the provider.
    pub fn is_model_side(&self) -> bool {
        matches!(self, AiError::ModelError(_) | AiError::RateLimited { .. })
    }
}

/// One structured vision request: a persona, a user message, and the frame.
///
/// The critique and keyword calls share this shape and differ only in
/// persona text and output-length cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionQuery {
    /// System persona instruction for this call.
    pub persona: String,
    /// Text part of the user message.
    pub user_text: String,
    /// Base64-encoded JPEG frame, without the data-URL envelope.
    pub image_base64: String,
    /// Cap on the completion length, tuned per call site.
    pub max_tokens: u32,
}
