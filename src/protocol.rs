// protocol.rs — Wire events exchanged with clients over the WebSocket.
// Every frame is a JSON object tagged by event name:
//   { "event": "analyze-drawing", "data": "<data-URL image>" }

use serde::{Deserialize, Serialize};

use crate::pipeline::AnalysisError;

/// Events a client may send.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// One captured frame awaiting analysis, as a data-URL string.
    AnalyzeDrawing(String),
}

/// Events the server sends back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    DrawingFeedback(FeedbackPayload),
    Error(ErrorPayload),
}

/// The combined result for one analyzed frame. Emitted as a whole or not
/// at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackPayload {
    /// The critique instruction text.
    pub text: String,
    /// Synthesized speech as a `data:audio/mp3;base64,` URL.
    pub audio: String,
    /// Zero or more reference image URLs. Empty on degraded search.
    pub images: Vec<String>,
}

/// Exactly one of these is emitted per failed capture event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

const MODEL_DETAIL: &str = "The AI model is currently unavailable. Please try again later.";
const CONNECTIVITY_DETAIL: &str =
    "There was an issue connecting to the AI service. Please check your internet connection.";

impl ErrorPayload {
    /// Map a pipeline failure to the coarse client-facing record, with a
    /// best-effort detail classifying the cause as model-related or
    /// connectivity-related.
    pub fn from_error(error: &AnalysisError) -> Self {
        let details = match error {
            AnalysisError::InvalidImageData => None,
            AnalysisError::EmptyCritique => Some(MODEL_DETAIL.into()),
            AnalysisError::ModelUnavailable(cause)
            | AnalysisError::SpeechSynthesisFailed(cause) => {
                if cause.is_model_side() {
                    Some(MODEL_DETAIL.into())
                } else {
                    Some(CONNECTIVITY_DETAIL.into())
                }
            }
        };
        Self {
            message: error.to_string(),
            details,
        }
    }
}
