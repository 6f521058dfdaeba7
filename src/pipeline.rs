// pipeline.rs — Orchestrates the per-frame analysis pipeline:
// normalize → critique (with history) → speech + keyword/search → feedback.
//
// Critique and speech failures abort the event with exactly one error
// record; keyword or search failures degrade to an empty image list.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::ai::{AiError, ImageSearchProvider, SpeechProvider, VisionProvider, VisionQuery};
use crate::frame;
use crate::memory::{ConnectionId, InstructionMemory};
use crate::protocol::FeedbackPayload;
use crate::settings::Settings;

/// Failure modes of one capture event. All are fatal to the event; search
/// degradation is absorbed before it can become one of these.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("No usable image data in the capture")]
    InvalidImageData,
    #[error("Vision model unavailable: {0}")]
    ModelUnavailable(AiError),
    #[error("The model returned an empty critique")]
    EmptyCritique,
    #[error("Speech synthesis failed: {0}")]
    SpeechSynthesisFailed(AiError),
}

/// Inserted between the persona and the history block.
const HISTORY_LABEL: &str = "Предыдущие инструкции:";
/// Fixed tail of the critique persona: do not repeat, answer in Russian,
/// 1-2 sentences.
const CRITIQUE_SUFFIX: &str = "Не повторяй предыдущие инструкции. Ответь строго на русском языке, очень кратко, ровно 1-2 предложения.";

/// Assemble the critique system prompt from the base persona and the
/// connection's prior instructions.
fn build_critique_prompt(persona: &str, history: &[String]) -> String {
    let mut prompt = String::from(persona);
    if !history.is_empty() {
        prompt.push(' ');
        prompt.push_str(HISTORY_LABEL);
        prompt.push(' ');
        prompt.push_str(&history.join(" | "));
        prompt.push('.');
    }
    prompt.push(' ');
    prompt.push_str(CRITIQUE_SUFFIX);
    prompt
}

/// The analysis pipeline, shared across all connections. Holds the three
/// provider handles and the prompt/tuning configuration.
pub struct AnalysisPipeline {
    settings: Settings,
    vision: Arc<dyn VisionProvider>,
    speech: Arc<dyn SpeechProvider>,
    search: Arc<dyn ImageSearchProvider>,
}

impl AnalysisPipeline {
    pub fn new(
        settings: Settings,
        vision: Arc<dyn VisionProvider>,
        speech: Arc<dyn SpeechProvider>,
        search: Arc<dyn ImageSearchProvider>,
    ) -> Self {
        Self {
            settings,
            vision,
            speech,
            search,
        }
    }

    /// Run the full pipeline for one captured frame.
    ///
    /// History for `connection` is read before the critique call and
    /// committed back exactly once, after every fatal stage has passed, so
    /// a failed event leaves memory untouched. The caller serializes
    /// events per connection; see `server::handle_connection`.
    pub async fn analyze(
        &self,
        connection: ConnectionId,
        image_data: &str,
        memory: &InstructionMemory,
    ) -> Result<FeedbackPayload, AnalysisError> {
        let frame = frame::strip_data_url(image_data)?;
        log::info!(
            "Connection {}: frame normalized ({} chars)",
            connection,
            frame.len()
        );

        let history = memory.get(connection);
        let critique = self.request_critique(frame, &history).await?;
        log::info!("Connection {}: critique received", connection);

        // Speech and reference images are independent; run them together.
        // A failure on the search side must not disturb the speech outcome.
        let (audio, images) = tokio::join!(
            self.speech.synthesize(&critique),
            self.find_reference_images(frame),
        );
        let audio = audio.map_err(AnalysisError::SpeechSynthesisFailed)?;
        log::info!(
            "Connection {}: speech synthesized ({} bytes), {} reference image(s)",
            connection,
            audio.len(),
            images.len()
        );

        memory.append(connection, critique.clone());

        Ok(FeedbackPayload {
            text: critique,
            audio: format!("data:audio/mp3;base64,{}", BASE64.encode(&audio)),
            images,
        })
    }

    async fn request_critique(
        &self,
        frame: &str,
        history: &[String],
    ) -> Result<String, AnalysisError> {
        let query = VisionQuery {
            persona: build_critique_prompt(&self.settings.critique_persona, history),
            user_text: self.settings.critique_user_text.clone(),
            image_base64: frame.to_string(),
            max_tokens: self.settings.critique_max_tokens,
        };

        let critique = self
            .vision
            .complete(&query)
            .await
            .map_err(AnalysisError::ModelUnavailable)?;

        let critique = critique.trim().to_string();
        if critique.is_empty() {
            return Err(AnalysisError::EmptyCritique);
        }
        Ok(critique)
    }

    /// Keyword extraction followed by image search. Best-effort: every
    /// failure path collapses to an empty list.
    async fn find_reference_images(&self, frame: &str) -> Vec<String> {
        let query = VisionQuery {
            persona: self.settings.keyword_persona.clone(),
            user_text: self.settings.critique_user_text.clone(),
            image_base64: frame.to_string(),
            max_tokens: self.settings.keyword_max_tokens,
        };

        let keyword = match self.vision.complete(&query).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                log::warn!("Keyword extraction failed, skipping reference images: {}", e);
                return Vec::new();
            }
        };
        if keyword.is_empty() {
            log::warn!("Keyword extraction returned no text, skipping reference images");
            return Vec::new();
        }

        log::info!("Searching reference images for {:?}", keyword);
        match self
            .search
            .search(&keyword, self.settings.reference_image_count)
            .await
        {
            Ok(urls) => urls,
            Err(e) => {
                log::warn!("Reference image search failed: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_without_history_has_no_history_block() {
        let prompt = build_critique_prompt("Persona.", &[]);
        assert_eq!(prompt, format!("Persona. {}", CRITIQUE_SUFFIX));
        assert!(!prompt.contains(HISTORY_LABEL));
    }

    #[test]
    fn prompt_joins_history_in_order() {
        let history = vec!["first".to_string(), "second".to_string()];
        let prompt = build_critique_prompt("Persona.", &history);
        assert_eq!(
            prompt,
            format!("Persona. {} first | second. {}", HISTORY_LABEL, CRITIQUE_SUFFIX)
        );
    }

    #[test]
    fn prompt_always_ends_with_suffix() {
        let history = vec!["a".to_string()];
        let prompt = build_critique_prompt("P.", &history);
        assert!(prompt.ends_with(CRITIQUE_SUFFIX));
    }
}
