use async_trait::async_trait;

pub mod google_search;
pub mod openai_speech;
pub mod openai_vision;
pub mod types;
pub use types::*;

/// Trait for vision-language providers.
/// One implementation serves both the critique and the keyword call; the
/// two differ only in the `VisionQuery` they pass.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Run one vision query and return the single text completion.
    async fn complete(&self, query: &VisionQuery) -> Result<String, AiError>;

    /// Provider name for logging/display
    fn name(&self) -> &str;
}

/// Trait for speech-synthesis providers.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Convert `text` to a complete audio payload (encoded bytes).
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, AiError>;

    /// Provider name for logging/display
    fn name(&self) -> &str;
}

/// Trait for reference-image search providers.
#[async_trait]
pub trait ImageSearchProvider: Send + Sync {
    /// Return at most `count` image URLs for `query`, in provider order.
    async fn search(&self, query: &str, count: usize) -> Result<Vec<String>, AiError>;

    /// Provider name for logging/display
    fn name(&self) -> &str;
}
