use serde::{Deserialize, Serialize};

/// Server configuration. Credentials, port, and allowed origin come from
/// the environment; prompts and tuning values carry defaults and are
/// overridable in tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default)]
    pub google_api_key: String,
    #[serde(default)]
    pub google_cse_id: String,
    pub port: u16,
    /// Origin allowed to open WebSocket connections. `*` disables the
    /// check; requests without an `Origin` header (non-browser clients)
    /// are always allowed.
    pub allowed_origin: String,
    pub vision_model: String,
    pub speech_model: String,
    pub speech_voice: String,
    pub critique_persona: String,
    pub critique_user_text: String,
    pub keyword_persona: String,
    pub critique_max_tokens: u32,
    pub keyword_max_tokens: u32,
    pub reference_image_count: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            google_api_key: String::new(),
            google_cse_id: String::new(),
            port: 3001,
            allowed_origin: "http://localhost:5173".into(),
            vision_model: "gpt-4-turbo".into(),
            speech_model: "tts-1".into(),
            speech_voice: "alloy".into(),
            critique_persona: "Ты — искусственный интеллект, помогающий рисовать. Проанализируй изображение и скажи, что нарисовать дальше и где именно на рисунке. Не предлагай улучшения и не давай советов — только конкретное указание, что и где нарисовать.".into(),
            critique_user_text: "Вот фото моего рисунка. Скажи, что нарисовать дальше и где.".into(),
            keyword_persona: "На основе этого рисунка, дай только одно ключевое слово или короткую фразу (1-3 слова) на английском, чтобы найти референс-изображения для улучшения этого рисунка.".into(),
            critique_max_tokens: 50,
            keyword_max_tokens: 10,
            reference_image_count: 3,
        }
    }
}

impl Settings {
    /// Build settings from the process environment on top of the defaults.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            settings.openai_api_key = key;
        }
        if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
            settings.google_api_key = key;
        }
        if let Ok(id) = std::env::var("GOOGLE_CSE_ID") {
            settings.google_cse_id = id;
        }
        if let Ok(port) = std::env::var("EASEL_PORT") {
            match port.parse() {
                Ok(port) => settings.port = port,
                Err(_) => log::warn!("Ignoring invalid EASEL_PORT value: {}", port),
            }
        }
        if let Ok(origin) = std::env::var("EASEL_ALLOWED_ORIGIN") {
            settings.allowed_origin = origin;
        }
        settings
    }

    /// Names of required credentials that are absent. The vision and
    /// speech calls cannot degrade, so their key is required; Google
    /// search credentials are optional and merely degrade search.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.openai_api_key.is_empty() {
            missing.push("OPENAI_API_KEY");
        }
        missing
    }

    pub fn has_search_credentials(&self) -> bool {
        !self.google_api_key.is_empty() && !self.google_cse_id.is_empty()
    }

    /// Log a configured/not-configured line per credential.
    pub fn log_credential_status(&self) {
        let status = |present: bool| if present { "Configured" } else { "Not configured" };
        log::info!("OPENAI_API_KEY: {}", status(!self.openai_api_key.is_empty()));
        log::info!("GOOGLE_API_KEY: {}", status(!self.google_api_key.is_empty()));
        log::info!("GOOGLE_CSE_ID: {}", status(!self.google_cse_id.is_empty()));
    }
}
