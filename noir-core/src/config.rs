//! Storyteller configuration.

/// Model used when nothing else is configured.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Configuration for the storyteller and its advisory calls.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryConfig {
    /// Model for story turns.
    pub model: String,

    /// Maximum tokens for a story turn.
    pub max_tokens: usize,

    /// Temperature for story turns.
    pub temperature: f32,

    /// Model for case summaries. Falls back to `model`.
    pub summary_model: Option<String>,

    /// Model for news lookups. Falls back to `model`.
    pub news_model: Option<String>,

    /// Chat turns kept in a story session, opening exchange included.
    pub history_window: usize,

    /// Extra instructions appended to the narrator prompt.
    pub custom_narrator_prompt: Option<String>,
}

impl Default for StoryConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 2048,
            temperature: 0.9,
            summary_model: None,
            news_model: None,
            history_window: 40,
            custom_narrator_prompt: None,
        }
    }
}

impl StoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from `NOIR_MODEL`, `NOIR_MAX_TOKENS` and `NOIR_TEMPERATURE`.
    ///
    /// Unparsable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`StoryConfig::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(model) = lookup("NOIR_MODEL").filter(|m| !m.trim().is_empty()) {
            config.model = model.trim().to_string();
        }
        if let Some(raw) = lookup("NOIR_MAX_TOKENS") {
            match raw.trim().parse::<usize>() {
                Ok(tokens) if tokens > 0 => config.max_tokens = tokens,
                _ => log::warn!("ignoring invalid NOIR_MAX_TOKENS={raw:?}"),
            }
        }
        if let Some(raw) = lookup("NOIR_TEMPERATURE") {
            match raw.trim().parse::<f32>() {
                Ok(temp) if (0.0..=1.0).contains(&temp) => config.temperature = temp,
                _ => log::warn!("ignoring invalid NOIR_TEMPERATURE={raw:?}"),
            }
        }

        config
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, tokens: usize) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = temp.clamp(0.0, 1.0);
        self
    }

    pub fn with_summary_model(mut self, model: impl Into<String>) -> Self {
        self.summary_model = Some(model.into());
        self
    }

    pub fn with_news_model(mut self, model: impl Into<String>) -> Self {
        self.news_model = Some(model.into());
        self
    }

    pub fn with_history_window(mut self, turns: usize) -> Self {
        self.history_window = turns;
        self
    }

    /// Append extra instructions to the narrator prompt.
    pub fn with_narrator_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.custom_narrator_prompt = Some(prompt.into());
        self
    }

    pub fn summary_model(&self) -> &str {
        self.summary_model.as_deref().unwrap_or(&self.model)
    }

    pub fn news_model(&self) -> &str {
        self.news_model.as_deref().unwrap_or(&self.model)
    }
}
