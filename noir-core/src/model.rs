//! Model Client: the seam between the storyteller and a language model.
//!
//! [`StoryModel`] is the backend trait. [`ClaudeModel`] talks to the
//! Anthropic API through the `claude` crate; tests use
//! [`MockModel`](crate::testing::MockModel). [`ChatSession`] carries the
//! turns of one conversational context.

use crate::config::StoryConfig;
use async_trait::async_trait;
use claude::{Claude, Message, Request, WebSearch};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Searches the model may run for one grounded request.
const WEB_SEARCH_MAX_USES: u32 = 5;

/// Errors from a model backend. Every one of these is recoverable.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Claude API error: {0}")]
    Api(#[from] claude::Error),

    #[error("model returned an empty reply")]
    EmptyReply,

    #[error("model unavailable: {0}")]
    Unavailable(String),
}

/// Who spoke a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Model,
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Model,
            text: text.into(),
        }
    }
}

/// A web page a grounded reply drew on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub title: String,
    pub uri: String,
}

/// A single request to a model backend.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub model: String,
    pub system: Option<String>,
    /// JSON schema the reply is expected to follow.
    pub response_schema: Option<Value>,
    pub messages: Vec<ChatTurn>,
    pub temperature: Option<f32>,
    pub max_tokens: usize,
    /// Allow the backend to ground the reply with web search.
    pub web_search: bool,
}

impl ModelRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatTurn>) -> Self {
        Self {
            model: model.into(),
            system: None,
            response_schema: None,
            messages,
            temperature: None,
            max_tokens: 2048,
            web_search: false,
        }
    }

    /// A one-shot request carrying a single user prompt.
    pub fn single(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::new(model, vec![ChatTurn::user(prompt)])
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_web_search(mut self) -> Self {
        self.web_search = true;
        self
    }

    /// System instruction with the response schema appended, for backends
    /// without native structured output.
    pub fn system_with_schema(&self) -> Option<String> {
        let schema = self
            .response_schema
            .as_ref()
            .and_then(|s| serde_json::to_string_pretty(s).ok());

        match (&self.system, schema) {
            (Some(system), Some(schema)) => Some(format!(
                "{system}\n\n## Response Format\nRespond with a single JSON object matching this schema and nothing else:\n{schema}"
            )),
            (Some(system), None) => Some(system.clone()),
            (None, Some(schema)) => Some(format!(
                "Respond with a single JSON object matching this schema and nothing else:\n{schema}"
            )),
            (None, None) => None,
        }
    }
}

/// What a backend sends back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub text: String,
    pub sources: Vec<Source>,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sources: Vec::new(),
        }
    }
}

/// A language model backend. One call is one attempt; no retries.
#[async_trait]
pub trait StoryModel: Send + Sync {
    async fn generate(&self, request: ModelRequest) -> Result<ModelReply, ModelError>;

    /// Backend name for logs.
    fn name(&self) -> &str;
}

/// [`StoryModel`] backed by the Anthropic Messages API.
#[derive(Clone)]
pub struct ClaudeModel {
    client: Claude,
}

impl ClaudeModel {
    pub fn new(client: Claude) -> Self {
        Self { client }
    }

    /// Build from `ANTHROPIC_API_KEY`.
    pub fn from_env() -> Result<Self, ModelError> {
        Ok(Self::new(Claude::from_env()?))
    }

    fn build_request(request: &ModelRequest) -> Request {
        let messages = request
            .messages
            .iter()
            .map(|turn| match turn.role {
                ChatRole::User => Message::user(&turn.text),
                ChatRole::Model => Message::assistant(&turn.text),
            })
            .collect();

        let mut api_request = Request::new(messages)
            .with_model(&request.model)
            .with_max_tokens(request.max_tokens);
        if let Some(system) = request.system_with_schema() {
            api_request = api_request.with_system(system);
        }
        if let Some(temperature) = request.temperature {
            api_request = api_request.with_temperature(temperature);
        }
        if request.web_search {
            api_request = api_request.with_web_search(WebSearch::with_max_uses(WEB_SEARCH_MAX_USES));
        }
        api_request
    }
}

#[async_trait]
impl StoryModel for ClaudeModel {
    async fn generate(&self, request: ModelRequest) -> Result<ModelReply, ModelError> {
        log::debug!(
            "claude request: model={} turns={} web_search={}",
            request.model,
            request.messages.len(),
            request.web_search
        );

        let response = self.client.complete(Self::build_request(&request)).await?;
        let text = response.text();
        if text.trim().is_empty() {
            return Err(ModelError::EmptyReply);
        }

        let sources = response
            .citations()
            .into_iter()
            .map(|c| Source {
                title: c.title,
                uri: c.url,
            })
            .collect();

        Ok(ModelReply { text, sources })
    }

    fn name(&self) -> &str {
        "claude"
    }
}

/// One conversational context with a model.
///
/// The backend is stateless, so the whole turn list is resent on every
/// call. History alternates user/model and is bounded by a sliding window
/// that always keeps the opening exchange.
#[derive(Debug, Clone)]
pub struct ChatSession {
    id: Uuid,
    system: String,
    schema: Option<Value>,
    history: Vec<ChatTurn>,
    max_history: usize,
}

impl ChatSession {
    /// Open an empty context bound to a system instruction.
    pub fn open(system: impl Into<String>, schema: Option<Value>, max_history: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            system: system.into(),
            schema,
            history: Vec::new(),
            max_history: max_history.max(4),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    /// Seed an exchange without calling the model.
    pub fn seed(&mut self, user: impl Into<String>, model: impl Into<String>) {
        self.history.push(ChatTurn::user(user));
        self.history.push(ChatTurn::model(model));
        self.trim_history();
    }

    /// Send a user turn and record the reply.
    ///
    /// On failure the user turn is removed again, leaving the history as it
    /// was before the call.
    pub async fn send(
        &mut self,
        model: &dyn StoryModel,
        config: &StoryConfig,
        text: impl Into<String>,
    ) -> Result<ModelReply, ModelError> {
        self.history.push(ChatTurn::user(text));

        let mut request = ModelRequest::new(&config.model, self.history.clone())
            .with_system(self.system.clone())
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens);
        if let Some(schema) = &self.schema {
            request = request.with_schema(schema.clone());
        }

        match model.generate(request).await {
            Ok(reply) => {
                self.history.push(ChatTurn::model(reply.text.clone()));
                self.trim_history();
                Ok(reply)
            }
            Err(e) => {
                self.history.pop();
                Err(e)
            }
        }
    }

    fn trim_history(&mut self) {
        // Drop whole exchanges after the opening one so roles keep alternating.
        while self.history.len() > self.max_history && self.history.len() > 2 {
            self.history.drain(2..4.min(self.history.len()));
        }
    }
}
