//! Turn Orchestrator.
//!
//! [`Storyteller`] turns a player action into a narrator request, validates
//! the reply and hands back a [`ModelTurnResponse`]. Model and validation
//! failures never escape: they are logged and replaced with a fixed
//! fallback turn so the front-end always has something to show.
//!
//! The conversational context lives in a [`StorySession`] owned by the
//! caller. Only one turn may be in flight per session.

use crate::config::StoryConfig;
use crate::model::{ChatSession, ClaudeModel, StoryModel};
use crate::state::{CharacterRecord, CharacterStats, SessionState};
use crate::validate::{parse_turn_response, ModelTurnResponse};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Narrative used when the opening scene cannot be generated.
pub const FALLBACK_OPENING: &str = "The city is quiet tonight. Too quiet. \
The phone on your desk stays silent, and the rain keeps its secrets. (The line to the narrator is down. Try again in a moment.)";

/// Narrative used when a turn cannot be generated.
pub const CONNECTION_LOST: &str = "Static crackles on the line. Whatever happened next is lost in the noise. \
(Connection lost. Your progress is safe; try that again.)";

/// Placeholder inventory item for the fallback opening.
pub const UNKNOWN_ITEM: &str = "(Unknown)";

/// What an empty action is sent as.
pub const WAIT_ACTION: &str = "wait";

/// Errors that stop a turn before the model is called.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoryError {
    #[error("the storyteller is not initialized - set ANTHROPIC_API_KEY")]
    NotInitialized,

    #[error("no active story session - begin a story first")]
    NoActiveSession,

    #[error("a turn is already in progress for this session")]
    TurnInFlight,
}

/// The conversational context of one game.
#[derive(Debug)]
pub struct StorySession {
    id: Uuid,
    chat: Mutex<Option<ChatSession>>,
}

impl StorySession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            chat: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// True once a story has been begun or resumed. A session with a turn
    /// in flight counts as open.
    pub fn is_open(&self) -> bool {
        self.chat.try_lock().map(|chat| chat.is_some()).unwrap_or(true)
    }
}

impl Default for StorySession {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds narrator requests and validates what comes back.
#[derive(Clone)]
pub struct Storyteller {
    model: Option<Arc<dyn StoryModel>>,
    config: StoryConfig,
}

impl Storyteller {
    pub fn new(model: Arc<dyn StoryModel>, config: StoryConfig) -> Self {
        Self {
            model: Some(model),
            config,
        }
    }

    /// A storyteller with no model. Every entry point fails with
    /// [`StoryError::NotInitialized`].
    pub fn uninitialized(config: StoryConfig) -> Self {
        Self {
            model: None,
            config,
        }
    }

    /// Claude-backed storyteller configured from the environment.
    ///
    /// A missing API key yields an uninitialized storyteller rather than an
    /// error, so the front-end can still start and report it.
    pub fn from_env() -> Self {
        Self::claude_from_env(StoryConfig::from_env())
    }

    /// Like [`Storyteller::from_env`] with an explicit configuration.
    pub fn claude_from_env(config: StoryConfig) -> Self {
        match ClaudeModel::from_env() {
            Ok(model) => Self::new(Arc::new(model), config),
            Err(e) => {
                log::warn!("storyteller unavailable: {e}");
                Self::uninitialized(config)
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.model.is_some()
    }

    pub fn config(&self) -> &StoryConfig {
        &self.config
    }

    pub(crate) fn model(&self) -> Result<&dyn StoryModel, StoryError> {
        self.model.as_deref().ok_or(StoryError::NotInitialized)
    }

    /// The fixed narrator instruction, plus any configured extras.
    pub fn system_prompt(&self) -> String {
        let mut prompt = String::from(include_str!("prompts/narrator.txt"));
        if let Some(ref custom) = self.config.custom_narrator_prompt {
            prompt.push_str("\n\n## Additional Instructions\n");
            prompt.push_str(custom);
        }
        prompt
    }

    fn open_chat(&self) -> ChatSession {
        ChatSession::open(
            self.system_prompt(),
            Some(ModelTurnResponse::json_schema()),
            self.config.history_window,
        )
    }

    /// Open a new context for `premise` and generate the opening scene.
    ///
    /// Replaces any context the session already had.
    pub async fn begin_story(
        &self,
        session: &StorySession,
        premise: &str,
    ) -> Result<ModelTurnResponse, StoryError> {
        let model = self.model()?;
        let mut slot = session.chat.try_lock().map_err(|_| StoryError::TurnInFlight)?;

        let mut chat = self.open_chat();
        let opening = opening_prompt(premise);
        let turn = match self.exchange(&mut chat, model, opening.clone()).await {
            Some(turn) => turn,
            None => {
                let fallback = fallback_opening();
                // A failed call leaves no turns behind; keep the premise in context.
                if chat.history().is_empty() {
                    let seeded = serde_json::to_string(&fallback).unwrap_or_default();
                    chat.seed(opening, seeded);
                }
                fallback
            }
        };

        log::debug!("story session {} opened as chat {}", session.id, chat.id());
        *slot = Some(chat);
        Ok(turn)
    }

    /// Send the player's action as the next turn of the open context.
    ///
    /// On failure the caller's stats, inventory and characters come back
    /// unchanged under a connection-lost narrative.
    pub async fn advance_story(
        &self,
        session: &StorySession,
        action: &str,
        stats: &CharacterStats,
        inventory: &[String],
        characters: &[CharacterRecord],
    ) -> Result<ModelTurnResponse, StoryError> {
        let model = self.model()?;
        let mut slot = session.chat.try_lock().map_err(|_| StoryError::TurnInFlight)?;
        let chat = slot.as_mut().ok_or(StoryError::NoActiveSession)?;

        let prompt = turn_prompt(normalize_action(action), stats, inventory, characters);
        let turn = self.exchange(chat, model, prompt).await.unwrap_or_else(|| {
            ModelTurnResponse::new(
                CONNECTION_LOST,
                *stats,
                inventory.to_vec(),
                characters.to_vec(),
            )
        });
        Ok(turn)
    }

    /// Re-open a context for a restored snapshot without calling the model.
    ///
    /// The new context is seeded with the premise and the current state so
    /// later turns pick up where the snapshot left off.
    pub async fn resume_story(
        &self,
        session: &StorySession,
        state: &SessionState,
    ) -> Result<(), StoryError> {
        self.model()?;
        let mut slot = session.chat.try_lock().map_err(|_| StoryError::TurnInFlight)?;

        let last_narrative = state
            .transcript
            .iter()
            .rev()
            .find(|entry| !entry.is_user_action)
            .map(|entry| entry.text.clone())
            .unwrap_or_default();
        let snapshot = ModelTurnResponse::new(
            last_narrative,
            state.stats,
            state.inventory.clone(),
            state.character_list(),
        );
        let seeded = serde_json::to_string(&snapshot).unwrap_or_default();

        let mut chat = self.open_chat();
        chat.seed(opening_prompt(&state.premise), seeded);
        *slot = Some(chat);
        Ok(())
    }

    /// One narrator exchange. `None` means the caller should fall back.
    async fn exchange(
        &self,
        chat: &mut ChatSession,
        model: &dyn StoryModel,
        prompt: String,
    ) -> Option<ModelTurnResponse> {
        let reply = match chat.send(model, &self.config, prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("narrator call via {} failed: {e}", model.name());
                return None;
            }
        };

        match parse_turn_response(&reply.text) {
            Ok(turn) => Some(turn),
            Err(e) => {
                log::warn!("narrator reply rejected: {e}");
                log::debug!("rejected reply: {}", reply.text);
                None
            }
        }
    }
}

/// Empty or whitespace-only actions become [`WAIT_ACTION`].
pub fn normalize_action(action: &str) -> &str {
    let trimmed = action.trim();
    if trimmed.is_empty() {
        WAIT_ACTION
    } else {
        trimmed
    }
}

fn opening_prompt(premise: &str) -> String {
    include_str!("prompts/opening.txt").replace("{premise}", premise.trim())
}

fn fallback_opening() -> ModelTurnResponse {
    ModelTurnResponse::new(
        FALLBACK_OPENING,
        CharacterStats::default(),
        vec![UNKNOWN_ITEM.to_string()],
        Vec::new(),
    )
}

/// Compact state prefix plus the action. Characters are sent by name only.
fn turn_prompt(
    action: &str,
    stats: &CharacterStats,
    inventory: &[String],
    characters: &[CharacterRecord],
) -> String {
    let inventory = if inventory.is_empty() {
        "nothing".to_string()
    } else {
        inventory.join(", ")
    };
    let names = if characters.is_empty() {
        "none".to_string()
    } else {
        characters
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "[Stats: health {}, resolve {}, suspicion {}]\n[Inventory: {inventory}]\n[Known characters: {names}]\n\nDetective's action: {action}",
        stats.health, stats.resolve, stats.suspicion
    )
}
