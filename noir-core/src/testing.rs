//! Testing utilities for the noir engine.
//!
//! This module provides tools for integration testing:
//! - `MockModel` for deterministic testing without API calls
//! - `TestHarness` for scripted cases through the full [`Game`] API
//! - Assertion helpers for verifying session state

use crate::config::StoryConfig;
use crate::game::{Game, TurnOutcome};
use crate::model::{ModelError, ModelReply, ModelRequest, Source, StoryModel};
use crate::persist::MemoryBlobStore;
use crate::state::{CharacterStats, CharacterStatus, SessionState};
use crate::storyteller::Storyteller;
use crate::validate::ModelTurnResponse;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A scripted reply from the mock model.
#[derive(Debug, Clone)]
pub struct MockReply {
    outcome: Result<ModelReply, String>,
    delay: Option<Duration>,
}

impl MockReply {
    /// Reply with a turn serialized as JSON.
    pub fn turn(turn: &ModelTurnResponse) -> Self {
        let text = serde_json::to_string(turn).unwrap_or_default();
        Self::text(text)
    }

    /// Reply with raw text, valid JSON or not.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            outcome: Ok(ModelReply::text(text)),
            delay: None,
        }
    }

    /// Fail the call as if the backend were unreachable.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            outcome: Err(message.into()),
            delay: None,
        }
    }

    /// Attach grounding sources to a successful reply.
    pub fn with_sources(mut self, sources: Vec<Source>) -> Self {
        if let Ok(ref mut reply) = self.outcome {
            reply.sources = sources;
        }
        self
    }

    /// Hold the reply back for a while before returning it.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// A model that returns scripted replies in order and records requests.
///
/// Once the script runs out every call fails.
#[derive(Debug, Default)]
pub struct MockModel {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<ModelRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockModel {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Add a reply to the end of the script.
    pub fn push(&self, reply: MockReply) {
        lock(&self.replies).push_back(reply);
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<ModelRequest> {
        lock(&self.requests).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }
}

#[async_trait]
impl StoryModel for MockModel {
    async fn generate(&self, request: ModelRequest) -> Result<ModelReply, ModelError> {
        lock(&self.requests).push(request);
        let next = lock(&self.replies).pop_front();

        let Some(reply) = next else {
            return Err(ModelError::Unavailable("no more scripted replies".to_string()));
        };
        if let Some(delay) = reply.delay {
            tokio::time::sleep(delay).await;
        }
        reply.outcome.map_err(ModelError::Unavailable)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Test harness for running scripted cases.
pub struct TestHarness {
    /// The game under test.
    pub game: Game,
    /// The scripted model behind it.
    pub model: Arc<MockModel>,
    /// The in-memory save store behind it.
    pub store: Arc<MemoryBlobStore>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(StoryConfig::default())
    }

    pub fn with_config(config: StoryConfig) -> Self {
        let model = Arc::new(MockModel::new(Vec::new()));
        let store = Arc::new(MemoryBlobStore::new());
        let game = Game::new(Storyteller::new(model.clone(), config), store.clone());
        Self { game, model, store }
    }

    /// Queue a full turn.
    pub fn expect_turn(&mut self, turn: ModelTurnResponse) -> &mut Self {
        self.model.push(MockReply::turn(&turn));
        self
    }

    /// Queue a turn that only narrates, keeping the current state.
    pub fn expect_narrative(&mut self, text: impl Into<String>) -> &mut Self {
        let state = self.game.state();
        let turn = ModelTurnResponse::new(
            text,
            state.stats,
            state.inventory.clone(),
            state.character_list(),
        );
        self.expect_turn(turn)
    }

    /// Queue raw reply text.
    pub fn expect_text(&mut self, text: impl Into<String>) -> &mut Self {
        self.model.push(MockReply::text(text));
        self
    }

    /// Queue a transport failure.
    pub fn expect_failure(&mut self) -> &mut Self {
        self.model.push(MockReply::failure("connection reset"));
        self
    }

    /// Start a case. Panics if the game refuses.
    pub async fn start(&mut self, premise: &str) -> TurnOutcome {
        self.game
            .start(premise)
            .await
            .expect("start should succeed with a mock model")
    }

    /// Submit an action. Panics if the game refuses.
    pub async fn input(&mut self, action: &str) -> TurnOutcome {
        self.game
            .submit_action(action)
            .await
            .expect("action should succeed on an open case")
    }

    pub fn state(&self) -> &SessionState {
        self.game.state()
    }

    pub fn stats(&self) -> CharacterStats {
        self.state().stats
    }

    pub fn has_item(&self, item: &str) -> bool {
        self.state().inventory.iter().any(|i| i == item)
    }

    pub fn character_status(&self, name: &str) -> Option<CharacterStatus> {
        self.state().characters.get(name).map(|c| c.status)
    }

    /// Get the last narrator entry.
    pub fn last_narrative(&self) -> Option<&str> {
        self.state()
            .transcript
            .iter()
            .rev()
            .find(|e| !e.is_user_action)
            .map(|e| e.text.as_str())
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert the detective's stats.
#[track_caller]
pub fn assert_stats(harness: &TestHarness, health: i32, resolve: i32, suspicion: i32) {
    let actual = harness.stats();
    assert_eq!(
        actual,
        CharacterStats::new(health, resolve, suspicion),
        "Expected stats {health}/{resolve}/{suspicion}, got {}/{}/{}",
        actual.health,
        actual.resolve,
        actual.suspicion
    );
}

/// Assert the detective carries an item.
#[track_caller]
pub fn assert_has_item(harness: &TestHarness, item: &str) {
    assert!(harness.has_item(item), "Expected '{item}' in inventory");
}

/// Assert an achievement has been unlocked.
#[track_caller]
pub fn assert_has_achievement(harness: &TestHarness, id: &str) {
    assert!(
        harness.state().has_achievement(id),
        "Expected achievement '{id}' to be unlocked"
    );
}

/// Assert a character's status.
#[track_caller]
pub fn assert_character_status(harness: &TestHarness, name: &str, status: CharacterStatus) {
    assert_eq!(
        harness.character_status(name),
        Some(status),
        "Expected '{name}' to be {status}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CharacterRecord;

    #[tokio::test]
    async fn test_mock_model_script() {
        let model = MockModel::new(vec![MockReply::text("one"), MockReply::failure("down")]);
        let request = ModelRequest::single("m", "hi");

        assert_eq!(model.generate(request.clone()).await.unwrap().text, "one");
        assert!(model.generate(request.clone()).await.is_err());
        assert!(matches!(
            model.generate(request).await,
            Err(ModelError::Unavailable(_))
        ));
        assert_eq!(model.requests().len(), 3);
        assert_eq!(model.remaining(), 0);
    }

    #[tokio::test]
    async fn test_harness_basic() {
        let mut harness = TestHarness::new();
        harness.expect_turn(ModelTurnResponse::new(
            "The office smells of rain.",
            CharacterStats::default(),
            vec!["Badge".into()],
            vec![CharacterRecord::new("Lena", "The sister", CharacterStatus::Alive)],
        ));

        let outcome = harness.start("A missing singer").await;
        assert_eq!(outcome.narrative, "The office smells of rain.");
        assert_stats(&harness, 100, 100, 0);
        assert_has_item(&harness, "Badge");
        assert_character_status(&harness, "Lena", CharacterStatus::Alive);
    }

    #[tokio::test]
    async fn test_multiple_responses() {
        let mut harness = TestHarness::new();
        harness.expect_narrative("Response 1");
        harness.start("p").await;

        harness.expect_narrative("Response 2").expect_narrative("Response 3");
        assert_eq!(harness.input("first").await.narrative, "Response 2");
        assert_eq!(harness.input("second").await.narrative, "Response 3");

        // After scripted responses run out, the turn falls back.
        assert!(harness.input("third").await.narrative.contains("Connection lost"));
        assert_eq!(harness.last_narrative(), Some(crate::storyteller::CONNECTION_LOST));
    }
}
