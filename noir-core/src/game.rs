//! Game - the primary public API for a noir case.
//!
//! Wraps the [`Storyteller`], the story session, the session state and a
//! save store into one object a front-end drives with intents: start,
//! submit an action, save, load, reset.

use crate::news::NewsDigest;
use crate::persist::{self, BlobStore, PersistError};
use crate::state::{Achievement, SessionState};
use crate::storyteller::{normalize_action, StoryError, StorySession, Storyteller};
use crate::validate::ModelTurnResponse;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// How long an achievement notice stays up.
pub const NOTICE_DURATION: Duration = Duration::from_secs(4);

/// Premise used when the player does not supply one.
pub const DEFAULT_PREMISE: &str = "You are a private detective in a rain-soaked city in 1947. \
A nightclub singer has gone missing, and her sister is waiting in your office.";

/// Errors from Game operations.
#[derive(Debug, Error)]
pub enum GameError {
    #[error(transparent)]
    Story(#[from] StoryError),

    #[error("Save error: {0}")]
    Persist(#[from] PersistError),
}

/// A transient notice for a newly unlocked achievement.
#[derive(Debug, Clone, PartialEq)]
pub struct AchievementNotice {
    pub achievement: Achievement,
    pub shown_at: Instant,
}

impl AchievementNotice {
    pub fn new(achievement: Achievement, shown_at: Instant) -> Self {
        Self {
            achievement,
            shown_at,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.shown_at) >= NOTICE_DURATION
    }
}

/// What one turn produced, for the front-end to show.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub narrative: String,
    /// First achievement this turn unlocked.
    pub unlocked: Option<Achievement>,
}

/// One game of the detective story.
pub struct Game {
    storyteller: Storyteller,
    session: StorySession,
    state: SessionState,
    store: Arc<dyn BlobStore>,
    notice: Option<AchievementNotice>,
}

impl Game {
    pub fn new(storyteller: Storyteller, store: Arc<dyn BlobStore>) -> Self {
        Self {
            storyteller,
            session: StorySession::new(),
            state: SessionState::default(),
            store,
            notice: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn storyteller(&self) -> &Storyteller {
        &self.storyteller
    }

    /// Whether a story is open for actions.
    pub fn is_active(&self) -> bool {
        self.session.is_open()
    }

    /// Start a new case, replacing the current one.
    ///
    /// Nothing changes if the storyteller is not initialized.
    pub async fn start(&mut self, premise: &str) -> Result<TurnOutcome, GameError> {
        let premise = match premise.trim() {
            "" => DEFAULT_PREMISE,
            trimmed => trimmed,
        };

        let session = StorySession::new();
        let opening = self.storyteller.begin_story(&session, premise).await?;

        self.session = session;
        self.state = SessionState::new(premise);
        self.notice = None;
        Ok(self.apply(&opening))
    }

    /// Record the player's action and advance the story by one turn.
    pub async fn submit_action(&mut self, action: &str) -> Result<TurnOutcome, GameError> {
        let action = normalize_action(action);
        let characters = self.state.character_list();
        let turn = self
            .storyteller
            .advance_story(
                &self.session,
                action,
                &self.state.stats,
                &self.state.inventory,
                &characters,
            )
            .await?;

        self.state.append_entry(action, true);
        Ok(self.apply(&turn))
    }

    fn apply(&mut self, turn: &ModelTurnResponse) -> TurnOutcome {
        let unlocked = self.state.apply_turn(turn);
        if let Some(ref achievement) = unlocked {
            log::debug!("achievement unlocked: {}", achievement.id);
            self.notice = Some(AchievementNotice::new(achievement.clone(), Instant::now()));
        }
        TurnOutcome {
            narrative: turn.narrative.clone(),
            unlocked,
        }
    }

    /// The current achievement notice, until it expires.
    pub fn notice(&self, now: Instant) -> Option<&AchievementNotice> {
        self.notice.as_ref().filter(|n| !n.is_expired(now))
    }

    /// Snapshot the current state. Returns the save time.
    pub async fn save(&self) -> Result<String, GameError> {
        Ok(persist::save_session(self.store.as_ref(), &self.state).await?)
    }

    /// Restore the saved snapshot. Returns false when there is none.
    ///
    /// The story context is re-seeded from the snapshot when a model is
    /// available; without one the state still loads for reading.
    pub async fn load(&mut self) -> Result<bool, GameError> {
        let Some(state) = persist::load_session(self.store.as_ref()).await else {
            return Ok(false);
        };

        let session = StorySession::new();
        match self.storyteller.resume_story(&session, &state).await {
            Ok(()) => {}
            Err(StoryError::NotInitialized) => {
                log::warn!("loaded save without a storyteller; actions stay unavailable")
            }
            Err(e) => return Err(e.into()),
        }

        self.session = session;
        self.state = state;
        self.notice = None;
        Ok(true)
    }

    /// The save time of the stored snapshot, if any.
    pub async fn saved_at(&self) -> Option<String> {
        persist::peek_saved_at(self.store.as_ref()).await
    }

    /// Forget the current case and delete the save.
    pub async fn reset(&mut self) -> Result<(), GameError> {
        persist::clear_session(self.store.as_ref()).await?;
        self.session = StorySession::new();
        self.state = SessionState::default();
        self.notice = None;
        Ok(())
    }

    /// Synopsis of recent diary entries.
    pub async fn summarize(&self) -> String {
        self.storyteller.summarize_case(&self.state.transcript).await
    }

    /// Real-world news echoing the premise.
    pub async fn news(&self) -> NewsDigest {
        self.storyteller.lookup_news(&self.state.premise).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_expiry() {
        let start = Instant::now();
        let notice = AchievementNotice::new(Achievement::new("a", "A", ""), start);

        assert!(!notice.is_expired(start));
        assert!(!notice.is_expired(start + Duration::from_millis(3999)));
        assert!(notice.is_expired(start + NOTICE_DURATION));
    }
}
