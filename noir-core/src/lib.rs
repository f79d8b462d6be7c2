//! Noir detective story engine with an AI narrator.
//!
//! This crate provides:
//! - Session state for a case: diary, stats, inventory, characters, achievements
//! - A storyteller that turns player actions into validated narrator turns
//! - Hardened extraction of the narrator's JSON from free text
//! - Case summaries and web-grounded news lookups
//! - Snapshot persistence over a pluggable blob store
//!
//! # Quick Start
//!
//! ```ignore
//! use noir_core::{FileBlobStore, Game, Storyteller};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(FileBlobStore::new("saves"));
//!     let mut game = Game::new(Storyteller::from_env(), store);
//!
//!     let opening = game.start("A body in the harbour at dawn").await?;
//!     println!("{}", opening.narrative);
//!
//!     let turn = game.submit_action("Check the dead man's pockets").await?;
//!     println!("{}", turn.narrative);
//!
//!     game.save().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod game;
pub mod model;
pub mod news;
pub mod persist;
pub mod state;
pub mod storyteller;
pub mod summary;
pub mod testing;
pub mod validate;

// Re-export for convenience
pub use noir_macros::Schema;

// Primary public API
pub use config::StoryConfig;
pub use game::{AchievementNotice, Game, GameError, TurnOutcome, DEFAULT_PREMISE, NOTICE_DURATION};
pub use model::{ChatSession, ClaudeModel, ModelError, ModelReply, ModelRequest, Source, StoryModel};
pub use news::{NewsDigest, NEWS_UNAVAILABLE};
pub use persist::{BlobStore, FileBlobStore, MemoryBlobStore, PersistError, SavedSession};
pub use state::{
    Achievement, CharacterRecord, CharacterStats, CharacterStatus, DiaryEntry, SessionState,
};
pub use storyteller::{StoryError, StorySession, Storyteller};
pub use summary::CASE_SUMMARY_UNAVAILABLE;
pub use testing::{MockModel, MockReply, TestHarness};
pub use validate::{parse_turn_response, ModelTurnResponse, ValidationError};
