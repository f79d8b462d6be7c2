//! Turn flow through the Game API with a scripted narrator.
//!
//! No network: every reply comes from `MockModel`.

use noir_core::testing::{
    assert_character_status, assert_has_achievement, assert_has_item, assert_stats,
};
use noir_core::{
    Achievement, CharacterRecord, CharacterStats, CharacterStatus, Game, GameError,
    MemoryBlobStore, ModelTurnResponse, StoryConfig, StoryError, Storyteller, TestHarness,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn opening() -> ModelTurnResponse {
    ModelTurnResponse::new(
        "Lena Marsh sits across your desk. Her sister hasn't been seen in three days.",
        CharacterStats::new(100, 100, 0),
        vec!["Snub-nosed revolver".into()],
        vec![
            CharacterRecord::new("Lena Marsh", "The client", CharacterStatus::Alive),
            CharacterRecord::new("Ruby Marsh", "The missing singer", CharacterStatus::Missing),
        ],
    )
}

// =============================================================================
// Opening and turns
// =============================================================================

#[tokio::test]
async fn test_full_case_flow() {
    let mut harness = TestHarness::new();
    harness.expect_turn(opening());

    let outcome = harness.start("A missing singer").await;
    assert!(outcome.narrative.contains("Lena Marsh"));
    assert_stats(&harness, 100, 100, 0);
    assert_has_item(&harness, "Snub-nosed revolver");
    assert_character_status(&harness, "Ruby Marsh", CharacterStatus::Missing);

    harness.expect_turn(
        ModelTurnResponse::new(
            "The Blue Lantern's bartender slides you a matchbook with a number on it.",
            CharacterStats::new(100, 95, 10),
            vec!["Snub-nosed revolver".into(), "Matchbook".into()],
            vec![CharacterRecord::new("Sal", "Bartender at the Blue Lantern", CharacterStatus::Alive)],
        )
        .with_achievements(vec![Achievement::new(
            "first_lead",
            "First Lead",
            "Found a real clue",
        )]),
    );

    let outcome = harness.input("Visit the Blue Lantern").await;
    assert_eq!(outcome.unlocked.as_ref().map(|a| a.id.as_str()), Some("first_lead"));
    assert_stats(&harness, 100, 95, 10);
    assert_has_item(&harness, "Matchbook");
    assert_has_achievement(&harness, "first_lead");

    // Characters from earlier turns stay on the roster.
    assert_eq!(harness.state().characters.len(), 3);

    let transcript = &harness.state().transcript;
    assert_eq!(transcript.len(), 3);
    assert!(!transcript[0].is_user_action);
    assert!(transcript[1].is_user_action);
    assert_eq!(transcript[1].text, "Visit the Blue Lantern");
    assert!(!transcript[2].is_user_action);
}

#[tokio::test]
async fn test_state_prefix_sent_with_action() {
    let mut harness = TestHarness::new();
    harness.expect_turn(opening());
    harness.start("A missing singer").await;

    harness.expect_narrative("You wait. Nobody comes.");
    harness.input("").await;

    let requests = harness.model.requests();
    let last = requests.last().unwrap().messages.last().unwrap().text.clone();
    assert!(last.contains("health 100, resolve 100, suspicion 0"));
    assert!(last.contains("Snub-nosed revolver"));
    assert!(last.contains("Lena Marsh, Ruby Marsh"));
    assert!(!last.contains("The missing singer"));
    assert!(last.ends_with("Detective's action: wait"));

    // The empty action is recorded as the canonical wait.
    let transcript = &harness.state().transcript;
    assert_eq!(transcript[transcript.len() - 2].text, "wait");
}

// =============================================================================
// Failure handling
// =============================================================================

#[tokio::test]
async fn test_opening_failure_uses_fallback() {
    let mut harness = TestHarness::new();
    harness.expect_failure();

    let outcome = harness.start("You are a detective...").await;
    assert!(outcome.narrative.contains("line to the narrator is down"));
    assert_stats(&harness, 100, 100, 0);
    assert_eq!(harness.state().inventory, vec!["(Unknown)"]);
    assert!(harness.state().characters.is_empty());
}

#[tokio::test]
async fn test_bad_reply_keeps_progress() {
    let mut harness = TestHarness::new();
    harness.expect_turn(opening());
    harness.start("A missing singer").await;
    let before = harness.state().clone();

    harness.expect_text("```json\n{\"narrative\": \"half a reply\"\n```");
    let outcome = harness.input("Search the dressing room").await;

    assert!(outcome.narrative.contains("Connection lost"));
    assert!(outcome.unlocked.is_none());
    let after = harness.state();
    assert_eq!(after.stats, before.stats);
    assert_eq!(after.inventory, before.inventory);
    assert_eq!(after.characters, before.characters);
    assert_eq!(after.transcript.len(), before.transcript.len() + 2);

    // The next good reply continues normally.
    harness.expect_narrative("The dressing room smells of gardenias.");
    let outcome = harness.input("Search again").await;
    assert_eq!(outcome.narrative, "The dressing room smells of gardenias.");
}

#[tokio::test]
async fn test_transport_failure_keeps_progress() {
    let mut harness = TestHarness::new();
    harness.expect_turn(opening());
    harness.start("A missing singer").await;

    harness.expect_failure();
    harness.input("Call the precinct").await;

    assert_stats(&harness, 100, 100, 0);
    assert_has_item(&harness, "Snub-nosed revolver");
    assert_character_status(&harness, "Lena Marsh", CharacterStatus::Alive);
}

#[tokio::test]
async fn test_action_before_start() {
    let mut harness = TestHarness::new();
    let result = harness.game.submit_action("look around").await;

    assert!(matches!(
        result,
        Err(GameError::Story(StoryError::NoActiveSession))
    ));
    assert!(harness.state().transcript.is_empty());
}

#[tokio::test]
async fn test_uninitialized_game_changes_nothing() {
    let store = Arc::new(MemoryBlobStore::new());
    let mut game = Game::new(Storyteller::uninitialized(StoryConfig::default()), store);

    let result = game.start("A missing singer").await;
    assert!(matches!(result, Err(GameError::Story(StoryError::NotInitialized))));
    assert!(!game.is_active());
    assert!(game.state().premise.is_empty());
    assert!(game.state().transcript.is_empty());
}

// =============================================================================
// Achievements
// =============================================================================

#[tokio::test]
async fn test_achievement_redelivery_is_ignored() {
    let mut harness = TestHarness::new();
    harness.expect_turn(opening());
    harness.start("A missing singer").await;

    let badge = Achievement::new("night_owl", "Night Owl", "Worked past midnight");
    for _ in 0..2 {
        let state = harness.state();
        let turn = ModelTurnResponse::new(
            "The clock strikes one.",
            state.stats,
            state.inventory.clone(),
            Vec::new(),
        )
        .with_achievements(vec![badge.clone()]);
        harness.expect_turn(turn);
    }

    let first = harness.input("Keep working").await;
    let second = harness.input("Keep working").await;

    assert!(first.unlocked.is_some());
    assert!(second.unlocked.is_none());
    assert_eq!(harness.state().achievements, vec![badge]);
}

#[tokio::test]
async fn test_achievement_notice_expires() {
    let mut harness = TestHarness::new();
    harness.expect_turn(
        opening().with_achievements(vec![Achievement::new("hired", "Hired", "Took the case")]),
    );
    harness.start("A missing singer").await;

    let now = Instant::now();
    let notice = harness.game.notice(now).expect("notice should be showing");
    assert_eq!(notice.achievement.id, "hired");
    assert!(harness.game.notice(now + Duration::from_secs(5)).is_none());
}

// =============================================================================
// Advisory calls
// =============================================================================

#[tokio::test]
async fn test_summary_and_news_leave_state_alone() {
    let mut harness = TestHarness::new();
    harness.expect_turn(opening());
    harness.start("A missing singer").await;
    let before = harness.state().clone();

    harness.expect_text("Ruby Marsh vanished after her last set.");
    harness.expect_failure();

    assert_eq!(
        harness.game.summarize().await,
        "Ruby Marsh vanished after her last set."
    );
    assert!(!harness.game.news().await.is_available());
    assert_eq!(harness.state(), &before);
}
