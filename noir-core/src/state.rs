//! Session state for a running case.
//!
//! Holds the diary transcript, the detective's stats, inventory, the
//! character roster and unlocked achievements. Only turn application
//! mutates it; front-ends read it.

use crate::validate::ModelTurnResponse;
use chrono::Local;
use noir_macros::Schema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// The detective's three tracked meters.
///
/// Values are conventionally within 0..=100 but are stored exactly as the
/// narrator reports them; use [`CharacterStats::clamped`] for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Schema)]
pub struct CharacterStats {
    /// Physical condition, 100 is unharmed
    pub health: i32,
    /// Mental fortitude, 100 is unshaken
    pub resolve: i32,
    /// How much attention the detective has drawn, 0 is unnoticed
    pub suspicion: i32,
}

impl CharacterStats {
    pub const fn new(health: i32, resolve: i32, suspicion: i32) -> Self {
        Self {
            health,
            resolve,
            suspicion,
        }
    }

    /// Copy with every meter limited to 0..=100.
    pub fn clamped(&self) -> Self {
        Self {
            health: self.health.clamp(0, 100),
            resolve: self.resolve.clamp(0, 100),
            suspicion: self.suspicion.clamp(0, 100),
        }
    }
}

impl Default for CharacterStats {
    fn default() -> Self {
        Self::new(100, 100, 0)
    }
}

/// Whether a character is still in play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Schema)]
#[serde(from = "String")]
pub enum CharacterStatus {
    Alive,
    Dead,
    Missing,
    #[default]
    Unknown,
}

impl From<String> for CharacterStatus {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "alive" => CharacterStatus::Alive,
            "dead" => CharacterStatus::Dead,
            "missing" => CharacterStatus::Missing,
            _ => CharacterStatus::Unknown,
        }
    }
}

impl std::fmt::Display for CharacterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CharacterStatus::Alive => "Alive",
            CharacterStatus::Dead => "Dead",
            CharacterStatus::Missing => "Missing",
            CharacterStatus::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// Someone the detective has met or heard about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Schema)]
pub struct CharacterRecord {
    /// Full name, used as the roster key
    pub name: String,
    /// One or two sentences on who they are
    pub description: String,
    /// Alive, Dead, Missing or Unknown
    pub status: CharacterStatus,
}

impl CharacterRecord {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        status: CharacterStatus,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            status,
        }
    }
}

/// A milestone unlocked during the case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Schema)]
pub struct Achievement {
    /// Unique lowercase slug such as first_blood
    pub id: String,
    /// Short display title
    pub title: String,
    /// What the detective did to earn it
    pub description: String,
}

impl Achievement {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
        }
    }
}

/// One line of the case diary. Never edited after it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiaryEntry {
    pub id: String,
    pub text: String,
    pub timestamp: String,
    pub is_user_action: bool,
}

impl DiaryEntry {
    fn new(text: impl Into<String>, is_user_action: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            timestamp: Local::now().format("%H:%M:%S").to_string(),
            is_user_action,
        }
    }
}

/// Everything a front-end shows, and everything a snapshot stores.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub transcript: Vec<DiaryEntry>,
    pub stats: CharacterStats,
    pub inventory: Vec<String>,
    pub characters: BTreeMap<String, CharacterRecord>,
    pub achievements: Vec<Achievement>,
    pub premise: String,
}

impl SessionState {
    /// Create an empty case for the given premise.
    pub fn new(premise: impl Into<String>) -> Self {
        Self {
            premise: premise.into(),
            ..Self::default()
        }
    }

    /// Append a diary entry and return it.
    pub fn append_entry(&mut self, text: impl Into<String>, is_user_action: bool) -> &DiaryEntry {
        self.transcript.push(DiaryEntry::new(text, is_user_action));
        &self.transcript[self.transcript.len() - 1]
    }

    /// Apply one narrator turn.
    ///
    /// Appends the narrative, replaces stats and inventory, upserts the
    /// characters by name and merges achievements. Returns the first
    /// achievement this turn unlocked, if any.
    pub fn apply_turn(&mut self, turn: &ModelTurnResponse) -> Option<Achievement> {
        self.append_entry(turn.narrative.clone(), false);
        self.stats = turn.stats;

        self.inventory.clear();
        for item in &turn.inventory {
            if !self.inventory.contains(item) {
                self.inventory.push(item.clone());
            }
        }

        for record in &turn.characters {
            self.upsert_character(record.clone());
        }

        let unlocked = match &turn.new_achievements {
            Some(achievements) => self.merge_achievements(achievements),
            None => Vec::new(),
        };
        unlocked.into_iter().next()
    }

    /// Insert or replace a character keyed by name.
    pub fn upsert_character(&mut self, record: CharacterRecord) {
        self.characters.insert(record.name.clone(), record);
    }

    /// Add achievements whose id is not yet known.
    ///
    /// Returns the ones actually added, in delivery order. Delivering the
    /// same id twice, in one call or across calls, adds it once.
    pub fn merge_achievements(&mut self, incoming: &[Achievement]) -> Vec<Achievement> {
        let mut added = Vec::new();
        for achievement in incoming {
            if self.has_achievement(&achievement.id) {
                continue;
            }
            self.achievements.push(achievement.clone());
            added.push(achievement.clone());
        }
        added
    }

    pub fn has_achievement(&self, id: &str) -> bool {
        self.achievements.iter().any(|a| a.id == id)
    }

    /// The last `n` diary entries, oldest first.
    pub fn recent_entries(&self, n: usize) -> &[DiaryEntry] {
        let start = self.transcript.len().saturating_sub(n);
        &self.transcript[start..]
    }

    /// Roster as a list, ordered by name.
    pub fn character_list(&self) -> Vec<CharacterRecord> {
        self.characters.values().cloned().collect()
    }

    pub fn character_names(&self) -> Vec<&str> {
        self.characters.keys().map(String::as_str).collect()
    }

    /// True once the opening turn has been recorded.
    pub fn has_started(&self) -> bool {
        !self.transcript.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(narrative: &str) -> ModelTurnResponse {
        ModelTurnResponse::new(
            narrative,
            CharacterStats::new(90, 80, 10),
            vec!["Revolver".to_string()],
            vec![CharacterRecord::new("Vera", "A singer", CharacterStatus::Alive)],
        )
    }

    #[test]
    fn test_default_stats() {
        assert_eq!(CharacterStats::default(), CharacterStats::new(100, 100, 0));
    }

    #[test]
    fn test_clamped_does_not_mutate() {
        let stats = CharacterStats::new(140, -5, 50);
        assert_eq!(stats.clamped(), CharacterStats::new(100, 0, 50));
        assert_eq!(stats.health, 140);
    }

    #[test]
    fn test_status_parsing_is_lenient() {
        let parsed: CharacterStatus = serde_json::from_str("\"dead\"").unwrap();
        assert_eq!(parsed, CharacterStatus::Dead);
        let parsed: CharacterStatus = serde_json::from_str("\"Presumed drowned\"").unwrap();
        assert_eq!(parsed, CharacterStatus::Unknown);
        assert_eq!(serde_json::to_string(&CharacterStatus::Missing).unwrap(), "\"Missing\"");
    }

    #[test]
    fn test_apply_turn() {
        let mut state = SessionState::new("Rain over the docks");
        let unlocked = state.apply_turn(&turn("The phone rings."));

        assert!(unlocked.is_none());
        assert_eq!(state.transcript.len(), 1);
        assert!(!state.transcript[0].is_user_action);
        assert_eq!(state.stats, CharacterStats::new(90, 80, 10));
        assert_eq!(state.inventory, vec!["Revolver"]);
        assert_eq!(state.character_names(), vec!["Vera"]);
    }

    #[test]
    fn test_inventory_deduplicated_in_order() {
        let mut state = SessionState::new("p");
        let mut t = turn("x");
        t.inventory = vec!["Badge".into(), "Matches".into(), "Badge".into()];
        state.apply_turn(&t);
        assert_eq!(state.inventory, vec!["Badge", "Matches"]);
    }

    #[test]
    fn test_characters_upserted_by_name() {
        let mut state = SessionState::new("p");
        state.apply_turn(&turn("x"));

        let mut t = turn("y");
        t.characters = vec![
            CharacterRecord::new("Vera", "Found in the river", CharacterStatus::Dead),
            CharacterRecord::new("Sal", "Bartender", CharacterStatus::Alive),
        ];
        state.apply_turn(&t);

        assert_eq!(state.characters.len(), 2);
        assert_eq!(state.characters["Vera"].status, CharacterStatus::Dead);

        // Characters absent from a later turn are kept.
        let mut t = turn("z");
        t.characters.clear();
        state.apply_turn(&t);
        assert_eq!(state.characters.len(), 2);
    }

    #[test]
    fn test_merge_achievements_idempotent() {
        let mut state = SessionState::new("p");
        let first = Achievement::new("first_clue", "First Clue", "Found a matchbook");

        let added = state.merge_achievements(&[first.clone(), first.clone()]);
        assert_eq!(added.len(), 1);

        let added = state.merge_achievements(&[first.clone()]);
        assert!(added.is_empty());
        assert_eq!(state.achievements.len(), 1);
    }

    #[test]
    fn test_apply_turn_surfaces_first_new_achievement() {
        let mut state = SessionState::new("p");
        state.merge_achievements(&[Achievement::new("old", "Old", "")]);

        let t = turn("x").with_achievements(vec![
            Achievement::new("old", "Old", ""),
            Achievement::new("tail", "Tail", "Followed a suspect"),
            Achievement::new("bribe", "Bribe", "Paid off a cop"),
        ]);
        let unlocked = state.apply_turn(&t).unwrap();

        assert_eq!(unlocked.id, "tail");
        assert_eq!(state.achievements.len(), 3);
    }

    #[test]
    fn test_recent_entries() {
        let mut state = SessionState::new("p");
        for i in 0..30 {
            state.append_entry(format!("entry {i}"), i % 2 == 0);
        }
        let recent = state.recent_entries(20);
        assert_eq!(recent.len(), 20);
        assert_eq!(recent[0].text, "entry 10");
        assert_eq!(recent[19].text, "entry 29");
        assert_eq!(state.recent_entries(100).len(), 30);
    }

    #[test]
    fn test_entry_ids_unique() {
        let mut state = SessionState::new("p");
        let a = state.append_entry("a", true).id.clone();
        let b = state.append_entry("b", true).id.clone();
        assert_ne!(a, b);
    }
}
