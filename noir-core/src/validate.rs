//! Response validation for narrator turns.
//!
//! The narrator is asked for a bare JSON object but regularly wraps it in
//! markdown fences or surrounds it with commentary. This module digs the
//! turn object out of arbitrary text and checks its shape before anything
//! touches session state. Nothing here panics on bad input.

use crate::state::{Achievement, CharacterRecord, CharacterStats};
use noir_macros::Schema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Fields every turn object must carry.
const REQUIRED_FIELDS: [&str; 4] = ["narrative", "stats", "inventory", "characters"];

/// Errors from validating a narrator response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("response contains no JSON object")]
    NoJson,

    #[error("response has an opening brace with no matching close")]
    Unbalanced,

    #[error("response contains {0} candidate turn objects")]
    Ambiguous(usize),

    #[error("malformed JSON: {0}")]
    Malformed(String),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid turn structure: {0}")]
    InvalidStructure(String),
}

/// One narrator turn. The only shape allowed across the trust boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Schema)]
pub struct ModelTurnResponse {
    /// Second-person noir narration of what happens next
    pub narrative: String,
    /// The detective's meters after this turn
    pub stats: CharacterStats,
    /// Every item the detective now carries
    pub inventory: Vec<String>,
    /// Characters introduced or changed by this turn
    pub characters: Vec<CharacterRecord>,
    /// Achievements unlocked by this turn, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_achievements: Option<Vec<Achievement>>,
}

impl ModelTurnResponse {
    pub fn new(
        narrative: impl Into<String>,
        stats: CharacterStats,
        inventory: Vec<String>,
        characters: Vec<CharacterRecord>,
    ) -> Self {
        Self {
            narrative: narrative.into(),
            stats,
            inventory,
            characters,
            new_achievements: None,
        }
    }

    pub fn with_achievements(mut self, achievements: Vec<Achievement>) -> Self {
        self.new_achievements = Some(achievements);
        self
    }
}

/// Parse raw narrator text into a turn.
pub fn parse_turn_response(raw: &str) -> Result<ModelTurnResponse, ValidationError> {
    let cleaned = strip_code_fences(raw);
    let object = extract_turn_object(&cleaned)?;

    for field in REQUIRED_FIELDS {
        if !object.contains_key(field) {
            return Err(ValidationError::MissingField(field));
        }
    }

    serde_json::from_value(Value::Object(object))
        .map_err(|e| ValidationError::InvalidStructure(e.to_string()))
}

/// Remove every markdown fence marker and trim.
pub fn strip_code_fences(text: &str) -> String {
    let text = text.trim();
    if !text.contains("```") {
        return text.to_string();
    }
    text.replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// JSON objects found in free text.
#[derive(Debug, Default)]
struct ObjectScan {
    /// Objects carrying a `narrative` key, in order.
    turns: Vec<Map<String, Value>>,
    /// Other objects that parsed, in order.
    others: Vec<Map<String, Value>>,
    saw_span: bool,
    saw_unbalanced: bool,
    first_error: Option<String>,
}

/// Scan `text` for balanced `{...}` spans, string-aware.
///
/// A `{` that never closes is skipped so prose like "a {stray brace" cannot
/// swallow the real object. A span that fails to parse, or parses without a
/// `narrative`, is searched again from just inside its opening brace, so a
/// turn wrapped in prose braces is still found. A turn object is taken whole.
fn scan_objects(text: &str) -> ObjectScan {
    let bytes = text.as_bytes();
    let mut scan = ObjectScan::default();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find('{') {
        let start = pos + offset;
        let Some(end) = matching_brace(bytes, start) else {
            scan.saw_unbalanced = true;
            pos = start + 1;
            continue;
        };
        scan.saw_span = true;

        match serde_json::from_str::<Value>(&text[start..=end]) {
            Ok(Value::Object(map)) if map.contains_key("narrative") => {
                scan.turns.push(map);
                pos = end + 1;
                continue;
            }
            Ok(Value::Object(map)) => scan.others.push(map),
            Ok(_) => {}
            Err(e) => {
                scan.first_error.get_or_insert_with(|| e.to_string());
            }
        }
        pos = start + 1;
    }

    scan
}

/// Index of the `}` closing the `{` at `start`, string-aware.
fn matching_brace(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn extract_turn_object(text: &str) -> Result<Map<String, Value>, ValidationError> {
    let mut scan = scan_objects(text);

    if !scan.saw_span {
        return Err(if scan.saw_unbalanced {
            ValidationError::Unbalanced
        } else {
            ValidationError::NoJson
        });
    }

    match scan.turns.len() {
        1 => Ok(scan.turns.swap_remove(0)),
        0 if !scan.others.is_empty() => Ok(scan.others.swap_remove(0)),
        0 => Err(ValidationError::Malformed(
            scan.first_error.unwrap_or_else(|| "no JSON object found".to_string()),
        )),
        n => Err(ValidationError::Ambiguous(n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CharacterStatus;

    const TURN: &str = r#"{
        "narrative": "The rain doesn't stop. Neither do you.",
        "stats": {"health": 95, "resolve": 90, "suspicion": 5},
        "inventory": ["Revolver", "Matchbook"],
        "characters": [{"name": "Vera", "description": "Singer", "status": "Alive"}]
    }"#;

    #[test]
    fn test_plain_json() {
        let turn = parse_turn_response(TURN).unwrap();
        assert_eq!(turn.stats, CharacterStats::new(95, 90, 5));
        assert_eq!(turn.inventory, vec!["Revolver", "Matchbook"]);
        assert_eq!(turn.characters[0].status, CharacterStatus::Alive);
        assert!(turn.new_achievements.is_none());
    }

    #[test]
    fn test_fenced_json() {
        let raw = format!("```json\n{TURN}\n```");
        assert!(parse_turn_response(&raw).is_ok());

        let raw = format!("```\n{TURN}\n```");
        assert!(parse_turn_response(&raw).is_ok());
    }

    #[test]
    fn test_surrounding_prose() {
        let raw = format!("Sure, here is the next scene:\n{TURN}\nLet me know what you do next.");
        let turn = parse_turn_response(&raw).unwrap();
        assert!(turn.narrative.starts_with("The rain"));
    }

    #[test]
    fn test_braces_inside_narrative() {
        let raw = r#"{"narrative": "A note reads {meet me at midnight}} and a } stray", "stats": {"health": 1, "resolve": 2, "suspicion": 3}, "inventory": [], "characters": []}"#;
        let turn = parse_turn_response(raw).unwrap();
        assert!(turn.narrative.contains("{meet me at midnight}}"));
    }

    #[test]
    fn test_escaped_quotes_inside_narrative() {
        let raw = r#"{"narrative": "She said \"{leave}\" and left.", "stats": {"health": 1, "resolve": 2, "suspicion": 3}, "inventory": [], "characters": []}"#;
        let turn = parse_turn_response(raw).unwrap();
        assert_eq!(turn.narrative, "She said \"{leave}\" and left.");
    }

    #[test]
    fn test_stray_braces_in_prose() {
        let raw = format!("Notes {{draft}} and an open {{ brace, then:\n{TURN}");
        assert!(parse_turn_response(&raw).is_ok());
    }

    #[test]
    fn test_no_json() {
        assert_eq!(
            parse_turn_response("The line went dead."),
            Err(ValidationError::NoJson)
        );
        assert_eq!(parse_turn_response(""), Err(ValidationError::NoJson));
    }

    #[test]
    fn test_unbalanced() {
        assert_eq!(
            parse_turn_response(r#"{"narrative": "cut off"#),
            Err(ValidationError::Unbalanced)
        );
    }

    #[test]
    fn test_malformed_span() {
        let err = parse_turn_response("{narrative: unquoted}").unwrap_err();
        assert!(matches!(err, ValidationError::Malformed(_)));
    }

    #[test]
    fn test_missing_required_field() {
        let raw = r#"{"narrative": "x", "stats": {"health": 1, "resolve": 2, "suspicion": 3}, "inventory": []}"#;
        assert_eq!(
            parse_turn_response(raw),
            Err(ValidationError::MissingField("characters"))
        );
    }

    #[test]
    fn test_wrong_field_type() {
        let raw = r#"{"narrative": "x", "stats": "fine", "inventory": [], "characters": []}"#;
        assert!(matches!(
            parse_turn_response(raw),
            Err(ValidationError::InvalidStructure(_))
        ));
    }

    #[test]
    fn test_two_turn_objects_are_ambiguous() {
        let raw = format!("{TURN}\n{TURN}");
        assert_eq!(parse_turn_response(&raw), Err(ValidationError::Ambiguous(2)));
    }

    #[test]
    fn test_stats_not_clamped() {
        let raw = r#"{"narrative": "x", "stats": {"health": 250, "resolve": -10, "suspicion": 0}, "inventory": [], "characters": []}"#;
        let turn = parse_turn_response(raw).unwrap();
        assert_eq!(turn.stats.health, 250);
        assert_eq!(turn.stats.resolve, -10);
    }

    #[test]
    fn test_new_achievements() {
        let raw = r#"{"narrative": "x", "stats": {"health": 1, "resolve": 2, "suspicion": 3}, "inventory": [], "characters": [],
            "new_achievements": [{"id": "first_clue", "title": "First Clue", "description": "Found it"}]}"#;
        let turn = parse_turn_response(raw).unwrap();
        assert_eq!(turn.new_achievements.unwrap()[0].id, "first_clue");
    }

    #[test]
    fn test_null_achievements_allowed() {
        let raw = r#"{"narrative": "x", "stats": {"health": 1, "resolve": 2, "suspicion": 3}, "inventory": [], "characters": [], "new_achievements": null}"#;
        assert!(parse_turn_response(raw).unwrap().new_achievements.is_none());
    }

    #[test]
    fn test_turn_wrapped_in_prose_braces() {
        let raw = format!("{{ as requested: {TURN} }}");
        let turn = parse_turn_response(&raw).unwrap();
        assert!(turn.narrative.starts_with("The rain"));

        let raw = format!("Note {{the \"key detail: {TURN}");
        assert!(parse_turn_response(&raw).is_ok());
    }

    #[test]
    fn test_turn_nested_in_wrapper_object() {
        let raw = format!(r#"{{"reply": {TURN}}}"#);
        assert_eq!(parse_turn_response(&raw).unwrap().stats.health, 95);
    }

    #[test]
    fn test_object_without_narrative() {
        let raw = r#"{"stats": {"health": 1, "resolve": 2, "suspicion": 3}, "inventory": [], "characters": []}"#;
        assert_eq!(
            parse_turn_response(raw),
            Err(ValidationError::MissingField("narrative"))
        );
    }

    #[test]
    fn test_response_schema() {
        let schema = ModelTurnResponse::json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["narrative"]["type"], "string");
        assert_eq!(schema["properties"]["stats"]["properties"]["health"]["type"], "integer");
        assert_eq!(schema["properties"]["inventory"]["items"]["type"], "string");
        assert_eq!(
            schema["properties"]["characters"]["items"]["properties"]["status"]["enum"][0],
            "Alive"
        );

        let required = schema["required"].as_array().unwrap();
        for field in REQUIRED_FIELDS {
            assert!(required.iter().any(|v| v == field));
        }
        assert!(!required.iter().any(|v| v == "new_achievements"));
    }
}
