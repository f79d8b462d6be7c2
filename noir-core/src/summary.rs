//! Case summaries.

use crate::model::ModelRequest;
use crate::state::DiaryEntry;
use crate::storyteller::Storyteller;

/// Returned whenever a summary cannot be produced.
pub const CASE_SUMMARY_UNAVAILABLE: &str =
    "The case file is a mess of coffee rings and crossed-out names. Nothing useful comes of it right now.";

/// Most recent diary entries a summary looks at.
pub const SUMMARY_WINDOW: usize = 20;

const SUMMARY_MAX_TOKENS: usize = 600;

impl Storyteller {
    /// A short synopsis of the most recent [`SUMMARY_WINDOW`] entries.
    ///
    /// One stateless call; no story session is touched. Never fails.
    pub async fn summarize_case(&self, transcript: &[DiaryEntry]) -> String {
        let Ok(model) = self.model() else {
            return CASE_SUMMARY_UNAVAILABLE.to_string();
        };
        if transcript.is_empty() {
            return CASE_SUMMARY_UNAVAILABLE.to_string();
        }

        let start = transcript.len().saturating_sub(SUMMARY_WINDOW);
        let request = ModelRequest::single(
            self.config().summary_model(),
            summary_prompt(&transcript[start..]),
        )
        .with_max_tokens(SUMMARY_MAX_TOKENS)
        .with_temperature(0.3);

        match model.generate(request).await {
            Ok(reply) if !reply.text.trim().is_empty() => reply.text.trim().to_string(),
            Ok(_) => {
                log::warn!("case summary came back empty");
                CASE_SUMMARY_UNAVAILABLE.to_string()
            }
            Err(e) => {
                log::warn!("case summary failed: {e}");
                CASE_SUMMARY_UNAVAILABLE.to_string()
            }
        }
    }
}

fn summary_prompt(entries: &[DiaryEntry]) -> String {
    let lines = entries
        .iter()
        .map(|entry| {
            let speaker = if entry.is_user_action {
                "DETECTIVE"
            } else {
                "NARRATOR"
            };
            format!("[{}] {speaker}: {}", entry.timestamp, entry.text)
        })
        .collect::<Vec<_>>()
        .join("\n");
    include_str!("prompts/summary.txt").replace("{entries}", &lines)
}
