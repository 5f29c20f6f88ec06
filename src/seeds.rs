//! Built-in question catalog shipped with the binary.
//!
//! The catalog lives in `data/questions.json` and is embedded at compile time so
//! the quiz works without any stored, generated or imported content.

use tracing::{error, info};

use crate::domain::{Question, QuestionDraft};

const STATIC_QUESTIONS_JSON: &str = include_str!("../data/questions.json");

/// Parse and validate the embedded catalog. Entries failing validation are
/// logged and skipped.
pub fn seed_questions() -> Vec<Question> {
  let drafts: Vec<QuestionDraft> = match serde_json::from_str(STATIC_QUESTIONS_JSON) {
    Ok(d) => d,
    Err(e) => {
      error!(target: "quiz", error = %e, "Embedded question catalog is not valid JSON");
      return Vec::new();
    }
  };

  let total = drafts.len();
  let questions: Vec<Question> = drafts
    .into_iter()
    .filter_map(|d| {
      let id = d.id;
      Question::try_from(d)
        .map_err(|e| error!(target: "quiz", ?id, error = %e, "Skipping invalid static question"))
        .ok()
    })
    .collect();
  info!(target: "quiz", loaded = questions.len(), total, "Static catalog loaded");
  questions
}
