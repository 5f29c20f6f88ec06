//! Loading application configuration (prompts, storage, quiz and generation
//! settings) from TOML.
//!
//! Every section is optional. See `AppConfig` for the schema; environment
//! variables override selected fields after the file is read.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::{Level, QuestionType};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub quiz: QuizConfig,
  #[serde(default)]
  pub generation: GenerationConfig,
}

/// Prompts used by the generation client. Placeholders: `{count}`, `{level}`,
/// `{type}`, `{topic}` and `{topic_clause}` (empty when no topic was given).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub question_user_template: String,
  pub kanji_guidance: String,
  pub vocabulary_guidance: String,
  pub grammar_guidance: String,
  pub reading_guidance: String,
  pub connection_test: String,
}

impl Prompts {
  pub fn guidance_for(&self, kind: QuestionType) -> &str {
    match kind {
      QuestionType::Kanji => &self.kanji_guidance,
      QuestionType::Vocabulary => &self.vocabulary_guidance,
      QuestionType::Grammar => &self.grammar_guidance,
      QuestionType::Reading => &self.reading_guidance,
    }
  }
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      question_user_template: r#"Generate {count} JLPT {level} multiple-choice questions of type "{type}"{topic_clause}.

Respond ONLY with strict JSON in exactly this shape, with no other text:

{
  "questions": [
    {
      "level": "{level}",
      "type": "{type}",
      "question": "question text",
      "options": ["option 1", "option 2", "option 3", "option 4"],
      "answer": "the correct option, copied exactly",
      "explanation": "why the answer is correct",
      "topic": "{topic}",
      "difficulty": 3
    }
  ]
}

Requirements:
1. Questions must match the {level} standard.
2. Exactly 4 distinct options, exactly one of them correct.
3. The explanation must say why the answer is correct.
4. Prefer practical, everyday content; avoid rare or archaic words.
5. "difficulty" is an integer from 1 to 5."#
        .into(),
      kanji_guidance: "Kanji questions should test the reading or the writing of a word.".into(),
      vocabulary_guidance: "Vocabulary questions should test meaning, usage or collocation.".into(),
      grammar_guidance: "Grammar questions should test particles, conjugation or sentence patterns.".into(),
      reading_guidance: "Reading questions should include a short passage followed by a question about it.".into(),
      connection_test: "Hello, this is a test message. Please respond with \"Connection successful\".".into(),
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  pub data_dir: PathBuf,
  pub max_stored_questions: usize,
  pub max_history: usize,
}

impl Default for StorageConfig {
  fn default() -> Self {
    Self { data_dir: PathBuf::from("./data/store"), max_stored_questions: 1000, max_history: 50 }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct QuizConfig {
  /// Level whose completion earns the level-starter badge.
  pub tracked_level: Level,
}

impl Default for QuizConfig {
  fn default() -> Self {
    Self { tracked_level: Level::N5 }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
  pub model: String,
  pub base_url: String,
  pub temperature: f32,
  pub top_k: u32,
  pub top_p: f32,
  pub max_output_tokens: u32,
  pub timeout_secs: u64,
  pub max_per_request: usize,
  pub rate_limit_enabled: bool,
  pub rate_limit_window_secs: u64,
  pub rate_limit_max: usize,
}

impl Default for GenerationConfig {
  fn default() -> Self {
    Self {
      model: "gemini-1.5-flash".into(),
      base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
      temperature: 0.7,
      top_k: 40,
      top_p: 0.95,
      max_output_tokens: 2048,
      timeout_secs: 30,
      max_per_request: 5,
      rate_limit_enabled: false,
      rate_limit_window_secs: 60,
      rate_limit_max: 15,
    }
  }
}

impl AppConfig {
  /// Apply `QUIZ_DATA_DIR`, `GEMINI_BASE_URL` and `GEMINI_MODEL` through `lookup`.
  pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(dir) = lookup("QUIZ_DATA_DIR").filter(|s| !s.is_empty()) {
      self.storage.data_dir = PathBuf::from(dir);
    }
    if let Some(url) = lookup("GEMINI_BASE_URL").filter(|s| !s.is_empty()) {
      self.generation.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(model) = lookup("GEMINI_MODEL").filter(|s| !s.is_empty()) {
      self.generation.model = model;
    }
  }
}

/// Load `AppConfig` from QUIZ_CONFIG_PATH (defaults when unset or unreadable),
/// then apply environment overrides.
pub fn load_config_from_env() -> AppConfig {
  let mut cfg = match std::env::var("QUIZ_CONFIG_PATH") {
    Ok(path) => read_config_file(&path).unwrap_or_default(),
    Err(_) => AppConfig::default(),
  };
  cfg.apply_overrides(|k| std::env::var(k).ok());
  cfg
}

fn read_config_file(path: &str) -> Option<AppConfig> {
  match std::fs::read_to_string(path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "jlpt_quiz", %path, "Loaded config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "jlpt_quiz", %path, error = %e, "Failed to parse TOML config; using defaults");
        None
      }
    },
    Err(e) => {
      error!(target: "jlpt_quiz", %path, error = %e, "Failed to read TOML config file; using defaults");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_toml_keeps_defaults() {
    let cfg: AppConfig = toml::from_str(
      r#"
      [storage]
      max_history = 10

      [quiz]
      tracked_level = "n4"

      [generation]
      rate_limit_enabled = true
      "#,
    )
    .unwrap();
    assert_eq!(cfg.storage.max_history, 10);
    assert_eq!(cfg.storage.max_stored_questions, 1000);
    assert_eq!(cfg.quiz.tracked_level, Level::N4);
    assert!(cfg.generation.rate_limit_enabled);
    assert_eq!(cfg.generation.rate_limit_max, 15);
    assert_eq!(cfg.generation.model, "gemini-1.5-flash");
    assert!(cfg.prompts.question_user_template.contains("{count}"));
  }

  #[test]
  fn env_overrides_apply() {
    let mut cfg = AppConfig::default();
    cfg.apply_overrides(|k| match k {
      "QUIZ_DATA_DIR" => Some("/tmp/quiz".into()),
      "GEMINI_BASE_URL" => Some("http://127.0.0.1:9/".into()),
      _ => None,
    });
    assert_eq!(cfg.storage.data_dir, PathBuf::from("/tmp/quiz"));
    assert_eq!(cfg.generation.base_url, "http://127.0.0.1:9");
    assert_eq!(cfg.generation.model, "gemini-1.5-flash");
  }

  #[test]
  fn unknown_tracked_level_is_a_parse_error() {
    assert!(toml::from_str::<AppConfig>("[quiz]\ntracked_level = \"N9\"").is_err());
  }
}
