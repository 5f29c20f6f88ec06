//! Domain models: JLPT levels, question categories and sources, the validated
//! `Question` record, and quiz history entries.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::QuizError;

/// Topic assigned when a question carries none.
pub const DEFAULT_TOPIC: &str = "general";
/// Difficulty assigned when a question carries none.
pub const DEFAULT_DIFFICULTY: u8 = 3;

/// Difficulty tier. `Beginner` is a pseudo-level whose quiz pool spans several tiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Level {
  N5,
  N4,
  N3,
  N2,
  N1,
  Beginner,
}

impl Level {
  pub const ALL: [Level; 6] = [Level::N5, Level::N4, Level::N3, Level::N2, Level::N1, Level::Beginner];

  pub fn as_str(&self) -> &'static str {
    match self {
      Level::N5 => "N5",
      Level::N4 => "N4",
      Level::N3 => "N3",
      Level::N2 => "N2",
      Level::N1 => "N1",
      Level::Beginner => "Beginner",
    }
  }

  /// True for the real JLPT tiers (everything except `Beginner`).
  pub fn is_jlpt(&self) -> bool {
    !matches!(self, Level::Beginner)
  }
}

impl fmt::Display for Level {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Level {
  type Err = QuizError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let t = s.trim();
    Level::ALL
      .iter()
      .copied()
      .find(|l| l.as_str().eq_ignore_ascii_case(t))
      .ok_or_else(|| QuizError::validation(format!("unknown level '{t}'")))
  }
}

impl TryFrom<String> for Level {
  type Error = QuizError;
  fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

/// Question category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum QuestionType {
  Kanji,
  Vocabulary,
  Grammar,
  Reading,
}

impl QuestionType {
  pub const ALL: [QuestionType; 4] =
    [QuestionType::Kanji, QuestionType::Vocabulary, QuestionType::Grammar, QuestionType::Reading];

  pub fn as_str(&self) -> &'static str {
    match self {
      QuestionType::Kanji => "Kanji",
      QuestionType::Vocabulary => "Vocabulary",
      QuestionType::Grammar => "Grammar",
      QuestionType::Reading => "Reading",
    }
  }

  /// Chinese category labels used by older exports.
  fn legacy_labels(&self) -> &'static [&'static str] {
    match self {
      QuestionType::Kanji => &["漢字", "汉字"],
      QuestionType::Vocabulary => &["詞彙", "词汇"],
      QuestionType::Grammar => &["文法"],
      QuestionType::Reading => &["讀解", "阅读", "読解"],
    }
  }
}

impl fmt::Display for QuestionType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for QuestionType {
  type Err = QuizError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let t = s.trim();
    QuestionType::ALL
      .iter()
      .copied()
      .find(|k| k.as_str().eq_ignore_ascii_case(t) || k.legacy_labels().contains(&t))
      .ok_or_else(|| QuizError::validation(format!("unknown question type '{t}'")))
  }
}

impl TryFrom<String> for QuestionType {
  type Error = QuizError;
  fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

/// Where a question came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionSource {
  #[default]
  Static,
  Generated,
  Imported,
}

impl QuestionSource {
  pub fn as_str(&self) -> &'static str {
    match self {
      QuestionSource::Static => "static",
      QuestionSource::Generated => "generated",
      QuestionSource::Imported => "imported",
    }
  }
}

impl FromStr for QuestionSource {
  type Err = QuizError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "static" => Ok(QuestionSource::Static),
      "generated" => Ok(QuestionSource::Generated),
      "imported" => Ok(QuestionSource::Imported),
      other => Err(QuizError::validation(format!("unknown source '{other}'"))),
    }
  }
}

/// Unvalidated question as read from JSON, CSV or model output.
/// Every field is optional; `Question::try_from` decides what is acceptable.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDraft {
  #[serde(default, deserialize_with = "lenient_number")]
  pub id: Option<f64>,
  #[serde(default)] pub level: Option<String>,
  #[serde(default, rename = "type")] pub kind: Option<String>,
  #[serde(default)] pub question: Option<String>,
  #[serde(default)] pub options: Option<Vec<String>>,
  #[serde(default)] pub answer: Option<String>,
  #[serde(default)] pub explanation: Option<String>,
  #[serde(default)] pub topic: Option<String>,
  #[serde(default)] pub difficulty: Option<serde_json::Value>,
  #[serde(default)] pub source: Option<String>,
  #[serde(default)] pub created_at: Option<String>,
  #[serde(default)] pub imported_at: Option<String>,
}

/// Accept ids written as integers, floats (timestamp + random fraction) or numeric strings.
fn lenient_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
  let v = Option::<serde_json::Value>::deserialize(d)?;
  Ok(v.as_ref().and_then(number_from_value))
}

fn number_from_value(v: &serde_json::Value) -> Option<f64> {
  match v {
    serde_json::Value::Number(n) => n.as_f64(),
    serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
    _ => None,
  }
}

/// Multiple-choice question. Only obtainable through `TryFrom<QuestionDraft>`,
/// which enforces four distinct options with the answer among them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "QuestionDraft")]
pub struct Question {
  pub id: u64,
  pub level: Level,
  #[serde(rename = "type")]
  pub kind: QuestionType,
  pub question: String,
  pub options: [String; 4],
  pub answer: String,
  pub explanation: String,
  pub topic: String,
  pub difficulty: u8,
  pub source: QuestionSource,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub imported_at: Option<String>,
}

impl Question {
  /// Identity used for de-duplication: question text plus answer.
  pub fn dedup_key(&self) -> (&str, &str) {
    (self.question.as_str(), self.answer.as_str())
  }

  pub fn is_correct(&self, choice: &str) -> bool {
    self.answer == choice
  }

  pub fn has_option(&self, choice: &str) -> bool {
    self.options.iter().any(|o| o == choice)
  }
}

fn required(field: &'static str, v: Option<String>) -> Result<String, QuizError> {
  match v {
    Some(s) if !s.trim().is_empty() => Ok(s),
    _ => Err(QuizError::validation(format!("missing required field '{field}'"))),
  }
}

/// Largest id accepted on import: 2^53, the largest integer JSON numbers carry exactly.
pub const MAX_QUESTION_ID: u64 = 1 << 53;

impl TryFrom<QuestionDraft> for Question {
  type Error = QuizError;

  fn try_from(d: QuestionDraft) -> Result<Self, Self::Error> {
    let id = match d.id {
      Some(n) if n.is_finite() && (0.0..=MAX_QUESTION_ID as f64).contains(&n) => n.trunc() as u64,
      Some(_) => return Err(QuizError::validation(format!("id must be a number between 0 and {MAX_QUESTION_ID}"))),
      None => return Err(QuizError::validation("missing required field 'id'")),
    };
    let level: Level = required("level", d.level)?.parse()?;
    let kind: QuestionType = required("type", d.kind)?.parse()?;
    let question = required("question", d.question)?;
    let answer = required("answer", d.answer)?;
    let explanation = required("explanation", d.explanation)?;

    let options = d.options.unwrap_or_default();
    let options: [String; 4] = options
      .try_into()
      .map_err(|v: Vec<String>| QuizError::validation(format!("expected 4 options, got {}", v.len())))?;
    for (i, o) in options.iter().enumerate() {
      if options[..i].contains(o) {
        return Err(QuizError::validation(format!("duplicate option '{o}'")));
      }
    }
    if !options.contains(&answer) {
      return Err(QuizError::validation(format!("answer '{answer}' is not one of the options")));
    }

    let difficulty = match d.difficulty.as_ref() {
      None | Some(serde_json::Value::Null) => DEFAULT_DIFFICULTY,
      Some(v) => match number_from_value(v) {
        Some(n) if n.fract() == 0.0 && (1.0..=5.0).contains(&n) => n as u8,
        _ => return Err(QuizError::validation(format!("difficulty must be an integer in 1..=5, got {v}"))),
      },
    };
    let topic = d
      .topic
      .filter(|t| !t.trim().is_empty())
      .unwrap_or_else(|| DEFAULT_TOPIC.to_string());
    let source = match d.source.as_deref() {
      None | Some("") => QuestionSource::default(),
      Some(s) => s.parse()?,
    };

    Ok(Question {
      id,
      level,
      kind,
      question,
      options,
      answer,
      explanation,
      topic,
      difficulty,
      source,
      created_at: d.created_at.filter(|s| !s.is_empty()),
      imported_at: d.imported_at.filter(|s| !s.is_empty()),
    })
  }
}

/// One finished quiz, as kept in the history list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
  pub date: NaiveDate,
  pub level: Level,
  pub score: f64,
  #[serde(alias = "time")]
  pub elapsed_seconds: u64,
}
