//! Persistence for generated/imported questions, quiz history, badges and
//! user settings, layered over a whole-value `KeyValueStore`.
//!
//! Every write replaces the full value under its key. Reads never fail: a
//! missing key is empty and a corrupt payload is logged and treated as empty.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::achievements::BadgeId;
use crate::codec::{self, ExportFile, ExportFormat, ImportFile};
use crate::domain::{HistoryRecord, Question, QuestionSource};
use crate::error::{QuizError, QuizResult};
use crate::kv::{
  KeyValueStore, KEY_API_KEY, KEY_GENERATED_QUESTIONS, KEY_QUIZ_HISTORY, KEY_UNLOCKED_BADGES, KEY_USER_LANGUAGE,
};
use crate::util::{now_millis, now_rfc3339};

pub const DEFAULT_LANGUAGE: &str = "zh";

#[derive(Clone, Copy, Debug)]
pub struct StoreLimits {
  pub max_stored_questions: usize,
  pub max_history: usize,
}

impl Default for StoreLimits {
  fn default() -> Self {
    Self { max_stored_questions: 1000, max_history: 50 }
  }
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
  pub total: usize,
  pub by_level: BTreeMap<String, usize>,
  pub by_type: BTreeMap<String, usize>,
  pub by_source: BTreeMap<String, usize>,
  pub size_kb: u64,
}

pub struct PersistenceStore {
  kv: Box<dyn KeyValueStore>,
  limits: StoreLimits,
}

impl PersistenceStore {
  pub fn new(kv: Box<dyn KeyValueStore>, limits: StoreLimits) -> Self {
    Self { kv, limits }
  }

  fn read_json<T: DeserializeOwned + Default>(&self, key: &str) -> T {
    let raw = match self.kv.get(key) {
      Ok(Some(raw)) => raw,
      Ok(None) => return T::default(),
      Err(e) => {
        error!(target: "storage", %key, error = %e, "Read failed; treating as empty");
        return T::default();
      }
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
      error!(target: "storage", %key, error = %e, "Corrupt stored payload; treating as empty");
      T::default()
    })
  }

  fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> QuizResult<()> {
    let raw = serde_json::to_string(value).map_err(|e| QuizError::storage(format!("encode {key}: {e}")))?;
    self.kv.set(key, &raw)
  }

  // ----- generated / imported questions -----

  /// Append, evict the oldest entries beyond the cap, then drop later
  /// duplicates of (question, answer). Returns the stored total.
  #[instrument(level = "debug", skip_all, fields(incoming = new.len()))]
  pub fn save_generated(&self, new: Vec<Question>) -> QuizResult<usize> {
    let mut all: Vec<Question> = self.read_json(KEY_GENERATED_QUESTIONS);
    all.extend(new);

    let max = self.limits.max_stored_questions;
    if all.len() > max {
      let excess = all.len() - max;
      all.drain(..excess);
      debug!(target: "storage", evicted = excess, "Evicted oldest stored questions");
    }

    let mut seen: HashSet<(String, String)> = HashSet::with_capacity(all.len());
    all.retain(|q| {
      let (question, answer) = q.dedup_key();
      seen.insert((question.to_owned(), answer.to_owned()))
    });

    self.write_json(KEY_GENERATED_QUESTIONS, &all)?;
    info!(target: "storage", total = all.len(), "Stored questions saved");
    Ok(all.len())
  }

  pub fn load_stored(&self) -> Vec<Question> {
    self.read_json(KEY_GENERATED_QUESTIONS)
  }

  pub fn clear_stored(&self) -> QuizResult<()> {
    self.kv.remove(KEY_GENERATED_QUESTIONS)?;
    info!(target: "storage", "Stored questions cleared");
    Ok(())
  }

  pub fn stats(&self) -> StorageStats {
    let bytes = self.kv.get(KEY_GENERATED_QUESTIONS).ok().flatten().map_or(0, |raw| raw.len());
    let questions = self.load_stored();
    let mut s = StorageStats {
      total: questions.len(),
      size_kb: (bytes as f64 / 1024.0).round() as u64,
      ..Default::default()
    };
    for q in &questions {
      *s.by_level.entry(q.level.to_string()).or_default() += 1;
      *s.by_type.entry(q.kind.to_string()).or_default() += 1;
      *s.by_source.entry(q.source.as_str().to_string()).or_default() += 1;
    }
    s
  }

  pub fn export_all(&self, format: ExportFormat) -> QuizResult<ExportFile> {
    let questions = self.load_stored();
    if questions.is_empty() {
      return Err(QuizError::NothingToExport);
    }
    let file = codec::render(&questions, format, Utc::now())?;
    info!(target: "storage", count = questions.len(), filename = %file.filename, "Exported stored questions");
    Ok(file)
  }

  /// Validate and merge an import file. Returns the accepted questions, which
  /// have already been passed through `save_generated`.
  #[instrument(level = "info", skip_all, fields(filename = %file.filename, bytes = file.content.len()))]
  pub fn import_from(&self, file: &ImportFile) -> QuizResult<Vec<Question>> {
    let drafts = codec::parse_import(file)?;
    let stamp = now_rfc3339();
    let base_id = now_millis();

    let mut accepted = Vec::with_capacity(drafts.len());
    let mut rejected = 0usize;
    for (i, mut draft) in drafts.into_iter().enumerate() {
      draft.source = Some(QuestionSource::Imported.as_str().to_string());
      draft.imported_at = Some(stamp.clone());
      if draft.id.is_none() {
        draft.id = Some((base_id + i as u64) as f64);
      }
      match Question::try_from(draft) {
        Ok(q) => accepted.push(q),
        Err(e) => {
          rejected += 1;
          debug!(target: "storage", entry = i, error = %e, "Rejected import entry");
        }
      }
    }

    if accepted.is_empty() {
      warn!(target: "storage", rejected, "Import contained no valid questions");
      return Err(QuizError::import("no valid questions found in file"));
    }
    self.save_generated(accepted.clone())?;
    info!(target: "storage", accepted = accepted.len(), rejected, "Import merged");
    Ok(accepted)
  }

  // ----- history -----

  pub fn load_history(&self) -> Vec<HistoryRecord> {
    self.read_json(KEY_QUIZ_HISTORY)
  }

  /// Prepend a record, keeping at most `max_history`. Returns the new length.
  pub fn append_history(&self, record: HistoryRecord) -> QuizResult<usize> {
    let mut history = self.load_history();
    history.insert(0, record);
    history.truncate(self.limits.max_history);
    self.write_json(KEY_QUIZ_HISTORY, &history)?;
    Ok(history.len())
  }

  pub fn delete_history_at(&self, index: usize) -> QuizResult<HistoryRecord> {
    let mut history = self.load_history();
    if index >= history.len() {
      return Err(QuizError::validation(format!(
        "history index {index} out of range (have {})",
        history.len()
      )));
    }
    let removed = history.remove(index);
    self.write_json(KEY_QUIZ_HISTORY, &history)?;
    Ok(removed)
  }

  /// Clears history and every unlocked badge.
  pub fn clear_history(&self) -> QuizResult<()> {
    self.kv.remove(KEY_QUIZ_HISTORY)?;
    self.kv.remove(KEY_UNLOCKED_BADGES)?;
    info!(target: "storage", "History and badges cleared");
    Ok(())
  }

  // ----- badges -----

  pub fn load_unlocked(&self) -> Vec<BadgeId> {
    let raw: Vec<String> = self.read_json(KEY_UNLOCKED_BADGES);
    let mut ids: Vec<BadgeId> = Vec::with_capacity(raw.len());
    for s in raw {
      match s.parse::<BadgeId>() {
        Ok(id) if !ids.contains(&id) => ids.push(id),
        Ok(_) => {}
        Err(_) => debug!(target: "storage", badge = %s, "Ignoring unknown stored badge id"),
      }
    }
    ids
  }

  /// Returns `true` only when the badge was not already unlocked.
  pub fn unlock(&self, id: BadgeId) -> QuizResult<bool> {
    let mut ids = self.load_unlocked();
    if ids.contains(&id) {
      return Ok(false);
    }
    ids.push(id);
    self.write_json(KEY_UNLOCKED_BADGES, &ids)?;
    info!(target: "storage", badge = %id, "Badge unlocked");
    Ok(true)
  }

  // ----- settings -----

  pub fn load_language(&self) -> String {
    match self.kv.get(KEY_USER_LANGUAGE) {
      Ok(Some(lang)) if !lang.trim().is_empty() => lang,
      _ => DEFAULT_LANGUAGE.to_string(),
    }
  }

  pub fn save_language(&self, language: &str) -> QuizResult<()> {
    let language = language.trim();
    if language.is_empty() {
      return Err(QuizError::validation("language must not be empty"));
    }
    self.kv.set(KEY_USER_LANGUAGE, language)
  }

  pub fn load_api_key(&self) -> Option<String> {
    self.kv.get(KEY_API_KEY).ok().flatten().filter(|k| !k.trim().is_empty())
  }

  pub fn save_api_key(&self, key: &str) -> QuizResult<()> {
    self.kv.set(KEY_API_KEY, key.trim())
  }

  pub fn remove_api_key(&self) -> QuizResult<()> {
    self.kv.remove(KEY_API_KEY)
  }
}
