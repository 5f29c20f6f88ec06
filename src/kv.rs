//! Whole-value key/value persistence backends.
//!
//! Values are overwritten as a unit, never patched. `FileStore` keeps one file
//! per key and swaps it in with a rename; `MemoryStore` keeps everything in a
//! map and can enforce a byte quota the way browser storage does.

#[cfg(test)]
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::Mutex;

use tracing::{debug, instrument};

use crate::error::{QuizError, QuizResult};

pub const KEY_GENERATED_QUESTIONS: &str = "generated_questions";
pub const KEY_QUIZ_HISTORY: &str = "quiz_history";
pub const KEY_UNLOCKED_BADGES: &str = "unlocked_badges";
pub const KEY_USER_LANGUAGE: &str = "user_language";
pub const KEY_API_KEY: &str = "gemini_api_key";

pub trait KeyValueStore: Send + Sync {
  fn get(&self, key: &str) -> QuizResult<Option<String>>;
  fn set(&self, key: &str, value: &str) -> QuizResult<()>;
  fn remove(&self, key: &str) -> QuizResult<()>;
}

/// Directory-backed store: `<dir>/<key>.json`.
#[derive(Clone, Debug)]
pub struct FileStore {
  dir: PathBuf,
}

impl FileStore {
  pub fn open(dir: impl Into<PathBuf>) -> QuizResult<Self> {
    let dir = dir.into();
    fs::create_dir_all(&dir)
      .map_err(|e| QuizError::storage(format!("cannot create data dir {}: {e}", dir.display())))?;
    Ok(Self { dir })
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  fn path_for(&self, key: &str) -> QuizResult<PathBuf> {
    let valid = !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
      return Err(QuizError::storage(format!("invalid storage key '{key}'")));
    }
    Ok(self.dir.join(format!("{key}.json")))
  }
}

impl KeyValueStore for FileStore {
  fn get(&self, key: &str) -> QuizResult<Option<String>> {
    let path = self.path_for(key)?;
    match fs::read_to_string(&path) {
      Ok(s) => Ok(Some(s)),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
      Err(e) => Err(QuizError::storage(format!("read {}: {e}", path.display()))),
    }
  }

  #[instrument(level = "debug", skip(self, value), fields(%key, bytes = value.len()))]
  fn set(&self, key: &str, value: &str) -> QuizResult<()> {
    let path = self.path_for(key)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, value).map_err(|e| QuizError::storage(format!("write {}: {e}", tmp.display())))?;
    fs::rename(&tmp, &path).map_err(|e| QuizError::storage(format!("replace {}: {e}", path.display())))?;
    debug!(target: "storage", %key, "Value written");
    Ok(())
  }

  fn remove(&self, key: &str) -> QuizResult<()> {
    let path = self.path_for(key)?;
    match fs::remove_file(&path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
      Err(e) => Err(QuizError::storage(format!("remove {}: {e}", path.display()))),
    }
  }
}

/// In-process store with an optional quota on the total stored bytes.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
  values: Mutex<HashMap<String, String>>,
  quota_bytes: Option<usize>,
}

#[cfg(test)]
impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_quota(quota_bytes: usize) -> Self {
    Self { values: Mutex::default(), quota_bytes: Some(quota_bytes) }
  }

  fn lock(&self) -> QuizResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
    self.values.lock().map_err(|_| QuizError::storage("memory store lock poisoned"))
  }
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
  fn get(&self, key: &str) -> QuizResult<Option<String>> {
    Ok(self.lock()?.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> QuizResult<()> {
    let mut values = self.lock()?;
    if let Some(quota) = self.quota_bytes {
      let others: usize = values.iter().filter(|(k, _)| k.as_str() != key).map(|(k, v)| k.len() + v.len()).sum();
      let needed = others + key.len() + value.len();
      if needed > quota {
        return Err(QuizError::storage(format!("quota exceeded: {needed} of {quota} bytes")));
      }
    }
    values.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> QuizResult<()> {
    self.lock()?.remove(key);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn file_store_round_trips_and_removes() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path().join("nested")).unwrap();
    assert_eq!(store.get(KEY_QUIZ_HISTORY).unwrap(), None);
    store.set(KEY_QUIZ_HISTORY, "[1]").unwrap();
    store.set(KEY_QUIZ_HISTORY, "[2]").unwrap();
    assert_eq!(store.get(KEY_QUIZ_HISTORY).unwrap().as_deref(), Some("[2]"));
    assert!(!store.dir().join("quiz_history.json.tmp").exists());
    store.remove(KEY_QUIZ_HISTORY).unwrap();
    store.remove(KEY_QUIZ_HISTORY).unwrap();
    assert_eq!(store.get(KEY_QUIZ_HISTORY).unwrap(), None);
  }

  #[test]
  fn file_store_rejects_path_like_keys() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    assert!(store.set("../escape", "x").is_err());
  }

  #[test]
  fn memory_quota_rejects_oversized_writes_and_keeps_old_value() {
    let store = MemoryStore::with_quota(20);
    store.set("k", "small").unwrap();
    let err = store.set("k", &"x".repeat(40)).unwrap_err();
    assert!(matches!(err, QuizError::Storage(_)));
    assert_eq!(store.get("k").unwrap().as_deref(), Some("small"));
  }
}
