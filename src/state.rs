//! Application state: question bank, persistence store, the active quiz and
//! the optional Gemini client.
//!
//! This module owns:
//!   - the in-memory bank (static seeds plus stored questions)
//!   - the persistence store (file-backed in production)
//!   - the single active quiz session and its one-second timer task
//!   - the loaded configuration (prompts, limits, generation settings)
//!
//! All mutation goes through tokio locks, so one quiz and one generation
//! request are in flight at a time per lock.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use crate::bank::QuestionBank;
use crate::config::{load_config_from_env, AppConfig};
use crate::error::QuizResult;
use crate::gemini::Gemini;
use crate::kv::{FileStore, KeyValueStore};
use crate::seeds::seed_questions;
use crate::session::QuizSession;
use crate::store::{PersistenceStore, StoreLimits};

/// The active quiz plus the task advancing its clock.
#[derive(Default)]
pub struct QuizSlot {
    pub session: QuizSession,
    timer: Option<JoinHandle<()>>,
}

impl QuizSlot {
    /// Swap in a new session, cancelling the previous timer.
    pub fn replace(&mut self, session: QuizSession) {
        self.stop_timer();
        self.session = session;
    }

    pub fn stop_timer(&mut self) {
        if let Some(t) = self.timer.take() {
            t.abort();
        }
    }
}

/// Tick the slot's session once per second until it leaves `InProgress`.
pub fn start_timer(slot: &Arc<Mutex<QuizSlot>>, guard: &mut QuizSlot) {
    guard.stop_timer();
    let slot = Arc::clone(slot);
    let session_id = guard.session.id();
    guard.timer = Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.tick().await;
        loop {
            interval.tick().await;
            let mut s = slot.lock().await;
            if s.session.id() != session_id || !s.session.tick() {
                debug!(target: "quiz", session = %session_id, "Quiz timer stopped");
                break;
            }
        }
    }));
}

pub struct AppState {
    pub bank: RwLock<QuestionBank>,
    pub store: Mutex<PersistenceStore>,
    pub quiz: Arc<Mutex<QuizSlot>>,
    pub gemini: RwLock<Option<Arc<Gemini>>>,
    pub config: AppConfig,
}

impl AppState {
    /// Build state from env: load config, open the data directory, seed the
    /// bank, and init Gemini when a key is available.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> QuizResult<Self> {
        let config = load_config_from_env();
        let kv = FileStore::open(&config.storage.data_dir)?;
        info!(target: "storage", dir = %kv.dir().display(), "File store opened");
        let env_key = std::env::var("GEMINI_API_KEY").ok();
        Ok(Self::with_store(config, Box::new(kv), env_key))
    }

    /// Build state over an explicit key/value backend.
    pub fn with_store(config: AppConfig, kv: Box<dyn KeyValueStore>, env_key: Option<String>) -> Self {
        let store = PersistenceStore::new(
            kv,
            StoreLimits {
                max_stored_questions: config.storage.max_stored_questions,
                max_history: config.storage.max_history,
            },
        );

        let mut bank = QuestionBank::new(seed_questions());
        let stored = store.load_stored();
        let stored_count = stored.len();
        let added = bank.append(stored);
        for (level, count) in &bank.stats().by_level {
            info!(target: "quiz", %level, count, "Startup question inventory");
        }
        info!(target: "quiz", total = bank.len(), stored = stored_count, added, "Question bank ready");

        let api_key = env_key.filter(|k| !k.trim().is_empty()).or_else(|| store.load_api_key());
        let gemini = match api_key {
            Some(key) => match Gemini::new(&key, config.generation.clone()) {
                Ok(g) => {
                    info!(
                        target: "generation",
                        base_url = %config.generation.base_url,
                        model = %g.model(),
                        rate_limit = config.generation.rate_limit_enabled,
                        "Gemini enabled."
                    );
                    Some(Arc::new(g))
                }
                Err(e) => {
                    error!(target: "generation", error = %e, "Failed to build Gemini client; generation disabled.");
                    None
                }
            },
            None => {
                info!(target: "generation", "Gemini disabled (no GEMINI_API_KEY or stored key).");
                None
            }
        };

        Self {
            bank: RwLock::new(bank),
            store: Mutex::new(store),
            quiz: Arc::new(Mutex::new(QuizSlot::default())),
            gemini: RwLock::new(gemini),
            config,
        }
    }

    /// Current Gemini client, if configured.
    pub async fn gemini(&self) -> Option<Arc<Gemini>> {
        self.gemini.read().await.clone()
    }
}
