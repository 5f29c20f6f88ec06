//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Running the quiz (start, answer, submit, reset) and recording results
//!   - Badge evaluation after each submission
//!   - Generation through Gemini and merging results into bank and store
//!   - Import/export of stored questions, history, settings

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::achievements::{badge_view, catalog, evaluate, BadgeView};
use crate::codec::{ExportFile, ExportFormat, ImportFile};
use crate::domain::{HistoryRecord, Level};
use crate::error::{QuizError, QuizResult};
use crate::gemini::{Gemini, GeneratorStatus};
use crate::generation::GenerationRequest;
use crate::protocol::{AnswerAck, DeletedOut, GenerateOut, ImportOut, QuizView, SubmitOut};
use crate::session::QuizSession;
use crate::state::{start_timer, AppState};
use crate::store::StorageStats;
use crate::util::today;

fn ensure_session(session: &QuizSession, session_id: Uuid) -> QuizResult<()> {
  if session.id() != session_id {
    return Err(QuizError::InvalidState(format!("session {session_id} is not the active quiz")));
  }
  Ok(())
}

/// Configure and start a fresh quiz, replacing whatever was active.
#[instrument(level = "info", skip(state), fields(%level, count))]
pub async fn start_quiz(state: &AppState, level: Level, count: i64) -> QuizResult<QuizView> {
  let mut session = QuizSession::new();
  session.configure(level, count)?;
  {
    let bank = state.bank.read().await;
    let mut rng = rand::thread_rng();
    session.start(&bank, &mut rng)?;
  }

  let mut slot = state.quiz.lock().await;
  slot.replace(session);
  start_timer(&state.quiz, &mut slot);
  Ok(QuizView::from(&slot.session))
}

pub async fn current_quiz(state: &AppState) -> QuizView {
  QuizView::from(&state.quiz.lock().await.session)
}

pub async fn select_answer(state: &AppState, session_id: Uuid, question_id: u64, option: &str) -> QuizResult<AnswerAck> {
  let mut slot = state.quiz.lock().await;
  ensure_session(&slot.session, session_id)?;
  slot.session.select(question_id, option)?;
  Ok(AnswerAck {
    question_id,
    answered: slot.session.answers().len(),
    total: slot.session.questions().len(),
  })
}

/// Score the active quiz, append it to history and unlock at most one badge.
#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn submit_quiz(state: &AppState, session_id: Uuid) -> QuizResult<SubmitOut> {
  let result = {
    let mut slot = state.quiz.lock().await;
    ensure_session(&slot.session, session_id)?;
    let result = slot.session.submit()?;
    slot.stop_timer();
    result
  };

  let tracked = state.config.quiz.tracked_level;
  let store = state.store.lock().await;
  let history_length = store.append_history(result.to_history(today()))?;
  let unlocked = store.load_unlocked();
  let new_badge = match evaluate(&result, history_length, &unlocked, tracked) {
    Some(id) if store.unlock(id)? => {
      info!(target: "quiz", badge = %id, "New badge earned");
      Some(badge_view(id, &store.load_language(), true, tracked))
    }
    _ => None,
  };
  Ok(SubmitOut { result, new_badge, history_length })
}

pub async fn reset_quiz(state: &AppState) -> QuizView {
  let mut slot = state.quiz.lock().await;
  slot.replace(QuizSession::new());
  QuizView::from(&slot.session)
}

// ----- history & badges -----

pub async fn history(state: &AppState) -> Vec<HistoryRecord> {
  state.store.lock().await.load_history()
}

pub async fn delete_history(state: &AppState, index: usize) -> QuizResult<DeletedOut> {
  let store = state.store.lock().await;
  let deleted = store.delete_history_at(index)?;
  Ok(DeletedOut { deleted, remaining: store.load_history().len() })
}

pub async fn clear_history(state: &AppState) -> QuizResult<()> {
  state.store.lock().await.clear_history()
}

pub async fn badges(state: &AppState) -> Vec<BadgeView> {
  let store = state.store.lock().await;
  catalog(&store.load_language(), &store.load_unlocked(), state.config.quiz.tracked_level)
}

// ----- storage -----

pub async fn storage_stats(state: &AppState) -> StorageStats {
  state.store.lock().await.stats()
}

pub async fn export_questions(state: &AppState, format: ExportFormat) -> QuizResult<ExportFile> {
  state.store.lock().await.export_all(format)
}

#[instrument(level = "info", skip(state, file), fields(filename = %file.filename))]
pub async fn import_questions(state: &AppState, file: ImportFile) -> QuizResult<ImportOut> {
  let accepted = state.store.lock().await.import_from(&file)?;
  let imported = accepted.len();
  let added_to_bank = state.bank.write().await.append(accepted);
  Ok(ImportOut { imported, added_to_bank })
}

pub async fn clear_storage(state: &AppState) -> QuizResult<()> {
  state.store.lock().await.clear_stored()
}

// ----- generation -----

async fn require_gemini(state: &AppState) -> QuizResult<Arc<Gemini>> {
  state.gemini().await.ok_or(QuizError::NotConfigured("set a Gemini API key first"))
}

#[instrument(level = "info", skip(state, req), fields(level = %req.level, kind = %req.kind, count = req.count))]
pub async fn generate_questions(state: &AppState, req: GenerationRequest) -> QuizResult<GenerateOut> {
  req.validate(state.config.generation.max_per_request)?;
  let gemini = require_gemini(state).await?;
  let questions = gemini.generate_questions(&state.config.prompts, &req).await?;

  let stored_total = state.store.lock().await.save_generated(questions.clone())?;
  let added_to_bank = state.bank.write().await.append(questions.clone());
  info!(target: "generation", generated = questions.len(), added_to_bank, stored_total, "Generated questions merged");
  Ok(GenerateOut { questions, added_to_bank, stored_total })
}

pub async fn generator_status(state: &AppState) -> GeneratorStatus {
  match state.gemini().await {
    Some(g) => g.status(),
    None => GeneratorStatus {
      configured: false,
      model: state.config.generation.model.clone(),
      rate_limit_enabled: state.config.generation.rate_limit_enabled,
      remaining_requests: None,
      reset_in_secs: None,
    },
  }
}

pub async fn test_generator(state: &AppState) -> QuizResult<String> {
  let gemini = require_gemini(state).await?;
  gemini.test_connection(&state.config.prompts).await
}

/// Install a new API key at runtime and persist it.
pub async fn set_api_key(state: &AppState, api_key: &str) -> QuizResult<GeneratorStatus> {
  let gemini = Gemini::new(api_key, state.config.generation.clone())?;
  state.store.lock().await.save_api_key(api_key)?;
  let status = gemini.status();
  *state.gemini.write().await = Some(Arc::new(gemini));
  info!(target: "generation", "Gemini API key updated");
  Ok(status)
}

pub async fn remove_api_key(state: &AppState) -> QuizResult<()> {
  state.store.lock().await.remove_api_key()?;
  *state.gemini.write().await = None;
  warn!(target: "generation", "Gemini API key removed; generation disabled");
  Ok(())
}

// ----- settings -----

pub async fn language(state: &AppState) -> String {
  state.store.lock().await.load_language()
}

pub async fn set_language(state: &AppState, language: &str) -> QuizResult<String> {
  let store = state.store.lock().await;
  store.save_language(language)?;
  Ok(store.load_language())
}
