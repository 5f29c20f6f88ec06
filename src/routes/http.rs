//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented; failures become `QuizError` responses.

use std::sync::Arc;

use axum::{
  extract::{
    rejection::{JsonRejection, PathRejection, QueryRejection, StringRejection},
    FromRequest, FromRequestParts, Path, Query, State,
  },
  http::header,
  response::IntoResponse,
  Json,
};
use tracing::{info, instrument};

use crate::achievements::BadgeView;
use crate::bank::{BankStats, QuestionFilter};
use crate::codec::{ExportFormat, ImportFile};
use crate::domain::HistoryRecord;
use crate::error::{QuizError, QuizResult};
use crate::gemini::GeneratorStatus;
use crate::generation::GenerationRequest;
use crate::logic;
use crate::protocol::*;
use crate::state::AppState;
use crate::store::StorageStats;

// Request extractors whose rejections become `QuizError::Validation`, so a
// malformed request gets the same `{success, category, error}` body as any
// other failure.

#[derive(FromRequest)]
#[from_request(via(Json), rejection(QuizError))]
pub struct JsonBody<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(QuizError))]
pub struct QueryParams<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(Path), rejection(QuizError))]
pub struct PathParam<T>(pub T);

impl From<JsonRejection> for QuizError {
  fn from(r: JsonRejection) -> Self {
    QuizError::validation(r.body_text())
  }
}

impl From<QueryRejection> for QuizError {
  fn from(r: QueryRejection) -> Self {
    QuizError::validation(r.body_text())
  }
}

impl From<PathRejection> for QuizError {
  fn from(r: PathRejection) -> Self {
    QuizError::validation(r.body_text())
  }
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { ok: true })
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_questions(
  State(state): State<Arc<AppState>>,
  QueryParams(filter): QueryParams<QuestionFilter>,
) -> Json<QuestionListOut> {
  let bank = state.bank.read().await;
  let questions: Vec<_> = bank.filter(&filter).into_iter().cloned().collect();
  Json(QuestionListOut { count: questions.len(), questions })
}

pub async fn http_question_stats(State(state): State<Arc<AppState>>) -> Json<BankStats> {
  Json(state.bank.read().await.stats())
}

#[instrument(level = "info", skip(state, body), fields(level = %body.level, count = body.count))]
pub async fn http_start_quiz(
  State(state): State<Arc<AppState>>,
  JsonBody(body): JsonBody<StartQuizIn>,
) -> QuizResult<Json<QuizView>> {
  let quiz = logic::start_quiz(&state, body.level, body.count).await?;
  info!(target: "quiz", session = %quiz.session_id, "HTTP quiz started");
  Ok(Json(quiz))
}

pub async fn http_get_quiz(State(state): State<Arc<AppState>>) -> Json<QuizView> {
  Json(logic::current_quiz(&state).await)
}

#[instrument(level = "debug", skip(state, body), fields(session = %body.session_id, question = body.question_id))]
pub async fn http_answer(
  State(state): State<Arc<AppState>>,
  JsonBody(body): JsonBody<AnswerIn>,
) -> QuizResult<Json<AnswerAck>> {
  Ok(Json(logic::select_answer(&state, body.session_id, body.question_id, &body.option).await?))
}

#[instrument(level = "info", skip(state, body), fields(session = %body.session_id))]
pub async fn http_submit(
  State(state): State<Arc<AppState>>,
  JsonBody(body): JsonBody<SubmitIn>,
) -> QuizResult<Json<SubmitOut>> {
  let out = logic::submit_quiz(&state, body.session_id).await?;
  info!(target: "quiz", score = out.result.score, badge = ?out.new_badge.as_ref().map(|b| b.id), "HTTP quiz submitted");
  Ok(Json(out))
}

pub async fn http_reset(State(state): State<Arc<AppState>>) -> Json<QuizView> {
  Json(logic::reset_quiz(&state).await)
}

pub async fn http_history(State(state): State<Arc<AppState>>) -> Json<Vec<HistoryRecord>> {
  Json(logic::history(&state).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_history(
  State(state): State<Arc<AppState>>,
  PathParam(index): PathParam<usize>,
) -> QuizResult<Json<DeletedOut>> {
  Ok(Json(logic::delete_history(&state, index).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_clear_history(State(state): State<Arc<AppState>>) -> QuizResult<Json<OkOut>> {
  logic::clear_history(&state).await?;
  Ok(Json(OkOut { success: true }))
}

pub async fn http_badges(State(state): State<Arc<AppState>>) -> Json<Vec<BadgeView>> {
  Json(logic::badges(&state).await)
}

pub async fn http_storage_stats(State(state): State<Arc<AppState>>) -> Json<StorageStats> {
  Json(logic::storage_stats(&state).await)
}

/// Download of all stored questions; `format` defaults to JSON.
#[instrument(level = "info", skip(state))]
pub async fn http_export(
  State(state): State<Arc<AppState>>,
  QueryParams(q): QueryParams<ExportQuery>,
) -> QuizResult<impl IntoResponse> {
  let file = logic::export_questions(&state, q.format.unwrap_or(ExportFormat::Json)).await?;
  let disposition = format!("attachment; filename=\"{}\"", file.filename);
  let content_type = format!("{}; charset=utf-8", file.mime_type);
  Ok(([(header::CONTENT_TYPE, content_type), (header::CONTENT_DISPOSITION, disposition)], file.content))
}

/// Raw file body; the format is taken from `?filename=`.
#[instrument(level = "info", skip(state, body), fields(filename = %q.filename, bytes = body.as_ref().map_or(0, |b| b.len())))]
pub async fn http_import(
  State(state): State<Arc<AppState>>,
  QueryParams(q): QueryParams<ImportQuery>,
  body: Result<String, StringRejection>,
) -> QuizResult<Json<ImportOut>> {
  let body = body.map_err(|r| QuizError::import(r.body_text()))?;
  let out = logic::import_questions(&state, ImportFile { filename: q.filename, content: body }).await?;
  Ok(Json(out))
}

#[instrument(level = "info", skip(state))]
pub async fn http_clear_storage(State(state): State<Arc<AppState>>) -> QuizResult<Json<OkOut>> {
  logic::clear_storage(&state).await?;
  Ok(Json(OkOut { success: true }))
}

#[instrument(level = "info", skip(state, body), fields(level = %body.level, kind = %body.kind, count = body.count))]
pub async fn http_generate(
  State(state): State<Arc<AppState>>,
  JsonBody(body): JsonBody<GenerationRequest>,
) -> QuizResult<Json<GenerateOut>> {
  Ok(Json(logic::generate_questions(&state, body).await?))
}

pub async fn http_generator_status(State(state): State<Arc<AppState>>) -> Json<GeneratorStatus> {
  Json(logic::generator_status(&state).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_generator_test(State(state): State<Arc<AppState>>) -> QuizResult<Json<ConnectionTestOut>> {
  let reply = logic::test_generator(&state).await?;
  Ok(Json(ConnectionTestOut { success: true, reply }))
}

#[instrument(level = "info", skip_all)]
pub async fn http_set_api_key(
  State(state): State<Arc<AppState>>,
  JsonBody(body): JsonBody<ApiKeyIn>,
) -> QuizResult<Json<GeneratorStatus>> {
  Ok(Json(logic::set_api_key(&state, &body.api_key).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_remove_api_key(State(state): State<Arc<AppState>>) -> QuizResult<Json<OkOut>> {
  logic::remove_api_key(&state).await?;
  Ok(Json(OkOut { success: true }))
}

pub async fn http_get_language(State(state): State<Arc<AppState>>) -> Json<LanguageBody> {
  Json(LanguageBody { language: logic::language(&state).await })
}

pub async fn http_set_language(
  State(state): State<Arc<AppState>>,
  JsonBody(body): JsonBody<LanguageBody>,
) -> QuizResult<Json<LanguageBody>> {
  let language = logic::set_language(&state, &body.language).await?;
  Ok(Json(LanguageBody { language }))
}
