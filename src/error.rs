//! Error taxonomy shared by the bank, store, session and generation client.
//!
//! Every user-visible failure carries a message plus a stable category string;
//! the HTTP edge maps the category to a status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::domain::Level;

#[derive(Debug, Error)]
pub enum QuizError {
  /// Malformed question or invalid request parameters.
  #[error("validation failed: {0}")]
  Validation(String),

  #[error("not enough questions for {level}: {available} available, {requested} requested")]
  InsufficientQuestions { level: Level, available: usize, requested: usize },

  #[error("storage failure: {0}")]
  Storage(String),

  #[error("could not parse generated questions: {reason}")]
  GenerationParse { reason: String, raw: String },

  #[error("generation request failed: {0}")]
  Generation(String),

  #[error("too many generation requests, retry in {wait_secs} seconds")]
  RateLimited { wait_secs: u64 },

  #[error("generation API is not configured: {0}")]
  NotConfigured(&'static str),

  #[error("import failed: {0}")]
  Import(String),

  #[error("no stored questions to export")]
  NothingToExport,

  #[error("{0}")]
  InvalidState(String),
}

pub type QuizResult<T> = Result<T, QuizError>;

impl QuizError {
  pub fn validation(msg: impl Into<String>) -> Self {
    Self::Validation(msg.into())
  }

  pub fn storage(msg: impl Into<String>) -> Self {
    Self::Storage(msg.into())
  }

  pub fn import(msg: impl Into<String>) -> Self {
    Self::Import(msg.into())
  }

  pub fn category(&self) -> &'static str {
    match self {
      Self::Validation(_) => "validation_failure",
      Self::InsufficientQuestions { .. } => "insufficient_questions",
      Self::Storage(_) => "storage_failure",
      Self::GenerationParse { .. } => "generation_parse_error",
      Self::Generation(_) => "generation_failure",
      Self::RateLimited { .. } => "rate_limited",
      Self::NotConfigured(_) => "not_configured",
      Self::Import(_) => "import_failure",
      Self::NothingToExport => "nothing_to_export",
      Self::InvalidState(_) => "invalid_state",
    }
  }

  fn status(&self) -> StatusCode {
    match self {
      Self::Validation(_) | Self::Import(_) => StatusCode::BAD_REQUEST,
      Self::InsufficientQuestions { .. } | Self::InvalidState(_) => StatusCode::CONFLICT,
      Self::NothingToExport => StatusCode::NOT_FOUND,
      Self::GenerationParse { .. } => StatusCode::UNPROCESSABLE_ENTITY,
      Self::Generation(_) => StatusCode::BAD_GATEWAY,
      Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
      Self::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
      Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

/// Body returned by the HTTP API for every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
  pub success: bool,
  pub category: &'static str,
  pub error: String,
}

impl From<&QuizError> for ErrorBody {
  fn from(e: &QuizError) -> Self {
    ErrorBody { success: false, category: e.category(), error: e.to_string() }
  }
}

impl IntoResponse for QuizError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(target: "jlpt_quiz", category = self.category(), error = %self, "Request failed");
    } else {
      tracing::warn!(target: "jlpt_quiz", category = self.category(), error = %self, "Request rejected");
    }
    (status, Json(ErrorBody::from(&self))).into_response()
  }
}
