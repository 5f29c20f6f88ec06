//! JLPT Quiz · Japanese Practice Backend
//!
//! - Axum HTTP + WebSocket API
//! - Built-in question bank, extended by stored and generated questions
//! - Optional Gemini integration for question generation
//!
//! Important env variables:
//!   PORT              : u16 (default 3000)
//!   QUIZ_CONFIG_PATH  : path to TOML config (prompts, storage, quiz, generation)
//!   QUIZ_DATA_DIR     : directory for persisted questions, history and settings
//!   GEMINI_API_KEY    : enables generation if present (else the stored key is used)
//!   GEMINI_BASE_URL   : default "https://generativelanguage.googleapis.com/v1beta"
//!   GEMINI_MODEL      : default "gemini-1.5-flash"
//!   LOG_LEVEL         : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT        : "pretty" (default) or "json"

mod telemetry;
mod util;
mod error;
mod domain;
mod config;
mod seeds;
mod bank;
mod kv;
mod codec;
mod store;
mod session;
mod achievements;
mod generation;
mod gemini;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared state: question bank, persistent store, active quiz, Gemini client.
  let state = Arc::new(AppState::new()?);

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "jlpt_quiz", %addr, "HTTP server listening");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
  info!(target: "jlpt_quiz", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "jlpt_quiz", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  info!(target: "jlpt_quiz", "Shutdown requested");
}
