//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.

use std::sync::Arc;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use base64::Engine;
use tracing::{debug, error, info, instrument};

use crate::codec::ImportFile;
use crate::error::{QuizError, QuizResult};
use crate::logic;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "jlpt_quiz", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "jlpt_quiz", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "jlpt_quiz", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state).await.unwrap_or_else(|e| error_msg(&e))
          }
          Err(e) => ServerWsMessage::Error { category: "validation_failure".into(), message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "category": "storage_failure", "message": format!("Serialization error: {}", e) })
            .to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "jlpt_quiz", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => {
        let _ = socket.send(Message::Pong(payload)).await;
      }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "jlpt_quiz", "WebSocket disconnected");
}

fn error_msg(e: &QuizError) -> ServerWsMessage {
  ServerWsMessage::Error { category: e.category().into(), message: e.to_string() }
}

fn decode_file(filename: String, content_base64: &str) -> QuizResult<ImportFile> {
  let bytes = base64::engine::general_purpose::STANDARD
    .decode(content_base64.trim())
    .map_err(|e| QuizError::import(format!("file body is not valid base64: {e}")))?;
  let content = String::from_utf8(bytes).map_err(|_| QuizError::import("file is not UTF-8 text"))?;
  Ok(ImportFile { filename, content })
}

async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> QuizResult<ServerWsMessage> {
  Ok(match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::StartQuiz { level, count } => {
      let quiz = logic::start_quiz(state, level, count).await?;
      info!(target: "quiz", session = %quiz.session_id, "WS quiz started");
      ServerWsMessage::Quiz { quiz }
    }

    ClientWsMessage::GetQuiz => ServerWsMessage::Quiz { quiz: logic::current_quiz(state).await },

    ClientWsMessage::SelectAnswer { session_id, question_id, option } => {
      ServerWsMessage::AnswerRecorded(logic::select_answer(state, session_id, question_id, &option).await?)
    }

    ClientWsMessage::SubmitQuiz { session_id } => ServerWsMessage::QuizResult(logic::submit_quiz(state, session_id).await?),

    ClientWsMessage::ResetQuiz => ServerWsMessage::Quiz { quiz: logic::reset_quiz(state).await },

    ClientWsMessage::Generate { request } => {
      ServerWsMessage::Generated(logic::generate_questions(state, request).await?)
    }

    ClientWsMessage::ImportFile { filename, content_base64 } => {
      let file = decode_file(filename, &content_base64)?;
      ServerWsMessage::Imported(logic::import_questions(state, file).await?)
    }

    ClientWsMessage::Export { format } => ServerWsMessage::ExportFile { file: logic::export_questions(state, format).await? },

    ClientWsMessage::StorageStats => ServerWsMessage::StorageStats { stats: logic::storage_stats(state).await },

    ClientWsMessage::History => ServerWsMessage::History { history: logic::history(state).await },

    ClientWsMessage::Badges => ServerWsMessage::Badges { badges: logic::badges(state).await },
  })
}
