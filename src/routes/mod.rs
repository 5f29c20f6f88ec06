//! Router assembly: HTTP endpoints, WebSocket upgrade, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - JSON API under `/api/v1/...`
/// - CORS (allow any origin/method/headers); adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // Bank
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/questions", get(http::http_list_questions))
        .route("/api/v1/questions/stats", get(http::http_question_stats))
        // Quiz
        .route("/api/v1/quiz", get(http::http_get_quiz))
        .route("/api/v1/quiz/start", post(http::http_start_quiz))
        .route("/api/v1/quiz/answer", post(http::http_answer))
        .route("/api/v1/quiz/submit", post(http::http_submit))
        .route("/api/v1/quiz/reset", post(http::http_reset))
        // History + badges
        .route("/api/v1/history", get(http::http_history).delete(http::http_clear_history))
        .route("/api/v1/history/:index", delete(http::http_delete_history))
        .route("/api/v1/badges", get(http::http_badges))
        // Stored questions
        .route("/api/v1/storage", delete(http::http_clear_storage))
        .route("/api/v1/storage/stats", get(http::http_storage_stats))
        .route("/api/v1/storage/export", get(http::http_export))
        .route("/api/v1/storage/import", post(http::http_import))
        // Generation
        .route("/api/v1/generate", post(http::http_generate))
        .route("/api/v1/generator/status", get(http::http_generator_status))
        .route("/api/v1/generator/test", post(http::http_generator_test))
        .route("/api/v1/generator/key", put(http::http_set_api_key).delete(http::http_remove_api_key))
        // Settings
        .route("/api/v1/settings/language", get(http::http_get_language).put(http::http_set_language))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use tower::ServiceExt;

    use crate::config::AppConfig;
    use crate::kv::MemoryStore;

    fn app() -> Router {
        let state = AppState::with_store(AppConfig::default(), Box::new(MemoryStore::new()), None);
        build_router(Arc::new(state))
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn health_and_question_listing() {
        let app = app();
        let (status, body) = call(&app, Method::GET, "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);

        let (status, body) = call(&app, Method::GET, "/api/v1/questions?level=N5&type=Kanji", None).await;
        assert_eq!(status, StatusCode::OK);
        let questions = body["questions"].as_array().unwrap();
        assert!(!questions.is_empty());
        assert!(questions.iter().all(|q| q["level"] == "N5" && q["type"] == "Kanji"));

        let (_, stats) = call(&app, Method::GET, "/api/v1/questions/stats", None).await;
        assert!(stats["total"].as_u64().unwrap() >= 80);
    }

    #[tokio::test]
    async fn quiz_round_trip_over_http() {
        let app = app();
        let (status, quiz) =
            call(&app, Method::POST, "/api/v1/quiz/start", Some(serde_json::json!({"level": "N4", "count": 2}))).await;
        assert_eq!(status, StatusCode::OK);
        let sid = quiz["sessionId"].clone();
        let q0 = &quiz["questions"][0];

        let (status, ack) = call(
            &app,
            Method::POST,
            "/api/v1/quiz/answer",
            Some(serde_json::json!({"sessionId": sid, "questionId": q0["id"], "option": q0["options"][0]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["answered"], 1);

        let (status, out) =
            call(&app, Method::POST, "/api/v1/quiz/submit", Some(serde_json::json!({"sessionId": sid}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(out["historyLength"], 1);
        assert_eq!(out["newBadge"]["id"], "firstQuiz");

        let (_, history) = call(&app, Method::GET, "/api/v1/history", None).await;
        assert_eq!(history.as_array().unwrap().len(), 1);
        let (_, badges) = call(&app, Method::GET, "/api/v1/badges", None).await;
        assert_eq!(badges[0]["unlocked"], true);

        let (status, _) = call(&app, Method::DELETE, "/api/v1/history/0", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(&app, Method::DELETE, "/api/v1/history/0", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["category"], "validation_failure");
    }

    #[tokio::test]
    async fn error_statuses_follow_categories() {
        let app = app();
        let (status, body) =
            call(&app, Method::POST, "/api/v1/quiz/start", Some(serde_json::json!({"level": "N1", "count": 999}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
        assert_eq!(body["category"], "insufficient_questions");

        let (status, _) = call(&app, Method::GET, "/api/v1/storage/export?format=csv", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/generate",
            Some(serde_json::json!({"level": "N5", "type": "Kanji", "count": 2})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["category"], "not_configured");
    }

    #[tokio::test]
    async fn malformed_requests_report_validation_failure() {
        let app = app();
        let (status, body) =
            call(&app, Method::POST, "/api/v1/quiz/start", Some(serde_json::json!({"level": "N9", "count": 5}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["category"], "validation_failure");
        assert!(body["error"].as_str().unwrap().contains("N9"));

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/generate",
            Some(serde_json::json!({"level": "N5", "type": "Kanji", "count": -1})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["category"], "validation_failure");

        let (status, body) = call(&app, Method::GET, "/api/v1/questions?difficulty=hard", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["category"], "validation_failure");

        let (status, body) = call(&app, Method::DELETE, "/api/v1/history/first", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["category"], "validation_failure");
    }

    #[tokio::test]
    async fn import_then_download_export() {
        let app = app();
        let csv = "ID,Level,Type,Question,Option1,Option2,Option3,Option4,Answer,Explanation,Topic\n\
            1,N5,Vocabulary,\"りんご, means?\",apple,pear,grape,peach,apple,fruit,food\n";
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/storage/import?filename=fruit.csv")
            .body(Body::from(csv))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let res = app
            .clone()
            .oneshot(Request::builder().uri("/api/v1/storage/export?format=csv").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let disposition = res.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
        assert!(disposition.contains("japanese_quiz_questions_") && disposition.contains(".csv"));
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("\"りんご, means?\""));

        let (_, stats) = call(&app, Method::GET, "/api/v1/storage/stats", None).await;
        assert_eq!(stats["total"], 1);
        assert_eq!(stats["bySource"]["imported"], 1);
    }

    #[tokio::test]
    async fn settings_and_key_management() {
        let app = app();
        let (_, lang) = call(&app, Method::GET, "/api/v1/settings/language", None).await;
        assert_eq!(lang["language"], "zh");
        let (status, lang) =
            call(&app, Method::PUT, "/api/v1/settings/language", Some(serde_json::json!({"language": "en"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(lang["language"], "en");

        let (_, status_body) = call(&app, Method::GET, "/api/v1/generator/status", None).await;
        assert_eq!(status_body["configured"], false);
        let (status, body) =
            call(&app, Method::PUT, "/api/v1/generator/key", Some(serde_json::json!({"apiKey": "k-123"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["configured"], true);
        let (status, _) = call(&app, Method::DELETE, "/api/v1/generator/key", None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
