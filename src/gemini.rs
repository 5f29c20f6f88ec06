//! Minimal Gemini client for question generation.
//!
//! We only call `models/{model}:generateContent` and take the first candidate's
//! text. Calls are instrumented and log the model, latency and response size.
//! The API key travels as a query parameter and is never logged.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::{GenerationConfig, Prompts};
use crate::error::{QuizError, QuizResult};
use crate::generation::{build_prompt, parse_generated_questions, GenerationRequest};
use crate::domain::Question;
use crate::util::{now_millis, now_rfc3339};

/// Sliding-window limiter: at most `max` calls in any `window`.
#[derive(Debug)]
pub struct RateLimiter {
  window: Duration,
  max: usize,
  hits: VecDeque<Instant>,
}

impl RateLimiter {
  pub fn new(window: Duration, max: usize) -> Self {
    Self { window, max, hits: VecDeque::new() }
  }

  fn prune(&mut self, now: Instant) {
    while let Some(&t) = self.hits.front() {
      if now.duration_since(t) >= self.window {
        self.hits.pop_front();
      } else {
        break;
      }
    }
  }

  /// Record a call at `now`, or fail with the seconds left until a slot frees.
  pub fn check_at(&mut self, now: Instant) -> QuizResult<()> {
    self.prune(now);
    if self.hits.len() >= self.max {
      let wait = self.reset_in_at(now).unwrap_or(self.window);
      let wait_secs = (wait.as_millis() as u64).div_ceil(1000).max(1);
      return Err(QuizError::RateLimited { wait_secs });
    }
    self.hits.push_back(now);
    Ok(())
  }

  pub fn remaining_at(&mut self, now: Instant) -> usize {
    self.prune(now);
    self.max.saturating_sub(self.hits.len())
  }

  /// Time until the oldest recorded call leaves the window.
  pub fn reset_in_at(&self, now: Instant) -> Option<Duration> {
    self.hits.front().map(|&t| self.window.saturating_sub(now.duration_since(t)))
  }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorStatus {
  pub configured: bool,
  pub model: String,
  pub rate_limit_enabled: bool,
  pub remaining_requests: Option<usize>,
  pub reset_in_secs: Option<u64>,
}

pub struct Gemini {
  client: reqwest::Client,
  api_key: String,
  cfg: GenerationConfig,
  limiter: Option<Mutex<RateLimiter>>,
}

impl Gemini {
  pub fn new(api_key: &str, cfg: GenerationConfig) -> QuizResult<Self> {
    let api_key = api_key.trim();
    if api_key.is_empty() {
      return Err(QuizError::validation("API key must not be empty"));
    }
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(cfg.timeout_secs))
      .build()
      .map_err(|e| QuizError::Generation(format!("HTTP client: {e}")))?;
    let limiter = cfg
      .rate_limit_enabled
      .then(|| Mutex::new(RateLimiter::new(Duration::from_secs(cfg.rate_limit_window_secs), cfg.rate_limit_max)));
    Ok(Self { client, api_key: api_key.to_string(), cfg, limiter })
  }

  pub fn model(&self) -> &str {
    &self.cfg.model
  }

  fn check_rate_limit(&self) -> QuizResult<()> {
    match &self.limiter {
      Some(l) => l
        .lock()
        .map_err(|_| QuizError::Generation("rate limiter lock poisoned".into()))?
        .check_at(Instant::now()),
      None => Ok(()),
    }
  }

  pub fn status(&self) -> GeneratorStatus {
    let (remaining, reset) = match self.limiter.as_ref().and_then(|l| l.lock().ok()) {
      Some(mut l) => {
        let now = Instant::now();
        let remaining = l.remaining_at(now);
        (Some(remaining), l.reset_in_at(now).map(|d| d.as_secs()))
      }
      None => (None, None),
    };
    GeneratorStatus {
      configured: true,
      model: self.cfg.model.clone(),
      rate_limit_enabled: self.cfg.rate_limit_enabled,
      remaining_requests: remaining,
      reset_in_secs: reset,
    }
  }

  /// Single-prompt `generateContent` call returning the first candidate's text.
  #[instrument(level = "info", skip(self, prompt), fields(model = %self.cfg.model, prompt_len = prompt.len()))]
  async fn generate_content(&self, prompt: &str) -> QuizResult<String> {
    self.check_rate_limit()?;

    let url = format!("{}/models/{}:generateContent", self.cfg.base_url, self.cfg.model);
    let req = GenerateContentRequest {
      contents: vec![Content { parts: vec![Part { text: Some(prompt.to_string()) }] }],
      generation_config: GenerationConfigWire {
        temperature: self.cfg.temperature,
        top_k: self.cfg.top_k,
        top_p: self.cfg.top_p,
        max_output_tokens: self.cfg.max_output_tokens,
      },
    };

    let started = Instant::now();
    let res = self
      .client
      .post(&url)
      .query(&[("key", self.api_key.as_str())])
      .header(USER_AGENT, "jlpt-quiz-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(&req)
      .send()
      .await
      .map_err(|e| QuizError::Generation(e.without_url().to_string()))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_gemini_error(&body).unwrap_or_else(|| "Unknown error".into());
      warn!(target: "generation", %status, error = %msg, "Gemini request failed");
      return Err(QuizError::Generation(format!("API request failed: {} - {msg}", status.as_u16())));
    }

    let body: GenerateContentResponse =
      res.json().await.map_err(|e| QuizError::Generation(format!("response format: {}", e.without_url())))?;
    let text = first_candidate_text(body)?;
    info!(
      target: "generation",
      elapsed_ms = started.elapsed().as_millis() as u64,
      response_len = text.len(),
      "Gemini response received"
    );
    Ok(text)
  }

  #[instrument(level = "info", skip(self, prompts), fields(level = %req.level, kind = %req.kind, count = req.count))]
  pub async fn generate_questions(&self, prompts: &Prompts, req: &GenerationRequest) -> QuizResult<Vec<Question>> {
    req.validate(self.cfg.max_per_request)?;
    let prompt = build_prompt(prompts, req);
    let text = self.generate_content(&prompt).await?;
    parse_generated_questions(&text, req, now_millis(), &now_rfc3339())
  }

  /// One short round trip to verify the key and model.
  pub async fn test_connection(&self, prompts: &Prompts) -> QuizResult<String> {
    let text = self.generate_content(&prompts.connection_test).await?;
    Ok(text.trim().to_string())
  }
}

/* ----- Wire types ----- */

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
  contents: Vec<Content>,
  generation_config: GenerationConfigWire,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfigWire {
  temperature: f32,
  top_k: u32,
  top_p: f32,
  max_output_tokens: u32,
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
  #[serde(default)]
  parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  text: Option<String>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
  #[serde(default)]
  candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
  #[serde(default)]
  content: Option<Content>,
}

fn first_candidate_text(body: GenerateContentResponse) -> QuizResult<String> {
  let candidate = body
    .candidates
    .into_iter()
    .next()
    .ok_or_else(|| QuizError::Generation("response format: no candidates".into()))?;
  candidate
    .content
    .and_then(|c| c.parts.into_iter().next())
    .and_then(|p| p.text)
    .filter(|t| !t.is_empty())
    .ok_or_else(|| QuizError::Generation("response format: cannot extract text".into()))
}

fn extract_gemini_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Level, QuestionType};
  use axum::routing::post;
  use axum::{Json, Router};

  async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
  }

  fn cfg(base_url: String) -> GenerationConfig {
    GenerationConfig { base_url, ..GenerationConfig::default() }
  }

  fn request() -> GenerationRequest {
    GenerationRequest { level: Level::N5, kind: QuestionType::Vocabulary, topic: None, count: 1 }
  }

  #[test]
  fn limiter_blocks_then_frees_slots() {
    let mut l = RateLimiter::new(Duration::from_secs(60), 2);
    let t0 = Instant::now();
    l.check_at(t0).unwrap();
    l.check_at(t0 + Duration::from_secs(10)).unwrap();
    assert_eq!(l.remaining_at(t0 + Duration::from_secs(11)), 0);
    match l.check_at(t0 + Duration::from_secs(20)) {
      Err(QuizError::RateLimited { wait_secs }) => assert_eq!(wait_secs, 40),
      other => panic!("expected rate limit, got {other:?}"),
    }
    l.check_at(t0 + Duration::from_secs(61)).unwrap();
    assert_eq!(l.remaining_at(t0 + Duration::from_secs(61)), 0);
    assert_eq!(l.remaining_at(t0 + Duration::from_secs(71)), 1);
  }

  #[test]
  fn empty_key_is_rejected() {
    assert!(Gemini::new("  ", GenerationConfig::default()).is_err());
  }

  #[test]
  fn candidate_text_extraction() {
    let ok: GenerateContentResponse =
      serde_json::from_str(r#"{"candidates":[{"content":{"parts":[{"text":"hi"}]}}]}"#).unwrap();
    assert_eq!(first_candidate_text(ok).unwrap(), "hi");
    let none: GenerateContentResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
    assert!(matches!(first_candidate_text(none), Err(QuizError::Generation(_))));
    let empty: GenerateContentResponse = serde_json::from_str(r#"{"candidates":[{"content":{"parts":[]}}]}"#).unwrap();
    assert!(first_candidate_text(empty).is_err());
  }

  #[tokio::test]
  async fn generates_questions_against_a_fake_api() {
    let reply = serde_json::json!({
      "questions": [{
        "question": "「みず」は？", "options": ["水", "火", "木", "金"], "answer": "水", "explanation": "water"
      }]
    })
    .to_string();
    let router = Router::new().route(
      "/models/:call",
      post(move |Json(body): Json<serde_json::Value>| {
        let reply = reply.clone();
        async move {
          assert_eq!(body["generationConfig"]["topK"], 40);
          assert!(body["contents"][0]["parts"][0]["text"].as_str().unwrap().contains("N5"));
          Json(serde_json::json!({ "candidates": [{ "content": { "parts": [{ "text": reply }] } }] }))
        }
      }),
    );
    let base = serve(router).await;
    let g = Gemini::new("k", cfg(base)).unwrap();
    let qs = g.generate_questions(&Prompts::default(), &request()).await.unwrap();
    assert_eq!(qs.len(), 1);
    assert_eq!(qs[0].answer, "水");
    assert_eq!(qs[0].level, Level::N5);
  }

  #[tokio::test]
  async fn http_errors_carry_the_api_message() {
    let router = Router::new().route(
      "/models/:call",
      post(|| async {
        (
          axum::http::StatusCode::BAD_REQUEST,
          Json(serde_json::json!({ "error": { "message": "API key not valid" } })),
        )
      }),
    );
    let base = serve(router).await;
    let g = Gemini::new("bad", cfg(base)).unwrap();
    match g.test_connection(&Prompts::default()).await {
      Err(QuizError::Generation(msg)) => assert!(msg.contains("400") && msg.contains("API key not valid")),
      other => panic!("expected generation failure, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn limiter_fails_fast_before_the_network() {
    let mut c = cfg("http://127.0.0.1:9".into());
    c.rate_limit_enabled = true;
    c.rate_limit_max = 0;
    let g = Gemini::new("k", c).unwrap();
    assert!(matches!(
      g.generate_questions(&Prompts::default(), &request()).await,
      Err(QuizError::RateLimited { .. })
    ));
    assert_eq!(g.status().remaining_requests, Some(0));
  }
}
