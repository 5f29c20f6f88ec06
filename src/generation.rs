//! Question generation: request validation, prompt assembly and parsing of the
//! model's reply into validated questions. Transport lives in `gemini`.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Prompts;
use crate::domain::{Level, Question, QuestionDraft, QuestionSource, QuestionType, DEFAULT_TOPIC};
use crate::error::{QuizError, QuizResult};
use crate::util::{extract_json_object, fill_template, trunc_for_log};

#[derive(Clone, Debug, Deserialize)]
pub struct GenerationRequest {
  pub level: Level,
  #[serde(rename = "type")]
  pub kind: QuestionType,
  #[serde(default)]
  pub topic: Option<String>,
  pub count: usize,
}

impl GenerationRequest {
  pub fn validate(&self, max_per_request: usize) -> QuizResult<()> {
    if !self.level.is_jlpt() {
      return Err(QuizError::validation(format!("cannot generate questions for level {}", self.level)));
    }
    if self.count == 0 || self.count > max_per_request {
      return Err(QuizError::validation(format!(
        "count must be between 1 and {max_per_request}, got {}",
        self.count
      )));
    }
    Ok(())
  }

  /// Trimmed topic, `None` when absent or blank.
  pub fn topic(&self) -> Option<&str> {
    self.topic.as_deref().map(str::trim).filter(|t| !t.is_empty())
  }
}

pub fn build_prompt(prompts: &Prompts, req: &GenerationRequest) -> String {
  let count = req.count.to_string();
  let topic_clause = req.topic().map(|t| format!(" on the topic \"{t}\"")).unwrap_or_default();
  let body = fill_template(
    &prompts.question_user_template,
    &[
      ("count", count.as_str()),
      ("level", req.level.as_str()),
      ("type", req.kind.as_str()),
      ("topic", req.topic().unwrap_or(DEFAULT_TOPIC)),
      ("topic_clause", topic_clause.as_str()),
    ],
  );
  format!("{body}\n\n{}", prompts.guidance_for(req.kind))
}

#[derive(Deserialize)]
struct GeneratedEnvelope {
  questions: Vec<serde_json::Value>,
}

/// Turn raw model text into questions. Missing level/type/topic are taken from
/// the request; ids are `now_ms + index`. Any unusable entry fails the batch.
pub fn parse_generated_questions(
  text: &str,
  req: &GenerationRequest,
  now_ms: u64,
  now_iso: &str,
) -> QuizResult<Vec<Question>> {
  let fail = |reason: String| {
    warn!(target: "generation", %reason, raw = %trunc_for_log(text, 300), "Generated text rejected");
    QuizError::GenerationParse { reason, raw: text.to_string() }
  };

  let json = extract_json_object(text).ok_or_else(|| fail("no JSON object found in response".into()))?;
  let envelope: GeneratedEnvelope =
    serde_json::from_str(json).map_err(|e| fail(format!("response is not a questions object: {e}")))?;

  let mut out = Vec::with_capacity(envelope.questions.len());
  for (i, item) in envelope.questions.into_iter().enumerate() {
    let mut draft: QuestionDraft =
      serde_json::from_value(item).map_err(|e| fail(format!("question {}: {e}", i + 1)))?;
    draft.id = Some((now_ms + i as u64) as f64);
    draft.level = draft.level.filter(|s| !s.trim().is_empty()).or_else(|| Some(req.level.to_string()));
    draft.kind = draft.kind.filter(|s| !s.trim().is_empty()).or_else(|| Some(req.kind.to_string()));
    draft.topic = draft
      .topic
      .filter(|s| !s.trim().is_empty())
      .or_else(|| Some(req.topic().unwrap_or(DEFAULT_TOPIC).to_string()));
    draft.source = Some(QuestionSource::Generated.as_str().to_string());
    draft.created_at = Some(now_iso.to_string());
    draft.imported_at = None;
    let q = Question::try_from(draft).map_err(|e| fail(format!("question {}: {e}", i + 1)))?;
    out.push(q);
  }
  if out.is_empty() {
    return Err(fail("response contained no questions".into()));
  }
  debug!(target: "generation", count = out.len(), "Parsed generated questions");
  Ok(out)
}
