//! Import/export codecs for the stored question set.
//!
//! JSON exports wrap the questions as `{exportDate, questionCount, questions}`.
//! CSV exports use a fixed column layout; the reader accepts RFC 4180 quoting
//! (embedded commas, newlines and doubled quotes).

use std::str::FromStr;

use chrono::{DateTime, Utc};
use csv::{QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{Question, QuestionDraft};
use crate::error::{QuizError, QuizResult};

pub const CSV_HEADERS: [&str; 13] = [
  "ID", "Level", "Type", "Question", "Option1", "Option2", "Option3", "Option4",
  "Answer", "Explanation", "Topic", "Source", "CreatedAt",
];

/// Rows shorter than this cannot carry a complete question.
const CSV_MIN_FIELDS: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
  Json,
  Csv,
}

impl ExportFormat {
  pub fn extension(&self) -> &'static str {
    match self {
      ExportFormat::Json => "json",
      ExportFormat::Csv => "csv",
    }
  }

  pub fn mime_type(&self) -> &'static str {
    match self {
      ExportFormat::Json => "application/json",
      ExportFormat::Csv => "text/csv",
    }
  }

  /// Pick the format from a file name's extension.
  pub fn from_filename(name: &str) -> QuizResult<Self> {
    let ext = name.rsplit_once('.').map(|(_, e)| e).unwrap_or_default();
    ext.parse().map_err(|_| QuizError::import(format!("unsupported file format: '{name}'")))
  }
}

impl FromStr for ExportFormat {
  type Err = QuizError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "json" => Ok(ExportFormat::Json),
      "csv" => Ok(ExportFormat::Csv),
      other => Err(QuizError::validation(format!("unsupported format '{other}'"))),
    }
  }
}

/// A rendered export, ready to hand to the client as a download.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFile {
  pub filename: String,
  pub mime_type: String,
  pub content: String,
}

/// File handed to the importer.
#[derive(Clone, Debug, Deserialize)]
pub struct ImportFile {
  pub filename: String,
  pub content: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportDocument<'a> {
  export_date: String,
  question_count: usize,
  questions: &'a [Question],
}

pub fn export_filename(format: ExportFormat, now: DateTime<Utc>) -> String {
  format!("japanese_quiz_questions_{}.{}", now.format("%Y%m%d"), format.extension())
}

pub fn render(questions: &[Question], format: ExportFormat, now: DateTime<Utc>) -> QuizResult<ExportFile> {
  let content = match format {
    ExportFormat::Json => to_json(questions, now)?,
    ExportFormat::Csv => to_csv(questions)?,
  };
  Ok(ExportFile {
    filename: export_filename(format, now),
    mime_type: format.mime_type().to_string(),
    content,
  })
}

pub fn to_json(questions: &[Question], now: DateTime<Utc>) -> QuizResult<String> {
  let doc = ExportDocument {
    export_date: now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    question_count: questions.len(),
    questions,
  };
  serde_json::to_string_pretty(&doc).map_err(|e| QuizError::storage(format!("JSON export: {e}")))
}

pub fn to_csv(questions: &[Question]) -> QuizResult<String> {
  let csv_err = |e: csv::Error| QuizError::storage(format!("CSV export: {e}"));
  let mut w = WriterBuilder::new()
    .quote_style(QuoteStyle::NonNumeric)
    .terminator(Terminator::Any(b'\n'))
    .from_writer(Vec::new());
  w.write_record(CSV_HEADERS).map_err(csv_err)?;
  for q in questions {
    let created = q.created_at.as_deref().or(q.imported_at.as_deref()).unwrap_or_default();
    let id = q.id.to_string();
    w.write_record([
      id.as_str(),
      q.level.as_str(),
      q.kind.as_str(),
      q.question.as_str(),
      q.options[0].as_str(),
      q.options[1].as_str(),
      q.options[2].as_str(),
      q.options[3].as_str(),
      q.answer.as_str(),
      q.explanation.as_str(),
      q.topic.as_str(),
      q.source.as_str(),
      created,
    ])
    .map_err(csv_err)?;
  }
  let bytes = w.into_inner().map_err(|e| QuizError::storage(format!("CSV export: {e}")))?;
  String::from_utf8(bytes).map_err(|e| QuizError::storage(format!("CSV export: {e}")))
}

/// Parse an import file into unvalidated drafts. Fails only when the file as a
/// whole cannot be read; individual malformed entries become invalid drafts
/// or are skipped.
pub fn parse_import(file: &ImportFile) -> QuizResult<Vec<QuestionDraft>> {
  let content = file.content.trim_start_matches('\u{feff}');
  match ExportFormat::from_filename(&file.filename)? {
    ExportFormat::Json => parse_json(content),
    ExportFormat::Csv => parse_csv(content),
  }
}

fn parse_json(content: &str) -> QuizResult<Vec<QuestionDraft>> {
  let value: serde_json::Value =
    serde_json::from_str(content).map_err(|e| QuizError::import(format!("invalid JSON: {e}")))?;
  let items = match value {
    serde_json::Value::Array(items) => items,
    serde_json::Value::Object(mut obj) => match obj.remove("questions") {
      Some(serde_json::Value::Array(items)) => items,
      _ => return Err(QuizError::import("JSON document has no 'questions' array")),
    },
    _ => return Err(QuizError::import("JSON document must be an object or an array")),
  };
  Ok(
    items
      .into_iter()
      .enumerate()
      .filter_map(|(i, item)| match serde_json::from_value::<QuestionDraft>(item) {
        Ok(d) => Some(d),
        Err(e) => {
          debug!(target: "storage", index = i, error = %e, "Skipping malformed JSON entry");
          None
        }
      })
      .collect(),
  )
}

fn non_empty(s: Option<&str>) -> Option<String> {
  s.filter(|v| !v.is_empty()).map(str::to_string)
}

fn parse_csv(content: &str) -> QuizResult<Vec<QuestionDraft>> {
  let mut rdr = ReaderBuilder::new().has_headers(true).flexible(true).from_reader(content.as_bytes());
  let header_len = rdr
    .headers()
    .map_err(|e| QuizError::import(format!("unreadable CSV header: {e}")))?
    .len();
  if header_len < CSV_MIN_FIELDS {
    return Err(QuizError::import(format!("CSV header has {header_len} columns, expected at least {CSV_MIN_FIELDS}")));
  }

  let mut drafts = Vec::new();
  for (i, rec) in rdr.records().enumerate() {
    let rec = match rec {
      Ok(r) => r,
      Err(e) => {
        warn!(target: "storage", row = i + 1, error = %e, "Skipping unreadable CSV row");
        continue;
      }
    };
    if rec.len() < CSV_MIN_FIELDS {
      debug!(target: "storage", row = i + 1, fields = rec.len(), "Skipping short CSV row");
      continue;
    }
    let options: Vec<String> = (4..8).map(|c| rec.get(c).unwrap_or_default().to_string()).collect();
    drafts.push(QuestionDraft {
      id: rec.get(0).and_then(|s| s.trim().parse::<f64>().ok()),
      level: non_empty(rec.get(1)),
      kind: non_empty(rec.get(2)),
      question: non_empty(rec.get(3)),
      options: Some(options),
      answer: non_empty(rec.get(8)),
      explanation: non_empty(rec.get(9)),
      topic: non_empty(rec.get(10)),
      created_at: non_empty(rec.get(12)),
      ..Default::default()
    });
  }
  Ok(drafts)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::tests::question;
  use crate::domain::Level;

  fn file(name: &str, content: &str) -> ImportFile {
    ImportFile { filename: name.into(), content: content.into() }
  }

  fn validated(drafts: Vec<QuestionDraft>) -> Vec<Question> {
    drafts.into_iter().filter_map(|d| Question::try_from(d).ok()).collect()
  }

  #[test]
  fn format_from_filename() {
    assert_eq!(ExportFormat::from_filename("a.JSON").unwrap(), ExportFormat::Json);
    assert_eq!(ExportFormat::from_filename("dir.v2/a.csv").unwrap(), ExportFormat::Csv);
    assert!(matches!(ExportFormat::from_filename("a.txt"), Err(QuizError::Import(_))));
    assert!(ExportFormat::from_filename("noext").is_err());
  }

  #[test]
  fn json_export_has_envelope_and_round_trips() {
    let qs = vec![question(1, Level::N5, "q1", "a"), question(2, Level::N3, "q2", "b")];
    let out = render(&qs, ExportFormat::Json, Utc::now()).unwrap();
    assert!(out.filename.starts_with("japanese_quiz_questions_") && out.filename.ends_with(".json"));
    let v: serde_json::Value = serde_json::from_str(&out.content).unwrap();
    assert_eq!(v["questionCount"], 2);
    assert!(v["exportDate"].is_string());

    let back = validated(parse_import(&file("x.json", &out.content)).unwrap());
    assert_eq!(back, qs);
  }

  #[test]
  fn csv_quotes_commas_quotes_and_newlines() {
    let mut q = question(7, Level::N2, "He said \"hi\", then left", "a");
    q.explanation = "line one,\nline two".into();
    q.created_at = Some("2025-07-16T00:00:00.000Z".into());
    let csv = to_csv(std::slice::from_ref(&q)).unwrap();
    assert!(csv.starts_with("\"ID\",\"Level\""));
    assert!(csv.contains("\"He said \"\"hi\"\", then left\""));

    let back = validated(parse_import(&file("x.csv", &csv)).unwrap());
    assert_eq!(back.len(), 1);
    assert_eq!(back[0].question, q.question);
    assert_eq!(back[0].explanation, q.explanation);
    assert_eq!(back[0].options, q.options);
    assert_eq!(back[0].created_at, q.created_at);
    assert_eq!(back[0].id, 7);
  }

  #[test]
  fn csv_rows_missing_answer_or_columns_do_not_validate() {
    let csv = "ID,Level,Type,Question,Option1,Option2,Option3,Option4,Answer,Explanation,Topic\n\
      1,N5,Kanji,\"水, みず?\",みず,すい,みづ,すいり,みず,reading,\n\
      2,N5,Kanji,q2,a,b,c,d,,missing answer,\n\
      3,N5,Kanji,q3,a,b\n";
    let drafts = parse_import(&file("x.csv", csv)).unwrap();
    assert_eq!(drafts.len(), 2);
    let ok = validated(drafts);
    assert_eq!(ok.len(), 1);
    assert_eq!(ok[0].question, "水, みず?");
    assert_eq!(ok[0].topic, "general");
  }

  #[test]
  fn json_accepts_bare_array_and_rejects_garbage() {
    let arr = r#"[{"id":1,"level":"N5","type":"Kanji","question":"q","options":["a","b","c","d"],"answer":"a","explanation":"e"}, 42]"#;
    assert_eq!(parse_import(&file("x.json", arr)).unwrap().len(), 1);
    assert!(matches!(parse_import(&file("x.json", "{not json")), Err(QuizError::Import(_))));
    assert!(matches!(parse_import(&file("x.json", r#"{"items": []}"#)), Err(QuizError::Import(_))));
  }

  #[test]
  fn csv_with_too_few_header_columns_is_unparseable() {
    assert!(matches!(parse_import(&file("x.csv", "a,b\n1,2\n")), Err(QuizError::Import(_))));
  }
}
