//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::achievements::BadgeView;
use crate::codec::{ExportFile, ExportFormat};
use crate::domain::{HistoryRecord, Level, Question, QuestionSource, QuestionType};
use crate::generation::GenerationRequest;
use crate::session::{Phase, QuizSession, SessionResult};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    StartQuiz {
        level: Level,
        count: i64,
    },
    GetQuiz,
    SelectAnswer {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
        #[serde(rename = "questionId")]
        question_id: u64,
        option: String,
    },
    SubmitQuiz {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
    },
    ResetQuiz,
    Generate {
        request: GenerationRequest,
    },
    ImportFile {
        filename: String,
        #[serde(rename = "contentBase64")]
        content_base64: String,
    },
    Export {
        format: ExportFormat,
    },
    StorageStats,
    History,
    Badges,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Quiz {
        quiz: QuizView,
    },
    AnswerRecorded(AnswerAck),
    QuizResult(SubmitOut),
    Generated(GenerateOut),
    Imported(ImportOut),
    ExportFile {
        file: ExportFile,
    },
    StorageStats {
        stats: crate::store::StorageStats,
    },
    History {
        history: Vec<HistoryRecord>,
    },
    Badges {
        badges: Vec<BadgeView>,
    },
    Error {
        category: String,
        message: String,
    },
}

/// Question as shown while a quiz is running: no answer, no explanation.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOut {
    pub id: u64,
    pub level: Level,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    pub question: String,
    pub options: [String; 4],
    pub topic: String,
    pub difficulty: u8,
    pub source: QuestionSource,
}

pub fn to_out(q: &Question) -> QuestionOut {
    QuestionOut {
        id: q.id,
        level: q.level,
        kind: q.kind,
        question: q.question.clone(),
        options: q.options.clone(),
        topic: q.topic.clone(),
        difficulty: q.difficulty,
        source: q.source,
    }
}

/// Snapshot of the active quiz.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizView {
    pub session_id: Uuid,
    pub phase: Phase,
    pub level: Option<Level>,
    pub questions: Vec<QuestionOut>,
    pub answers: BTreeMap<u64, String>,
    pub elapsed_seconds: u64,
}

impl From<&QuizSession> for QuizView {
    fn from(s: &QuizSession) -> Self {
        QuizView {
            session_id: s.id(),
            phase: s.phase(),
            level: s.level(),
            questions: s.questions().iter().map(to_out).collect(),
            answers: s.answers().iter().map(|(k, v)| (*k, v.clone())).collect(),
            elapsed_seconds: s.elapsed_seconds(),
        }
    }
}

//
// HTTP request/response DTOs
//

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionListOut {
    pub count: usize,
    pub questions: Vec<Question>,
}

#[derive(Debug, Deserialize)]
pub struct StartQuizIn {
    pub level: Level,
    pub count: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerIn {
    pub session_id: Uuid,
    pub question_id: u64,
    pub option: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerAck {
    pub question_id: u64,
    pub answered: usize,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitIn {
    pub session_id: Uuid,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOut {
    pub result: SessionResult,
    pub new_badge: Option<BadgeView>,
    pub history_length: usize,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateOut {
    pub questions: Vec<Question>,
    pub added_to_bank: usize,
    pub stored_total: usize,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOut {
    pub imported: usize,
    pub added_to_bank: usize,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: Option<ExportFormat>,
}

#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    pub filename: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedOut {
    pub deleted: HistoryRecord,
    pub remaining: usize,
}

#[derive(Debug, Serialize)]
pub struct OkOut {
    pub success: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyIn {
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct ConnectionTestOut {
    pub success: bool,
    pub reply: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LanguageBody {
    pub language: String,
}
