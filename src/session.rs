//! One quiz attempt: configure, sample, collect answers, time, score.
//!
//! Phases run `Idle -> Configured -> InProgress -> Submitted`. `Submitted` is
//! terminal; a new attempt needs a fresh `QuizSession`.

use std::collections::HashMap;

use chrono::NaiveDate;
use rand::Rng;
use serde::{Serialize, Serializer};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::bank::QuestionBank;
use crate::domain::{HistoryRecord, Level, Question, QuestionType};
use crate::error::{QuizError, QuizResult};
use crate::util::round1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Idle,
    Configured,
    InProgress,
    Submitted,
}

/// What the player ended up choosing for one question.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    Chosen(String),
    Unanswered,
}

impl Selection {
    pub const UNANSWERED: &'static str = "unanswered";

    pub fn as_str(&self) -> &str {
        match self {
            Selection::Chosen(s) => s,
            Selection::Unanswered => Self::UNANSWERED,
        }
    }
}

impl Serialize for Selection {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryScore {
    #[serde(rename = "type")]
    pub kind: QuestionType,
    pub correct: usize,
    pub total: usize,
    pub percentage: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WrongAnswer {
    pub question_id: u64,
    pub question: String,
    pub your_answer: Selection,
    pub correct_answer: String,
    pub explanation: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResult {
    pub session_id: Uuid,
    pub level: Level,
    pub score: f64,
    pub correct_count: usize,
    pub total: usize,
    pub elapsed_seconds: u64,
    pub categories: Vec<CategoryScore>,
    pub wrong_answers: Vec<WrongAnswer>,
}

impl SessionResult {
    pub fn to_history(&self, date: NaiveDate) -> HistoryRecord {
        HistoryRecord { date, level: self.level, score: self.score, elapsed_seconds: self.elapsed_seconds }
    }
}

#[derive(Debug)]
pub struct QuizSession {
    id: Uuid,
    phase: Phase,
    level: Option<Level>,
    requested: usize,
    questions: Vec<Question>,
    answers: HashMap<u64, String>,
    elapsed_seconds: u64,
}

impl Default for QuizSession {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: Phase::Idle,
            level: None,
            requested: 0,
            questions: Vec::new(),
            answers: HashMap::new(),
            elapsed_seconds: 0,
        }
    }
}

impl QuizSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn level(&self) -> Option<Level> {
        self.level
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn answers(&self) -> &HashMap<u64, String> {
        &self.answers
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    fn expect_phase(&self, allowed: &[Phase], action: &str) -> QuizResult<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(QuizError::InvalidState(format!("cannot {action} while session is {:?}", self.phase)))
        }
    }

    /// Choose level and question count. May be repeated until the quiz starts.
    pub fn configure(&mut self, level: Level, requested: i64) -> QuizResult<()> {
        self.expect_phase(&[Phase::Idle, Phase::Configured], "configure")?;
        if requested <= 0 {
            return Err(QuizError::validation(format!("question count must be positive, got {requested}")));
        }
        self.level = Some(level);
        self.requested = requested as usize;
        self.phase = Phase::Configured;
        debug!(target: "quiz", session = %self.id, %level, requested, "Session configured");
        Ok(())
    }

    /// Sample the questions. A short pool leaves the session `Configured`.
    #[instrument(level = "info", skip_all, fields(session = %self.id))]
    pub fn start<R: Rng + ?Sized>(&mut self, bank: &QuestionBank, rng: &mut R) -> QuizResult<&[Question]> {
        self.expect_phase(&[Phase::Configured], "start")?;
        let level = self.level.ok_or_else(|| QuizError::InvalidState("session has no level".into()))?;

        let picked = bank.sample(level, self.requested, None, rng);
        if picked.len() < self.requested {
            return Err(QuizError::InsufficientQuestions {
                level,
                available: picked.len(),
                requested: self.requested,
            });
        }

        self.questions = picked;
        self.answers.clear();
        self.elapsed_seconds = 0;
        self.phase = Phase::InProgress;
        info!(target: "quiz", %level, count = self.questions.len(), "Quiz started");
        Ok(&self.questions)
    }

    /// Advance the clock by one second. No-op outside `InProgress`.
    pub fn tick(&mut self) -> bool {
        if self.phase != Phase::InProgress {
            return false;
        }
        self.elapsed_seconds += 1;
        true
    }

    /// Record (or overwrite) the chosen option for a question.
    pub fn select(&mut self, question_id: u64, option: &str) -> QuizResult<()> {
        self.expect_phase(&[Phase::InProgress], "answer")?;
        let q = self
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| QuizError::validation(format!("question {question_id} is not part of this quiz")))?;
        if !q.has_option(option) {
            return Err(QuizError::validation(format!("'{option}' is not an option of question {question_id}")));
        }
        self.answers.insert(question_id, option.to_string());
        Ok(())
    }

    #[instrument(level = "info", skip_all, fields(session = %self.id))]
    pub fn submit(&mut self) -> QuizResult<SessionResult> {
        self.expect_phase(&[Phase::InProgress], "submit")?;
        let level = self.level.ok_or_else(|| QuizError::InvalidState("session has no level".into()))?;

        let total = self.questions.len();
        let mut correct_count = 0usize;
        let mut categories: Vec<CategoryScore> = Vec::new();
        let mut wrong_answers = Vec::new();

        for q in &self.questions {
            let selection = match self.answers.get(&q.id) {
                Some(s) => Selection::Chosen(s.clone()),
                None => Selection::Unanswered,
            };
            let correct = matches!(&selection, Selection::Chosen(s) if q.is_correct(s));

            let idx = match categories.iter().position(|c| c.kind == q.kind) {
                Some(i) => i,
                None => {
                    categories.push(CategoryScore { kind: q.kind, correct: 0, total: 0, percentage: 0 });
                    categories.len() - 1
                }
            };
            categories[idx].total += 1;

            if correct {
                correct_count += 1;
                categories[idx].correct += 1;
            } else {
                wrong_answers.push(WrongAnswer {
                    question_id: q.id,
                    question: q.question.clone(),
                    your_answer: selection,
                    correct_answer: q.answer.clone(),
                    explanation: q.explanation.clone(),
                });
            }
        }
        for c in &mut categories {
            c.percentage = (c.correct as f64 / c.total as f64 * 100.0).round() as u32;
        }

        let score = if total == 0 { 0.0 } else { round1(correct_count as f64 / total as f64 * 100.0) };
        self.phase = Phase::Submitted;
        info!(target: "quiz", %level, score, correct_count, total, elapsed = self.elapsed_seconds, "Quiz submitted");

        Ok(SessionResult {
            session_id: self.id,
            level,
            score,
            correct_count,
            total,
            elapsed_seconds: self.elapsed_seconds,
            categories,
            wrong_answers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tests::question;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn bank(n: u64) -> QuestionBank {
        QuestionBank::new((1..=n).map(|i| question(i, Level::N5, &format!("q{i}"), "right")).collect())
    }

    fn started(n: u64, count: i64) -> QuizSession {
        let mut s = QuizSession::new();
        s.configure(Level::N5, count).unwrap();
        s.start(&bank(n), &mut StdRng::seed_from_u64(5)).unwrap();
        s
    }

    #[test]
    fn scenario_b_four_right_one_blank() {
        let mut s = started(5, 5);
        let ids: Vec<u64> = s.questions().iter().map(|q| q.id).collect();
        for id in &ids[..4] {
            s.select(*id, "right").unwrap();
        }
        let r = s.submit().unwrap();
        assert_eq!(r.score, 80.0);
        assert_eq!(r.correct_count, 4);
        assert_eq!(r.total, 5);
        assert_eq!(r.wrong_answers.len(), 1);
        assert_eq!(r.wrong_answers[0].your_answer, Selection::Unanswered);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["wrongAnswers"][0]["yourAnswer"], "unanswered");
        assert_eq!(json["categories"][0]["percentage"], 80);
        assert_eq!(s.phase(), Phase::Submitted);
    }

    #[test]
    fn shortfall_keeps_session_configured() {
        let mut s = QuizSession::new();
        s.configure(Level::N5, 10).unwrap();
        let err = s.start(&bank(8), &mut StdRng::seed_from_u64(1)).unwrap_err();
        assert!(err.to_string().contains("N5: 8 available"));
        assert_eq!(s.phase(), Phase::Configured);
    }

    #[test]
    fn non_positive_count_is_rejected() {
        let mut s = QuizSession::new();
        assert!(matches!(s.configure(Level::N4, 0), Err(QuizError::Validation(_))));
        assert!(matches!(s.configure(Level::N4, -3), Err(QuizError::Validation(_))));
        assert_eq!(s.phase(), Phase::Idle);
    }

    #[test]
    fn operations_out_of_phase_are_invalid_state() {
        let mut s = QuizSession::new();
        assert!(matches!(s.submit(), Err(QuizError::InvalidState(_))));
        assert!(matches!(s.select(1, "right"), Err(QuizError::InvalidState(_))));
        assert!(!s.tick());

        let mut s = started(3, 3);
        s.submit().unwrap();
        assert!(matches!(s.submit(), Err(QuizError::InvalidState(_))));
        assert!(matches!(s.configure(Level::N5, 3), Err(QuizError::InvalidState(_))));
        assert!(!s.tick());
    }

    #[test]
    fn selection_is_validated_and_overwritable() {
        let mut s = started(3, 3);
        let id = s.questions()[0].id;
        assert!(matches!(s.select(999, "right"), Err(QuizError::Validation(_))));
        assert!(matches!(s.select(id, "nope"), Err(QuizError::Validation(_))));
        s.select(id, "right-b").unwrap();
        s.select(id, "right").unwrap();
        assert_eq!(s.answers()[&id], "right");
    }

    #[test]
    fn ticks_accumulate_only_in_progress() {
        let mut s = started(3, 3);
        for _ in 0..4 {
            assert!(s.tick());
        }
        let r = s.submit().unwrap();
        assert_eq!(r.elapsed_seconds, 4);
        assert_eq!(r.to_history(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()).elapsed_seconds, 4);
    }

    #[test]
    fn categories_follow_first_appearance() {
        let mut qs = vec![question(1, Level::N3, "k", "a"), question(2, Level::N3, "g", "a"), question(3, Level::N3, "k2", "a")];
        qs[0].kind = QuestionType::Kanji;
        qs[1].kind = QuestionType::Grammar;
        qs[2].kind = QuestionType::Kanji;
        let mut s = QuizSession::new();
        s.configure(Level::N3, 3).unwrap();
        s.start(&QuestionBank::new(qs), &mut StdRng::seed_from_u64(9)).unwrap();
        let first_kind = s.questions()[0].kind;
        let ids: Vec<u64> = s.questions().iter().map(|q| q.id).collect();
        for id in ids {
            s.select(id, "a").unwrap();
        }
        let r = s.submit().unwrap();
        assert_eq!(r.score, 100.0);
        assert_eq!(r.categories[0].kind, first_kind);
        let kanji = r.categories.iter().find(|c| c.kind == QuestionType::Kanji).unwrap();
        assert_eq!((kanji.correct, kanji.total, kanji.percentage), (2, 2, 100));
    }
}
