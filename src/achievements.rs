//! Badge catalog and the per-submission unlock rules.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::Level;
use crate::error::QuizError;
use crate::session::SessionResult;

/// Quizzes at least this long can earn `QuickLearner`.
pub const QUICK_LEARNER_MIN_QUESTIONS: usize = 10;
/// ...when finished in under this many seconds.
pub const QUICK_LEARNER_MAX_SECONDS: u64 = 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BadgeId {
  FirstQuiz,
  PerfectScore,
  #[serde(alias = "n5master")]
  LevelStarter,
  QuickLearner,
}

impl BadgeId {
  /// Evaluation order; the first newly satisfied badge wins.
  pub const ALL: [BadgeId; 4] = [BadgeId::FirstQuiz, BadgeId::PerfectScore, BadgeId::LevelStarter, BadgeId::QuickLearner];

  pub fn as_str(&self) -> &'static str {
    match self {
      BadgeId::FirstQuiz => "firstQuiz",
      BadgeId::PerfectScore => "perfectScore",
      BadgeId::LevelStarter => "levelStarter",
      BadgeId::QuickLearner => "quickLearner",
    }
  }
}

impl fmt::Display for BadgeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for BadgeId {
  type Err = QuizError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if s == "n5master" {
      return Ok(BadgeId::LevelStarter);
    }
    BadgeId::ALL
      .iter()
      .copied()
      .find(|b| b.as_str() == s)
      .ok_or_else(|| QuizError::validation(format!("unknown badge '{s}'")))
  }
}

struct BadgeText {
  name: &'static str,
  description: &'static str,
}

struct BadgeDef {
  icon: &'static str,
  zh: BadgeText,
  en: BadgeText,
}

fn definition(id: BadgeId) -> BadgeDef {
  match id {
    BadgeId::FirstQuiz => BadgeDef {
      icon: "🔰",
      zh: BadgeText { name: "初次挑戰", description: "完成你的第一次測驗" },
      en: BadgeText { name: "First Challenge", description: "Complete your first quiz" },
    },
    BadgeId::PerfectScore => BadgeDef {
      icon: "🏆",
      zh: BadgeText { name: "完美主義者", description: "在測驗中獲得100分" },
      en: BadgeText { name: "Perfectionist", description: "Get a perfect score of 100" },
    },
    BadgeId::LevelStarter => BadgeDef {
      icon: "🐣",
      zh: BadgeText { name: "入門者", description: "完成一次指定級別的測驗" },
      en: BadgeText { name: "Level Starter", description: "Complete a quiz at the tracked level" },
    },
    BadgeId::QuickLearner => BadgeDef {
      icon: "⚡️",
      zh: BadgeText { name: "速讀者", description: "在1分鐘內完成10題以上的測驗" },
      en: BadgeText { name: "Quick Learner", description: "Finish a 10+ question quiz in under 1 minute" },
    },
  }
}

/// Badge as shown to the player, localized.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeView {
  pub id: BadgeId,
  pub icon: &'static str,
  pub name: String,
  pub description: String,
  pub unlocked: bool,
}

pub fn badge_view(id: BadgeId, language: &str, unlocked: bool, tracked_level: Level) -> BadgeView {
  let def = definition(id);
  let text = if language.starts_with("en") { &def.en } else { &def.zh };
  let name = match id {
    BadgeId::LevelStarter if language.starts_with("en") => format!("{tracked_level} Starter"),
    BadgeId::LevelStarter => format!("{tracked_level}入門"),
    _ => text.name.to_string(),
  };
  BadgeView { id, icon: def.icon, name, description: text.description.to_string(), unlocked }
}

/// The full catalog in evaluation order, flagged with the unlocked set.
pub fn catalog(language: &str, unlocked: &[BadgeId], tracked_level: Level) -> Vec<BadgeView> {
  BadgeId::ALL
    .iter()
    .map(|&id| badge_view(id, language, unlocked.contains(&id), tracked_level))
    .collect()
}

/// Pick at most one newly earned badge. `history_len` is the history length
/// after this result has been appended.
pub fn evaluate(
  result: &SessionResult,
  history_len: usize,
  unlocked: &[BadgeId],
  tracked_level: Level,
) -> Option<BadgeId> {
  let earned = BadgeId::ALL.into_iter().filter(|id| !unlocked.contains(id)).find(|id| match id {
    BadgeId::FirstQuiz => history_len == 1,
    BadgeId::PerfectScore => result.score >= 100.0,
    BadgeId::LevelStarter => result.level == tracked_level,
    BadgeId::QuickLearner => {
      result.total >= QUICK_LEARNER_MIN_QUESTIONS && result.elapsed_seconds < QUICK_LEARNER_MAX_SECONDS
    }
  });
  debug!(target: "quiz", badge = ?earned, "Achievements evaluated");
  earned
}
