//! In-memory question catalog: filters, statistics and randomized sampling.
//!
//! The bank starts from the static seeds plus whatever the store holds, and only
//! ever grows: generation and imports append, nothing edits or deletes in place.

use std::collections::{BTreeMap, HashSet};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Level, Question, QuestionType};

/// Optional conjunction of filters for listing questions.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct QuestionFilter {
    #[serde(default)]
    pub level: Option<Level>,
    #[serde(default, rename = "type")]
    pub kind: Option<QuestionType>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub difficulty: Option<u8>,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BankStats {
    pub total: usize,
    pub by_level: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub by_topic: BTreeMap<String, usize>,
    pub by_difficulty: BTreeMap<u8, usize>,
}

#[derive(Clone, Debug, Default)]
pub struct QuestionBank {
    questions: Vec<Question>,
}

/// Levels whose questions are eligible when a quiz is requested at `requested`.
/// `Beginner` draws from the Beginner, N5 and N4 tiers.
pub fn pool_levels(requested: Level) -> &'static [Level] {
    match requested {
        Level::Beginner => &[Level::Beginner, Level::N5, Level::N4],
        Level::N5 => &[Level::N5],
        Level::N4 => &[Level::N4],
        Level::N3 => &[Level::N3],
        Level::N2 => &[Level::N2],
        Level::N1 => &[Level::N1],
    }
}

impl QuestionBank {
    pub fn new(questions: Vec<Question>) -> Self {
        let mut bank = Self::default();
        bank.append(questions);
        bank
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn by_level(&self, level: Level) -> Vec<&Question> {
        self.questions.iter().filter(|q| q.level == level).collect()
    }

    pub fn by_type(&self, kind: QuestionType) -> Vec<&Question> {
        self.questions.iter().filter(|q| q.kind == kind).collect()
    }

    pub fn by_topic(&self, topic: &str) -> Vec<&Question> {
        self.questions.iter().filter(|q| q.topic == topic).collect()
    }

    pub fn by_difficulty(&self, difficulty: u8) -> Vec<&Question> {
        self.questions.iter().filter(|q| q.difficulty == difficulty).collect()
    }

    pub fn filter(&self, f: &QuestionFilter) -> Vec<&Question> {
        self.questions
            .iter()
            .filter(|q| f.level.map_or(true, |l| q.level == l))
            .filter(|q| f.kind.map_or(true, |k| q.kind == k))
            .filter(|q| f.topic.as_deref().map_or(true, |t| q.topic == t))
            .filter(|q| f.difficulty.map_or(true, |d| q.difficulty == d))
            .collect()
    }

    fn pool(&self, level: Level, kind: Option<QuestionType>) -> Vec<&Question> {
        let levels = pool_levels(level);
        self.questions
            .iter()
            .filter(|q| levels.contains(&q.level))
            .filter(|q| kind.map_or(true, |k| q.kind == k))
            .collect()
    }

    pub fn pool_size(&self, level: Level, kind: Option<QuestionType>) -> usize {
        self.pool(level, kind).len()
    }

    /// Draw up to `count` distinct questions from the pool for `level`
    /// (optionally restricted to `kind`), uniformly shuffled.
    /// Returns fewer than `count` when the pool is too small; never fails.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        level: Level,
        count: usize,
        kind: Option<QuestionType>,
        rng: &mut R,
    ) -> Vec<Question> {
        let mut pool = self.pool(level, kind);
        let available = pool.len();
        let (picked, _) = pool.partial_shuffle(rng, count);
        debug!(target: "quiz", %level, count, available, picked = picked.len(), "Sampled questions");
        picked.iter().map(|q| (*q).clone()).collect()
    }

    pub fn stats(&self) -> BankStats {
        let mut s = BankStats { total: self.questions.len(), ..Default::default() };
        for q in &self.questions {
            *s.by_level.entry(q.level.to_string()).or_default() += 1;
            *s.by_type.entry(q.kind.to_string()).or_default() += 1;
            *s.by_topic.entry(q.topic.clone()).or_default() += 1;
            *s.by_difficulty.entry(q.difficulty).or_default() += 1;
        }
        s
    }

    /// Append questions to the catalog. Entries whose (question, answer) pair is
    /// already present are skipped; colliding ids are replaced with fresh ones.
    /// Returns how many entries were added.
    pub fn append(&mut self, incoming: impl IntoIterator<Item = Question>) -> usize {
        let mut keys: HashSet<(String, String)> = self
            .questions
            .iter()
            .map(|q| (q.question.clone(), q.answer.clone()))
            .collect();
        let mut ids: HashSet<u64> = self.questions.iter().map(|q| q.id).collect();
        let mut next_id = ids.iter().max().map_or(1, |m| m.saturating_add(1));

        let before = self.questions.len();
        for mut q in incoming {
            if !keys.insert((q.question.clone(), q.answer.clone())) {
                continue;
            }
            if ids.contains(&q.id) {
                q.id = free_id(&ids, next_id);
            }
            ids.insert(q.id);
            next_id = next_id.max(q.id.saturating_add(1));
            self.questions.push(q);
        }
        self.questions.len() - before
    }
}

/// First id at or after `from` that is not taken, wrapping past `u64::MAX`.
fn free_id(taken: &HashSet<u64>, from: u64) -> u64 {
    let mut id = from;
    while taken.contains(&id) {
        id = id.wrapping_add(1);
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tests::question;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn bank_with(n5: usize, n4: usize, beginner: usize) -> QuestionBank {
        let mut qs = Vec::new();
        let mut id = 1;
        for (level, n) in [(Level::N5, n5), (Level::N4, n4), (Level::Beginner, beginner)] {
            for i in 0..n {
                qs.push(question(id, level, &format!("{level} q{i}"), "a"));
                id += 1;
            }
        }
        QuestionBank::new(qs)
    }

    #[test]
    fn scenario_a_short_pool_returns_what_is_available() {
        let bank = bank_with(8, 0, 0);
        let mut rng = StdRng::seed_from_u64(7);
        let got = bank.sample(Level::N5, 10, None, &mut rng);
        assert_eq!(got.len(), 8);
    }

    #[test]
    fn sample_is_bounded_and_exact_when_pool_is_large() {
        let bank = bank_with(20, 5, 0);
        let mut rng = StdRng::seed_from_u64(1);
        for count in [0, 1, 5, 20, 30] {
            let got = bank.sample(Level::N5, count, None, &mut rng);
            assert!(got.len() <= count);
            if count <= 20 {
                assert_eq!(got.len(), count);
            }
            assert!(got.iter().all(|q| q.level == Level::N5));
            let ids: HashSet<u64> = got.iter().map(|q| q.id).collect();
            assert_eq!(ids.len(), got.len(), "sampling must not repeat questions");
        }
    }

    #[test]
    fn beginner_pool_spans_beginner_n5_and_n4() {
        let bank = bank_with(3, 2, 1);
        assert_eq!(bank.pool_size(Level::Beginner, None), 6);
        let mut rng = StdRng::seed_from_u64(3);
        let got = bank.sample(Level::Beginner, 6, None, &mut rng);
        assert_eq!(got.len(), 6);
    }

    #[test]
    fn type_filter_narrows_pool() {
        let mut bank = bank_with(4, 0, 0);
        let mut g = question(100, Level::N5, "grammar", "a");
        g.kind = QuestionType::Grammar;
        bank.append([g]);
        let mut rng = StdRng::seed_from_u64(3);
        let got = bank.sample(Level::N5, 5, Some(QuestionType::Grammar), &mut rng);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].kind, QuestionType::Grammar);
    }

    #[test]
    fn shuffle_varies_order() {
        let bank = bank_with(10, 0, 0);
        let mut rng = StdRng::seed_from_u64(11);
        let first: Vec<u64> = bank.sample(Level::N5, 10, None, &mut rng).iter().map(|q| q.id).collect();
        let differs = (0..20).any(|_| {
            let next: Vec<u64> = bank.sample(Level::N5, 10, None, &mut rng).iter().map(|q| q.id).collect();
            next != first
        });
        assert!(differs);
    }

    #[test]
    fn filters_preserve_catalog_order() {
        let bank = bank_with(3, 2, 0);
        let ids: Vec<u64> = bank.by_level(Level::N4).iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![4, 5]);
        assert!(bank.by_topic("nothing").is_empty());
        assert_eq!(bank.by_difficulty(3).len(), 5);
        assert_eq!(bank.by_type(QuestionType::Vocabulary).len(), 5);

        let f = QuestionFilter { level: Some(Level::N5), difficulty: Some(3), ..Default::default() };
        assert_eq!(bank.filter(&f).len(), 3);
    }

    #[test]
    fn append_skips_duplicates_and_reassigns_colliding_ids() {
        let mut bank = bank_with(2, 0, 0);
        let dup = question(50, Level::N5, "N5 q0", "a");
        let clash = question(1, Level::N3, "fresh", "a");
        assert_eq!(bank.append([dup, clash]), 1);
        let added = bank.by_level(Level::N3);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].question, "fresh");
        assert_eq!(added[0].id, 3);
    }

    #[test]
    fn append_with_largest_id_does_not_overflow() {
        let mut bank = bank_with(1, 0, 0);
        let mut huge = question(2, Level::N2, "huge id", "a");
        huge.id = u64::MAX;
        let mut clash = question(2, Level::N1, "collides with huge", "a");
        clash.id = u64::MAX;
        assert_eq!(bank.append([huge, clash]), 2);
        assert_eq!(bank.len(), 3);
        assert_eq!(bank.by_level(Level::N2)[0].id, u64::MAX);
        let reassigned = bank.by_level(Level::N1)[0].id;
        assert!(reassigned != u64::MAX && reassigned != 1);
    }

    #[test]
    fn stats_group_by_every_dimension() {
        let bank = bank_with(2, 1, 0);
        let s = bank.stats();
        assert_eq!(s.total, 3);
        assert_eq!(s.by_level["N5"], 2);
        assert_eq!(s.by_type["Vocabulary"], 3);
        assert_eq!(s.by_topic["general"], 3);
        assert_eq!(s.by_difficulty[&3], 3);
    }
}
