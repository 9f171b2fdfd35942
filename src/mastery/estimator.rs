//! Per-concept mastery from a student's graded answer history.
//!
//! Each concept starts at the baseline and moves by a recency- and
//! difficulty-weighted step per answer, clamped to [0,1] after every step.
//! A final pass in topological order caps each concept at 1.2x its weakest
//! prerequisite.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::decay::{recency_weight, weeks_elapsed};
use super::graph::ConceptGraph;
use crate::types::{AnswerEvent, MasteryVector};

/// Mastery of a concept with no evidence.
pub const BASELINE_MASTERY: f64 = 0.5;
/// Step for a correct answer before weighting.
pub const CORRECT_GAIN: f64 = 0.15;
/// Step for an incorrect answer before weighting.
pub const INCORRECT_PENALTY: f64 = 0.20;
/// A concept may exceed its weakest prerequisite by at most this factor.
pub const PREREQUISITE_CAP_FACTOR: f64 = 1.2;

#[derive(Debug, Clone, Default)]
pub struct MasteryEstimator {
    graph: ConceptGraph,
}

impl MasteryEstimator {
    pub fn new(graph: ConceptGraph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &ConceptGraph {
        &self.graph
    }

    /// Signed mastery change contributed by one answer at time `now`.
    pub fn answer_delta(event: &AnswerEvent, now: DateTime<Utc>) -> f64 {
        let rw = recency_weight(weeks_elapsed(event.answered_at, now));
        let dw = event.difficulty.weight();
        if event.correct {
            CORRECT_GAIN * rw * dw
        } else {
            -INCORRECT_PENALTY * rw * dw
        }
    }

    /// Mastery for every graph concept plus every concept seen in `history`.
    ///
    /// `history` may be in any order; answers are applied chronologically.
    /// Concepts outside the graph have no prerequisites and are never capped.
    pub fn estimate(&self, history: &[AnswerEvent], now: DateTime<Utc>) -> MasteryVector {
        let mut scores: BTreeMap<String, f64> = self
            .graph
            .order()
            .iter()
            .map(|c| (c.clone(), BASELINE_MASTERY))
            .collect();

        let mut ordered: Vec<&AnswerEvent> = history.iter().collect();
        ordered.sort_by(|a, b| a.answered_at.cmp(&b.answered_at).then(a.id.cmp(&b.id)));

        for event in ordered {
            let score = scores
                .entry(event.concept.clone())
                .or_insert(BASELINE_MASTERY);
            *score = (*score + Self::answer_delta(event, now)).clamp(0.0, 1.0);
        }

        self.apply_prerequisite_caps(&mut scores);
        scores.into_iter().collect()
    }

    /// Cap in topological order so each cap sees already-capped prerequisites.
    fn apply_prerequisite_caps(&self, scores: &mut BTreeMap<String, f64>) {
        for concept in self.graph.order() {
            let weakest = self
                .graph
                .prerequisites(concept)
                .iter()
                .filter_map(|p| scores.get(p).copied())
                .min_by(f64::total_cmp);
            let Some(weakest) = weakest else {
                continue;
            };
            if let Some(score) = scores.get_mut(concept) {
                let cap = PREREQUISITE_CAP_FACTOR * weakest;
                if *score > cap {
                    log::debug!("Capping {} at {:.3} (weakest prerequisite {:.3})", concept, cap, weakest);
                    *score = cap;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use proptest::prelude::*;

    use super::*;
    use crate::types::{Difficulty, EventSource};

    fn answer(id: i64, concept: &str, difficulty: Difficulty, correct: bool, at: DateTime<Utc>) -> AnswerEvent {
        AnswerEvent {
            id,
            student_id: 1,
            course_id: None,
            submission_id: None,
            concept: concept.to_string(),
            subconcept: None,
            difficulty,
            correct,
            source: EventSource::Quiz,
            answered_at: at,
        }
    }

    #[test]
    fn test_no_history_is_baseline_everywhere() {
        let estimator = MasteryEstimator::default();
        let mastery = estimator.estimate(&[], Utc::now());
        assert_eq!(mastery.len(), 7);
        assert!(mastery.iter().all(|(_, m)| m == BASELINE_MASTERY));
    }

    #[test]
    fn test_week_old_incorrect_hard_answer() {
        let now = Utc::now();
        let estimator = MasteryEstimator::default();
        let history = vec![answer(1, "Loops", Difficulty::Hard, false, now - Duration::weeks(1))];
        let mastery = estimator.estimate(&history, now);

        // 0.5 - 0.20 * 0.9 * 1.2; Variables stays at 0.5, so the 0.6 cap does not bind
        let loops = mastery.get("Loops").unwrap();
        assert!((loops - 0.284).abs() < 1e-9, "got {}", loops);

        // Arrays depends on Loops: capped at 1.2 * 0.284
        let arrays = mastery.get("Arrays").unwrap();
        assert!((arrays - 1.2 * 0.284).abs() < 1e-9, "got {}", arrays);
    }

    #[test]
    fn test_mastery_is_capped_by_prerequisite() {
        let now = Utc::now();
        let estimator = MasteryEstimator::default();
        let mut history = Vec::new();
        for i in 0..5 {
            history.push(answer(i, "Functions", Difficulty::Hard, true, now));
        }
        for i in 5..8 {
            history.push(answer(i, "Variables", Difficulty::Medium, false, now));
        }
        let mastery = estimator.estimate(&history, now);

        // Variables floors at 0, so Functions is capped to 0 despite five hard hits
        assert_eq!(mastery.get("Variables"), Some(0.0));
        assert_eq!(mastery.get("Functions"), Some(0.0));
        // Caps propagate: Loops is still at baseline but capped by Variables too
        assert_eq!(mastery.get("Loops"), Some(0.0));
    }

    #[test]
    fn test_unknown_concept_is_tracked_uncapped() {
        let now = Utc::now();
        let estimator = MasteryEstimator::default();
        let history = vec![answer(1, "Recursion", Difficulty::Easy, true, now)];
        let mastery = estimator.estimate(&history, now);
        let recursion = mastery.get("Recursion").unwrap();
        assert!((recursion - (0.5 + 0.15 * 0.8)).abs() < 1e-9);
    }

    #[test]
    fn test_clamp_applies_per_step() {
        let now = Utc::now();
        let estimator = MasteryEstimator::default();
        // Five hard misses floor at 0, then one medium hit climbs from 0, not from -0.7
        let mut history: Vec<AnswerEvent> = (0..5)
            .map(|i| answer(i, "Variables", Difficulty::Hard, false, now - Duration::seconds(10 - i)))
            .collect();
        history.push(answer(9, "Variables", Difficulty::Medium, true, now));
        let mastery = estimator.estimate(&history, now);
        let variables = mastery.get("Variables").unwrap();
        assert!((variables - 0.15).abs() < 1e-6, "got {}", variables);
    }

    #[test]
    fn test_history_order_does_not_matter() {
        let now = Utc::now();
        let estimator = MasteryEstimator::default();
        let mut history: Vec<AnswerEvent> = (0..6)
            .map(|i| answer(i, "Loops", Difficulty::Medium, i % 2 == 0, now - Duration::days(6 - i)))
            .collect();
        let forward = estimator.estimate(&history, now);
        history.reverse();
        assert_eq!(estimator.estimate(&history, now), forward);
    }

    fn difficulty_strategy() -> impl Strategy<Value = Difficulty> {
        prop_oneof![
            Just(Difficulty::Easy),
            Just(Difficulty::Medium),
            Just(Difficulty::Hard)
        ]
    }

    fn concept_strategy() -> impl Strategy<Value = &'static str> {
        prop_oneof![
            Just("Variables"),
            Just("Functions"),
            Just("Loops"),
            Just("Arrays"),
            Just("Objects"),
            Just("Async"),
            Just("Closures"),
            Just("Recursion"),
        ]
    }

    fn history_strategy() -> impl Strategy<Value = Vec<(&'static str, Difficulty, bool, i64)>> {
        prop::collection::vec(
            (concept_strategy(), difficulty_strategy(), any::<bool>(), -10_000i64..2_000_000),
            0..60,
        )
    }

    fn build(raw: &[(&'static str, Difficulty, bool, i64)], now: DateTime<Utc>) -> Vec<AnswerEvent> {
        raw.iter()
            .enumerate()
            .map(|(i, (c, d, ok, age))| answer(i as i64, c, *d, *ok, now - Duration::seconds(*age)))
            .collect()
    }

    proptest! {
        #[test]
        fn prop_mastery_stays_in_unit_interval(raw in history_strategy()) {
            let now = Utc::now();
            let mastery = MasteryEstimator::default().estimate(&build(&raw, now), now);
            for (concept, m) in mastery.iter() {
                prop_assert!((0.0..=1.0).contains(&m), "{} = {}", concept, m);
            }
        }

        #[test]
        fn prop_prerequisite_cap_holds(raw in history_strategy()) {
            let now = Utc::now();
            let estimator = MasteryEstimator::default();
            let mastery = estimator.estimate(&build(&raw, now), now);
            for concept in estimator.graph().order() {
                let prereqs = estimator.graph().prerequisites(concept);
                if prereqs.is_empty() {
                    continue;
                }
                let weakest = prereqs
                    .iter()
                    .map(|p| mastery.get(p).unwrap())
                    .fold(f64::INFINITY, f64::min);
                prop_assert!(mastery.get(concept).unwrap() <= PREREQUISITE_CAP_FACTOR * weakest + 1e-12);
            }
        }

        #[test]
        fn prop_recent_correct_answer_counts_more(
            older in 1i64..5_000_000,
            gap in 1i64..5_000_000,
            difficulty in difficulty_strategy(),
        ) {
            let now = Utc::now();
            let recent = MasteryEstimator::answer_delta(
                &answer(1, "Variables", difficulty, true, now - Duration::seconds(older)),
                now,
            );
            let stale = MasteryEstimator::answer_delta(
                &answer(2, "Variables", difficulty, true, now - Duration::seconds(older + gap)),
                now,
            );
            prop_assert!(recent > stale);
            prop_assert!(stale > 0.0);
        }
    }
}
