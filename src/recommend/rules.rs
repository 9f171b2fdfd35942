//! Instructor rule override.
//!
//! A rule matches a weak concept when it is active, names the concept, and the
//! student's mastery is strictly below its threshold. When several match, the
//! strictest (lowest threshold) wins, then the oldest rule.

use crate::types::AdaptiveRule;

/// The rule that overrides bandit selection for `concept`, if any.
pub fn select_rule<'a>(
    rules: &'a [AdaptiveRule],
    concept: &str,
    mastery: f64,
) -> Option<&'a AdaptiveRule> {
    rules
        .iter()
        .filter(|r| r.is_active && r.concept == concept && mastery < r.threshold)
        .min_by(|a, b| {
            a.threshold
                .total_cmp(&b.threshold)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    fn rule(id: i64, concept: &str, threshold: f64, resource_id: i64, age_days: i64) -> AdaptiveRule {
        AdaptiveRule {
            id,
            course_id: 1,
            concept: concept.to_string(),
            threshold,
            resource_id,
            is_active: true,
            created_at: Utc::now() - Duration::days(age_days),
        }
    }

    #[test]
    fn test_lowest_matching_threshold_wins() {
        let rules = vec![rule(1, "Loops", 0.7, 10, 5), rule(2, "Loops", 0.5, 20, 1)];
        assert_eq!(select_rule(&rules, "Loops", 0.3).unwrap().id, 2);
        // 0.55 only clears the 0.7 rule
        assert_eq!(select_rule(&rules, "Loops", 0.55).unwrap().id, 1);
    }

    #[test]
    fn test_equal_thresholds_prefer_oldest() {
        let rules = vec![rule(7, "Loops", 0.6, 10, 1), rule(8, "Loops", 0.6, 20, 9)];
        assert_eq!(select_rule(&rules, "Loops", 0.2).unwrap().id, 8);
    }

    #[test]
    fn test_threshold_is_strict() {
        let rules = vec![rule(1, "Loops", 0.4, 10, 1)];
        assert!(select_rule(&rules, "Loops", 0.4).is_none());
    }

    #[test]
    fn test_inactive_and_other_concepts_ignored() {
        let mut inactive = rule(1, "Loops", 0.9, 10, 1);
        inactive.is_active = false;
        let rules = vec![inactive, rule(2, "Arrays", 0.9, 20, 1)];
        assert!(select_rule(&rules, "Loops", 0.1).is_none());
    }
}
