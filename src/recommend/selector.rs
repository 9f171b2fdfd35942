//! The two ways a resource gets chosen for a weak concept.

use serde::Serialize;

use crate::bandit::ArmScore;
use crate::types::{ActionType, AdaptiveRule, SelectedBy};

/// A chosen resource and the evidence behind the choice.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "selectedBy", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ResourceSelection {
    /// An instructor rule fired; the bandit was not consulted.
    Rule {
        rule_id: i64,
        resource_id: i64,
        threshold: f64,
    },
    /// LinUCB picked the highest-scoring candidate.
    Bandit { resource_id: i64, score: ArmScore },
}

impl ResourceSelection {
    pub fn from_rule(rule: &AdaptiveRule) -> Self {
        ResourceSelection::Rule {
            rule_id: rule.id,
            resource_id: rule.resource_id,
            threshold: rule.threshold,
        }
    }

    pub fn from_score(score: ArmScore) -> Self {
        ResourceSelection::Bandit {
            resource_id: score.action_id,
            score,
        }
    }

    pub fn resource_id(&self) -> i64 {
        match self {
            ResourceSelection::Rule { resource_id, .. }
            | ResourceSelection::Bandit { resource_id, .. } => *resource_id,
        }
    }

    pub fn selected_by(&self) -> SelectedBy {
        match self {
            ResourceSelection::Rule { .. } => SelectedBy::Rule,
            ResourceSelection::Bandit { .. } => SelectedBy::Bandit,
        }
    }

    pub fn action_type(&self) -> ActionType {
        match self {
            ResourceSelection::Rule { .. } => ActionType::RuleRecommendation,
            ResourceSelection::Bandit { .. } => ActionType::BanditRecommendation,
        }
    }

    /// Selector-specific sentence appended to the recommendation reason.
    pub fn rationale(&self) -> Option<String> {
        match self {
            ResourceSelection::Rule { threshold, .. } => Some(format!(
                "Your instructor recommends this resource below {}% mastery.",
                percent(*threshold)
            )),
            ResourceSelection::Bandit { .. } => None,
        }
    }
}

/// Whole-number percentage, truncated like a score display.
pub(crate) fn percent(fraction: f64) -> i64 {
    (fraction * 100.0 + 1e-9).floor() as i64
}
