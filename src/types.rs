//! Domain types shared by the mastery, bandit and recommendation layers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Identifier of a bandit arm. Arms are candidate resources, so this is a resource id.
pub type ActionId = i64;

/// Question difficulty of a graded answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// Multiplier applied to every mastery delta for an answer of this difficulty.
    pub fn weight(&self) -> f64 {
        match self {
            Difficulty::Easy => 0.8,
            Difficulty::Medium => 1.0,
            Difficulty::Hard => 1.2,
        }
    }
}

impl FromStr for Difficulty {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(EngineError::Validation(format!("unknown difficulty '{}'", other))),
        }
    }
}

/// Where a graded event came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Quiz,
    Assessment,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Quiz => "quiz",
            EventSource::Assessment => "assessment",
        }
    }
}

impl FromStr for EventSource {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quiz" => Ok(EventSource::Quiz),
            "assessment" => Ok(EventSource::Assessment),
            other => Err(EngineError::Validation(format!("unknown event source '{}'", other))),
        }
    }
}

/// A single graded answer. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerEvent {
    pub id: i64,
    pub student_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<i64>,
    pub concept: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subconcept: Option<String>,
    pub difficulty: Difficulty,
    pub correct: bool,
    pub source: EventSource,
    pub answered_at: DateTime<Utc>,
}

/// A scored quiz or assessment submission, input to learning velocity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: i64,
    pub student_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<i64>,
    pub kind: EventSource,
    /// Fraction of the maximum score, in [0,1]
    pub score: f64,
    pub submitted_at: DateTime<Utc>,
}

/// Per-concept mastery in [0,1] for one student.
///
/// Keys are ordered by name for stable serialization; the bandit feature order
/// comes from the concept graph, not from this map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MasteryVector {
    scores: BTreeMap<String, f64>,
}

impl MasteryVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, concept: &str) -> Option<f64> {
        self.scores.get(concept).copied()
    }

    pub fn set(&mut self, concept: impl Into<String>, score: f64) {
        self.scores.insert(concept.into(), score.clamp(0.0, 1.0));
    }

    pub fn contains(&self, concept: &str) -> bool {
        self.scores.contains_key(concept)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.scores.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Concepts strictly below `threshold`, weakest first (ties by name).
    pub fn weak_concepts(&self, threshold: f64) -> Vec<WeakConcept> {
        let mut weak: Vec<WeakConcept> = self
            .scores
            .iter()
            .filter(|(_, &m)| m < threshold)
            .map(|(c, &m)| WeakConcept {
                concept: c.clone(),
                mastery: m,
            })
            .collect();
        weak.sort_by(|a, b| {
            a.mastery
                .total_cmp(&b.mastery)
                .then_with(|| a.concept.cmp(&b.concept))
        });
        weak
    }
}

impl FromIterator<(String, f64)> for MasteryVector {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut v = MasteryVector::new();
        for (c, s) in iter {
            v.set(c, s);
        }
        v
    }
}

/// A concept below the weakness threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeakConcept {
    pub concept: String,
    pub mastery: f64,
}

/// Recommendation priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// high below 0.4, medium below 0.6, low otherwise.
    pub fn from_mastery(mastery: f64) -> Self {
        if mastery < 0.4 {
            Priority::High
        } else if mastery < 0.6 {
            Priority::Medium
        } else {
            Priority::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl FromStr for Priority {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(EngineError::Validation(format!("unknown priority '{}'", other))),
        }
    }
}

/// Recommendation lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationStatus {
    Active,
    Completed,
    Dismissed,
}

impl RecommendationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationStatus::Active => "active",
            RecommendationStatus::Completed => "completed",
            RecommendationStatus::Dismissed => "dismissed",
        }
    }
}

impl FromStr for RecommendationStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(RecommendationStatus::Active),
            "completed" => Ok(RecommendationStatus::Completed),
            "dismissed" => Ok(RecommendationStatus::Dismissed),
            other => Err(EngineError::Validation(format!("unknown status '{}'", other))),
        }
    }
}

/// Student rating of a recommendation (+1 helpful, -1 not helpful)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rating {
    Helpful,
    NotHelpful,
}

impl Rating {
    pub fn value(&self) -> i32 {
        match self {
            Rating::Helpful => 1,
            Rating::NotHelpful => -1,
        }
    }
}

impl TryFrom<i32> for Rating {
    type Error = EngineError;

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(Rating::Helpful),
            -1 => Ok(Rating::NotHelpful),
            other => Err(EngineError::Validation(format!(
                "rating must be +1 or -1, got {}",
                other
            ))),
        }
    }
}

impl Serialize for Rating {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.value())
    }
}

impl<'de> Deserialize<'de> for Rating {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = i32::deserialize(deserializer)?;
        Rating::try_from(v).map_err(serde::de::Error::custom)
    }
}

/// Which selector produced a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectedBy {
    Rule,
    Bandit,
}

impl SelectedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectedBy::Rule => "rule",
            SelectedBy::Bandit => "bandit",
        }
    }
}

impl FromStr for SelectedBy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rule" => Ok(SelectedBy::Rule),
            "bandit" => Ok(SelectedBy::Bandit),
            other => Err(EngineError::Validation(format!("unknown selector '{}'", other))),
        }
    }
}

/// A persisted recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub id: i64,
    pub student_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<i64>,
    pub concept: String,
    pub reason: String,
    pub priority: Priority,
    pub resource_id: i64,
    pub selected_by: SelectedBy,
    pub status: RecommendationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Instructor-authored threshold rule. Read-only to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveRule {
    pub id: i64,
    pub course_id: i64,
    pub concept: String,
    /// Mastery threshold in [0,1]
    pub threshold: f64,
    pub resource_id: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Kind of learning material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Article,
    Video,
    Practice,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Article => "article",
            ResourceType::Video => "video",
            ResourceType::Practice => "practice",
        }
    }
}

impl FromStr for ResourceType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "article" => Ok(ResourceType::Article),
            "video" => Ok(ResourceType::Video),
            "practice" => Ok(ResourceType::Practice),
            other => Err(EngineError::Validation(format!("unknown resource type '{}'", other))),
        }
    }
}

/// Target level of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl ResourceLevel {
    /// Level to serve a student at `mastery`: beginner below 0.3,
    /// intermediate below 0.6, advanced otherwise.
    pub fn for_mastery(mastery: f64) -> Self {
        if mastery < 0.3 {
            ResourceLevel::Beginner
        } else if mastery < 0.6 {
            ResourceLevel::Intermediate
        } else {
            ResourceLevel::Advanced
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceLevel::Beginner => "beginner",
            ResourceLevel::Intermediate => "intermediate",
            ResourceLevel::Advanced => "advanced",
        }
    }
}

impl FromStr for ResourceLevel {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(ResourceLevel::Beginner),
            "intermediate" => Ok(ResourceLevel::Intermediate),
            "advanced" => Ok(ResourceLevel::Advanced),
            other => Err(EngineError::Validation(format!("unknown resource level '{}'", other))),
        }
    }
}

/// A recommendable resource. Each resource is one bandit arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub resource_type: ResourceType,
    pub level: ResourceLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<String>,
    pub concepts: Vec<String>,
}

/// What kind of action a learning log entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    RuleRecommendation,
    BanditRecommendation,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::RuleRecommendation => "rule_recommendation",
            ActionType::BanditRecommendation => "bandit_recommendation",
        }
    }
}

impl FromStr for ActionType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rule_recommendation" => Ok(ActionType::RuleRecommendation),
            "bandit_recommendation" => Ok(ActionType::BanditRecommendation),
            other => Err(EngineError::Validation(format!("unknown action type '{}'", other))),
        }
    }
}

/// One row of the experience buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningLogEntry {
    pub id: i64,
    pub student_id: i64,
    /// Groups every entry written by one `generate_recommendations` call
    pub batch_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation_id: Option<i64>,
    pub concept: String,
    pub state: MasteryVector,
    pub action_type: ActionType,
    pub action_id: ActionId,
    pub immediate_outcome: Option<f64>,
    pub delayed_outcome: Option<f64>,
    pub engagement_score: Option<f64>,
    pub next_state: Option<MasteryVector>,
    pub created_at: DateTime<Utc>,
    pub outcome_measured_at: Option<DateTime<Utc>>,
}

/// What triggered a recommendation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Trigger {
    Quiz { submission_id: Option<i64> },
    Assessment { submission_id: Option<i64> },
}

impl Trigger {
    pub fn submission_id(&self) -> Option<i64> {
        match self {
            Trigger::Quiz { submission_id } | Trigger::Assessment { submission_id } => {
                *submission_id
            }
        }
    }

    pub fn source(&self) -> EventSource {
        match self {
            Trigger::Quiz { .. } => EventSource::Quiz,
            Trigger::Assessment { .. } => EventSource::Assessment,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source().as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difficulty_parse_rejects_unknown() {
        assert_eq!("Hard".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert!(matches!(
            "extreme".parse::<Difficulty>(),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_priority_bands() {
        assert_eq!(Priority::from_mastery(0.39), Priority::High);
        assert_eq!(Priority::from_mastery(0.4), Priority::Medium);
        assert_eq!(Priority::from_mastery(0.59), Priority::Medium);
        assert_eq!(Priority::from_mastery(0.6), Priority::Low);
    }

    #[test]
    fn test_resource_level_bands() {
        assert_eq!(ResourceLevel::for_mastery(0.29), ResourceLevel::Beginner);
        assert_eq!(ResourceLevel::for_mastery(0.3), ResourceLevel::Intermediate);
        assert_eq!(ResourceLevel::for_mastery(0.59), ResourceLevel::Intermediate);
        assert_eq!(ResourceLevel::for_mastery(0.6), ResourceLevel::Advanced);
    }

    #[test]
    fn test_rating_only_accepts_plus_minus_one() {
        assert_eq!(Rating::try_from(1).unwrap(), Rating::Helpful);
        assert_eq!(Rating::try_from(-1).unwrap(), Rating::NotHelpful);
        assert!(Rating::try_from(0).is_err());
        let parsed: Result<Rating, _> = serde_json::from_str("2");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_weak_concepts_weakest_first() {
        let v: MasteryVector = vec![
            ("Loops".to_string(), 0.42),
            ("Variables".to_string(), 0.9),
            ("Arrays".to_string(), 0.3),
            ("Async".to_string(), 0.42),
        ]
        .into_iter()
        .collect();
        let weak = v.weak_concepts(0.6);
        let names: Vec<&str> = weak.iter().map(|w| w.concept.as_str()).collect();
        assert_eq!(names, vec!["Arrays", "Async", "Loops"]);
    }

    #[test]
    fn test_mastery_vector_serializes_as_map() {
        let mut v = MasteryVector::new();
        v.set("Loops", 0.25);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"Loops":0.25}"#);
        let back: MasteryVector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_trigger_tagged_serialization() {
        let t = Trigger::Assessment { submission_id: Some(4) };
        let json = serde_json::to_value(t).unwrap();
        assert_eq!(json["kind"], "assessment");
        assert_eq!(json["submissionId"], 4);
    }
}
