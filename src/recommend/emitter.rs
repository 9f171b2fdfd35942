//! Turns a resource selection into a persisted, active recommendation.

use super::selector::{percent, ResourceSelection};
use crate::db::{LearningDb, RecommendationUpsert, UpsertOutcome};
use crate::error::EngineError;
use crate::types::{Priority, Trigger};

/// Everything the emitter needs to write one recommendation.
#[derive(Debug, Clone)]
pub struct Emission<'a> {
    pub student_id: i64,
    pub course_id: Option<i64>,
    pub trigger: Trigger,
    pub concept: &'a str,
    pub mastery: f64,
    pub selection: &'a ResourceSelection,
    /// Another weak concept that lists this one as a prerequisite.
    pub weak_dependent: Option<&'a str>,
}

impl Emission<'_> {
    pub fn priority(&self) -> Priority {
        Priority::from_mastery(self.mastery)
    }

    /// Student-facing explanation of why this resource was recommended.
    pub fn reason(&self) -> String {
        let mut reason = if let Some(dependent) = self.weak_dependent {
            format!(
                "Strengthen your {} skills to better understand {}.",
                self.concept, dependent
            )
        } else {
            match self.trigger {
                Trigger::Assessment { .. } => format!(
                    "Based on your assessment, you need to review {}.",
                    self.concept
                ),
                Trigger::Quiz { .. } => {
                    let follow_up = match self.priority() {
                        Priority::High => "This concept needs immediate attention.",
                        _ => "Some review would be beneficial.",
                    };
                    format!(
                        "Your {} mastery is {}%. {}",
                        self.concept,
                        percent(self.mastery),
                        follow_up
                    )
                }
            }
        };
        if let Some(rationale) = self.selection.rationale() {
            reason.push(' ');
            reason.push_str(&rationale);
        }
        reason
    }
}

/// Write the recommendation, refreshing an existing active one for the same
/// (student, concept, resource) instead of inserting a duplicate.
pub fn emit(db: &LearningDb, emission: &Emission<'_>) -> Result<UpsertOutcome, EngineError> {
    let upsert = RecommendationUpsert {
        student_id: emission.student_id,
        course_id: emission.course_id,
        submission_id: emission.trigger.submission_id(),
        concept: emission.concept.to_string(),
        reason: emission.reason(),
        priority: emission.priority(),
        resource_id: emission.selection.resource_id(),
        selected_by: emission.selection.selected_by(),
    };
    let outcome =
        db.with_transaction(|tx| tx.upsert_active_recommendation(&upsert).map_err(EngineError::from))?;

    match outcome {
        UpsertOutcome::Inserted(id) => log::debug!(
            "Recommendation {} created: student {} concept {} resource {}",
            id,
            upsert.student_id,
            upsert.concept,
            upsert.resource_id
        ),
        UpsertOutcome::Updated(id) => log::debug!(
            "Recommendation {} refreshed: student {} concept {}",
            id,
            upsert.student_id,
            upsert.concept
        ),
    }
    Ok(outcome)
}
