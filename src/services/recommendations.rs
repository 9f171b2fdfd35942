// Recommendation lifecycle service
// Student feedback and status transitions. None of these touch bandit state:
// arms learn only from measured rewards, not from ratings.

use crate::db::{LearningDb, OutcomeUpdate};
use crate::error::EngineError;
use crate::recommend::experience;
use crate::types::{LearningLogEntry, Rating, Recommendation, RecommendationStatus};

fn load(db: &LearningDb, id: i64) -> Result<Recommendation, EngineError> {
    db.get_recommendation(id)?
        .ok_or_else(|| EngineError::NotFound(format!("recommendation {}", id)))
}

/// Store a +1/-1 rating and optional free-text feedback.
pub fn record_feedback(
    db: &LearningDb,
    recommendation_id: i64,
    rating: i32,
    feedback: Option<&str>,
) -> Result<Recommendation, EngineError> {
    let rating = Rating::try_from(rating)?;
    let feedback = feedback.map(str::trim).filter(|f| !f.is_empty());
    if !db.set_recommendation_rating(recommendation_id, rating, feedback)? {
        return Err(EngineError::NotFound(format!(
            "recommendation {}",
            recommendation_id
        )));
    }
    log::debug!("Recommendation {} rated {}", recommendation_id, rating.value());
    load(db, recommendation_id)
}

/// Move an active recommendation to `target`. Finished recommendations stay put.
fn transition(
    db: &LearningDb,
    id: i64,
    target: RecommendationStatus,
) -> Result<Recommendation, EngineError> {
    let current = load(db, id)?;
    if current.status != RecommendationStatus::Active {
        return Err(EngineError::Validation(format!(
            "recommendation {} is already {}",
            id,
            current.status.as_str()
        )));
    }
    db.set_recommendation_status(id, target)?;
    load(db, id)
}

pub fn complete_recommendation(db: &LearningDb, id: i64) -> Result<Recommendation, EngineError> {
    transition(db, id, RecommendationStatus::Completed)
}

pub fn dismiss_recommendation(db: &LearningDb, id: i64) -> Result<Recommendation, EngineError> {
    transition(db, id, RecommendationStatus::Dismissed)
}

/// A student's recommendations, newest first. `status` filters when given.
pub fn list_recommendations(
    db: &LearningDb,
    student_id: i64,
    status: Option<&str>,
) -> Result<Vec<Recommendation>, EngineError> {
    let status = status.map(str::parse::<RecommendationStatus>).transpose()?;
    Ok(db.list_recommendations(student_id, status)?)
}

/// Recommendations a student got from one submission.
pub fn list_recommendations_by_submission(
    db: &LearningDb,
    student_id: i64,
    submission_id: i64,
) -> Result<Vec<Recommendation>, EngineError> {
    Ok(db.list_recommendations_for_submission(student_id, submission_id)?)
}

/// Attach measured outcomes to an experience log entry.
pub fn update_outcome(
    db: &LearningDb,
    log_id: i64,
    update: &OutcomeUpdate,
) -> Result<LearningLogEntry, EngineError> {
    experience::update_outcome(db, log_id, update)
}
