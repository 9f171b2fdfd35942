// Answer intake service
// Validates graded events from quiz and assessment collaborators before they
// reach the mastery history.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::db::{LearningDb, NewAnswer, NewSubmission};
use crate::error::EngineError;
use crate::types::{AnswerEvent, Difficulty, EventSource};

fn require_student(student_id: i64) -> Result<(), EngineError> {
    if student_id <= 0 {
        return Err(EngineError::Validation(format!(
            "student id must be positive, got {}",
            student_id
        )));
    }
    Ok(())
}

fn require_concept(concept: &str) -> Result<String, EngineError> {
    let trimmed = concept.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation("concept must not be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

fn require_fraction(name: &str, value: f64) -> Result<(), EngineError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(EngineError::Validation(format!(
            "{} must be in [0,1], got {}",
            name, value
        )));
    }
    Ok(())
}

/// Record one graded quiz answer.
pub fn record_answer(
    db: &LearningDb,
    student_id: i64,
    concept: &str,
    subconcept: Option<&str>,
    difficulty: &str,
    correct: bool,
    answered_at: DateTime<Utc>,
) -> Result<AnswerEvent, EngineError> {
    require_student(student_id)?;
    let concept = require_concept(concept)?;
    let difficulty: Difficulty = difficulty.parse()?;
    let subconcept = subconcept
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let event = db.insert_answer(&NewAnswer {
        student_id,
        course_id: None,
        submission_id: None,
        concept,
        subconcept,
        difficulty,
        correct,
        source: EventSource::Quiz,
        answered_at,
    })?;
    Ok(event)
}

/// Record a scored submission for learning velocity.
pub fn record_submission(
    db: &LearningDb,
    student_id: i64,
    course_id: Option<i64>,
    kind: EventSource,
    score: f64,
    submitted_at: DateTime<Utc>,
) -> Result<i64, EngineError> {
    require_student(student_id)?;
    require_fraction("score", score)?;
    let id = db.insert_submission(&NewSubmission {
        student_id,
        course_id,
        kind,
        score,
        submitted_at,
    })?;
    Ok(id)
}

/// What an assessment grading produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentRecord {
    pub submission_id: i64,
    pub mean_score: f64,
    pub events: Vec<AnswerEvent>,
}

/// Record per-concept assessment scores.
///
/// Each concept becomes one medium-difficulty event, correct when its score
/// reaches the configured pass mark, and the mean score is stored as one
/// assessment submission. Everything is written atomically.
pub fn record_assessment_concept_scores(
    db: &LearningDb,
    config: &EngineConfig,
    student_id: i64,
    course_id: i64,
    concept_scores: &BTreeMap<String, f64>,
    graded_at: DateTime<Utc>,
) -> Result<AssessmentRecord, EngineError> {
    require_student(student_id)?;
    if concept_scores.is_empty() {
        return Err(EngineError::Validation(
            "assessment has no concept scores".to_string(),
        ));
    }
    let mut scores = Vec::with_capacity(concept_scores.len());
    for (concept, &score) in concept_scores {
        let concept = require_concept(concept)?;
        require_fraction(&format!("score for {}", concept), score)?;
        scores.push((concept, score));
    }
    let mean_score = (scores.iter().map(|(_, s)| s).sum::<f64>() / scores.len() as f64).clamp(0.0, 1.0);

    let record = db.with_transaction(|tx| {
        let submission_id = tx.insert_submission(&NewSubmission {
            student_id,
            course_id: Some(course_id),
            kind: EventSource::Assessment,
            score: mean_score,
            submitted_at: graded_at,
        })?;

        let mut events = Vec::with_capacity(scores.len());
        for (concept, score) in &scores {
            events.push(tx.insert_answer(&NewAnswer {
                student_id,
                course_id: Some(course_id),
                submission_id: Some(submission_id),
                concept: concept.clone(),
                subconcept: None,
                difficulty: Difficulty::Medium,
                correct: *score >= config.assessment_pass_mark,
                source: EventSource::Assessment,
                answered_at: graded_at,
            })?);
        }
        Ok::<_, EngineError>(AssessmentRecord {
            submission_id,
            mean_score,
            events,
        })
    })?;

    log::info!(
        "Assessment recorded for student {}: {} concepts, mean {:.2}",
        student_id,
        record.events.len(),
        record.mean_score
    );
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;

    #[test]
    fn test_record_answer_validates() {
        let db = test_db();
        let now = Utc::now();
        assert!(matches!(
            record_answer(&db, 1, "  ", None, "easy", true, now),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            record_answer(&db, 1, "Loops", None, "impossible", true, now),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            record_answer(&db, 0, "Loops", None, "easy", true, now),
            Err(EngineError::Validation(_))
        ));
        assert!(db.get_answer_history(1).unwrap().is_empty());
    }

    #[test]
    fn test_record_answer_stores_trimmed_event() {
        let db = test_db();
        let event = record_answer(&db, 1, " Loops ", Some("for-of"), "Hard", false, Utc::now()).unwrap();
        assert_eq!(event.concept, "Loops");
        assert_eq!(event.difficulty, Difficulty::Hard);
        assert_eq!(event.subconcept.as_deref(), Some("for-of"));
        assert_eq!(db.get_answer_history(1).unwrap(), vec![event]);
    }

    #[test]
    fn test_assessment_scores_become_events_and_submission() {
        let db = test_db();
        let mut scores = BTreeMap::new();
        scores.insert("Loops".to_string(), 0.4);
        scores.insert("Functions".to_string(), 0.8);
        scores.insert("Arrays".to_string(), 0.6);

        let record =
            record_assessment_concept_scores(&db, &EngineConfig::default(), 3, 1, &scores, Utc::now())
                .unwrap();
        assert!((record.mean_score - 0.6).abs() < 1e-9);

        let by_concept: BTreeMap<&str, bool> = record
            .events
            .iter()
            .map(|e| (e.concept.as_str(), e.correct))
            .collect();
        assert!(!by_concept["Loops"]);
        assert!(by_concept["Functions"]);
        // The pass mark is inclusive
        assert!(by_concept["Arrays"]);
        assert!(record.events.iter().all(|e| e.difficulty == Difficulty::Medium
            && e.source == EventSource::Assessment
            && e.submission_id == Some(record.submission_id)));

        let submissions = db.get_recent_submissions(3, 10).unwrap();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].kind, EventSource::Assessment);
    }

    #[test]
    fn test_bad_assessment_score_writes_nothing() {
        let db = test_db();
        let mut scores = BTreeMap::new();
        scores.insert("Loops".to_string(), 0.4);
        scores.insert("Objects".to_string(), 1.4);
        assert!(record_assessment_concept_scores(
            &db,
            &EngineConfig::default(),
            3,
            1,
            &scores,
            Utc::now()
        )
        .is_err());
        assert!(db.get_answer_history(3).unwrap().is_empty());
        assert!(db.get_recent_submissions(3, 10).unwrap().is_empty());
    }

    #[test]
    fn test_record_submission_range() {
        let db = test_db();
        assert!(record_submission(&db, 1, None, EventSource::Quiz, -0.1, Utc::now()).is_err());
        assert!(record_submission(&db, 1, None, EventSource::Quiz, 0.75, Utc::now()).is_ok());
    }
}
