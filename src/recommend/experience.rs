//! Experience buffer: one (state, action) row per emitted recommendation,
//! with outcomes filled in later.
//!
//! Logging sits on the recommendation path but must never fail it, so write
//! errors are counted and logged rather than returned.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{LearningDb, NewLogEntry, OutcomeUpdate};
use crate::error::EngineError;
use crate::types::{ActionId, ActionType, LearningLogEntry, MasteryVector};

#[derive(Debug, Default)]
pub struct ExperienceLogger {
    failures: AtomicU64,
}

impl ExperienceLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Returns its id, or `None` if the write failed.
    pub fn log(&self, db: &LearningDb, entry: &NewLogEntry) -> Option<i64> {
        match db.insert_learning_log(entry) {
            Ok(id) => Some(id),
            Err(e) => {
                let total = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                log::warn!(
                    "Experience log write failed for student {} concept {} ({} failures so far): {}",
                    entry.student_id,
                    entry.concept,
                    total,
                    e
                );
                None
            }
        }
    }

    /// Number of entries dropped since this logger was created.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Fill outcome fields of a logged entry once they are measured.
pub fn update_outcome(
    db: &LearningDb,
    log_id: i64,
    update: &OutcomeUpdate,
) -> Result<LearningLogEntry, EngineError> {
    for (name, value) in [
        ("immediateOutcome", update.immediate_outcome),
        ("delayedOutcome", update.delayed_outcome),
    ] {
        if let Some(v) = value {
            if !v.is_finite() {
                return Err(EngineError::Validation(format!("{} must be finite, got {}", name, v)));
            }
        }
    }
    if let Some(engagement) = update.engagement_score {
        if !(0.0..=1.0).contains(&engagement) {
            return Err(EngineError::Validation(format!(
                "engagementScore must be in [0,1], got {}",
                engagement
            )));
        }
    }

    if !db.update_learning_log_outcome(log_id, update)? {
        return Err(EngineError::NotFound(format!("learning log {}", log_id)));
    }
    db.get_learning_log(log_id)?
        .ok_or_else(|| EngineError::NotFound(format!("learning log {}", log_id)))
}

/// Action half of an experience tuple.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub id: ActionId,
}

/// Reward signals of an experience tuple; unmeasured ones are null.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceReward {
    pub immediate: Option<f64>,
    pub delayed: Option<f64>,
    pub engagement: Option<f64>,
}

/// `(state, action, reward, next_state, timestamp)` for offline training.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceTuple {
    pub log_id: i64,
    pub student_id: i64,
    pub concept: String,
    pub state: MasteryVector,
    pub action: ExperienceAction,
    pub reward: ExperienceReward,
    pub next_state: Option<MasteryVector>,
    pub timestamp: DateTime<Utc>,
}

impl From<LearningLogEntry> for ExperienceTuple {
    fn from(entry: LearningLogEntry) -> Self {
        ExperienceTuple {
            log_id: entry.id,
            student_id: entry.student_id,
            concept: entry.concept,
            state: entry.state,
            action: ExperienceAction {
                action_type: entry.action_type,
                id: entry.action_id,
            },
            reward: ExperienceReward {
                immediate: entry.immediate_outcome,
                delayed: entry.delayed_outcome,
                engagement: entry.engagement_score,
            },
            next_state: entry.next_state,
            timestamp: entry.created_at,
        }
    }
}

/// Experience tuples oldest first, for one student or everyone.
pub fn export_experience(
    db: &LearningDb,
    student_id: Option<i64>,
) -> Result<Vec<ExperienceTuple>, EngineError> {
    let entries = db.list_learning_logs(student_id)?;
    Ok(entries.into_iter().map(ExperienceTuple::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;

    fn entry(student_id: i64) -> NewLogEntry {
        let mut state = MasteryVector::new();
        state.set("Loops", 0.3);
        NewLogEntry {
            student_id,
            batch_id: "b1".to_string(),
            recommendation_id: None,
            concept: "Loops".to_string(),
            state,
            action_type: ActionType::BanditRecommendation,
            action_id: 5,
        }
    }

    #[test]
    fn test_failed_write_is_counted_not_raised() {
        let db = test_db();
        db.conn_ref().execute_batch("DROP TABLE learning_logs").unwrap();

        let logger = ExperienceLogger::new();
        assert!(logger.log(&db, &entry(1)).is_none());
        assert!(logger.log(&db, &entry(1)).is_none());
        assert_eq!(logger.failure_count(), 2);
    }

    #[test]
    fn test_outcome_then_export() {
        let db = test_db();
        let logger = ExperienceLogger::new();
        let id = logger.log(&db, &entry(1)).unwrap();
        logger.log(&db, &entry(2)).unwrap();

        let mut next = MasteryVector::new();
        next.set("Loops", 0.55);
        let updated = update_outcome(
            &db,
            id,
            &OutcomeUpdate {
                immediate_outcome: Some(0.25),
                next_state: Some(next.clone()),
                ..OutcomeUpdate::default()
            },
        )
        .unwrap();
        assert_eq!(updated.immediate_outcome, Some(0.25));

        let tuples = export_experience(&db, Some(1)).unwrap();
        assert_eq!(tuples.len(), 1);
        assert_eq!(tuples[0].reward.immediate, Some(0.25));
        assert_eq!(tuples[0].next_state, Some(next));

        let json = serde_json::to_value(&tuples[0]).unwrap();
        assert_eq!(json["action"]["type"], "bandit_recommendation");
        assert_eq!(json["action"]["id"], 5);
        assert!(json["reward"]["delayed"].is_null());

        assert_eq!(export_experience(&db, None).unwrap().len(), 2);
    }

    #[test]
    fn test_outcome_validation_and_missing_log() {
        let db = test_db();
        let bad = OutcomeUpdate {
            engagement_score: Some(1.5),
            ..OutcomeUpdate::default()
        };
        assert!(matches!(update_outcome(&db, 1, &bad), Err(EngineError::Validation(_))));
        assert!(matches!(
            update_outcome(&db, 99, &OutcomeUpdate::default()),
            Err(EngineError::NotFound(_))
        ));
    }
}
