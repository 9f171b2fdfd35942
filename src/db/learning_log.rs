use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::types::{json_column, parse_column};
use super::{DbError, LearningDb, NewLogEntry, OutcomeUpdate};
use crate::types::{LearningLogEntry, MasteryVector};

const LOG_COLUMNS: &str = "id, student_id, batch_id, recommendation_id, concept, state, action_type,
     action_id, immediate_outcome, delayed_outcome, engagement_score, next_state, created_at,
     outcome_measured_at";

impl LearningDb {
    /// Append an experience-buffer row. Returns the new id.
    pub fn insert_learning_log(&self, entry: &NewLogEntry) -> Result<i64, DbError> {
        let state = serde_json::to_string(&entry.state)
            .map_err(|e| DbError::Corrupt(format!("state snapshot: {}", e)))?;
        self.conn.execute(
            "INSERT INTO learning_logs
                (student_id, batch_id, recommendation_id, concept, state, action_type, action_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.student_id,
                entry.batch_id,
                entry.recommendation_id,
                entry.concept,
                state,
                entry.action_type.as_str(),
                entry.action_id,
                Utc::now(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_learning_log(&self, id: i64) -> Result<Option<LearningLogEntry>, DbError> {
        let sql = format!("SELECT {} FROM learning_logs WHERE id = ?1", LOG_COLUMNS);
        let entry = self
            .conn
            .query_row(&sql, params![id], Self::map_log_row)
            .optional()?;
        Ok(entry)
    }

    /// Fill outcome fields of an entry. Fields left `None` keep their stored value.
    /// Returns false if the id is unknown.
    pub fn update_learning_log_outcome(
        &self,
        id: i64,
        update: &OutcomeUpdate,
    ) -> Result<bool, DbError> {
        let next_state = match &update.next_state {
            Some(state) => Some(
                serde_json::to_string(state)
                    .map_err(|e| DbError::Corrupt(format!("next state: {}", e)))?,
            ),
            None => None,
        };
        let changed = self.conn.execute(
            "UPDATE learning_logs
             SET immediate_outcome = COALESCE(?1, immediate_outcome),
                 delayed_outcome = COALESCE(?2, delayed_outcome),
                 engagement_score = COALESCE(?3, engagement_score),
                 next_state = COALESCE(?4, next_state),
                 outcome_measured_at = ?5
             WHERE id = ?6",
            params![
                update.immediate_outcome,
                update.delayed_outcome,
                update.engagement_score,
                next_state,
                Utc::now(),
                id,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Experience rows oldest first, for one student or everyone.
    pub fn list_learning_logs(
        &self,
        student_id: Option<i64>,
    ) -> Result<Vec<LearningLogEntry>, DbError> {
        let sql = format!(
            "SELECT {} FROM learning_logs
             WHERE (?1 IS NULL OR student_id = ?1)
             ORDER BY created_at ASC, id ASC",
            LOG_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![student_id], Self::map_log_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    fn map_log_row(row: &Row<'_>) -> rusqlite::Result<LearningLogEntry> {
        let state: String = row.get(5)?;
        let next_state: Option<String> = row.get(11)?;
        let next_state = match next_state {
            Some(raw) => Some(json_column::<MasteryVector>(11, &raw)?),
            None => None,
        };
        Ok(LearningLogEntry {
            id: row.get(0)?,
            student_id: row.get(1)?,
            batch_id: row.get(2)?,
            recommendation_id: row.get(3)?,
            concept: row.get(4)?,
            state: json_column(5, &state)?,
            action_type: parse_column(6, row.get(6)?)?,
            action_id: row.get(7)?,
            immediate_outcome: row.get(8)?,
            delayed_outcome: row.get(9)?,
            engagement_score: row.get(10)?,
            next_state,
            created_at: row.get(12)?,
            outcome_measured_at: row.get(13)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;
    use crate::types::ActionType;

    fn entry(student_id: i64) -> NewLogEntry {
        let mut state = MasteryVector::new();
        state.set("Loops", 0.42);
        state.set("Variables", 0.5);
        NewLogEntry {
            student_id,
            batch_id: "batch-1".to_string(),
            recommendation_id: Some(3),
            concept: "Loops".to_string(),
            state,
            action_type: ActionType::BanditRecommendation,
            action_id: 11,
        }
    }

    #[test]
    fn test_insert_and_read_back_snapshot() {
        let db = test_db();
        let id = db.insert_learning_log(&entry(1)).unwrap();
        let stored = db.get_learning_log(id).unwrap().unwrap();
        assert_eq!(stored.state.get("Loops"), Some(0.42));
        assert_eq!(stored.action_type, ActionType::BanditRecommendation);
        assert!(stored.immediate_outcome.is_none());
        assert!(stored.outcome_measured_at.is_none());
    }

    #[test]
    fn test_outcome_update_is_partial() {
        let db = test_db();
        let id = db.insert_learning_log(&entry(1)).unwrap();

        db.update_learning_log_outcome(
            id,
            &OutcomeUpdate {
                immediate_outcome: Some(0.2),
                ..OutcomeUpdate::default()
            },
        )
        .unwrap();
        db.update_learning_log_outcome(
            id,
            &OutcomeUpdate {
                engagement_score: Some(0.9),
                ..OutcomeUpdate::default()
            },
        )
        .unwrap();

        let stored = db.get_learning_log(id).unwrap().unwrap();
        assert_eq!(stored.immediate_outcome, Some(0.2));
        assert_eq!(stored.engagement_score, Some(0.9));
        assert!(stored.delayed_outcome.is_none());
        assert!(stored.outcome_measured_at.is_some());
    }

    #[test]
    fn test_list_filters_by_student() {
        let db = test_db();
        db.insert_learning_log(&entry(1)).unwrap();
        db.insert_learning_log(&entry(2)).unwrap();
        db.insert_learning_log(&entry(1)).unwrap();

        assert_eq!(db.list_learning_logs(Some(1)).unwrap().len(), 2);
        assert_eq!(db.list_learning_logs(None).unwrap().len(), 3);
    }
}
