use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::types::parse_column;
use super::{DbError, LearningDb, RecommendationUpsert, UpsertOutcome};
use crate::types::{Rating, Recommendation, RecommendationStatus};

const RECOMMENDATION_COLUMNS: &str = "id, student_id, course_id, submission_id, concept, reason, priority,
     resource_id, selected_by, status, user_rating, user_feedback, created_at, updated_at, completed_at";

impl LearningDb {
    /// Create an active recommendation, or refresh the existing active one for
    /// the same (student, concept, resource).
    ///
    /// Must run inside a transaction so the lookup and the write see the same state.
    pub fn upsert_active_recommendation(
        &self,
        rec: &RecommendationUpsert,
    ) -> Result<UpsertOutcome, DbError> {
        let now = Utc::now();
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM recommendations
                 WHERE student_id = ?1 AND concept = ?2 AND resource_id = ?3 AND status = 'active'",
                params![rec.student_id, rec.concept, rec.resource_id],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            self.conn.execute(
                "UPDATE recommendations
                 SET reason = ?1, priority = ?2, selected_by = ?3,
                     submission_id = COALESCE(?4, submission_id), updated_at = ?5
                 WHERE id = ?6",
                params![
                    rec.reason,
                    rec.priority.as_str(),
                    rec.selected_by.as_str(),
                    rec.submission_id,
                    now,
                    id,
                ],
            )?;
            return Ok(UpsertOutcome::Updated(id));
        }

        self.conn.execute(
            "INSERT INTO recommendations
                (student_id, course_id, submission_id, concept, reason, priority, resource_id,
                 selected_by, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'active', ?9, ?9)",
            params![
                rec.student_id,
                rec.course_id,
                rec.submission_id,
                rec.concept,
                rec.reason,
                rec.priority.as_str(),
                rec.resource_id,
                rec.selected_by.as_str(),
                now,
            ],
        )?;
        Ok(UpsertOutcome::Inserted(self.conn.last_insert_rowid()))
    }

    pub fn get_recommendation(&self, id: i64) -> Result<Option<Recommendation>, DbError> {
        let sql = format!("SELECT {} FROM recommendations WHERE id = ?1", RECOMMENDATION_COLUMNS);
        let rec = self
            .conn
            .query_row(&sql, params![id], Self::map_recommendation_row)
            .optional()?;
        Ok(rec)
    }

    /// Recommendations for a student, newest first, optionally filtered by status.
    pub fn list_recommendations(
        &self,
        student_id: i64,
        status: Option<RecommendationStatus>,
    ) -> Result<Vec<Recommendation>, DbError> {
        let sql = format!(
            "SELECT {} FROM recommendations
             WHERE student_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC, id DESC",
            RECOMMENDATION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![student_id, status.map(|s| s.as_str())],
            Self::map_recommendation_row,
        )?;

        let mut recs = Vec::new();
        for row in rows {
            recs.push(row?);
        }
        Ok(recs)
    }

    /// A student's recommendations raised by one quiz or assessment submission,
    /// in any status, newest first.
    pub fn list_recommendations_for_submission(
        &self,
        student_id: i64,
        submission_id: i64,
    ) -> Result<Vec<Recommendation>, DbError> {
        let sql = format!(
            "SELECT {} FROM recommendations
             WHERE student_id = ?1 AND submission_id = ?2
             ORDER BY created_at DESC, id DESC",
            RECOMMENDATION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![student_id, submission_id], Self::map_recommendation_row)?;

        let mut recs = Vec::new();
        for row in rows {
            recs.push(row?);
        }
        Ok(recs)
    }

    /// Move a recommendation to a new status. Returns false if the id is unknown.
    pub fn set_recommendation_status(
        &self,
        id: i64,
        status: RecommendationStatus,
    ) -> Result<bool, DbError> {
        let now = Utc::now();
        let completed_at = match status {
            RecommendationStatus::Completed => Some(now),
            _ => None,
        };
        let changed = self.conn.execute(
            "UPDATE recommendations
             SET status = ?1, updated_at = ?2, completed_at = COALESCE(?3, completed_at)
             WHERE id = ?4",
            params![status.as_str(), now, completed_at, id],
        )?;
        Ok(changed > 0)
    }

    /// Store a student rating and optional free-text feedback.
    pub fn set_recommendation_rating(
        &self,
        id: i64,
        rating: Rating,
        feedback: Option<&str>,
    ) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "UPDATE recommendations
             SET user_rating = ?1, user_feedback = COALESCE(?2, user_feedback), updated_at = ?3
             WHERE id = ?4",
            params![rating.value(), feedback, Utc::now(), id],
        )?;
        Ok(changed > 0)
    }

    fn map_recommendation_row(row: &Row<'_>) -> rusqlite::Result<Recommendation> {
        let rating: Option<i32> = row.get(10)?;
        let rating = match rating {
            Some(v) => Some(Rating::try_from(v).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    10,
                    rusqlite::types::Type::Integer,
                    e.to_string().into(),
                )
            })?),
            None => None,
        };
        Ok(Recommendation {
            id: row.get(0)?,
            student_id: row.get(1)?,
            course_id: row.get(2)?,
            submission_id: row.get(3)?,
            concept: row.get(4)?,
            reason: row.get(5)?,
            priority: parse_column(6, row.get(6)?)?,
            resource_id: row.get(7)?,
            selected_by: parse_column(8, row.get(8)?)?,
            status: parse_column(9, row.get(9)?)?,
            rating,
            feedback: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
            completed_at: row.get(14)?,
        })
    }
}
