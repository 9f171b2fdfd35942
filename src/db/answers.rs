use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::types::parse_column;
use super::{DbError, LearningDb, NewAnswer, NewSubmission};
use crate::types::{AnswerEvent, Submission};

impl LearningDb {
    // =========================================================================
    // Answer events
    // =========================================================================

    /// Append a graded answer. Returns the stored event.
    pub fn insert_answer(&self, answer: &NewAnswer) -> Result<AnswerEvent, DbError> {
        self.conn.execute(
            "INSERT INTO answer_events
                (student_id, course_id, submission_id, concept, subconcept, difficulty, correct, source, answered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                answer.student_id,
                answer.course_id,
                answer.submission_id,
                answer.concept,
                answer.subconcept,
                answer.difficulty.as_str(),
                answer.correct,
                answer.source.as_str(),
                answer.answered_at,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(AnswerEvent {
            id,
            student_id: answer.student_id,
            course_id: answer.course_id,
            submission_id: answer.submission_id,
            concept: answer.concept.clone(),
            subconcept: answer.subconcept.clone(),
            difficulty: answer.difficulty,
            correct: answer.correct,
            source: answer.source,
            answered_at: answer.answered_at,
        })
    }

    /// Full answer history for a student, oldest first.
    pub fn get_answer_history(&self, student_id: i64) -> Result<Vec<AnswerEvent>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, student_id, course_id, submission_id, concept, subconcept,
                    difficulty, correct, source, answered_at
             FROM answer_events
             WHERE student_id = ?1
             ORDER BY answered_at ASC, id ASC",
        )?;

        let rows = stmt.query_map(params![student_id], Self::map_answer_row)?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    fn map_answer_row(row: &Row<'_>) -> rusqlite::Result<AnswerEvent> {
        Ok(AnswerEvent {
            id: row.get(0)?,
            student_id: row.get(1)?,
            course_id: row.get(2)?,
            submission_id: row.get(3)?,
            concept: row.get(4)?,
            subconcept: row.get(5)?,
            difficulty: parse_column(6, row.get(6)?)?,
            correct: row.get(7)?,
            source: parse_column(8, row.get(8)?)?,
            answered_at: row.get(9)?,
        })
    }

    // =========================================================================
    // Submissions
    // =========================================================================

    /// Record a scored submission. Returns the new id.
    pub fn insert_submission(&self, submission: &NewSubmission) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO submissions (student_id, course_id, kind, score, submitted_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                submission.student_id,
                submission.course_id,
                submission.kind.as_str(),
                submission.score,
                submission.submitted_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// The `limit` most recent submissions of a student, returned oldest first.
    pub fn get_recent_submissions(
        &self,
        student_id: i64,
        limit: usize,
    ) -> Result<Vec<Submission>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, student_id, course_id, kind, score, submitted_at
             FROM submissions
             WHERE student_id = ?1
             ORDER BY submitted_at DESC, id DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![student_id, limit as i64], |row| {
            Ok(Submission {
                id: row.get(0)?,
                student_id: row.get(1)?,
                course_id: row.get(2)?,
                kind: parse_column(3, row.get(3)?)?,
                score: row.get(4)?,
                submitted_at: row.get::<_, DateTime<Utc>>(5)?,
            })
        })?;

        let mut submissions = Vec::new();
        for row in rows {
            submissions.push(row?);
        }
        submissions.reverse();
        Ok(submissions)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use crate::db::test_utils::test_db;
    use super::*;
    use crate::types::{Difficulty, EventSource};

    fn answer(student_id: i64, concept: &str, correct: bool, at: DateTime<Utc>) -> NewAnswer {
        NewAnswer {
            student_id,
            course_id: Some(1),
            submission_id: None,
            concept: concept.to_string(),
            subconcept: None,
            difficulty: Difficulty::Medium,
            correct,
            source: EventSource::Quiz,
            answered_at: at,
        }
    }

    #[test]
    fn test_history_is_chronological_and_per_student() {
        let db = test_db();
        let now = Utc::now();
        db.insert_answer(&answer(1, "Loops", true, now)).unwrap();
        db.insert_answer(&answer(1, "Loops", false, now - Duration::days(3)))
            .unwrap();
        db.insert_answer(&answer(2, "Loops", true, now)).unwrap();

        let history = db.get_answer_history(1).unwrap();
        assert_eq!(history.len(), 2);
        assert!(!history[0].correct, "older answer should come first");
        assert!(history[1].correct);
        assert_eq!(history[0].difficulty, Difficulty::Medium);
    }

    #[test]
    fn test_recent_submissions_window() {
        let db = test_db();
        let start = Utc::now() - Duration::days(10);
        for i in 0..5 {
            db.insert_submission(&NewSubmission {
                student_id: 1,
                course_id: None,
                kind: EventSource::Quiz,
                score: i as f64 / 10.0,
                submitted_at: start + Duration::days(i),
            })
            .unwrap();
        }

        let recent = db.get_recent_submissions(1, 3).unwrap();
        let scores: Vec<f64> = recent.iter().map(|s| s.score).collect();
        assert_eq!(scores, vec![0.2, 0.3, 0.4]);
    }
}
