use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{
    ActionType, Difficulty, EventSource, MasteryVector, Priority, ResourceLevel, ResourceType,
    SelectedBy,
};

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    /// A stored value could not be decoded (bad enum text, malformed JSON).
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// A validated answer ready to insert into `answer_events`.
#[derive(Debug, Clone)]
pub struct NewAnswer {
    pub student_id: i64,
    pub course_id: Option<i64>,
    pub submission_id: Option<i64>,
    pub concept: String,
    pub subconcept: Option<String>,
    pub difficulty: Difficulty,
    pub correct: bool,
    pub source: EventSource,
    pub answered_at: DateTime<Utc>,
}

/// A submission score ready to insert into `submissions`.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub student_id: i64,
    pub course_id: Option<i64>,
    pub kind: EventSource,
    pub score: f64,
    pub submitted_at: DateTime<Utc>,
}

/// Instructor-side resource seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewResource {
    pub title: String,
    pub url: String,
    pub resource_type: ResourceType,
    pub level: ResourceLevel,
    #[serde(default)]
    pub estimated_time: Option<String>,
    pub concepts: Vec<String>,
}

/// Instructor-side rule seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRule {
    pub course_id: i64,
    pub concept: String,
    pub threshold: f64,
    pub resource_id: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Values written when a recommendation is emitted or refreshed.
#[derive(Debug, Clone)]
pub struct RecommendationUpsert {
    pub student_id: i64,
    pub course_id: Option<i64>,
    pub submission_id: Option<i64>,
    pub concept: String,
    pub reason: String,
    pub priority: Priority,
    pub resource_id: i64,
    pub selected_by: SelectedBy,
}

/// Whether an upsert created a row or refreshed an existing active one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(i64),
    Updated(i64),
}

impl UpsertOutcome {
    pub fn id(&self) -> i64 {
        match self {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Updated(id) => *id,
        }
    }
}

/// An experience-buffer row before it has an id.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub student_id: i64,
    pub batch_id: String,
    pub recommendation_id: Option<i64>,
    pub concept: String,
    pub state: MasteryVector,
    pub action_type: ActionType,
    pub action_id: i64,
}

/// Outcome fields filled in after the fact by quiz/assessment collaborators.
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeUpdate {
    #[serde(default)]
    pub immediate_outcome: Option<f64>,
    #[serde(default)]
    pub delayed_outcome: Option<f64>,
    #[serde(default)]
    pub engagement_score: Option<f64>,
    #[serde(default)]
    pub next_state: Option<MasteryVector>,
}

/// Parse a stored enum column, reporting the column on failure.
pub(crate) fn parse_column<T: std::str::FromStr>(
    idx: usize,
    raw: String,
) -> Result<T, rusqlite::Error> {
    raw.parse::<T>().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unexpected value '{}'", raw).into(),
        )
    })
}

/// Decode a JSON text column.
pub(crate) fn json_column<T: serde::de::DeserializeOwned>(
    idx: usize,
    raw: &str,
) -> Result<T, rusqlite::Error> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
