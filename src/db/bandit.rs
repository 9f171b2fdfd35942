use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::types::json_column;
use super::{DbError, LearningDb};
use crate::bandit::linalg::SquareMatrix;
use crate::bandit::ArmState;
use crate::types::ActionId;

/// An arm row together with its optimistic-concurrency version.
#[derive(Debug, Clone)]
pub struct StoredArm {
    pub state: ArmState,
    pub version: i64,
}

fn encode(state: &ArmState) -> Result<(String, String), DbError> {
    let a = serde_json::to_string(state.a().as_slice())
        .map_err(|e| DbError::Corrupt(format!("matrix_a: {}", e)))?;
    let b = serde_json::to_string(state.b())
        .map_err(|e| DbError::Corrupt(format!("vector_b: {}", e)))?;
    Ok((a, b))
}

impl LearningDb {
    /// Load an arm's parameters, or `None` if the arm has never been updated.
    pub fn get_arm_state(&self, action_id: ActionId) -> Result<Option<StoredArm>, DbError> {
        let row = self
            .conn
            .query_row(
                "SELECT dimension, matrix_a, vector_b, observation_count, version
                 FROM bandit_params WHERE resource_id = ?1",
                params![action_id],
                |row| {
                    let dimension: i64 = row.get(0)?;
                    let a: String = row.get(1)?;
                    let b: String = row.get(2)?;
                    Ok((
                        dimension as usize,
                        json_column::<Vec<f64>>(1, &a)?,
                        json_column::<Vec<f64>>(2, &b)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((dimension, a, b, count, version)) = row else {
            return Ok(None);
        };
        let matrix = SquareMatrix::from_flat(dimension, a)
            .map_err(|e| DbError::Corrupt(format!("arm {}: {}", action_id, e)))?;
        let state = ArmState::from_parts(matrix, b, count.max(0) as u64)
            .map_err(|e| DbError::Corrupt(format!("arm {}: {}", action_id, e)))?;
        Ok(Some(StoredArm { state, version }))
    }

    /// Create the first row for an arm at version 1. Returns false if another
    /// writer created it first.
    pub fn insert_arm_state(&self, action_id: ActionId, state: &ArmState) -> Result<bool, DbError> {
        let (a, b) = encode(state)?;
        let now = Utc::now();
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO bandit_params
                (resource_id, dimension, matrix_a, vector_b, observation_count, version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
            params![
                action_id,
                state.dimension() as i64,
                a,
                b,
                state.observation_count() as i64,
                now,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Replace an arm's parameters only if its version is still `expected_version`.
    /// Returns false when another writer got there first.
    pub fn compare_and_swap_arm_state(
        &self,
        action_id: ActionId,
        expected_version: i64,
        state: &ArmState,
    ) -> Result<bool, DbError> {
        let (a, b) = encode(state)?;
        let changed = self.conn.execute(
            "UPDATE bandit_params
             SET dimension = ?1, matrix_a = ?2, vector_b = ?3, observation_count = ?4,
                 version = version + 1, updated_at = ?5
             WHERE resource_id = ?6 AND version = ?7",
            params![
                state.dimension() as i64,
                a,
                b,
                state.observation_count() as i64,
                Utc::now(),
                action_id,
                expected_version,
            ],
        )?;
        Ok(changed > 0)
    }
}
