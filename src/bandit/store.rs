//! Keyed arm-state stores.
//!
//! Scoring reads a snapshot of each candidate arm; only the rank-1 update
//! needs exclusive access, and only to the one arm it touches. Updates to
//! different arms never wait on each other.

use std::path::Path;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use super::linucb::ArmState;
use crate::db::LearningDb;
use crate::error::EngineError;
use crate::types::ActionId;

/// Shared, keyed storage of per-arm LinUCB statistics.
pub trait ArmStore: Send + Sync {
    /// Current state of an arm, or a cold-start state of `dimension` if the
    /// arm has never been updated. Staleness of a concurrent update is fine.
    fn snapshot(&self, action_id: ActionId, dimension: usize) -> Result<ArmState, EngineError>;

    /// Apply `A += x xᵀ`, `b += r x` atomically for one arm and return the new
    /// state. A failed update leaves the arm unchanged.
    fn apply_update(
        &self,
        action_id: ActionId,
        context: &[f64],
        reward: f64,
    ) -> Result<ArmState, EngineError>;
}

/// In-process store: one `RwLock` per arm inside a concurrent map.
#[derive(Default)]
pub struct MemoryArmStore {
    arms: DashMap<ActionId, Arc<RwLock<ArmState>>>,
}

impl MemoryArmStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.arms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arms.is_empty()
    }
}

impl ArmStore for MemoryArmStore {
    fn snapshot(&self, action_id: ActionId, dimension: usize) -> Result<ArmState, EngineError> {
        // Clone the handle so the map shard is released before locking the arm
        let handle = self.arms.get(&action_id).map(|entry| Arc::clone(entry.value()));
        Ok(match handle {
            Some(arm) => arm.read().clone(),
            None => ArmState::new(dimension),
        })
    }

    fn apply_update(
        &self,
        action_id: ActionId,
        context: &[f64],
        reward: f64,
    ) -> Result<ArmState, EngineError> {
        let existing = self.arms.get(&action_id).map(|entry| Arc::clone(entry.value()));
        let handle = match existing {
            Some(arm) => arm,
            None => {
                // Build the first state before the arm becomes visible so a
                // rejected update never leaves a mis-sized arm behind
                let fresh = ArmState::new(context.len()).observed(context, reward)?;
                match self.arms.entry(action_id) {
                    Entry::Vacant(slot) => {
                        slot.insert(Arc::new(RwLock::new(fresh.clone())));
                        return Ok(fresh);
                    }
                    Entry::Occupied(slot) => Arc::clone(slot.get()),
                }
            }
        };
        let mut arm = handle.write();
        arm.observe(context, reward)?;
        Ok(arm.clone())
    }
}

/// Store backed by the `bandit_params` table.
///
/// Each instance owns one connection. Several instances (threads or processes)
/// may share a database file; lost updates between them are detected with a
/// version compare-and-swap and retried up to `max_retries` times.
///
/// Snapshots and updates on one instance serialize on its connection mutex,
/// so reads through a single instance never run in parallel. Callers that
/// need parallel reads under WAL open one instance per worker.
pub struct SqliteArmStore {
    db: Mutex<LearningDb>,
    max_retries: u32,
}

impl SqliteArmStore {
    pub fn new(db: LearningDb, max_retries: u32) -> Self {
        Self {
            db: Mutex::new(db),
            max_retries,
        }
    }

    pub fn open_at(path: impl AsRef<Path>, max_retries: u32) -> Result<Self, EngineError> {
        Ok(Self::new(LearningDb::open_at(path)?, max_retries))
    }

    /// One read-compute-write round. `Ok(None)` means another writer won.
    fn try_update(
        &self,
        action_id: ActionId,
        context: &[f64],
        reward: f64,
    ) -> Result<Option<ArmState>, EngineError> {
        let db = self.db.lock();
        match db.get_arm_state(action_id)? {
            Some(stored) => {
                let next = stored.state.observed(context, reward)?;
                if db.compare_and_swap_arm_state(action_id, stored.version, &next)? {
                    Ok(Some(next))
                } else {
                    Ok(None)
                }
            }
            None => {
                let next = ArmState::new(context.len()).observed(context, reward)?;
                if db.insert_arm_state(action_id, &next)? {
                    Ok(Some(next))
                } else {
                    Ok(None)
                }
            }
        }
    }
}

impl ArmStore for SqliteArmStore {
    fn snapshot(&self, action_id: ActionId, dimension: usize) -> Result<ArmState, EngineError> {
        let db = self.db.lock();
        Ok(match db.get_arm_state(action_id)? {
            Some(stored) => stored.state,
            None => ArmState::new(dimension),
        })
    }

    fn apply_update(
        &self,
        action_id: ActionId,
        context: &[f64],
        reward: f64,
    ) -> Result<ArmState, EngineError> {
        let attempts = self.max_retries.max(1);
        for attempt in 1..=attempts {
            if let Some(state) = self.try_update(action_id, context, reward)? {
                return Ok(state);
            }
            log::debug!(
                "Arm {} update lost a race (attempt {}/{}), retrying",
                action_id,
                attempt,
                attempts
            );
        }
        log::warn!("Arm {} update gave up after {} conflicting attempts", action_id, attempts);
        Err(EngineError::ConcurrencyConflict {
            action_id,
            attempts,
        })
    }
}
