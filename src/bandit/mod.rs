//! Contextual bandit over learning resources.
//!
//! - `linalg`: Cholesky solves for the per-arm ridge regression
//! - `linucb`: arm statistics, UCB scoring and deterministic selection
//! - `store`: keyed arm storage with per-arm update atomicity

pub mod linalg;
pub mod linucb;
pub mod store;

pub use linucb::{normalized_improvement, ArmScore, ArmState, LinUcb};
pub use store::{ArmStore, MemoryArmStore, SqliteArmStore};
