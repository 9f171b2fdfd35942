//! Collaborator-facing operations.
//!
//! Each function validates its input at the boundary, then delegates to
//! `LearningDb` or the recommendation layer. Callers own the connection.

pub mod answers;
pub mod recommendations;
