//! Student model: concept mastery, its decay, and learning velocity.

pub mod decay;
pub mod estimator;
pub mod graph;
pub mod velocity;

pub use estimator::{MasteryEstimator, BASELINE_MASTERY};
pub use graph::ConceptGraph;
pub use velocity::learning_velocity;
