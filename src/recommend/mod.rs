//! From weak concepts to persisted recommendations.
//!
//! - `rules`: instructor threshold overrides
//! - `selector`: rule-selected vs bandit-selected resource choice
//! - `emitter`: priority, reason text, duplicate-free persistence
//! - `experience`: experience buffer for offline policy training
//! - `engine`: per-request orchestration

pub mod emitter;
pub mod engine;
pub mod experience;
pub mod rules;
pub mod selector;

pub use engine::{RecommendationBatch, RecommendationEngine, SkippedConcept};
pub use experience::{ExperienceLogger, ExperienceTuple};
pub use selector::ResourceSelection;
