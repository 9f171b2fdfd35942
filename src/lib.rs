//! learnloop: adaptive recommendation core.
//!
//! Estimates per-concept mastery from graded answers, turns it into a context
//! vector, and picks remedial resources per weak concept, either from an
//! instructor rule or with a LinUCB contextual bandit whose per-resource
//! statistics are shared by all students.

pub mod bandit;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod mastery;
mod migrations;
pub mod recommend;
pub mod services;
pub mod types;

pub use config::EngineConfig;
pub use error::EngineError;
pub use recommend::RecommendationEngine;
