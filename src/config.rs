//! Engine configuration loaded from `~/.learnloop/config.json`.
//!
//! Every field has a default so an absent or partial file is valid.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

fn default_alpha() -> f64 {
    1.0
}

fn default_weak_threshold() -> f64 {
    0.6
}

fn default_velocity_window() -> usize {
    10
}

fn default_max_update_retries() -> u32 {
    3
}

fn default_pass_mark() -> f64 {
    0.6
}

/// Tunables for mastery estimation, LinUCB and the arm store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// LinUCB exploration coefficient
    #[serde(default = "default_alpha")]
    pub exploration_alpha: f64,
    /// Concepts below this mastery are weak
    #[serde(default = "default_weak_threshold")]
    pub weak_threshold: f64,
    /// Number of most recent submissions used for learning velocity
    #[serde(default = "default_velocity_window")]
    pub velocity_window: usize,
    /// Append a constant 1.0 intercept feature to the context vector
    #[serde(default)]
    pub include_bias: bool,
    /// Bounded retries for lost-update conflicts on arm state
    #[serde(default = "default_max_update_retries")]
    pub max_update_retries: u32,
    /// Assessment concept score at or above which the concept counts as answered correctly
    #[serde(default = "default_pass_mark")]
    pub assessment_pass_mark: f64,
    /// Replaces the built-in prerequisite graph when set (concept -> prerequisites)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept_graph: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            exploration_alpha: default_alpha(),
            weak_threshold: default_weak_threshold(),
            velocity_window: default_velocity_window(),
            include_bias: false,
            max_update_retries: default_max_update_retries(),
            assessment_pass_mark: default_pass_mark(),
            concept_graph: None,
            database_path: None,
        }
    }
}

impl EngineConfig {
    /// Reject values the math cannot work with.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.exploration_alpha.is_finite() || self.exploration_alpha < 0.0 {
            return Err(EngineError::Configuration(format!(
                "explorationAlpha must be a non-negative number, got {}",
                self.exploration_alpha
            )));
        }
        if !(0.0..=1.0).contains(&self.weak_threshold) {
            return Err(EngineError::Configuration(format!(
                "weakThreshold must be in [0,1], got {}",
                self.weak_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.assessment_pass_mark) {
            return Err(EngineError::Configuration(format!(
                "assessmentPassMark must be in [0,1], got {}",
                self.assessment_pass_mark
            )));
        }
        if self.velocity_window < 2 {
            return Err(EngineError::Configuration(
                "velocityWindow must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

/// Directory holding config and the default database.
pub fn get_state_dir() -> Result<PathBuf, EngineError> {
    let home = dirs::home_dir()
        .ok_or_else(|| EngineError::Configuration("Could not find home directory".to_string()))?;
    Ok(home.join(".learnloop"))
}

/// Load config from `~/.learnloop/config.json`, falling back to defaults when
/// the file does not exist.
pub fn load_config() -> Result<EngineConfig, EngineError> {
    let path = get_state_dir()?.join("config.json");
    if !path.exists() {
        log::debug!("No config at {}, using defaults", path.display());
        return Ok(EngineConfig::default());
    }
    load_config_from(&path)
}

/// Load and validate config from an explicit path.
pub fn load_config_from(path: &Path) -> Result<EngineConfig, EngineError> {
    let content = fs::read_to_string(path).map_err(|e| {
        EngineError::Configuration(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let config: EngineConfig = serde_json::from_str(&content).map_err(|e| {
        EngineError::Configuration(format!("Failed to parse {}: {}", path.display(), e))
    })?;
    config.validate()?;
    Ok(config)
}
