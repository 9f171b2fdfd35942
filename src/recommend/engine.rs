//! Recommendation orchestration.
//!
//! Flow per request: answer history -> mastery -> weak concepts -> context
//! vector -> per concept, a rule override or a LinUCB pick -> emitted
//! recommendation + experience log entry.
//!
//! The engine holds no per-student state. Arm statistics live in the shared
//! `ArmStore`, so one engine can serve many request threads, each with its own
//! `LearningDb` connection.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::emitter::{emit, Emission};
use super::experience::ExperienceLogger;
use super::rules::select_rule;
use super::selector::ResourceSelection;
use crate::bandit::{ArmState, ArmStore, LinUcb, MemoryArmStore};
use crate::config::EngineConfig;
use crate::context::ContextBuilder;
use crate::db::{LearningDb, NewLogEntry};
use crate::error::EngineError;
use crate::mastery::{learning_velocity, ConceptGraph, MasteryEstimator, BASELINE_MASTERY};
use crate::types::{
    ActionId, ActionType, AdaptiveRule, MasteryVector, Recommendation, ResourceLevel, Trigger,
    WeakConcept,
};

/// A weak concept that got no recommendation, and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedConcept {
    pub concept: String,
    pub reason: String,
}

/// Result of one `generate_recommendations` call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationBatch {
    /// Shared by every experience log entry this call wrote.
    pub batch_id: String,
    pub mastery: MasteryVector,
    pub recommendations: Vec<Recommendation>,
    pub skipped: Vec<SkippedConcept>,
}

pub struct RecommendationEngine {
    config: EngineConfig,
    estimator: MasteryEstimator,
    context: ContextBuilder,
    policy: LinUcb,
    arms: Arc<dyn ArmStore>,
    experience: ExperienceLogger,
}

impl RecommendationEngine {
    pub fn new(config: EngineConfig, arms: Arc<dyn ArmStore>) -> Result<Self, EngineError> {
        config.validate()?;
        let graph = ConceptGraph::from_config(config.concept_graph.as_ref())?;
        let context = ContextBuilder::from_graph(&graph, config.include_bias);
        log::info!(
            "Recommendation engine ready: {} concepts, context dimension {}, alpha {}",
            graph.len(),
            context.dimension(),
            config.exploration_alpha
        );
        Ok(Self {
            policy: LinUcb::new(config.exploration_alpha),
            estimator: MasteryEstimator::new(graph),
            context,
            arms,
            experience: ExperienceLogger::new(),
            config,
        })
    }

    /// Engine with process-local arm statistics.
    pub fn with_memory_store(config: EngineConfig) -> Result<Self, EngineError> {
        Self::new(config, Arc::new(MemoryArmStore::new()))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn graph(&self) -> &ConceptGraph {
        self.estimator.graph()
    }

    pub fn context_builder(&self) -> &ContextBuilder {
        &self.context
    }

    pub fn experience(&self) -> &ExperienceLogger {
        &self.experience
    }

    pub fn arm_store(&self) -> &Arc<dyn ArmStore> {
        &self.arms
    }

    // =========================================================================
    // Student model
    // =========================================================================

    pub fn get_mastery(&self, db: &LearningDb, student_id: i64) -> Result<MasteryVector, EngineError> {
        self.get_mastery_at(db, student_id, Utc::now())
    }

    pub fn get_mastery_at(
        &self,
        db: &LearningDb,
        student_id: i64,
        now: DateTime<Utc>,
    ) -> Result<MasteryVector, EngineError> {
        let history = db.get_answer_history(student_id)?;
        Ok(self.estimator.estimate(&history, now))
    }

    /// Concepts below the configured weakness threshold, weakest first.
    pub fn get_weak_concepts(
        &self,
        db: &LearningDb,
        student_id: i64,
    ) -> Result<Vec<WeakConcept>, EngineError> {
        let mastery = self.get_mastery(db, student_id)?;
        Ok(mastery.weak_concepts(self.config.weak_threshold))
    }

    /// Slope of the most recent submission scores per submission.
    pub fn get_learning_velocity(&self, db: &LearningDb, student_id: i64) -> Result<f64, EngineError> {
        let submissions = db.get_recent_submissions(student_id, self.config.velocity_window)?;
        Ok(learning_velocity(&submissions))
    }

    // =========================================================================
    // Recommendation
    // =========================================================================

    pub fn generate_recommendations(
        &self,
        db: &LearningDb,
        student_id: i64,
        course_id: Option<i64>,
        trigger: Trigger,
    ) -> Result<RecommendationBatch, EngineError> {
        self.generate_recommendations_at(db, student_id, course_id, trigger, Utc::now())
    }

    /// One recommendation per weak concept that has a rule or a candidate
    /// resource. A numerical failure on one concept skips that concept only.
    pub fn generate_recommendations_at(
        &self,
        db: &LearningDb,
        student_id: i64,
        course_id: Option<i64>,
        trigger: Trigger,
        now: DateTime<Utc>,
    ) -> Result<RecommendationBatch, EngineError> {
        let history = db.get_answer_history(student_id)?;
        let mastery = self.estimator.estimate(&history, now);

        // An untouched concept sits at the baseline, which is below the default
        // threshold. Only concepts with evidence, or dragged below the baseline
        // by a weak prerequisite, are worth a recommendation.
        let answered: BTreeSet<&str> = history.iter().map(|e| e.concept.as_str()).collect();
        let weak: Vec<WeakConcept> = mastery
            .weak_concepts(self.config.weak_threshold)
            .into_iter()
            .filter(|w| answered.contains(w.concept.as_str()) || w.mastery < BASELINE_MASTERY)
            .collect();

        let rules: Vec<AdaptiveRule> = match course_id {
            Some(id) => db.list_adaptive_rules(id)?,
            None => Vec::new(),
        };
        let x = self.context.build(&mastery);
        let batch_id = uuid::Uuid::new_v4().to_string();

        let mut recommendations = Vec::new();
        let mut skipped = Vec::new();

        for weak_concept in &weak {
            let concept = weak_concept.concept.as_str();
            let selection = match select_rule(&rules, concept, weak_concept.mastery) {
                Some(rule) => ResourceSelection::from_rule(rule),
                None => match self.rank_candidates(db, weak_concept, &x) {
                    Ok(Some(selection)) => selection,
                    Ok(None) => {
                        skipped.push(SkippedConcept {
                            concept: concept.to_string(),
                            reason: "no candidate resources".to_string(),
                        });
                        continue;
                    }
                    Err(e) if e.is_computation() => {
                        log::warn!(
                            "No recommendation for student {} concept {}: {}",
                            student_id,
                            concept,
                            e
                        );
                        skipped.push(SkippedConcept {
                            concept: concept.to_string(),
                            reason: e.to_string(),
                        });
                        continue;
                    }
                    Err(e) => return Err(e),
                },
            };

            let weak_dependent = self
                .graph()
                .dependents(concept)
                .into_iter()
                .find(|d| weak.iter().any(|w| w.concept == *d));

            let emission = Emission {
                student_id,
                course_id,
                trigger,
                concept,
                mastery: weak_concept.mastery,
                selection: &selection,
                weak_dependent,
            };
            let recommendation_id = emit(db, &emission)?.id();

            self.experience.log(
                db,
                &NewLogEntry {
                    student_id,
                    batch_id: batch_id.clone(),
                    recommendation_id: Some(recommendation_id),
                    concept: concept.to_string(),
                    state: mastery.clone(),
                    action_type: selection.action_type(),
                    action_id: selection.resource_id(),
                },
            );

            let recommendation = db.get_recommendation(recommendation_id)?.ok_or_else(|| {
                EngineError::NotFound(format!("recommendation {}", recommendation_id))
            })?;
            recommendations.push(recommendation);
        }

        log::info!(
            "Student {} ({} trigger): {} weak concepts, {} recommendations, {} skipped",
            student_id,
            trigger,
            weak.len(),
            recommendations.len(),
            skipped.len()
        );

        Ok(RecommendationBatch {
            batch_id,
            mastery,
            recommendations,
            skipped,
        })
    }

    /// LinUCB pick among the concept's candidate resources, restricted to the
    /// level matching the student's mastery when any exist.
    fn rank_candidates(
        &self,
        db: &LearningDb,
        weak: &WeakConcept,
        x: &[f64],
    ) -> Result<Option<ResourceSelection>, EngineError> {
        let level = ResourceLevel::for_mastery(weak.mastery);
        let candidates = db.list_candidate_resources(&weak.concept, level)?;
        if candidates.is_empty() {
            return Ok(None);
        }
        let dimension = self.context.dimension();
        let mut arms: Vec<(ActionId, ArmState)> = Vec::with_capacity(candidates.len());
        for id in candidates {
            arms.push((id, self.arms.snapshot(id, dimension)?));
        }
        Ok(self.policy.select(&arms, x)?.map(ResourceSelection::from_score))
    }

    // =========================================================================
    // Learning
    // =========================================================================

    /// Credit `reward` to the arm behind a bandit-selected log entry, using the
    /// context the selection was made with.
    pub fn observe_reward(
        &self,
        db: &LearningDb,
        log_id: i64,
        reward: f64,
    ) -> Result<ArmState, EngineError> {
        let entry = db
            .get_learning_log(log_id)?
            .ok_or_else(|| EngineError::NotFound(format!("learning log {}", log_id)))?;
        if entry.action_type != ActionType::BanditRecommendation {
            return Err(EngineError::Validation(format!(
                "learning log {} records a {} and has no arm to update",
                log_id,
                entry.action_type.as_str()
            )));
        }
        if !reward.is_finite() {
            return Err(EngineError::Validation(format!("reward must be finite, got {}", reward)));
        }
        let x = self.context.build(&entry.state);
        let state = self.arms.apply_update(entry.action_id, &x, reward)?;
        log::debug!(
            "Arm {} updated from log {} (reward {:.3}, {} observations)",
            entry.action_id,
            log_id,
            reward,
            state.observation_count()
        );
        Ok(state)
    }

    /// Direct arm update with an explicit context vector.
    pub fn update_arm(
        &self,
        action_id: ActionId,
        x: &[f64],
        reward: f64,
    ) -> Result<ArmState, EngineError> {
        if x.len() != self.context.dimension() {
            return Err(EngineError::Validation(format!(
                "context has {} features, engine uses {}",
                x.len(),
                self.context.dimension()
            )));
        }
        self.arms.apply_update(action_id, x, reward)
    }
}
