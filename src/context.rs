//! Mastery vector -> bandit context vector `x_t`.
//!
//! Features follow the concept graph's topological order so every student and
//! every arm agree on what position `i` means. The same builder is used for
//! scoring and for reward updates.

use crate::mastery::{ConceptGraph, BASELINE_MASTERY};
use crate::types::MasteryVector;

/// Value of the optional intercept feature.
const BIAS_FEATURE: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ContextBuilder {
    concepts: Vec<String>,
    include_bias: bool,
}

impl ContextBuilder {
    pub fn from_graph(graph: &ConceptGraph, include_bias: bool) -> Self {
        Self {
            concepts: graph.order().to_vec(),
            include_bias,
        }
    }

    /// Length of every vector this builder produces.
    pub fn dimension(&self) -> usize {
        self.concepts.len() + usize::from(self.include_bias)
    }

    /// Concept behind each feature position (the bias, if any, comes last).
    pub fn order(&self) -> &[String] {
        &self.concepts
    }

    /// Concepts missing from `mastery` contribute the baseline. Concepts in
    /// `mastery` but outside the graph are not features.
    pub fn build(&self, mastery: &MasteryVector) -> Vec<f64> {
        let mut x: Vec<f64> = self
            .concepts
            .iter()
            .map(|c| mastery.get(c).unwrap_or(BASELINE_MASTERY))
            .collect();
        if self.include_bias {
            x.push(BIAS_FEATURE);
        }
        x
    }
}
