//! LinUCB scoring, selection and the per-arm rank-1 update.
//!
//! For an arm with statistics `(A, b)` and context `x`:
//!
//! `theta = A⁻¹ b`, `score = theta·x + alpha * sqrt(xᵀ A⁻¹ x)`
//!
//! A fresh arm (`A = I`, `b = 0`) scores by the confidence bonus alone, so
//! untried resources are preferred until evidence accumulates.

use serde::Serialize;

use super::linalg::{dot, SquareMatrix};
use crate::error::EngineError;
use crate::types::ActionId;

/// Statistics of one arm. Shared by every student.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmState {
    a: SquareMatrix,
    b: Vec<f64>,
    observation_count: u64,
}

impl ArmState {
    /// Cold-start state: identity regularization, zero reward vector.
    pub fn new(dimension: usize) -> Self {
        Self {
            a: SquareMatrix::identity(dimension),
            b: vec![0.0; dimension],
            observation_count: 0,
        }
    }

    pub fn from_parts(
        a: SquareMatrix,
        b: Vec<f64>,
        observation_count: u64,
    ) -> Result<Self, EngineError> {
        if a.dim() != b.len() {
            return Err(EngineError::Computation(format!(
                "arm matrix is {}x{} but reward vector has {} entries",
                a.dim(),
                a.dim(),
                b.len()
            )));
        }
        Ok(Self {
            a,
            b,
            observation_count,
        })
    }

    pub fn dimension(&self) -> usize {
        self.b.len()
    }

    pub fn a(&self) -> &SquareMatrix {
        &self.a
    }

    pub fn b(&self) -> &[f64] {
        &self.b
    }

    pub fn observation_count(&self) -> u64 {
        self.observation_count
    }

    /// `A += x xᵀ`, `b += r x`. Inputs are checked before anything is touched,
    /// so a rejected update leaves the state unchanged.
    pub fn observe(&mut self, x: &[f64], reward: f64) -> Result<(), EngineError> {
        check_context(x, self.dimension())?;
        if !reward.is_finite() {
            return Err(EngineError::Validation(format!(
                "reward must be finite, got {}",
                reward
            )));
        }
        self.a.add_outer(x);
        for (bi, xi) in self.b.iter_mut().zip(x) {
            *bi += reward * xi;
        }
        self.observation_count += 1;
        Ok(())
    }

    /// Copy of this state with one more observation applied.
    pub fn observed(&self, x: &[f64], reward: f64) -> Result<Self, EngineError> {
        let mut next = self.clone();
        next.observe(x, reward)?;
        Ok(next)
    }
}

fn check_context(x: &[f64], dimension: usize) -> Result<(), EngineError> {
    if x.len() != dimension {
        return Err(EngineError::Computation(format!(
            "context has {} features but arm expects {}",
            x.len(),
            dimension
        )));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(EngineError::Computation(
            "context vector contains a non-finite value".to_string(),
        ));
    }
    Ok(())
}

/// Score breakdown for one arm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmScore {
    pub action_id: ActionId,
    /// theta·x
    pub expected_reward: f64,
    /// alpha * sqrt(xᵀ A⁻¹ x)
    pub confidence_bonus: f64,
    pub score: f64,
}

/// Deterministic LinUCB policy.
#[derive(Debug, Clone, Copy)]
pub struct LinUcb {
    alpha: f64,
}

impl LinUcb {
    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// UCB score of one arm against context `x`.
    pub fn score(
        &self,
        action_id: ActionId,
        arm: &ArmState,
        x: &[f64],
    ) -> Result<ArmScore, EngineError> {
        check_context(x, arm.dimension())?;
        let chol = arm.a.cholesky()?;
        let theta = chol.solve(&arm.b);
        let expected_reward = dot(&theta, x);
        let variance = chol.inverse_quadratic_form(x);
        if !variance.is_finite() || variance < 0.0 {
            return Err(EngineError::Computation(format!(
                "arm {} has invalid variance {}",
                action_id, variance
            )));
        }
        let confidence_bonus = self.alpha * variance.sqrt();
        let score = expected_reward + confidence_bonus;
        if !score.is_finite() {
            return Err(EngineError::Computation(format!(
                "arm {} produced a non-finite score",
                action_id
            )));
        }
        Ok(ArmScore {
            action_id,
            expected_reward,
            confidence_bonus,
            score,
        })
    }

    /// Pick the highest-scoring arm, ties going to the lowest action id.
    ///
    /// Any arm failing to score fails the whole selection; no arm is picked
    /// from a partially scored set.
    pub fn select(
        &self,
        arms: &[(ActionId, ArmState)],
        x: &[f64],
    ) -> Result<Option<ArmScore>, EngineError> {
        let mut ordered: Vec<&(ActionId, ArmState)> = arms.iter().collect();
        ordered.sort_by_key(|(id, _)| *id);

        let mut best: Option<ArmScore> = None;
        for (id, arm) in ordered {
            let scored = self.score(*id, arm, x)?;
            match best {
                Some(ref current) if scored.score <= current.score => {}
                _ => best = Some(scored),
            }
        }
        Ok(best)
    }
}

/// Reward for a score change between two quiz attempts, both in [0,1].
pub fn normalized_improvement(before: f64, after: f64) -> f64 {
    (after - before).clamp(-1.0, 1.0)
}
