//! Replay-time context broadcasting
//!
//! A policy update consumes one context vector per action step, not one per
//! demonstration clip. This component collapses each variation's demo
//! embeddings into a single vector and repeats it across the action axis.

use crate::error::{ContextError, Result};
use crate::network::norm::unit_rows;
use crate::training::{HingeMetricLoss, MetricLossOutput};
use ndarray::{Array2, Array3, Axis};
use serde::{Deserialize, Serialize};

/// How each variation's demo embeddings collapse into one context vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplayEmbeddingPolicy {
    /// Take embedding index 0 of each variation
    SingleEmbedding,
    /// Mean-pool across the demo axis
    MeanEmbedding,
}

/// Broadcasts per-variation demo embeddings across action steps.
#[derive(Debug, Clone)]
pub struct ReplayContextBroadcaster {
    policy: ReplayEmbeddingPolicy,
}

impl ReplayContextBroadcaster {
    pub fn new(policy: ReplayEmbeddingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ReplayEmbeddingPolicy {
        self.policy
    }

    /// Collapse (B, K_demo, D) demo embeddings and repeat across `k_action`
    /// steps, yielding a unit-normalized (B, K_action, D) context tensor.
    pub fn broadcast(&self, embeddings: &Array3<f64>, k_action: usize) -> Result<Array3<f64>> {
        let (b, k_demo, d) = embeddings.dim();
        if b == 0 || k_demo == 0 || d == 0 {
            return Err(ContextError::shape("non-empty (B, K_demo, D)", embeddings.dim()));
        }
        if k_action == 0 {
            return Err(ContextError::InvalidConfig(
                "k_action must be at least 1".into(),
            ));
        }

        let collapsed: Array2<f64> = match self.policy {
            ReplayEmbeddingPolicy::SingleEmbedding => embeddings.index_axis(Axis(1), 0).to_owned(),
            ReplayEmbeddingPolicy::MeanEmbedding => embeddings
                .mean_axis(Axis(1))
                .ok_or_else(|| ContextError::shape("(B, K_demo, D)", embeddings.dim()))?,
        };
        let normalized = unit_rows(&collapsed);

        Ok(Array3::from_shape_fn((b, k_action, d), |(i, _, j)| {
            normalized[[i, j]]
        }))
    }

    /// Broadcast and additionally compute the training-mode metric loss from
    /// the un-broadcast per-clip embeddings, so a policy update can jointly
    /// optimize the extractor.
    pub fn broadcast_with_loss(
        &self,
        embeddings: &Array3<f64>,
        k_action: usize,
        loss: &HingeMetricLoss,
    ) -> Result<(Array3<f64>, MetricLossOutput)> {
        let context = self.broadcast(embeddings, k_action)?;
        let output = loss.train_loss(embeddings)?;
        Ok((context, output))
    }
}
