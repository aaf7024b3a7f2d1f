//! Margin-based metric loss over variation batches
//!
//! Turns a (B, K, D) embedding batch into a scalar hinge loss plus accuracy
//! diagnostics: embeddings are row-normalized, partitioned into query and
//! support sets, compared against per-variation prototypes, and every
//! negative similarity within `margin` of its matching positive is
//! penalized. The same computation runs in a validation mode that reserves
//! a single query per variation and is never used to update parameters.

use crate::error::{ContextError, Result};
use crate::network::norm::unit_rows3;
use crate::network::{
    PrototypePolicy, PrototypeSimilarityEngine, SimilaritySets, SupportQueryPartitioner,
};
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Loss objective selector.
///
/// Only the margin hinge objective is supported; unknown selectors are
/// rejected at parse time rather than falling back silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossMode {
    Hinge,
}

impl Default for LossMode {
    fn default() -> Self {
        Self::Hinge
    }
}

impl FromStr for LossMode {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hinge" => Ok(Self::Hinge),
            other => Err(ContextError::UnsupportedLossMode(other.to_string())),
        }
    }
}

/// Configuration for the metric-learning objective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricLossConfig {
    /// Fraction of each variation's K samples reserved as queries during
    /// training
    pub query_ratio: f64,
    /// Hinge margin m > 0
    pub margin: f64,
    /// Scale applied to the loss (and the per-pair tensor)
    pub loss_weight: f64,
    pub mode: LossMode,
}

impl Default for MetricLossConfig {
    fn default() -> Self {
        Self {
            query_ratio: 0.3,
            margin: 0.1,
            loss_weight: 1.0,
            mode: LossMode::Hinge,
        }
    }
}

/// Result of one loss computation. Never mutated after construction.
#[derive(Debug, Clone)]
pub struct MetricLossOutput {
    /// Weighted per-pair hinge values, shape (B, B−1, num_query)
    pub pair_loss: Array3<f64>,
    /// Weighted scalar mean loss: the quantity whose gradient drives
    /// optimization on the training path
    pub loss: f64,
    /// Fraction of (variation, query) pairs ranked correctly under
    /// mean-pooled prototypes
    pub accuracy: f64,
    /// Same ranking under first-sample prototypes; reported separately,
    /// never combined with `accuracy`
    pub single_accuracy: f64,
    /// Mean of the raw, unnormalized embedding values, for monitoring only
    pub mean_embedding: f64,
}

/// Margin hinge loss with train/validation asymmetry.
#[derive(Debug, Clone)]
pub struct HingeMetricLoss {
    config: MetricLossConfig,
    partitioner: SupportQueryPartitioner,
}

impl HingeMetricLoss {
    pub fn new(config: MetricLossConfig) -> Result<Self> {
        if config.margin <= 0.0 {
            return Err(ContextError::InvalidConfig(format!(
                "margin must be positive, got {}",
                config.margin
            )));
        }
        let partitioner = SupportQueryPartitioner::new(config.query_ratio)?;
        Ok(Self {
            config,
            partitioner,
        })
    }

    pub fn config(&self) -> &MetricLossConfig {
        &self.config
    }

    /// Training-mode loss over a raw (B, K, D) embedding batch.
    pub fn train_loss(&self, embeddings: &Array3<f64>) -> Result<MetricLossOutput> {
        self.compute(embeddings, false)
    }

    /// Validation-mode loss: one query per variation, same formula. The
    /// caller must not feed the result back into any parameter update.
    pub fn validation_loss(&self, embeddings: &Array3<f64>) -> Result<MetricLossOutput> {
        self.compute(embeddings, true)
    }

    fn compute(&self, embeddings: &Array3<f64>, validation: bool) -> Result<MetricLossOutput> {
        let normalized = unit_rows3(embeddings);
        let partition = self.partitioner.split(&normalized, validation)?;

        let mean_sets =
            PrototypeSimilarityEngine::new(PrototypePolicy::MeanPooled).compare(&partition)?;
        let single_sets =
            PrototypeSimilarityEngine::new(PrototypePolicy::FirstSample).compare(&partition)?;

        let (pair_loss, loss) = self.hinge(&mean_sets);

        Ok(MetricLossOutput {
            pair_loss,
            loss,
            accuracy: mean_sets.accuracy(),
            single_accuracy: single_sets.accuracy(),
            mean_embedding: embeddings.mean().unwrap_or(0.0),
        })
    }

    /// Per-element hinge `max(0, margin − positive + negative)` with the
    /// positive broadcast over the negative axis, scaled by the loss weight.
    fn hinge(&self, sets: &SimilaritySets) -> (Array3<f64>, f64) {
        let (b, negatives_per_row, q) = sets.negatives.dim();
        let mut pair_loss = Array3::zeros((b, negatives_per_row, q));
        for i in 0..b {
            for j in 0..negatives_per_row {
                for t in 0..q {
                    let h = (self.config.margin - sets.positives[[i, 0, t]]
                        + sets.negatives[[i, j, t]])
                        .max(0.0);
                    pair_loss[[i, j, t]] = h * self.config.loss_weight;
                }
            }
        }
        let loss = pair_loss.mean().unwrap_or(0.0);
        (pair_loss, loss)
    }
}
