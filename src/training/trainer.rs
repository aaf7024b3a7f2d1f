//! Training loop for the context embedding
//!
//! Owns the trainable extractor, embeds demonstration clip batches through
//! the sequence stacker, computes the margin hinge loss, and applies the
//! parameter update exactly once per training call. Validation runs the
//! same pipeline through `&self` with a single reserved query and cannot
//! mutate anything.

use crate::data::VariationSampler;
use crate::error::{ContextError, Result};
use crate::network::{SequenceStacker, StackMode, TrainableExtractor};
use crate::training::loss::{HingeMetricLoss, MetricLossOutput};
use crate::training::scheduler::LearningRateScheduler;
use ndarray::{Array3, Array5, Array6};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// Configuration for the training loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Number of training iterations
    pub iterations: usize,
    /// Base learning rate feeding the weight-decay update
    pub learning_rate: f64,
    /// L2 weight decay strength
    pub weight_decay: f64,
    /// Variations per batch (B)
    pub batch_variations: usize,
    /// Demonstration clips per variation (K)
    pub samples_per_variation: usize,
    /// Log every this many iterations
    pub log_interval: usize,
    /// Validate every this many iterations
    pub val_interval: usize,
    /// Batches averaged per validation pass
    pub val_batches: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            iterations: 1000,
            learning_rate: 0.001,
            weight_decay: 0.0001,
            batch_variations: 4,
            samples_per_variation: 5,
            log_interval: 100,
            val_interval: 100,
            val_batches: 20,
        }
    }
}

/// Metric histories collected over one training run.
#[derive(Debug, Clone, Default)]
pub struct TrainingResult {
    pub loss_history: Vec<f64>,
    pub accuracy_history: Vec<f64>,
    pub single_accuracy_history: Vec<f64>,
    /// Mean raw embedding value per iteration, for monitoring only
    pub mean_embedding_history: Vec<f64>,
    pub val_loss_history: Vec<f64>,
    pub val_accuracy_history: Vec<f64>,
    pub best_val_accuracy: f64,
    pub best_iteration: usize,
    pub total_iterations: usize,
}

/// Trains the embedding extractor with the metric-learning objective.
pub struct ContextTrainer<E: TrainableExtractor> {
    config: TrainerConfig,
    extractor: E,
    loss: HingeMetricLoss,
    stacker: SequenceStacker,
    scheduler: Option<LearningRateScheduler>,
    iteration: usize,
}

impl<E: TrainableExtractor> ContextTrainer<E> {
    /// Create a trainer. The stacker must use channel stacking: the batch
    /// mode multiplies the sample axis by T and the per-clip embedding
    /// correspondence is lost.
    pub fn new(
        config: TrainerConfig,
        extractor: E,
        loss: HingeMetricLoss,
        stacker: SequenceStacker,
    ) -> Result<Self> {
        if stacker.mode() != StackMode::Channel {
            return Err(ContextError::InvalidConfig(
                "training requires the channel stacking mode".into(),
            ));
        }
        Ok(Self {
            config,
            extractor,
            loss,
            stacker,
            scheduler: None,
            iteration: 0,
        })
    }

    pub fn with_scheduler(mut self, scheduler: LearningRateScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    pub fn into_extractor(self) -> E {
        self.extractor
    }

    /// Embed a (B, K, T, C, H, W) clip batch into (B, K, D).
    pub fn embed_clips(&self, clips: &Array6<f64>) -> Result<Array3<f64>> {
        let (b, k, t, c, h, w) = clips.dim();
        if b == 0 || k == 0 {
            return Err(ContextError::shape("non-empty (B, K, T, C, H, W)", clips.dim()));
        }
        let merged_values: Vec<f64> = clips.iter().copied().collect();
        let merged = Array5::from_shape_vec((b * k, t, c, h, w), merged_values)
            .map_err(|_| ContextError::shape("(B*K, T, C, H, W)", (b * k, t, c, h, w)))?;
        let stacked = self.stacker.stack(&merged)?;
        let embeddings = self.extractor.embed(&stacked.frames)?;
        let d = self.extractor.embedding_dim();
        let values: Vec<f64> = embeddings.iter().copied().collect();
        Array3::from_shape_vec((b, k, d), values)
            .map_err(|_| ContextError::shape("(B, K, D)", (b, k, d)))
    }

    /// One training step: embed, compute the hinge loss, apply the weight
    /// update once.
    pub fn update(&mut self, clips: &Array6<f64>) -> Result<MetricLossOutput> {
        let embeddings = self.embed_clips(clips)?;
        let output = self.loss.train_loss(&embeddings)?;

        let lr = self
            .scheduler
            .as_ref()
            .map(|s| s.step(self.iteration))
            .unwrap_or(self.config.learning_rate);
        self.extractor
            .decay_weights(1.0 - self.config.weight_decay * lr);
        self.iteration += 1;

        debug!(
            iteration = self.iteration,
            loss = output.loss,
            mean_embedding = output.mean_embedding,
            "context update"
        );
        Ok(output)
    }

    /// Validation pass: same loss with one reserved query, no mutation.
    pub fn validate(&self, clips: &Array6<f64>) -> Result<MetricLossOutput> {
        let embeddings = self.embed_clips(clips)?;
        self.loss.validation_loss(&embeddings)
    }

    /// Run the full training loop with periodic validation.
    pub fn train(
        &mut self,
        sampler: &mut VariationSampler,
        mut val_sampler: Option<&mut VariationSampler>,
    ) -> Result<TrainingResult> {
        let b = self.config.batch_variations;
        let k = self.config.samples_per_variation;
        if !sampler.can_sample(b, k) {
            return Err(ContextError::InvalidConfig(format!(
                "training sampler cannot produce ({}, {}) batches",
                b, k
            )));
        }

        let mut result = TrainingResult::default();
        for iteration in 0..self.config.iterations {
            let batch = sampler.sample(b, k)?;
            let output = self.update(&batch)?;

            result.loss_history.push(output.loss);
            result.accuracy_history.push(output.accuracy);
            result.single_accuracy_history.push(output.single_accuracy);
            result.mean_embedding_history.push(output.mean_embedding);

            if (iteration + 1) % self.config.log_interval == 0 {
                let window = self.config.log_interval;
                let avg = |hist: &[f64]| {
                    hist[hist.len().saturating_sub(window)..].iter().sum::<f64>() / window as f64
                };
                info!(
                    iteration = iteration + 1,
                    total = self.config.iterations,
                    loss = avg(&result.loss_history),
                    accuracy = avg(&result.accuracy_history),
                    single_accuracy = avg(&result.single_accuracy_history),
                    mean_embedding = avg(&result.mean_embedding_history),
                    "train"
                );
            }

            if let Some(val) = val_sampler.as_deref_mut() {
                if (iteration + 1) % self.config.val_interval == 0 {
                    match self.run_validation(val) {
                        Ok((val_loss, val_accuracy)) => {
                            result.val_loss_history.push(val_loss);
                            result.val_accuracy_history.push(val_accuracy);
                            info!(
                                iteration = iteration + 1,
                                loss = val_loss,
                                accuracy = val_accuracy,
                                "validation"
                            );
                            if val_accuracy > result.best_val_accuracy {
                                result.best_val_accuracy = val_accuracy;
                                result.best_iteration = iteration + 1;
                            }
                        }
                        Err(err) => warn!(error = %err, "validation batch skipped"),
                    }
                }
            }
            result.total_iterations = iteration + 1;
        }
        Ok(result)
    }

    fn run_validation(&self, sampler: &mut VariationSampler) -> Result<(f64, f64)> {
        let b = self.config.batch_variations;
        let k = self.config.samples_per_variation;
        let mut total_loss = 0.0;
        let mut total_accuracy = 0.0;
        for _ in 0..self.config.val_batches {
            let batch = sampler.sample(b, k)?;
            let output = self.validate(&batch)?;
            total_loss += output.loss;
            total_accuracy += output.accuracy;
        }
        let n = self.config.val_batches.max(1) as f64;
        Ok((total_loss / n, total_accuracy / n))
    }

    /// Persist the extractor's parameters under `dir` (fixed filename,
    /// format owned by the extractor).
    pub fn save_weights(&self, dir: &Path) -> Result<()> {
        self.extractor.save_weights(dir)
    }

    /// Restore the extractor's parameters from `dir`.
    pub fn load_weights(&mut self, dir: &Path) -> Result<()> {
        self.extractor.load_weights(dir)
    }
}
