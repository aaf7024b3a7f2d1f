//! Training-side components
//!
//! This module provides:
//! - The margin hinge metric loss with train/validation variants
//! - The training loop over variation batches
//! - Learning rate scheduling

mod loss;
mod scheduler;
mod trainer;

pub use loss::{HingeMetricLoss, LossMode, MetricLossConfig, MetricLossOutput};
pub use scheduler::LearningRateScheduler;
pub use trainer::{ContextTrainer, TrainerConfig, TrainingResult};
