//! # Task Context Embedding
//!
//! This library trains a task/variation identity embedding for conditioning
//! a downstream manipulation policy in a multi-task, multi-variation
//! robot-learning setting. Short demonstration clips grouped by variation
//! are mapped to fixed-size vectors such that clips from the same variation
//! embed close together (in cosine similarity) and clips from different
//! variations embed far apart, via a margin-based, prototype-style
//! metric-learning objective.
//!
//! ## Overview
//!
//! Training partitions each variation's clips into support and query sets,
//! builds one prototype per variation from its support embeddings, compares
//! every prototype against every query, and penalizes negative similarities
//! within a margin of the matching positive. At serving time the learned
//! (or frozen) embedding conditions both offline replay-based policy
//! updates and live rollout:
//!
//! - Replay: per-variation demo embeddings collapse into one unit vector
//!   broadcast across all action steps.
//! - Rollout: a handful of per-camera demonstration observations aggregate
//!   into one persistent session context held until explicitly refreshed.
//!
//! The feature extractor itself is consumed as an opaque capability; the
//! bundled MLP extractor exists so the trainer, the training binary and the
//! tests have a concrete network to drive.
//!
//! ## Modules
//!
//! - `network` - Sequence stacking, the extractor capability, partitioning
//!   and prototype similarity
//! - `training` - Margin hinge loss, training loop, learning rate schedules
//! - `context` - Replay broadcasting and live context estimation
//! - `data` - Variation clip pools and observation preprocessing

pub mod context;
pub mod data;
pub mod error;
pub mod network;
pub mod training;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::context::{LiveContextEstimator, ReplayContextBroadcaster, ReplayEmbeddingPolicy};

    pub use crate::data::{preprocess, VariationSampler};

    pub use crate::error::{ContextError, Result};

    pub use crate::network::{
        ActivationType, EmbeddingExtractor, ExtractorConfig, MlpExtractor, Partition,
        PrototypePolicy, PrototypeSimilarityEngine, SequenceStacker, SimilaritySets, StackMode,
        StackedClips, SupportQueryPartitioner, TrainableExtractor,
    };

    pub use crate::training::{
        ContextTrainer, HingeMetricLoss, LearningRateScheduler, LossMode, MetricLossConfig,
        MetricLossOutput, TrainerConfig, TrainingResult,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
