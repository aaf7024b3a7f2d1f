//! Embedding-side components
//!
//! This module provides:
//! - Sequence stacking between clip tensors and extractor frame layout
//! - The embedding extractor capability and its reference implementation
//! - Support/query partitioning of variation batches
//! - Prototype construction and similarity-set selection

mod embedding;
pub mod norm;
mod partition;
mod prototype;
pub mod stacker;

pub use embedding::{
    ActivationType, EmbeddingExtractor, ExtractorConfig, MlpExtractor, TrainableExtractor,
};
pub use partition::{Partition, SupportQueryPartitioner};
pub use prototype::{PrototypePolicy, PrototypeSimilarityEngine, SimilaritySets};
pub use stacker::{SequenceStacker, StackMode, StackedClips};
