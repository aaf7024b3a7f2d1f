//! Serving-side context aggregation
//!
//! This module provides:
//! - Replay-time broadcasting of demo embeddings across action steps
//! - Live rollout context estimation with a persistent session vector

mod live;
mod replay;

pub use live::LiveContextEstimator;
pub use replay::{ReplayContextBroadcaster, ReplayEmbeddingPolicy};
