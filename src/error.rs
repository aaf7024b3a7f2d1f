//! Error types for the context embedding library

use thiserror::Error;

/// Errors raised by the embedding core
///
/// Configuration errors are fatal and surface immediately at component
/// construction or at the first call that can detect them; shape mismatches
/// fail loudly at the component boundary instead of propagating a silently
/// wrong result.
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("unsupported loss mode '{0}', expected 'hinge'")]
    UnsupportedLossMode(String),

    #[error("action fusion is only valid for the channel stacking mode")]
    ActionFusionUnsupported,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: String, got: String },

    #[error("weight persistence failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("weight encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, ContextError>;

impl ContextError {
    /// Shape error from a free-form expectation and an observed dimension list
    pub fn shape(expected: impl Into<String>, got: impl std::fmt::Debug) -> Self {
        Self::ShapeMismatch {
            expected: expected.into(),
            got: format!("{:?}", got),
        }
    }
}
