//! Sequence stacking: folding the time axis of demonstration clips into the
//! layout the embedding extractor consumes
//!
//! Two interchangeable strategies:
//! - Channel stacking concatenates all time steps along the channel axis,
//!   producing one "fat" frame per sample, and supports the exact inverse.
//! - Batch stacking flattens time into the sample axis, leaving the channel
//!   count unchanged.
//!
//! Only channel stacking can fuse a parallel per-timestep action sequence
//! into the stacked tensor (action values tiled spatially and concatenated
//! on the channel axis), which is required when the extractor is
//! action-conditioned.

use crate::error::{ContextError, Result};
use ndarray::{concatenate, Array3, Array4, Array5, Axis};
use serde::{Deserialize, Serialize};

/// Where the time axis of a clip is folded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StackMode {
    /// (N, T, C, H, W) -> (N, T*C, H, W)
    Channel,
    /// (N, T, C, H, W) -> (N*T, C, H, W)
    Batch,
}

/// Reshapes clip tensors into extractor layout and back.
#[derive(Debug, Clone)]
pub struct SequenceStacker {
    mode: StackMode,
    fuse_actions: bool,
}

impl SequenceStacker {
    /// Create a stacker.
    ///
    /// Requesting action fusion under batch stacking is a configuration
    /// error: the fused action channels only have a defined position when
    /// time steps share one frame.
    pub fn new(mode: StackMode, fuse_actions: bool) -> Result<Self> {
        if fuse_actions && mode != StackMode::Channel {
            return Err(ContextError::ActionFusionUnsupported);
        }
        Ok(Self { mode, fuse_actions })
    }

    /// Channel-stacking without action fusion.
    pub fn channel() -> Self {
        Self {
            mode: StackMode::Channel,
            fuse_actions: false,
        }
    }

    pub fn mode(&self) -> StackMode {
        self.mode
    }

    /// Whether this stacker expects a parallel action sequence.
    pub fn fuses_actions(&self) -> bool {
        self.fuse_actions
    }

    /// Fold the time axis of a (N, T, C, H, W) clip tensor.
    pub fn stack(&self, clips: &Array5<f64>) -> Result<StackedClips> {
        let (n, t, c, h, w) = clips.dim();
        if n == 0 || t == 0 || c == 0 {
            return Err(ContextError::shape("non-empty (N, T, C, H, W)", clips.dim()));
        }
        let values: Vec<f64> = clips.iter().copied().collect();
        let frames = match self.mode {
            StackMode::Channel => Array4::from_shape_vec((n, t * c, h, w), values)
                .map_err(|_| ContextError::shape("(N, T*C, H, W)", (n, t * c, h, w)))?,
            StackMode::Batch => Array4::from_shape_vec((n * t, c, h, w), values)
                .map_err(|_| ContextError::shape("(N*T, C, H, W)", (n * t, c, h, w)))?,
        };
        Ok(StackedClips {
            frames,
            mode: self.mode,
            samples: n,
            timesteps: t,
            channels: c,
            action_channels: 0,
        })
    }

    /// Fold the time axis and fuse a parallel (N, T, A) action sequence.
    ///
    /// Action values for all time steps are stacked, tiled over the spatial
    /// extent and concatenated after the observation channels.
    pub fn stack_with_actions(
        &self,
        clips: &Array5<f64>,
        actions: &Array3<f64>,
    ) -> Result<StackedClips> {
        if !self.fuse_actions {
            return Err(ContextError::InvalidConfig(
                "stacker was not configured for action fusion".into(),
            ));
        }
        let (n, t, _c, h, w) = clips.dim();
        let (an, at, a) = actions.dim();
        if an != n || at != t {
            return Err(ContextError::shape(
                format!("actions of shape ({}, {}, A)", n, t),
                actions.dim(),
            ));
        }
        let mut stacked = self.stack(clips)?;

        // (N, T, A) -> (N, T*A), then tiled to (N, T*A, H, W)
        let action_channels = t * a;
        let flat: Vec<f64> = actions.iter().copied().collect();
        let action_rows = ndarray::Array2::from_shape_vec((n, action_channels), flat)
            .map_err(|_| ContextError::shape("(N, T*A)", (n, action_channels)))?;
        let tiled =
            Array4::from_shape_fn((n, action_channels, h, w), |(i, ch, _, _)| action_rows[[i, ch]]);

        stacked.frames = concatenate(Axis(1), &[stacked.frames.view(), tiled.view()])
            .map_err(|_| ContextError::shape("(N, T*C + T*A, H, W)", (n, action_channels, h, w)))?;
        stacked.action_channels = action_channels;
        Ok(stacked)
    }
}

/// A stacked clip tensor plus the layout metadata needed to invert it.
#[derive(Debug, Clone)]
pub struct StackedClips {
    /// Frames in extractor layout: (N, T*C [+ T*A], H, W) for channel
    /// stacking, (N*T, C, H, W) for batch stacking.
    pub frames: Array4<f64>,
    mode: StackMode,
    samples: usize,
    timesteps: usize,
    channels: usize,
    action_channels: usize,
}

impl StackedClips {
    /// Recover the original (N, T, C, H, W) observation tensor.
    ///
    /// Fused action channels are split off and dropped; the round trip
    /// reproduces the observation values exactly.
    pub fn invert(&self) -> Result<Array5<f64>> {
        let (rows, ch, h, w) = self.frames.dim();
        let (n, t, c) = (self.samples, self.timesteps, self.channels);
        let obs = match self.mode {
            StackMode::Channel => {
                if ch != t * c + self.action_channels || rows != n {
                    return Err(ContextError::shape(
                        format!("({}, {}, {}, {})", n, t * c + self.action_channels, h, w),
                        self.frames.dim(),
                    ));
                }
                self.frames
                    .slice(ndarray::s![.., ..t * c, .., ..])
                    .iter()
                    .copied()
                    .collect::<Vec<f64>>()
            }
            StackMode::Batch => {
                if rows != n * t || ch != c {
                    return Err(ContextError::shape(
                        format!("({}, {}, {}, {})", n * t, c, h, w),
                        self.frames.dim(),
                    ));
                }
                self.frames.iter().copied().collect::<Vec<f64>>()
            }
        };
        Array5::from_shape_vec((n, t, c, h, w), obs)
            .map_err(|_| ContextError::shape("(N, T, C, H, W)", (n, t, c, h, w)))
    }
}
