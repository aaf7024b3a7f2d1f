//! Live rollout context estimation
//!
//! At rollout time there is no batch, only a handful of demonstration
//! observations for the current episode, arriving per camera viewpoint.
//! The estimator stacks each camera's clip tensor, optionally fuses the
//! demonstrated action sequence, feeds everything to the extractor and
//! keeps the aggregated unit vector as the session's persistent context
//! until the next refresh or an explicit clear.
//!
//! One estimator belongs to one live session; callers serialize access
//! (one session per rollout worker, never shared across workers).

use crate::error::{ContextError, Result};
use crate::network::norm::{unit_rows, unit_vector};
use crate::network::{EmbeddingExtractor, SequenceStacker};
use ndarray::{concatenate, Array1, Array3, Array5, Axis};

/// Aggregates demonstration observations into one persistent context
/// vector.
pub struct LiveContextEstimator {
    stacker: SequenceStacker,
    context: Option<Array1<f64>>,
}

impl LiveContextEstimator {
    pub fn new(stacker: SequenceStacker) -> Self {
        Self {
            stacker,
            context: None,
        }
    }

    /// The current session context, if one has been estimated.
    pub fn context(&self) -> Option<&Array1<f64>> {
        self.context.as_ref()
    }

    /// Drop the session context. The next call to [`refresh`] starts from
    /// scratch.
    ///
    /// [`refresh`]: LiveContextEstimator::refresh
    pub fn clear(&mut self) {
        self.context = None;
    }

    /// Aggregate K demonstration observations into the session context.
    ///
    /// Each camera supplies a (K, T, C, H, W) tensor; camera streams are
    /// stacked individually and concatenated on the channel axis before
    /// being embedded, yielding K raw embeddings. Those are normalized,
    /// averaged and renormalized into one vector of dimension D, which
    /// overwrites any previously stored context; there is no accumulation
    /// across calls.
    ///
    /// `actions` must be given exactly when the stacker is configured for
    /// action fusion; it carries the demonstrated (K, T, A) action rows.
    pub fn refresh(
        &mut self,
        extractor: &dyn EmbeddingExtractor,
        cameras: &[Array5<f64>],
        actions: Option<&Array3<f64>>,
    ) -> Result<&Array1<f64>> {
        if cameras.is_empty() {
            return Err(ContextError::InvalidConfig(
                "at least one camera stream is required".into(),
            ));
        }
        if self.stacker.fuses_actions() != actions.is_some() {
            return Err(ContextError::InvalidConfig(if actions.is_some() {
                "actions supplied but the stacker does not fuse actions".into()
            } else {
                "stacker fuses actions but no action sequence was supplied".into()
            }));
        }

        let first_dim = cameras[0].dim();
        let mut streams = Vec::with_capacity(cameras.len());
        for camera in cameras {
            let (k, t, _c, h, w) = camera.dim();
            if (k, t, h, w) != (first_dim.0, first_dim.1, first_dim.3, first_dim.4) {
                return Err(ContextError::shape(
                    format!("camera streams agreeing on (K={}, T={}, H, W)", first_dim.0, first_dim.1),
                    camera.dim(),
                ));
            }
            let stacked = match actions {
                Some(action_rows) => self.stacker.stack_with_actions(camera, action_rows)?,
                None => self.stacker.stack(camera)?,
            };
            streams.push(stacked.frames);
        }

        let views: Vec<_> = streams.iter().map(|f| f.view()).collect();
        let frames = concatenate(Axis(1), &views)
            .map_err(|_| ContextError::shape("camera frames with equal (K, H, W)", first_dim))?;

        let embeddings = extractor.embed(&frames)?;
        let normalized = unit_rows(&embeddings);
        let mean = normalized
            .mean_axis(Axis(0))
            .ok_or_else(|| ContextError::shape("(K, D) embeddings", embeddings.dim()))?;
        Ok(&*self.context.insert(unit_vector(&mean)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::stacker::StackMode;
    use crate::network::{ActivationType, ExtractorConfig, MlpExtractor};
    use approx::assert_relative_eq;
    use ndarray::{Array3, Array5};

    const K: usize = 3;
    const T: usize = 2;
    const C: usize = 2;
    const RES: usize = 3;

    fn extractor(cameras: usize, action_dim: usize) -> MlpExtractor {
        MlpExtractor::new(ExtractorConfig {
            input_dim: cameras * (T * C + T * action_dim) * RES * RES,
            hidden_dims: vec![10],
            output_dim: 6,
            normalize_embeddings: false,
            activation: ActivationType::Tanh,
        })
    }

    fn camera(seed: f64) -> Array5<f64> {
        Array5::from_shape_fn((K, T, C, RES, RES), |(a, b, c, d, e)| {
            seed + (a * 7 + b * 5 + c * 3 + d * 2 + e) as f64 * 0.01
        })
    }

    #[test]
    fn test_refresh_returns_unit_context() {
        let mut estimator = LiveContextEstimator::new(SequenceStacker::channel());
        let net = extractor(1, 0);
        let context = estimator.refresh(&net, &[camera(0.3)], None).unwrap();
        assert_eq!(context.len(), 6);
        assert_relative_eq!(context.dot(context).sqrt(), 1.0, epsilon = 1e-9);
        assert!(estimator.context().is_some());
    }

    #[test]
    fn test_refresh_overwrites_previous_context() {
        let mut estimator = LiveContextEstimator::new(SequenceStacker::channel());
        let net = extractor(1, 0);

        let first = estimator.refresh(&net, &[camera(0.1)], None).unwrap().clone();
        let second = estimator.refresh(&net, &[camera(5.0)], None).unwrap().clone();
        assert_ne!(first, second);
        // stored value is exactly the second estimate, no blending
        assert_eq!(estimator.context().unwrap(), &second);

        // identical inputs produce an identical context again
        let third = estimator.refresh(&net, &[camera(5.0)], None).unwrap().clone();
        assert_eq!(second, third);
    }

    #[test]
    fn test_clear_drops_context() {
        let mut estimator = LiveContextEstimator::new(SequenceStacker::channel());
        let net = extractor(1, 0);
        estimator.refresh(&net, &[camera(1.0)], None).unwrap();
        estimator.clear();
        assert!(estimator.context().is_none());
    }

    #[test]
    fn test_multi_camera_channel_concat() {
        let mut estimator = LiveContextEstimator::new(SequenceStacker::channel());
        let net = extractor(2, 0);
        let context = estimator
            .refresh(&net, &[camera(0.0), camera(2.0)], None)
            .unwrap();
        assert_eq!(context.len(), 6);
    }

    #[test]
    fn test_action_fusion_contract() {
        let stacker = SequenceStacker::new(StackMode::Channel, true).unwrap();
        let mut estimator = LiveContextEstimator::new(stacker);
        let net = extractor(1, 2);
        let actions = Array3::from_shape_fn((K, T, 2), |(a, b, c)| (a + b + c) as f64);

        // fusion configured but actions missing
        assert!(estimator.refresh(&net, &[camera(0.5)], None).is_err());
        assert!(estimator
            .refresh(&net, &[camera(0.5)], Some(&actions))
            .is_ok());

        // fusion not configured but actions supplied
        let mut plain = LiveContextEstimator::new(SequenceStacker::channel());
        let plain_net = extractor(1, 0);
        assert!(plain
            .refresh(&plain_net, &[camera(0.5)], Some(&actions))
            .is_err());
    }

    #[test]
    fn test_single_demo_degenerates_to_renormalization() {
        let mut estimator = LiveContextEstimator::new(SequenceStacker::channel());
        let net = MlpExtractor::new(ExtractorConfig {
            input_dim: T * C * RES * RES,
            hidden_dims: vec![10],
            output_dim: 6,
            normalize_embeddings: false,
            activation: ActivationType::Tanh,
        });
        let single = Array5::from_shape_fn((1, T, C, RES, RES), |(_, b, c, d, e)| {
            (b + c + d + e) as f64 * 0.1 + 0.2
        });

        let context = estimator.refresh(&net, &[single.clone()], None).unwrap().clone();
        // with K = 1 the context is the normalized single embedding
        let stacked = SequenceStacker::channel().stack(&single).unwrap();
        let embedding = net.embed(&stacked.frames).unwrap();
        let expected = unit_vector(&embedding.row(0).to_owned());
        for (a, b) in context.iter().zip(expected.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }
}
