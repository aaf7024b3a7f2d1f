//! Embedding extraction: the opaque capability that maps stacked
//! demonstration frames to fixed-size vectors
//!
//! The core depends only on the [`EmbeddingExtractor`] trait; the bundled
//! [`MlpExtractor`] is a reference implementation used by the trainer,
//! the training binary and the tests. Any network that accepts the frame
//! layout produced by the sequence stacker can stand behind the trait.

use crate::error::{ContextError, Result};
use crate::network::norm::unit_rows;
use ndarray::{Array1, Array2, Array4};
use rand::Rng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Fixed filename for persisted extractor parameters inside a
/// caller-supplied directory.
const WEIGHTS_FILE: &str = "embedding_net.json";

/// Maps a batch of stacked frames (N, C, H, W) to one vector per sample
/// (N, D), preserving batch order.
pub trait EmbeddingExtractor {
    fn embed(&self, frames: &Array4<f64>) -> Result<Array2<f64>>;

    /// Output dimension D.
    fn embedding_dim(&self) -> usize;
}

/// An extractor whose parameters the training path may update and persist.
///
/// `decay_weights` is the parameter-update seam: the trainer invokes it
/// exactly once per training call, never during validation. Persistence is
/// an opaque blob under a fixed filename; the format is owned by the
/// extractor, the core only triggers save/load.
pub trait TrainableExtractor: EmbeddingExtractor {
    fn decay_weights(&mut self, factor: f64);
    fn save_weights(&self, dir: &Path) -> Result<()>;
    fn load_weights(&mut self, dir: &Path) -> Result<()>;
}

/// Activation applied between hidden layers of the reference extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationType {
    ReLU,
    Tanh,
    Linear,
}

impl Default for ActivationType {
    fn default() -> Self {
        Self::ReLU
    }
}

/// Configuration for the reference MLP extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Flattened frame dimension (C * H * W after stacking)
    pub input_dim: usize,
    /// Hidden layer dimensions
    pub hidden_dims: Vec<usize>,
    /// Output embedding dimension D
    pub output_dim: usize,
    /// Whether to L2-normalize outputs. The metric loss normalizes before
    /// any comparison, so raw outputs are the default.
    pub normalize_embeddings: bool,
    pub activation: ActivationType,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            input_dim: 768,
            hidden_dims: vec![128, 64],
            output_dim: 64,
            normalize_embeddings: false,
            activation: ActivationType::ReLU,
        }
    }
}

/// Feedforward reference extractor over flattened stacked frames.
///
/// A stand-in for a production feature network; it demonstrates the
/// extractor contract using basic linear algebra.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpExtractor {
    config: ExtractorConfig,
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
}

impl MlpExtractor {
    /// Create a new extractor with Xavier-initialized weights.
    pub fn new(config: ExtractorConfig) -> Self {
        let mut weights = Vec::new();
        let mut biases = Vec::new();
        let mut rng = rand::thread_rng();

        let mut dims = vec![config.input_dim];
        dims.extend(&config.hidden_dims);
        dims.push(config.output_dim);

        for i in 0..dims.len() - 1 {
            let (in_dim, out_dim) = (dims[i], dims[i + 1]);
            let std = (2.0 / (in_dim + out_dim) as f64).sqrt();
            let normal = Normal::new(0.0, std).unwrap();
            weights.push(Array2::from_shape_fn((in_dim, out_dim), |_| rng.sample(normal)));
            biases.push(Array1::zeros(out_dim));
        }

        Self {
            config,
            weights,
            biases,
        }
    }

    fn apply_activation(&self, x: &mut Array1<f64>) {
        match self.config.activation {
            ActivationType::ReLU => x.mapv_inplace(|v| v.max(0.0)),
            ActivationType::Tanh => x.mapv_inplace(|v| v.tanh()),
            ActivationType::Linear => {}
        }
    }

    /// Forward pass for a single flattened frame.
    fn forward(&self, input: &Array1<f64>) -> Array1<f64> {
        let mut x = input.clone();
        for i in 0..self.weights.len() - 1 {
            x = self.weights[i].t().dot(&x) + &self.biases[i];
            self.apply_activation(&mut x);
        }
        let last = self.weights.len() - 1;
        x = self.weights[last].t().dot(&x) + &self.biases[last];
        x
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn input_dim(&self) -> usize {
        self.config.input_dim
    }
}

impl EmbeddingExtractor for MlpExtractor {
    fn embed(&self, frames: &Array4<f64>) -> Result<Array2<f64>> {
        let (n, c, h, w) = frames.dim();
        if c * h * w != self.config.input_dim {
            return Err(ContextError::shape(
                format!("frames with C*H*W == {}", self.config.input_dim),
                frames.dim(),
            ));
        }
        let mut outputs = Array2::zeros((n, self.config.output_dim));
        for i in 0..n {
            let flat: Array1<f64> = frames
                .index_axis(ndarray::Axis(0), i)
                .iter()
                .copied()
                .collect();
            outputs.row_mut(i).assign(&self.forward(&flat));
        }
        if self.config.normalize_embeddings {
            outputs = unit_rows(&outputs);
        }
        Ok(outputs)
    }

    fn embedding_dim(&self) -> usize {
        self.config.output_dim
    }
}

impl TrainableExtractor for MlpExtractor {
    fn decay_weights(&mut self, factor: f64) {
        for weight in &mut self.weights {
            weight.mapv_inplace(|w| w * factor);
        }
    }

    fn save_weights(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let encoded = serde_json::to_string(self)?;
        std::fs::write(dir.join(WEIGHTS_FILE), encoded)?;
        Ok(())
    }

    fn load_weights(&mut self, dir: &Path) -> Result<()> {
        let raw = std::fs::read_to_string(dir.join(WEIGHTS_FILE))?;
        *self = serde_json::from_str(&raw)?;
        Ok(())
    }
}
