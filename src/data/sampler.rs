//! Variation batch sampling for metric-learning updates
//!
//! Holds per-variation pools of demonstration clips and assembles
//! (B, K, T, C, H, W) batches: B distinct variations, K clips each, drawn
//! without replacement. The sampler keys pools by variation id but does not
//! otherwise police distinctness: feeding two pools with clips of the same
//! underlying variation degrades accuracy rather than crashing.

use crate::error::{ContextError, Result};
use ndarray::{Array4, Array6};
use rand::prelude::*;
use std::collections::HashMap;

/// Per-variation demonstration clip pools with batch assembly.
pub struct VariationSampler {
    /// variation id -> clips of shape (T, C, H, W)
    pools: HashMap<usize, Vec<Array4<f64>>>,
    clip_dim: Option<(usize, usize, usize, usize)>,
    rng: StdRng,
}

impl VariationSampler {
    pub fn new() -> Self {
        Self {
            pools: HashMap::new(),
            clip_dim: None,
            rng: StdRng::from_entropy(),
        }
    }

    /// Fixed seed for reproducible batch sequences.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            pools: HashMap::new(),
            clip_dim: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Add demonstration clips for one variation. All clips across all
    /// variations must share one (T, C, H, W) shape.
    pub fn add_variation_clips(&mut self, variation: usize, clips: Vec<Array4<f64>>) -> Result<()> {
        for clip in &clips {
            match self.clip_dim {
                None => self.clip_dim = Some(clip.dim()),
                Some(dim) if dim != clip.dim() => {
                    return Err(ContextError::shape(format!("clip of shape {:?}", dim), clip.dim()));
                }
                _ => {}
            }
        }
        self.pools.entry(variation).or_default().extend(clips);
        Ok(())
    }

    pub fn num_variations(&self) -> usize {
        self.pools.len()
    }

    pub fn clips_per_variation(&self) -> HashMap<usize, usize> {
        self.pools.iter().map(|(&v, c)| (v, c.len())).collect()
    }

    /// Whether a (B, K) batch can be assembled from the current pools.
    pub fn can_sample(&self, batch_variations: usize, samples_per_variation: usize) -> bool {
        let eligible = self
            .pools
            .values()
            .filter(|clips| clips.len() >= samples_per_variation)
            .count();
        batch_variations >= 1 && samples_per_variation >= 1 && eligible >= batch_variations
    }

    /// Assemble a (B, K, T, C, H, W) batch without replacement.
    pub fn sample(
        &mut self,
        batch_variations: usize,
        samples_per_variation: usize,
    ) -> Result<Array6<f64>> {
        if !self.can_sample(batch_variations, samples_per_variation) {
            return Err(ContextError::InvalidConfig(format!(
                "cannot assemble a ({}, {}) batch from {} variation pools",
                batch_variations,
                samples_per_variation,
                self.pools.len()
            )));
        }
        let (t, c, h, w) = self
            .clip_dim
            .ok_or_else(|| ContextError::InvalidConfig("sampler holds no clips".into()))?;

        let eligible: Vec<usize> = self
            .pools
            .iter()
            .filter(|(_, clips)| clips.len() >= samples_per_variation)
            .map(|(&v, _)| v)
            .collect();
        let chosen: Vec<usize> = eligible
            .choose_multiple(&mut self.rng, batch_variations)
            .copied()
            .collect();

        let mut batch = Array6::zeros((batch_variations, samples_per_variation, t, c, h, w));
        for (row, &variation) in chosen.iter().enumerate() {
            let pool = &self.pools[&variation];
            let picks: Vec<usize> = (0..pool.len())
                .collect::<Vec<_>>()
                .choose_multiple(&mut self.rng, samples_per_variation)
                .copied()
                .collect();
            for (slot, &idx) in picks.iter().enumerate() {
                batch
                    .slice_mut(ndarray::s![row, slot, .., .., .., ..])
                    .assign(&pool[idx]);
            }
        }
        Ok(batch)
    }
}

impl Default for VariationSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_sampler(variations: usize, clips: usize) -> VariationSampler {
        let mut sampler = VariationSampler::with_seed(42);
        for v in 0..variations {
            let pool: Vec<Array4<f64>> = (0..clips)
                .map(|i| Array4::from_elem((2, 3, 4, 4), (v * 100 + i) as f64))
                .collect();
            sampler.add_variation_clips(v, pool).unwrap();
        }
        sampler
    }

    #[test]
    fn test_sample_shape_and_distinct_pools() {
        let mut sampler = filled_sampler(5, 10);
        let batch = sampler.sample(3, 4).unwrap();
        assert_eq!(batch.dim(), (3, 4, 2, 3, 4, 4));

        // each row's clips come from one pool, rows from distinct pools
        let mut row_variations = Vec::new();
        for row in 0..3 {
            let variation = (batch[[row, 0, 0, 0, 0, 0]] / 100.0).floor() as usize;
            for slot in 0..4 {
                let v = (batch[[row, slot, 0, 0, 0, 0]] / 100.0).floor() as usize;
                assert_eq!(v, variation);
            }
            row_variations.push(variation);
        }
        row_variations.sort_unstable();
        row_variations.dedup();
        assert_eq!(row_variations.len(), 3);
    }

    #[test]
    fn test_insufficient_data_refused() {
        let mut sampler = filled_sampler(3, 5);
        assert!(!sampler.can_sample(4, 5));
        assert!(sampler.sample(4, 5).is_err());
        assert!(!sampler.can_sample(2, 6));
        assert!(sampler.sample(2, 6).is_err());
    }

    #[test]
    fn test_clip_shape_mismatch_rejected() {
        let mut sampler = filled_sampler(2, 3);
        let odd = vec![Array4::zeros((2, 3, 5, 5))];
        assert!(sampler.add_variation_clips(9, odd).is_err());
    }

    #[test]
    fn test_seeded_sampling_is_reproducible() {
        let batch_a = filled_sampler(5, 10).sample(3, 4).unwrap();
        let batch_b = filled_sampler(5, 10).sample(3, 4).unwrap();
        assert_eq!(batch_a, batch_b);
    }
}
