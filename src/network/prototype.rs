//! Prototype construction and all-pairs similarity selection
//!
//! One prototype per variation is built from its support embeddings, the
//! full cross-variation cosine-similarity matrix against all queries is
//! assembled, and a diagonal mask splits it into positive and negative
//! similarity sets. The same masking/selection routine serves both
//! prototype policies; only the prototype construction differs.

use crate::error::{ContextError, Result};
use crate::network::norm::unit_rows;
use crate::network::partition::Partition;
use ndarray::{Array2, Array3, Axis};
use serde::{Deserialize, Serialize};

/// How a variation's prototype is derived from its support embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrototypePolicy {
    /// Renormalized mean of the support embeddings. Drives the loss and the
    /// primary accuracy metric.
    MeanPooled,
    /// The first support embedding, no averaging. Used only for the
    /// single-shot accuracy diagnostic.
    FirstSample,
}

impl PrototypePolicy {
    /// Build one prototype per variation from (B, num_support, D) support
    /// embeddings. Inputs are expected row-normalized; mean pooling
    /// renormalizes its output, first-sample passes the row through.
    pub fn build(&self, support: &Array3<f64>) -> Result<Array2<f64>> {
        let (_b, s, _d) = support.dim();
        if s < 1 {
            return Err(ContextError::InvalidConfig(
                "cannot build prototypes from an empty support set".into(),
            ));
        }
        match self {
            PrototypePolicy::MeanPooled => {
                let mean = support
                    .mean_axis(Axis(1))
                    .ok_or_else(|| ContextError::shape("(B, num_support, D)", support.dim()))?;
                Ok(unit_rows(&mean))
            }
            PrototypePolicy::FirstSample => Ok(support.index_axis(Axis(1), 0).to_owned()),
        }
    }
}

/// Positive and negative similarity sets extracted from the full
/// cross-variation similarity matrix.
///
/// `positives` has shape (B, 1, num_query): each variation's prototype
/// against its own queries. `negatives` has shape (B, B−1, num_query):
/// every other variation's prototype against those queries. Values are dot
/// products of unit vectors, i.e. cosine similarities in [−1, 1].
#[derive(Debug, Clone)]
pub struct SimilaritySets {
    pub positives: Array3<f64>,
    pub negatives: Array3<f64>,
}

impl SimilaritySets {
    /// Fraction of (variation, query) pairs whose positive similarity
    /// strictly exceeds every negative.
    pub fn accuracy(&self) -> f64 {
        let (b, _, q) = self.positives.dim();
        let mut correct = 0usize;
        for i in 0..b {
            for t in 0..q {
                let positive = self.positives[[i, 0, t]];
                let max_negative = (0..b - 1)
                    .map(|j| self.negatives[[i, j, t]])
                    .fold(f64::NEG_INFINITY, f64::max);
                if positive > max_negative {
                    correct += 1;
                }
            }
        }
        correct as f64 / (b * q) as f64
    }
}

/// Builds prototypes under a policy and extracts the similarity sets.
#[derive(Debug, Clone)]
pub struct PrototypeSimilarityEngine {
    policy: PrototypePolicy,
}

impl PrototypeSimilarityEngine {
    pub fn new(policy: PrototypePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> PrototypePolicy {
        self.policy
    }

    /// Compare every prototype against every query of a partitioned batch.
    pub fn compare(&self, partition: &Partition) -> Result<SimilaritySets> {
        let (b, _s, d) = partition.support.dim();
        if b < 2 {
            return Err(ContextError::InvalidConfig(
                "similarity needs at least 2 variations for a negative set".into(),
            ));
        }
        let (rows, qd) = partition.query.dim();
        let num_query = partition.num_query;
        if qd != d || rows != b * num_query {
            return Err(ContextError::shape(
                format!("query of shape ({}, {})", b * num_query, d),
                partition.query.dim(),
            ));
        }

        let prototypes = self.policy.build(&partition.support)?;
        // (B, D) x (D, B*num_query) -> (B, B*num_query), entry (i, j*q + t)
        // pairing prototype i with variation j's t-th query
        let similarities = prototypes.dot(&partition.query.t());

        let mut positives = Array3::zeros((b, 1, num_query));
        let mut negatives = Array3::zeros((b, b - 1, num_query));
        for i in 0..b {
            let mut neg_row = 0usize;
            for j in 0..b {
                for t in 0..num_query {
                    let value = similarities[[i, j * num_query + t]];
                    if i == j {
                        positives[[i, 0, t]] = value;
                    } else {
                        negatives[[i, neg_row, t]] = value;
                    }
                }
                if i != j {
                    neg_row += 1;
                }
            }
        }

        Ok(SimilaritySets {
            positives,
            negatives,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::norm::unit_rows3;
    use crate::network::partition::SupportQueryPartitioner;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    /// Batch of B variations whose embeddings are one-hot on axis `i`,
    /// perfectly separable by construction.
    fn orthogonal_batch(b: usize, k: usize, d: usize) -> Array3<f64> {
        Array3::from_shape_fn((b, k, d), |(i, _, l)| if l == i { 1.0 } else { 0.0 })
    }

    fn partition(embeddings: &Array3<f64>, ratio: f64) -> Partition {
        SupportQueryPartitioner::new(ratio)
            .unwrap()
            .split(&unit_rows3(embeddings), false)
            .unwrap()
    }

    #[test]
    fn test_similarity_set_shapes() {
        let p = partition(&orthogonal_batch(4, 5, 8), 0.4);
        let sets = PrototypeSimilarityEngine::new(PrototypePolicy::MeanPooled)
            .compare(&p)
            .unwrap();
        assert_eq!(sets.positives.dim(), (4, 1, 2));
        assert_eq!(sets.negatives.dim(), (4, 3, 2));
    }

    #[test]
    fn test_similarities_are_cosines() {
        let p = partition(&orthogonal_batch(3, 4, 8), 0.5);
        for policy in [PrototypePolicy::MeanPooled, PrototypePolicy::FirstSample] {
            let sets = PrototypeSimilarityEngine::new(policy).compare(&p).unwrap();
            for v in sets.positives.iter().chain(sets.negatives.iter()) {
                assert!(*v >= -1.0 - 1e-12 && *v <= 1.0 + 1e-12);
            }
        }
    }

    #[test]
    fn test_orthogonal_variations_separate_perfectly() {
        let p = partition(&orthogonal_batch(3, 4, 8), 0.5);
        let sets = PrototypeSimilarityEngine::new(PrototypePolicy::MeanPooled)
            .compare(&p)
            .unwrap();
        for v in sets.positives.iter() {
            assert_relative_eq!(*v, 1.0, epsilon = 1e-9);
        }
        for v in sets.negatives.iter() {
            assert_relative_eq!(*v, 0.0, epsilon = 1e-9);
        }
        assert_relative_eq!(sets.accuracy(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_mean_prototype_is_unit_norm() {
        let embeddings = unit_rows3(&Array3::from_shape_fn((2, 4, 3), |(i, j, l)| {
            (i + j + l) as f64 + 0.5
        }));
        let p = SupportQueryPartitioner::new(0.25)
            .unwrap()
            .split(&embeddings, false)
            .unwrap();
        let prototypes = PrototypePolicy::MeanPooled.build(&p.support).unwrap();
        for row in prototypes.rows() {
            assert_relative_eq!(row.dot(&row).sqrt(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_first_sample_prototype_matches_support_row() {
        let embeddings = unit_rows3(&orthogonal_batch(3, 4, 8));
        let p = SupportQueryPartitioner::new(0.25)
            .unwrap()
            .split(&embeddings, false)
            .unwrap();
        let prototypes = PrototypePolicy::FirstSample.build(&p.support).unwrap();
        assert_eq!(prototypes.row(1).to_owned(), p.support.index_axis(Axis(0), 1).row(0).to_owned());
    }

    #[test]
    fn test_inverted_similarities_give_zero_accuracy() {
        // positives below negatives everywhere
        let sets = SimilaritySets {
            positives: Array3::from_elem((3, 1, 2), 0.1),
            negatives: Array3::from_elem((3, 2, 2), 0.9),
        };
        assert_relative_eq!(sets.accuracy(), 0.0, epsilon = 1e-12);
    }
}
