//! Support/query partitioning of per-variation embedding batches

use crate::error::{ContextError, Result};
use ndarray::{s, Array2, Array3};

/// A support/query split of a (B, K, D) embedding batch.
///
/// Queries are flattened to (B * num_query, D) in variation-major order;
/// support stays (B, num_support, D).
#[derive(Debug, Clone)]
pub struct Partition {
    pub query: Array2<f64>,
    pub support: Array3<f64>,
    pub num_query: usize,
    pub num_support: usize,
}

/// Splits each variation's K embeddings into query and support subsets.
///
/// The split is a plain slice along the K axis (the first `num_query`
/// entries become queries, the remainder support), so callers control
/// ordering by how they assemble the batch. No sampling happens here.
#[derive(Debug, Clone)]
pub struct SupportQueryPartitioner {
    query_ratio: f64,
}

impl SupportQueryPartitioner {
    /// Create a partitioner. The ratio must lie in (0, 1].
    pub fn new(query_ratio: f64) -> Result<Self> {
        if !(query_ratio > 0.0 && query_ratio <= 1.0) {
            return Err(ContextError::InvalidConfig(format!(
                "query_ratio must be in (0, 1], got {}",
                query_ratio
            )));
        }
        Ok(Self { query_ratio })
    }

    pub fn query_ratio(&self) -> f64 {
        self.query_ratio
    }

    /// Number of query embeddings reserved out of K samples.
    ///
    /// Training uses `max(1, round(query_ratio * K))`. Validation always
    /// reserves exactly one query regardless of the configured ratio:
    /// validation pools are small, and a ratio-sized query set would starve
    /// the support set.
    pub fn num_query(&self, k: usize, validation: bool) -> usize {
        if validation {
            1
        } else {
            ((self.query_ratio * k as f64).round() as usize).max(1)
        }
    }

    /// Split a (B, K, D) batch. Fails if B < 2, K < 2, or fewer than one
    /// support embedding would remain per variation.
    pub fn split(&self, embeddings: &Array3<f64>, validation: bool) -> Result<Partition> {
        let (b, k, d) = embeddings.dim();
        if b < 2 {
            return Err(ContextError::InvalidConfig(format!(
                "batch must contain at least 2 variations, got {}",
                b
            )));
        }
        if k < 2 {
            return Err(ContextError::InvalidConfig(format!(
                "each variation needs at least 2 samples, got {}",
                k
            )));
        }

        let num_query = self.num_query(k, validation);
        if num_query >= k {
            return Err(ContextError::InvalidConfig(format!(
                "support set is empty: K = {} with num_query = {}",
                k, num_query
            )));
        }
        let num_support = k - num_query;

        let query_values: Vec<f64> = embeddings
            .slice(s![.., ..num_query, ..])
            .iter()
            .copied()
            .collect();
        let query = Array2::from_shape_vec((b * num_query, d), query_values)
            .map_err(|_| ContextError::shape("(B*num_query, D)", (b * num_query, d)))?;
        let support = embeddings.slice(s![.., num_query.., ..]).to_owned();

        Ok(Partition {
            query,
            support,
            num_query,
            num_support,
        })
    }
}
