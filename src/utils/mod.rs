//! Utility functions and helpers for sceneflow-eval
//!
//! This module provides common utilities used across the crate.

/// Tensor utilities
pub mod tensor_utils {
    use candle_core::{Result, Tensor, D};

    /// Squared Euclidean distances between two batched point sets
    ///
    /// `a`: `(B, N, 3)`, `b`: `(B, M, 3)` -> `(B, N, M)`
    pub fn pairwise_sq_distances(a: &Tensor, b: &Tensor) -> Result<Tensor> {
        // |a|^2 + |b|^2 - 2 a.b
        let a2 = a.sqr()?.sum_keepdim(D::Minus1)?;
        let b2 = b.sqr()?.sum_keepdim(D::Minus1)?.transpose(1, 2)?;
        let ab = a.matmul(&b.transpose(1, 2)?.contiguous()?)?;
        let dist = a2.broadcast_add(&b2)?.broadcast_sub(&(ab * 2.0)?)?;
        // cancellation can leave tiny negatives
        dist.relu()
    }

    /// For each point of `src`, its nearest point in `dst` minus itself
    ///
    /// `src`: `(B, N, 3)`, `dst`: `(B, M, 3)` -> `(B, N, 3)`
    pub fn nearest_neighbor_flow(src: &Tensor, dst: &Tensor) -> Result<Tensor> {
        let idx = pairwise_sq_distances(src, dst)?.argmin(D::Minus1)?;
        let batch = src.dim(0)?;
        let mut matched = Vec::with_capacity(batch);
        for b in 0..batch {
            matched.push(dst.get(b)?.index_select(&idx.get(b)?, 0)?);
        }
        Tensor::stack(&matched, 0)?.sub(src)
    }
}
