//! Dissimilarity scores between two multi-channel windows
//!
//! Smaller is more similar and an identical window scores `0.0`. The runner is generic
//! over [`DistanceMetric`], so a custom metric can replace the default [`DtwMetric`].

pub mod dtw;

pub use dtw::{dtw, DtwMetric};

use crate::OHLCV;

/// Scores how far apart two windows are
pub trait DistanceMetric: Send + Sync {
    /// Non-negative score, or a non-finite value when the pair cannot be compared.
    fn distance<T: OHLCV>(&self, a: &[T], b: &[T]) -> f64;

    /// Stable description of the metric and its settings, used in cache keys.
    fn id(&self) -> String;
}
