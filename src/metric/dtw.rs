//! Multi-channel Dynamic Time Warping
//!
//! For each channel the classic cost matrix `D` of size `(n+1) x (m+1)` is filled with
//! `D[0][0] = 0`, `D[i][0] = D[0][j] = +inf` and
//! `D[i][j] = |a[i] - b[j]| + min(D[i-1][j], D[i][j-1], D[i-1][j-1])`.
//! The channel distances are summed with equal weight and divided by `n + m` so windows
//! of different length compete on the same footing.
//!
//! Only two rows of `D` are kept at a time; the values are the same as the full matrix.

use crate::{Channel, Result, SearchError, OHLCV};

use super::DistanceMetric;

/// Channels compared by default
pub const DEFAULT_CHANNELS: [Channel; 3] = [Channel::High, Channel::Low, Channel::Close];

/// Unnormalized DTW cost `D[n][m]` between two scalar sequences.
///
/// Both empty is `0.0`; exactly one empty is `+inf` since no warping path exists.
pub fn dtw(a: &[f64], b: &[f64]) -> f64 {
    let mut prev = Vec::new();
    let mut curr = Vec::new();
    dtw_with_buffers(a, b, &mut prev, &mut curr)
}

fn dtw_with_buffers(a: &[f64], b: &[f64], prev: &mut Vec<f64>, curr: &mut Vec<f64>) -> f64 {
    let (n, m) = (a.len(), b.len());
    if n == 0 && m == 0 {
        return 0.0;
    }
    if n == 0 || m == 0 {
        return f64::INFINITY;
    }

    prev.clear();
    prev.resize(m + 1, f64::INFINITY);
    curr.clear();
    curr.resize(m + 1, f64::INFINITY);
    prev[0] = 0.0;

    for &ai in a {
        curr[0] = f64::INFINITY;
        for j in 1..=m {
            let cost = (ai - b[j - 1]).abs();
            curr[j] = cost + prev[j].min(curr[j - 1]).min(prev[j - 1]);
        }
        std::mem::swap(prev, curr);
    }

    prev[m]
}

/// DTW over a set of price channels, normalized by `n + m`
#[derive(Debug, Clone, PartialEq)]
pub struct DtwMetric {
    channels: Vec<Channel>,
}

impl Default for DtwMetric {
    fn default() -> Self {
        Self {
            channels: DEFAULT_CHANNELS.to_vec(),
        }
    }
}

impl DtwMetric {
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// Compare only the given channels. Duplicates are kept and count twice.
    pub fn with_channels(channels: impl IntoIterator<Item = Channel>) -> Result<Self> {
        let channels: Vec<Channel> = channels.into_iter().collect();
        if channels.is_empty() {
            return Err(SearchError::InvalidConfig(
                "DTW needs at least one channel".to_string(),
            ));
        }
        Ok(Self { channels })
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }
}

impl DistanceMetric for DtwMetric {
    fn distance<T: OHLCV>(&self, a: &[T], b: &[T]) -> f64 {
        let (n, m) = (a.len(), b.len());
        if n == 0 && m == 0 {
            return 0.0;
        }
        if n == 0 || m == 0 {
            return f64::INFINITY;
        }

        let mut xs = Vec::with_capacity(n);
        let mut ys = Vec::with_capacity(m);
        let mut prev = Vec::with_capacity(m + 1);
        let mut curr = Vec::with_capacity(m + 1);

        let mut total = 0.0;
        for &channel in &self.channels {
            xs.clear();
            xs.extend(a.iter().map(|bar| channel.value(bar)));
            ys.clear();
            ys.extend(b.iter().map(|bar| channel.value(bar)));
            total += dtw_with_buffers(&xs, &ys, &mut prev, &mut curr);
        }

        total / (n + m) as f64
    }

    fn id(&self) -> String {
        let names: Vec<&str> = self.channels.iter().map(|c| c.as_str()).collect();
        format!("dtw:{}", names.join(","))
    }
}
