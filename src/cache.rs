//! Content-addressed cache of search results
//!
//! Keys are SHA-256 digests over the series fingerprint, the canonical JSON of the
//! [`SearchSpec`] and the runner's [`cache_identity`](StrategyRunner::cache_identity), so
//! a hit is only possible for inputs that would produce the same result. Entries are kept
//! in insertion order and the oldest is evicted once the cache is full.

use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::metric::DistanceMetric;
use crate::models::MatchResult;
use crate::progress::ProgressReporter;
use crate::runner::StrategyRunner;
use crate::search::SearchSpec;
use crate::series::TimeSeries;
use crate::Result;

pub const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
struct Entry {
    fingerprint: String,
    matches: Vec<MatchResult>,
}

/// Bounded map from search inputs to ranked matches
#[derive(Debug, Clone)]
pub struct SearchCache {
    capacity: usize,
    entries: IndexMap<String, Entry>,
}

impl Default for SearchCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl SearchCache {
    /// A cache holding at most `capacity` results. Zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: IndexMap::with_capacity(capacity.min(DEFAULT_CAPACITY)),
        }
    }

    /// Hex digest identifying one search.
    pub fn key<M: DistanceMetric>(
        series: &TimeSeries,
        spec: &SearchSpec,
        runner: &StrategyRunner<M>,
    ) -> Result<String> {
        let spec_bytes = spec.canonical_bytes()?;
        let identity = runner.cache_identity();
        let parts: [&[u8]; 3] = [
            series.fingerprint().as_bytes(),
            &spec_bytes,
            identity.as_bytes(),
        ];

        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        Ok(hex::encode(hasher.finalize()))
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&[MatchResult]> {
        self.entries.get(key).map(|e| e.matches.as_slice())
    }

    /// Store `matches` for `series` under `key`, evicting the oldest entry if full.
    pub fn insert(&mut self, key: String, series: &TimeSeries, matches: Vec<MatchResult>) {
        if self.capacity == 0 {
            return;
        }
        if !self.entries.contains_key(&key) {
            while self.entries.len() >= self.capacity {
                if let Some((evicted, _)) = self.entries.shift_remove_index(0) {
                    debug!(key = %evicted, "Evicted oldest cached search");
                }
            }
        }
        self.entries.insert(
            key,
            Entry {
                fingerprint: series.fingerprint().to_string(),
                matches,
            },
        );
    }

    /// Cached result if present, otherwise run the search and remember it.
    ///
    /// A non-empty hit reports `1.0` so the reporter sees the same final value as after a
    /// scan. Failed searches are not cached.
    pub fn get_or_search<M: DistanceMetric>(
        &mut self,
        runner: &StrategyRunner<M>,
        series: &TimeSeries,
        spec: &SearchSpec,
        reporter: Option<&dyn ProgressReporter>,
    ) -> Result<Vec<MatchResult>> {
        let key = Self::key(series, spec, runner)?;
        if let Some(hit) = self.get(&key) {
            debug!(key = %key, "Search cache hit");
            if let (Some(reporter), false) = (reporter, hit.is_empty()) {
                reporter.report(1.0);
            }
            return Ok(hit.to_vec());
        }
        debug!(key = %key, "Search cache miss");

        let matches = runner.search(series, spec, reporter)?;
        self.insert(key, series, matches.clone());
        Ok(matches)
    }

    /// Drop every entry computed from the series with this fingerprint.
    pub fn invalidate_series(&mut self, fingerprint: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.fingerprint != fingerprint);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
