//! Search orchestration
//!
//! [`StrategyRunner`] ties the pieces together: it resolves the target window, walks the
//! candidate windows, scores each one with its [`DistanceMetric`], keeps the best K in a
//! [`TopKSelector`] and reports progress as it goes. Scans are stateless; a runner can be
//! shared across threads and reused for any number of searches.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use chrono::Duration;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::metric::{DistanceMetric, DtwMetric};
use crate::models::MatchResult;
use crate::progress::{ProgressReporter, ProgressTracker};
use crate::search::SearchSpec;
use crate::series::{Bar, TimeSeries};
use crate::topk::TopKSelector;
use crate::window::{Window, WindowIndexer};
use crate::{ProgressStep, Result, SearchError};

// ============================================================
// CONFIG
// ============================================================

/// Runner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Score candidates on the rayon pool instead of the calling thread.
    pub parallel: bool,
    pub progress_step: ProgressStep,
    /// Maximum gap between a requested timestamp and the bar it resolves to.
    /// `None` uses the series' bar interval.
    #[serde(deserialize_with = "deserialize_tolerance")]
    pub resolve_tolerance_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            progress_step: ProgressStep::default(),
            resolve_tolerance_secs: None,
        }
    }
}

impl EngineConfig {
    fn tolerance_for(&self, series: &TimeSeries) -> Result<Duration> {
        match self.resolve_tolerance_secs {
            Some(secs) => tolerance_from_secs(secs),
            None => Ok(series.interval().unwrap_or_else(Duration::zero)),
        }
    }
}

/// Largest tolerance a [`Duration`] can hold, in whole seconds.
pub const MAX_RESOLVE_TOLERANCE_SECS: u64 = (i64::MAX / 1_000) as u64;

fn tolerance_from_secs(secs: u64) -> Result<Duration> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| {
            SearchError::InvalidConfig(format!(
                "resolve tolerance {secs}s exceeds {MAX_RESOLVE_TOLERANCE_SECS}s"
            ))
        })
}

fn deserialize_tolerance<'de, D>(d: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<u64>::deserialize(d)?;
    if let Some(secs) = value {
        tolerance_from_secs(secs).map_err(serde::de::Error::custom)?;
    }
    Ok(value)
}

// ============================================================
// RUNNER
// ============================================================

/// Similarity-search engine
#[derive(Debug, Clone)]
pub struct StrategyRunner<M: DistanceMetric = DtwMetric> {
    metric: M,
    config: EngineConfig,
}

impl Default for StrategyRunner<DtwMetric> {
    fn default() -> Self {
        Self::new(DtwMetric::default(), EngineConfig::default())
    }
}

impl<M: DistanceMetric> StrategyRunner<M> {
    pub fn new(metric: M, config: EngineConfig) -> Self {
        Self { metric, config }
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn metric(&self) -> &M {
        &self.metric
    }

    /// Everything about this runner that can change a search result.
    pub fn cache_identity(&self) -> String {
        match self.config.resolve_tolerance_secs {
            Some(secs) => format!("{};tolerance={secs}s", self.metric.id()),
            None => format!("{};tolerance=auto", self.metric.id()),
        }
    }

    /// Find the `spec.top_k` windows closest to the target, best first.
    ///
    /// An empty candidate set is not an error; the result is simply empty.
    pub fn search(
        &self,
        series: &TimeSeries,
        spec: &SearchSpec,
        reporter: Option<&dyn ProgressReporter>,
    ) -> Result<Vec<MatchResult>> {
        self.search_with_token(series, spec, reporter, &CancellationToken::new())
    }

    /// Like [`search`](Self::search), but abandons the scan between candidates once
    /// `token` is cancelled and returns [`SearchError::Cancelled`].
    pub fn search_with_token(
        &self,
        series: &TimeSeries,
        spec: &SearchSpec,
        reporter: Option<&dyn ProgressReporter>,
        token: &CancellationToken,
    ) -> Result<Vec<MatchResult>> {
        if token.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let started = Instant::now();
        let indexer = WindowIndexer::new(series, spec.anchor_time, spec.lookback);
        let target = indexer.target_window(spec.target_end, self.config.tolerance_for(series)?)?;
        let target_bars = target.bars(series);

        let candidates: Vec<Window> = indexer
            .candidates(spec.search_start..spec.search_end, spec.candidate_end, &target)
            .collect();

        info!(
            target_start = %target.start,
            target_end = %target.end,
            target_bars = target.len(),
            candidates = candidates.len(),
            top_k = spec.top_k.get(),
            parallel = self.config.parallel,
            "Similarity scan started"
        );

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let tracker = ProgressTracker::new(reporter, candidates.len(), self.config.progress_step);
        let k = spec.top_k.get();

        let selector = if self.config.parallel {
            self.scan_parallel(series, target_bars, &candidates, k, &tracker, token)?
        } else {
            self.scan_sequential(series, target_bars, &candidates, k, &tracker, token)?
        };
        tracker.finish();

        let matches = selector.into_sorted_vec();
        info!(
            matches = matches.len(),
            best_score = ?matches.first().map(|m| m.score),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Similarity scan finished"
        );
        Ok(matches)
    }

    fn scan_sequential(
        &self,
        series: &TimeSeries,
        target: &[Bar],
        candidates: &[Window],
        k: usize,
        tracker: &ProgressTracker<'_>,
        token: &CancellationToken,
    ) -> Result<TopKSelector> {
        let mut selector = TopKSelector::new(k);
        for window in candidates {
            if token.is_cancelled() {
                return Err(SearchError::Cancelled);
            }
            if let Some(scored) = self.score(series, target, window) {
                selector.offer(scored);
            }
            tracker.record();
        }
        Ok(selector)
    }

    fn scan_parallel(
        &self,
        series: &TimeSeries,
        target: &[Bar],
        candidates: &[Window],
        k: usize,
        tracker: &ProgressTracker<'_>,
        token: &CancellationToken,
    ) -> Result<TopKSelector> {
        candidates
            .par_iter()
            .try_fold(
                || TopKSelector::new(k),
                |mut selector, window| {
                    if token.is_cancelled() {
                        return Err(SearchError::Cancelled);
                    }
                    if let Some(scored) = self.score(series, target, window) {
                        selector.offer(scored);
                    }
                    tracker.record();
                    Ok(selector)
                },
            )
            .try_reduce(
                || TopKSelector::new(k),
                |mut left, right| {
                    left.merge(right);
                    Ok(left)
                },
            )
    }

    fn score(&self, series: &TimeSeries, target: &[Bar], window: &Window) -> Option<MatchResult> {
        let score = self.metric.distance(target, window.bars(series));
        if !score.is_finite() {
            warn!(
                start = %window.start,
                end = %window.end,
                score,
                "Candidate produced a non-finite score; dropped"
            );
            return None;
        }
        Some(MatchResult {
            start: window.start,
            end: window.end,
            score,
        })
    }
}

impl<M> StrategyRunner<M>
where
    M: DistanceMetric + Clone + 'static,
{
    /// Run a search on a background thread.
    ///
    /// The returned [`ScanTask`] owns the only completion event: [`ScanTask::join`].
    pub fn spawn(
        &self,
        series: Arc<TimeSeries>,
        spec: SearchSpec,
        reporter: Option<Arc<dyn ProgressReporter>>,
    ) -> Result<ScanTask> {
        let token = CancellationToken::new();
        let runner = self.clone();
        let worker_token = token.clone();

        let handle = std::thread::Builder::new()
            .name("simsearch-scan".to_string())
            .spawn(move || {
                runner.search_with_token(&series, &spec, reporter.as_deref(), &worker_token)
            })
            .map_err(|e| SearchError::Spawn(e.to_string()))?;

        Ok(ScanTask { handle, token })
    }
}

// ============================================================
// BACKGROUND TASK
// ============================================================

/// Handle to a search running on its own thread
#[derive(Debug)]
pub struct ScanTask {
    handle: JoinHandle<Result<Vec<MatchResult>>>,
    token: CancellationToken,
}

impl ScanTask {
    /// Ask the scan to stop at the next candidate boundary.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the scan and take its result.
    pub fn join(self) -> Result<Vec<MatchResult>> {
        self.handle
            .join()
            .map_err(|_| SearchError::WorkerPanicked)?
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for [`StrategyRunner`]
#[derive(Debug, Clone)]
pub struct EngineBuilder<M: DistanceMetric = DtwMetric> {
    metric: M,
    parallel: bool,
    progress_step: f64,
    resolve_tolerance: Option<Duration>,
}

impl Default for EngineBuilder<DtwMetric> {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder<DtwMetric> {
    pub fn new() -> Self {
        Self {
            metric: DtwMetric::default(),
            parallel: true,
            progress_step: ProgressStep::default().get(),
            resolve_tolerance: None,
        }
    }
}

impl<M: DistanceMetric> EngineBuilder<M> {
    /// Change distance metric
    pub fn metric<M2: DistanceMetric>(self, metric: M2) -> EngineBuilder<M2> {
        EngineBuilder {
            metric,
            parallel: self.parallel,
            progress_step: self.progress_step,
            resolve_tolerance: self.resolve_tolerance,
        }
    }

    /// Enable/disable the rayon scan
    pub fn parallel(mut self, enable: bool) -> Self {
        self.parallel = enable;
        self
    }

    /// Minimum fraction advance between progress reports
    pub fn progress_step(mut self, step: f64) -> Self {
        self.progress_step = step;
        self
    }

    /// Maximum distance back to the bar a timestamp resolves to
    pub fn resolve_tolerance(mut self, tolerance: Duration) -> Self {
        self.resolve_tolerance = Some(tolerance);
        self
    }

    /// Build the runner
    pub fn build(self) -> Result<StrategyRunner<M>> {
        let progress_step = ProgressStep::new(self.progress_step)?;
        let resolve_tolerance_secs = match self.resolve_tolerance {
            Some(t) => Some(u64::try_from(t.num_seconds()).map_err(|_| {
                SearchError::InvalidConfig(format!("negative resolve tolerance: {t}"))
            })?),
            None => None,
        };

        Ok(StrategyRunner::new(
            self.metric,
            EngineConfig {
                parallel: self.parallel,
                progress_step,
                resolve_tolerance_secs,
            },
        ))
    }
}
