//! # simsearch - market similarity search
//!
//! Finds historical intraday windows that behaved like a chosen target window, so the
//! trader can study what followed them. Candidate windows are anchored to a session
//! time-of-day, scored against the target with multi-channel Dynamic Time Warping and the
//! best K are kept.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{Duration, NaiveDate, TimeZone, Utc};
//! use simsearch::prelude::*;
//!
//! // Three sessions of 5-minute bars from 09:30 New York time.
//! let mut bars = Vec::new();
//! for day in 1..=3u32 {
//!     let open = NaiveDate::from_ymd_opt(2024, 7, day).unwrap().and_hms_opt(9, 30, 0).unwrap();
//!     let open = DEFAULT_TZ.from_local_datetime(&open).unwrap().with_timezone(&Utc);
//!     for k in 0..12u32 {
//!         let c = 100.0 + ((day * 7 + k * 3) % 11) as f64 * 0.1;
//!         let ts = open + Duration::minutes(5 * k as i64);
//!         bars.push(Bar::new(ts, c, c + 0.5, c - 0.5, c, 1_000.0));
//!     }
//! }
//! let series = TimeSeries::with_default_tz(bars).unwrap();
//!
//! // Search everything before the last session for its two closest analogues.
//! let target_end = series.bars().last().unwrap().timestamp;
//! let spec = SearchSpec::builder().target_end(target_end).top_k(2).build().unwrap();
//! let runner = EngineBuilder::new().build().unwrap();
//!
//! let matches = runner.search(&series, &spec, None).unwrap();
//! assert_eq!(matches.len(), 2);
//! assert!(matches[0].score <= matches[1].score);
//! ```

pub mod assemble;
pub mod cache;
pub mod metric;
pub mod models;
pub mod params;
pub mod progress;
pub mod runner;
pub mod search;
pub mod series;
pub mod topk;
pub mod window;

pub mod prelude {
    pub use crate::{
        // Assembly
        assemble::MatchAssembler,
        // Cache
        cache::SearchCache,
        // Metrics
        metric::{dtw, DistanceMetric, DtwMetric},
        // Models
        models::{MatchResult, WindowMatch, WindowMatchRecord},
        // Progress
        progress::{NoProgress, ProgressReporter},
        // Runner
        runner::{EngineBuilder, EngineConfig, ScanTask, StrategyRunner},
        // Parallel
        search_many,
        // Search parameters
        search::{SearchSpec, SearchSpecBuilder},
        // Data
        series::{Bar, DstPolicy, Session, TimeSeries, DEFAULT_TZ},
        topk::TopKSelector,
        window::{CandidateEnd, Window, WindowIndexer},
        // Types
        Channel,
        LookbackSessions,
        ProgressStep,
        Result,
        SearchError,
        SearchFailure,
        SearchOutcome,
        TopK,
        OHLCV,
    };
    pub use tokio_util::sync::CancellationToken;
}

use chrono::{DateTime, NaiveDateTime, Utc};

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors that can occur while searching or assembling matches
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    /// The target window cannot be formed from the history before `target_end`.
    #[error("Invalid target window: {reason}")]
    InvalidWindow { reason: String },

    /// A requested timestamp has no bar within tolerance.
    #[error("No bar within {tolerance_secs}s at or before {timestamp}")]
    DataGap {
        timestamp: DateTime<Utc>,
        tolerance_secs: i64,
    },

    /// No bar follows a match's end, so there is nothing to project.
    #[error("No projection available after {match_end}")]
    ProjectionUnavailable { match_end: DateTime<Utc> },

    #[error("Search cancelled")]
    Cancelled,

    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid bar at index {index}: {reason}")]
    InvalidBar { index: usize, reason: &'static str },

    #[error("Timestamps not strictly increasing at index {index}")]
    UnorderedTimestamps { index: usize },

    #[error("Local time {0} is ambiguous or skipped in the series time zone")]
    AmbiguousLocalTime(NaiveDateTime),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Failed to spawn scan worker: {0}")]
    Spawn(String),

    #[error("Scan worker panicked")]
    WorkerPanicked,
}

impl From<serde_json::Error> for SearchError {
    fn from(e: serde_json::Error) -> Self {
        SearchError::Serialization(e.to_string())
    }
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Number of consecutive sessions a window spans (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LookbackSessions(usize);

impl LookbackSessions {
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(SearchError::InvalidValue("LookbackSessions must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for LookbackSessions {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for LookbackSessions {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        LookbackSessions::new(value).map_err(serde::de::Error::custom)
    }
}

/// Number of matches to keep (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TopK(usize);

impl TopK {
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(SearchError::InvalidValue("TopK must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for TopK {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for TopK {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        TopK::new(value).map_err(serde::de::Error::custom)
    }
}

/// Minimum advance of the scan fraction between progress reports, in (0.0, 1.0]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ProgressStep(f64);

impl ProgressStep {
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(SearchError::InvalidValue(
                "ProgressStep cannot be NaN or infinite",
            ));
        }
        if value <= 0.0 || value > 1.0 {
            return Err(SearchError::OutOfRange {
                field: "ProgressStep",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl Default for ProgressStep {
    fn default() -> Self {
        Self(0.01)
    }
}

impl serde::Serialize for ProgressStep {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for ProgressStep {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        ProgressStep::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;
}

/// Named price channel of a bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl Channel {
    #[inline]
    pub fn value<T: OHLCV>(self, bar: &T) -> f64 {
        match self {
            Channel::Open => bar.open(),
            Channel::High => bar.high(),
            Channel::Low => bar.low(),
            Channel::Close => bar.close(),
            Channel::Volume => bar.volume(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Open => "open",
            Channel::High => "high",
            Channel::Low => "low",
            Channel::Close => "close",
            Channel::Volume => "volume",
        }
    }
}

// ============================================================
// PARALLEL SEARCH
// ============================================================

use metric::DistanceMetric;
use models::MatchResult;
use rayon::prelude::*;
use runner::StrategyRunner;
use search::SearchSpec;
use series::TimeSeries;

/// Result of searching a single instrument
#[derive(Debug)]
pub struct SearchOutcome {
    pub symbol: String,
    pub matches: Vec<MatchResult>,
}

/// Error from searching a single instrument
#[derive(Debug)]
pub struct SearchFailure {
    pub symbol: String,
    pub error: SearchError,
}

/// Run one search spec across several instruments in parallel
pub fn search_many<'a, M, I>(
    runner: &StrategyRunner<M>,
    spec: &SearchSpec,
    instruments: I,
) -> (Vec<SearchOutcome>, Vec<SearchFailure>)
where
    M: DistanceMetric,
    I: IntoParallelIterator<Item = (&'a str, &'a TimeSeries)>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, series)| {
            runner
                .search(series, spec, None)
                .map(|matches| SearchOutcome {
                    symbol: symbol.to_string(),
                    matches,
                })
                .map_err(|error| SearchFailure {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================
