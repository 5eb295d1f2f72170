//! Strongly typed price bars and the read-only series the search runs over.
//!
//! A [`TimeSeries`] carries the IANA zone its sessions live in. Session boundaries are
//! local calendar days: the data layer is expected to have trimmed the series to active
//! trading hours, so every run of bars sharing a local date is one session.

use std::ops::RangeInclusive;
use std::sync::OnceLock;

use chrono::{
    DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Result, SearchError, OHLCV};

/// Zone used when the caller does not name one (US equity sessions).
pub const DEFAULT_TZ: Tz = chrono_tz::America::New_York;

// ============================================================
// BAR
// ============================================================

/// One sampling interval of OHLCV data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Check the read contract for a single bar.
    pub fn validate(&self) -> Result<()> {
        let values = [self.open, self.high, self.low, self.close, self.volume];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(SearchError::InvalidBar {
                index: 0,
                reason: "non-finite value",
            });
        }
        if values.iter().any(|v| *v < 0.0) {
            return Err(SearchError::InvalidBar {
                index: 0,
                reason: "negative value",
            });
        }
        if self.open <= 0.0 || self.close <= 0.0 {
            return Err(SearchError::InvalidBar {
                index: 0,
                reason: "open and close must be positive",
            });
        }
        if self.high < self.low {
            return Err(SearchError::InvalidBar {
                index: 0,
                reason: "high < low",
            });
        }
        Ok(())
    }
}

impl OHLCV for Bar {
    #[inline]
    fn open(&self) -> f64 {
        self.open
    }

    #[inline]
    fn high(&self) -> f64 {
        self.high
    }

    #[inline]
    fn low(&self) -> f64 {
        self.low
    }

    #[inline]
    fn close(&self) -> f64 {
        self.close
    }

    #[inline]
    fn volume(&self) -> f64 {
        self.volume
    }
}

// ============================================================
// SESSIONS
// ============================================================

/// A run of bars sharing one local calendar date. Indices are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub date: NaiveDate,
    pub first: usize,
    pub last: usize,
}

impl Session {
    #[inline]
    pub fn indices(&self) -> RangeInclusive<usize> {
        self.first..=self.last
    }

    /// Number of bars; a session always holds at least one.
    #[allow(clippy::len_without_is_empty)]
    #[inline]
    pub fn len(&self) -> usize {
        self.last - self.first + 1
    }
}

/// How to map a local wall-clock time that is ambiguous or skipped by a DST change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DstPolicy {
    /// Error on both ambiguous (fall-back) and nonexistent (spring-forward) times.
    #[default]
    Strict,
    /// Pick the earlier instant of an ambiguous time.
    PreferEarliest,
    /// Pick the later instant of an ambiguous time.
    PreferLatest,
}

// ============================================================
// TIME SERIES
// ============================================================

/// Immutable, strictly ordered bars plus the zone their sessions are defined in.
#[derive(Debug, Clone)]
pub struct TimeSeries {
    bars: Vec<Bar>,
    tz: Tz,
    sessions: Vec<Session>,
    fingerprint: OnceLock<String>,
}

impl TimeSeries {
    /// Validate and index `bars`. Timestamps must be strictly increasing.
    pub fn new(bars: Vec<Bar>, tz: Tz) -> Result<Self> {
        for (i, bar) in bars.iter().enumerate() {
            bar.validate().map_err(|e| match e {
                SearchError::InvalidBar { reason, .. } => SearchError::InvalidBar { index: i, reason },
                other => other,
            })?;
        }
        if let Some(i) = bars
            .windows(2)
            .position(|pair| pair[1].timestamp <= pair[0].timestamp)
        {
            return Err(SearchError::UnorderedTimestamps { index: i + 1 });
        }

        let sessions = build_sessions(&bars, tz);
        Ok(Self {
            bars,
            tz,
            sessions,
            fingerprint: OnceLock::new(),
        })
    }

    /// Build a series in [`DEFAULT_TZ`].
    pub fn with_default_tz(bars: Vec<Bar>) -> Result<Self> {
        Self::new(bars, DEFAULT_TZ)
    }

    #[inline]
    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    #[inline]
    pub fn tz(&self) -> Tz {
        self.tz
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index)
    }

    #[inline]
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Index into [`Self::sessions`] of the session containing bar `index`.
    pub fn session_of(&self, index: usize) -> Option<usize> {
        if index >= self.bars.len() {
            return None;
        }
        let pos = self.sessions.partition_point(|s| s.last < index);
        (pos < self.sessions.len()).then_some(pos)
    }

    /// Local wall-clock time of bar `index`.
    pub fn local_time(&self, index: usize) -> Option<NaiveTime> {
        self.bars
            .get(index)
            .map(|b| b.timestamp.with_timezone(&self.tz).time())
    }

    /// Exact timestamp lookup.
    pub fn index_of(&self, timestamp: DateTime<Utc>) -> Option<usize> {
        self.bars
            .binary_search_by_key(&timestamp, |b| b.timestamp)
            .ok()
    }

    /// Last bar at or before `timestamp`.
    pub fn index_at_or_before(&self, timestamp: DateTime<Utc>) -> Option<usize> {
        let pos = self.bars.partition_point(|b| b.timestamp <= timestamp);
        pos.checked_sub(1)
    }

    /// Resolve `timestamp` to the last bar at or before it, no further away than `tolerance`.
    pub fn resolve(&self, timestamp: DateTime<Utc>, tolerance: Duration) -> Result<usize> {
        let gap = || SearchError::DataGap {
            timestamp,
            tolerance_secs: tolerance.num_seconds(),
        };
        let index = self.index_at_or_before(timestamp).ok_or_else(gap)?;
        if timestamp - self.bars[index].timestamp > tolerance {
            return Err(gap());
        }
        Ok(index)
    }

    /// Smallest positive spacing between consecutive bars.
    pub fn interval(&self) -> Option<Duration> {
        self.bars
            .windows(2)
            .map(|pair| pair[1].timestamp - pair[0].timestamp)
            .min()
    }

    /// Bars `range`, clamped to the series.
    pub fn slice(&self, range: RangeInclusive<usize>) -> &[Bar] {
        if self.bars.is_empty() || *range.start() >= self.bars.len() {
            return &[];
        }
        let end = (*range.end()).min(self.bars.len() - 1);
        if *range.start() > end {
            return &[];
        }
        &self.bars[*range.start()..=end]
    }

    /// Bars with `start <= timestamp <= end`.
    pub fn slice_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> &[Bar] {
        let lo = self.bars.partition_point(|b| b.timestamp < start);
        let hi = self.bars.partition_point(|b| b.timestamp <= end);
        if lo >= hi {
            return &[];
        }
        &self.bars[lo..hi]
    }

    /// Convert a wall-clock time in this series' zone to UTC, erroring on DST edge cases.
    pub fn localize(&self, naive: NaiveDateTime) -> Result<DateTime<Utc>> {
        self.localize_with(naive, DstPolicy::Strict)
    }

    pub fn localize_with(&self, naive: NaiveDateTime, policy: DstPolicy) -> Result<DateTime<Utc>> {
        match self.tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(a, b) => match policy {
                DstPolicy::PreferEarliest => Ok(a.with_timezone(&Utc)),
                DstPolicy::PreferLatest => Ok(b.with_timezone(&Utc)),
                DstPolicy::Strict => Err(SearchError::AmbiguousLocalTime(naive)),
            },
            LocalResult::None => Err(SearchError::AmbiguousLocalTime(naive)),
        }
    }

    /// SHA-256 over the zone and every bar, hex encoded. Computed once.
    pub fn fingerprint(&self) -> &str {
        self.fingerprint.get_or_init(|| {
            let mut hasher = Sha256::new();
            hasher.update(self.tz.name().as_bytes());
            for bar in &self.bars {
                hasher.update(bar.timestamp.timestamp_millis().to_le_bytes());
                for v in [bar.open, bar.high, bar.low, bar.close, bar.volume] {
                    hasher.update(v.to_bits().to_le_bytes());
                }
            }
            hex::encode(hasher.finalize())
        })
    }
}

fn build_sessions(bars: &[Bar], tz: Tz) -> Vec<Session> {
    let mut sessions: Vec<Session> = Vec::new();
    for (i, bar) in bars.iter().enumerate() {
        let date = bar.timestamp.with_timezone(&tz).date_naive();
        match sessions.last_mut() {
            Some(s) if s.date == date => s.last = i,
            _ => sessions.push(Session {
                date,
                first: i,
                last: i,
            }),
        }
    }
    sessions
}
