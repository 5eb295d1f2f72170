//! Search results and their display-ready form
//!
//! [`WindowMatch`] (de)serializes through [`WindowMatchRecord`], a versioned record with
//! the window as an ordered list of bars, RFC 3339 timestamps and a float score.

use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::series::Bar;
use crate::{Result, SearchError};

/// Current [`WindowMatchRecord`] format version
pub const WINDOW_MATCH_VERSION: u32 = 1;

/// A ranked candidate window. Smaller score is more similar; `0.0` is identical.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub score: f64,
}

/// A matched window followed by its projection, ready for charting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "WindowMatchRecord", try_from = "WindowMatchRecord")]
pub struct WindowMatch {
    /// Matched bars immediately followed by the projection bars
    pub window: Vec<Bar>,
    pub match_end: DateTime<Utc>,
    pub projection_start: DateTime<Utc>,
    pub score: f64,
}

impl WindowMatch {
    /// Bars of the matched window, without the projection.
    pub fn match_window(&self) -> &[Bar] {
        &self.window[..self.split_index()]
    }

    /// Bars from `projection_start` on.
    pub fn projection(&self) -> &[Bar] {
        &self.window[self.split_index()..]
    }

    fn split_index(&self) -> usize {
        self.window
            .partition_point(|b| b.timestamp < self.projection_start)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl PartialEq for WindowMatch {
    fn eq(&self, other: &Self) -> bool {
        self.match_end == other.match_end && self.projection_start == other.projection_start
    }
}

impl Eq for WindowMatch {}

impl Hash for WindowMatch {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.match_end.hash(state);
        self.projection_start.hash(state);
    }
}

/// Serialized form of [`WindowMatch`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowMatchRecord {
    pub version: u32,
    pub window: Vec<Bar>,
    pub match_end: DateTime<Utc>,
    pub projection_start: DateTime<Utc>,
    pub score: f64,
}

impl From<WindowMatch> for WindowMatchRecord {
    fn from(m: WindowMatch) -> Self {
        Self {
            version: WINDOW_MATCH_VERSION,
            window: m.window,
            match_end: m.match_end,
            projection_start: m.projection_start,
            score: m.score,
        }
    }
}

impl TryFrom<WindowMatchRecord> for WindowMatch {
    type Error = SearchError;

    fn try_from(r: WindowMatchRecord) -> Result<Self> {
        if r.version != WINDOW_MATCH_VERSION {
            return Err(SearchError::Serialization(format!(
                "unsupported window match version {} (expected {})",
                r.version, WINDOW_MATCH_VERSION
            )));
        }
        if let Some(i) = r
            .window
            .windows(2)
            .position(|pair| pair[1].timestamp <= pair[0].timestamp)
        {
            return Err(SearchError::UnorderedTimestamps { index: i + 1 });
        }
        if r.projection_start <= r.match_end {
            return Err(SearchError::Serialization(
                "projection_start must follow match_end".to_string(),
            ));
        }
        Ok(Self {
            window: r.window,
            match_end: r.match_end,
            projection_start: r.projection_start,
            score: r.score,
        })
    }
}
