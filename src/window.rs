//! Candidate window enumeration
//!
//! Every window starts at the first bar on or after the session anchor time and spans
//! `lookback` consecutive sessions. The target window ends at the resolved target bar;
//! candidates end on their last session according to [`CandidateEnd`].

use std::ops::Range;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::series::{Bar, Session, TimeSeries};
use crate::{LookbackSessions, Result, SearchError};

/// Where a candidate window ends on its last session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateEnd {
    /// Last bar at or before the target end's local time-of-day.
    #[default]
    TargetTimeOfDay,
    /// Last bar of the session.
    SessionClose,
}

/// A contiguous run of bars, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    pub start_index: usize,
    pub end_index: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    #[allow(clippy::len_without_is_empty)]
    #[inline]
    pub fn len(&self) -> usize {
        self.end_index - self.start_index + 1
    }

    #[inline]
    pub fn bars<'a>(&self, series: &'a TimeSeries) -> &'a [Bar] {
        series.slice(self.start_index..=self.end_index)
    }

    #[inline]
    pub fn overlaps(&self, other: &Window) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

#[derive(Debug, Clone, Copy)]
enum EndRule {
    TimeOfDay(NaiveTime),
    SessionClose,
}

/// Enumerates session-anchored windows over one series
#[derive(Debug, Clone, Copy)]
pub struct WindowIndexer<'a> {
    series: &'a TimeSeries,
    anchor: NaiveTime,
    lookback: LookbackSessions,
}

impl<'a> WindowIndexer<'a> {
    pub fn new(series: &'a TimeSeries, anchor: NaiveTime, lookback: LookbackSessions) -> Self {
        Self {
            series,
            anchor,
            lookback,
        }
    }

    /// Resolve the target window ending at the bar `target_end` resolves to.
    pub fn target_window(&self, target_end: DateTime<Utc>, tolerance: Duration) -> Result<Window> {
        let end_index = self.series.resolve(target_end, tolerance)?;
        let session_index = self
            .series
            .session_of(end_index)
            .ok_or_else(|| SearchError::InvalidWindow {
                reason: format!("no session contains {target_end}"),
            })?;

        let lookback = self.lookback.get();
        if session_index + 1 < lookback {
            return Err(SearchError::InvalidWindow {
                reason: format!(
                    "need {lookback} sessions up to {target_end}, only {} available",
                    session_index + 1
                ),
            });
        }

        let first = self.series.sessions()[session_index + 1 - lookback];
        let start_index = self
            .anchor_index(&first)
            .ok_or_else(|| SearchError::InvalidWindow {
                reason: format!("no bar at or after {} on {}", self.anchor, first.date),
            })?;
        if start_index > end_index {
            return Err(SearchError::InvalidWindow {
                reason: format!("target end {target_end} precedes the {} anchor", self.anchor),
            });
        }

        Ok(self.window(start_index, end_index))
    }

    /// Candidates inside `range` that end strictly before `target` starts.
    ///
    /// The iterator is lazy and `Clone`; calling this again restarts the enumeration.
    pub fn candidates(
        &self,
        range: Range<DateTime<Utc>>,
        end: CandidateEnd,
        target: &Window,
    ) -> Candidates<'a> {
        let end_rule = match end {
            CandidateEnd::TargetTimeOfDay => match self.series.local_time(target.end_index) {
                Some(t) => EndRule::TimeOfDay(t),
                None => EndRule::SessionClose,
            },
            CandidateEnd::SessionClose => EndRule::SessionClose,
        };

        let sessions = self.series.sessions();
        let lookback = self.lookback.get();
        let first_in_range = sessions.partition_point(|s| {
            self.series.bars()[s.last].timestamp < range.start
        });

        Candidates {
            indexer: *self,
            next_session: first_in_range + lookback - 1,
            end_rule,
            range,
            target: *target,
            done: false,
        }
    }

    fn anchor_index(&self, session: &Session) -> Option<usize> {
        session
            .indices()
            .find(|&i| self.series.local_time(i).is_some_and(|t| t >= self.anchor))
    }

    fn end_index(&self, session: &Session, rule: EndRule) -> Option<usize> {
        match rule {
            EndRule::SessionClose => Some(session.last),
            EndRule::TimeOfDay(limit) => session
                .indices()
                .rev()
                .find(|&i| self.series.local_time(i).is_some_and(|t| t <= limit)),
        }
    }

    fn window(&self, start_index: usize, end_index: usize) -> Window {
        let bars = self.series.bars();
        Window {
            start_index,
            end_index,
            start: bars[start_index].timestamp,
            end: bars[end_index].timestamp,
        }
    }
}

/// Lazy iterator over eligible candidate windows
#[derive(Debug, Clone)]
pub struct Candidates<'a> {
    indexer: WindowIndexer<'a>,
    next_session: usize,
    end_rule: EndRule,
    range: Range<DateTime<Utc>>,
    target: Window,
    done: bool,
}

impl Iterator for Candidates<'_> {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        let sessions = self.indexer.series.sessions();
        let lookback = self.indexer.lookback.get();

        while !self.done && self.next_session < sessions.len() {
            let last = sessions[self.next_session];
            let first = sessions[self.next_session + 1 - lookback];
            self.next_session += 1;

            let Some(start_index) = self.indexer.anchor_index(&first) else {
                debug!(date = %first.date, "session has no bar at or after the anchor; skipped");
                continue;
            };
            let Some(end_index) = self.indexer.end_index(&last, self.end_rule) else {
                debug!(date = %last.date, "session has no bar before the end time; skipped");
                continue;
            };
            if end_index < start_index {
                continue;
            }

            let window = self.indexer.window(start_index, end_index);
            if window.end >= self.range.end || window.end >= self.target.start {
                // Sessions are ordered, so nothing later can qualify.
                self.done = true;
                return None;
            }
            if window.start < self.range.start {
                continue;
            }
            debug_assert!(!window.overlaps(&self.target));
            return Some(window);
        }

        self.done = true;
        None
    }
}

impl std::iter::FusedIterator for Candidates<'_> {}
