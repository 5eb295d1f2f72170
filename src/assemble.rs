//! Turning ranked matches into chartable windows

use tracing::warn;

use crate::models::{MatchResult, WindowMatch};
use crate::series::TimeSeries;
use crate::{Result, SearchError};

/// Expands [`MatchResult`]s into [`WindowMatch`]es against the series they came from
#[derive(Debug, Clone, Copy)]
pub struct MatchAssembler<'a> {
    series: &'a TimeSeries,
}

impl<'a> MatchAssembler<'a> {
    pub fn new(series: &'a TimeSeries) -> Self {
        Self { series }
    }

    /// Matched bars plus the rest of the session that follows them.
    ///
    /// The projection starts at the bar right after `result.end` and runs to the last bar
    /// of that bar's session.
    pub fn assemble(&self, result: &MatchResult) -> Result<WindowMatch> {
        let series = self.series;
        let start_index = series.index_of(result.start).ok_or(SearchError::DataGap {
            timestamp: result.start,
            tolerance_secs: 0,
        })?;
        let end_index = series.index_of(result.end).ok_or(SearchError::DataGap {
            timestamp: result.end,
            tolerance_secs: 0,
        })?;
        if end_index < start_index {
            return Err(SearchError::InvalidWindow {
                reason: format!("match ends at {} before it starts at {}", result.end, result.start),
            });
        }

        let projection_index = end_index + 1;
        let projection_start = series
            .get(projection_index)
            .map(|bar| bar.timestamp)
            .ok_or(SearchError::ProjectionUnavailable {
                match_end: result.end,
            })?;
        let projection_end = series
            .session_of(projection_index)
            .map(|s| series.sessions()[s].last)
            .unwrap_or(series.len() - 1);

        Ok(WindowMatch {
            window: series.slice(start_index..=projection_end).to_vec(),
            match_end: result.end,
            projection_start,
            score: result.score,
        })
    }

    /// Assemble every match, skipping the ones that fail.
    pub fn assemble_all(&self, results: &[MatchResult]) -> Vec<WindowMatch> {
        results
            .iter()
            .filter_map(|result| match self.assemble(result) {
                Ok(window) => Some(window),
                Err(error) => {
                    warn!(
                        %error,
                        start = %result.start,
                        end = %result.end,
                        "Skipping match that could not be assembled"
                    );
                    None
                }
            })
            .collect()
    }
}
