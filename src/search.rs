//! Caller-supplied search parameters

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::params::{LOOKBACK_SESSIONS, TOP_K};
use crate::window::CandidateEnd;
use crate::{LookbackSessions, Result, SearchError, TopK};

/// What to search for and where
///
/// Deserialization goes through [`SearchSpecBuilder::build`], so loaded specs obey the
/// same parameter bounds as built ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SearchSpecRecord")]
pub struct SearchSpec {
    /// Candidates must start at or after this instant.
    pub search_start: DateTime<Utc>,
    /// Candidates must end strictly before this instant.
    pub search_end: DateTime<Utc>,
    /// Session anchor, in the series' local time.
    pub anchor_time: NaiveTime,
    pub lookback: LookbackSessions,
    pub target_end: DateTime<Utc>,
    pub top_k: TopK,
    pub candidate_end: CandidateEnd,
}

impl SearchSpec {
    pub fn builder() -> SearchSpecBuilder {
        SearchSpecBuilder::default()
    }

    /// Stable byte form used for cache keys.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Builder for [`SearchSpec`]
///
/// Only `target_end` is required. The search range defaults to everything from the Unix
/// epoch up to the target, the anchor to 09:30, the lookback to one session and K to five.
#[derive(Debug, Clone, Default)]
pub struct SearchSpecBuilder {
    search_start: Option<DateTime<Utc>>,
    search_end: Option<DateTime<Utc>>,
    anchor_time: Option<NaiveTime>,
    lookback: Option<usize>,
    target_end: Option<DateTime<Utc>>,
    top_k: Option<usize>,
    candidate_end: CandidateEnd,
}

impl SearchSpecBuilder {
    pub fn search_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.search_start = Some(start);
        self.search_end = Some(end);
        self
    }

    pub fn search_start(mut self, start: DateTime<Utc>) -> Self {
        self.search_start = Some(start);
        self
    }

    pub fn search_end(mut self, end: DateTime<Utc>) -> Self {
        self.search_end = Some(end);
        self
    }

    pub fn anchor_time(mut self, anchor: NaiveTime) -> Self {
        self.anchor_time = Some(anchor);
        self
    }

    pub fn lookback_sessions(mut self, sessions: usize) -> Self {
        self.lookback = Some(sessions);
        self
    }

    pub fn target_end(mut self, target_end: DateTime<Utc>) -> Self {
        self.target_end = Some(target_end);
        self
    }

    pub fn top_k(mut self, k: usize) -> Self {
        self.top_k = Some(k);
        self
    }

    pub fn candidate_end(mut self, rule: CandidateEnd) -> Self {
        self.candidate_end = rule;
        self
    }

    /// Validate and build. Lookback and K are checked against the parameter table.
    pub fn build(self) -> Result<SearchSpec> {
        let target_end = self
            .target_end
            .ok_or_else(|| SearchError::InvalidConfig("target_end is required".to_string()))?;

        let lookback = self.lookback.unwrap_or(LOOKBACK_SESSIONS.default as usize);
        LOOKBACK_SESSIONS.validate(lookback as f64)?;
        let top_k = self.top_k.unwrap_or(TOP_K.default as usize);
        TOP_K.validate(top_k as f64)?;

        let anchor_time = match self.anchor_time {
            Some(t) => t,
            None => NaiveTime::from_hms_opt(9, 30, 0)
                .ok_or(SearchError::InvalidValue("invalid default anchor"))?,
        };

        Ok(SearchSpec {
            search_start: self.search_start.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            search_end: self.search_end.unwrap_or(target_end),
            anchor_time,
            lookback: LookbackSessions::new(lookback)?,
            target_end,
            top_k: TopK::new(top_k)?,
            candidate_end: self.candidate_end,
        })
    }
}

/// Unchecked wire form of [`SearchSpec`]
#[derive(Deserialize)]
struct SearchSpecRecord {
    search_start: DateTime<Utc>,
    search_end: DateTime<Utc>,
    anchor_time: NaiveTime,
    lookback: usize,
    target_end: DateTime<Utc>,
    top_k: usize,
    #[serde(default)]
    candidate_end: CandidateEnd,
}

impl TryFrom<SearchSpecRecord> for SearchSpec {
    type Error = SearchError;

    fn try_from(r: SearchSpecRecord) -> Result<Self> {
        SearchSpec::builder()
            .search_range(r.search_start, r.search_end)
            .anchor_time(r.anchor_time)
            .lookback_sessions(r.lookback)
            .target_end(r.target_end)
            .top_k(r.top_k)
            .candidate_end(r.candidate_end)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn target() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 1, 16, 0, 0).unwrap()
    }

    #[test]
    fn test_defaults() {
        let spec = SearchSpec::builder().target_end(target()).build().unwrap();
        assert_eq!(spec.anchor_time, NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        assert_eq!(spec.lookback.get(), 1);
        assert_eq!(spec.top_k.get(), 5);
        assert_eq!(spec.search_end, target());
        assert_eq!(spec.candidate_end, CandidateEnd::TargetTimeOfDay);
    }

    #[test]
    fn test_requires_target_end() {
        assert!(matches!(
            SearchSpec::builder().build(),
            Err(SearchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_bounds_enforced() {
        let b = || SearchSpec::builder().target_end(target());
        assert!(b().lookback_sessions(0).build().is_err());
        assert!(b().lookback_sessions(4).build().is_err());
        assert!(b().top_k(0).build().is_err());
        assert!(b().top_k(11).build().is_err());
        assert!(b().lookback_sessions(3).top_k(10).build().is_ok());
    }

    #[test]
    fn test_serde_round_trip_and_validation() {
        let spec = SearchSpec::builder()
            .target_end(target())
            .lookback_sessions(2)
            .top_k(3)
            .build()
            .unwrap();
        let json = serde_json::to_string(&spec).unwrap();
        let back: SearchSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);

        let broken = json.replace("\"top_k\":3", "\"top_k\":0");
        assert!(serde_json::from_str::<SearchSpec>(&broken).is_err());
    }

    #[test]
    fn test_deserialize_enforces_parameter_bounds() {
        let spec = SearchSpec::builder()
            .target_end(target())
            .lookback_sessions(2)
            .top_k(3)
            .build()
            .unwrap();
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("\"lookback\":2"));
        assert!(json.contains("\"top_k\":3"));

        for (from, to) in [
            ("\"top_k\":3", "\"top_k\":11"),
            ("\"top_k\":3", "\"top_k\":500"),
            ("\"lookback\":2", "\"lookback\":4"),
            ("\"lookback\":2", "\"lookback\":40"),
        ] {
            let out_of_bounds = json.replace(from, to);
            assert!(
                serde_json::from_str::<SearchSpec>(&out_of_bounds).is_err(),
                "accepted {to}"
            );
        }

        let at_bounds = json
            .replace("\"top_k\":3", "\"top_k\":10")
            .replace("\"lookback\":2", "\"lookback\":3");
        let loaded: SearchSpec = serde_json::from_str(&at_bounds).unwrap();
        assert_eq!(loaded.top_k.get(), 10);
        assert_eq!(loaded.lookback.get(), 3);
    }

    #[test]
    fn test_canonical_bytes_are_stable() {
        let a = SearchSpec::builder().target_end(target()).build().unwrap();
        let b = SearchSpec::builder().target_end(target()).build().unwrap();
        assert_eq!(a.canonical_bytes().unwrap(), b.canonical_bytes().unwrap());
    }
}
