//! Parameter metadata for search inputs
//!
//! Describes the bounds a search form should offer and that [`SearchSpec`] validation
//! enforces. Callers building their own input surface can read the same table.
//!
//! # Example
//!
//! ```rust
//! use simsearch::params::SEARCH_PARAMS;
//!
//! for param in SEARCH_PARAMS {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//! ```
//!
//! [`SearchSpec`]: crate::search::SearchSpec

use std::collections::HashMap;

use crate::{LookbackSessions, ProgressStep, Result, SearchError, TopK};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// Positive integer count (sessions, matches)
    Count,
    /// Fraction in (0.0, 1.0]
    Fraction,
}

/// Metadata for a single search parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
    /// Parameter name (e.g., "lookback_sessions")
    pub name: &'static str,
    pub param_type: ParamType,
    pub default: f64,
    /// Accepted range: (min, max)
    pub range: (f64, f64),
    pub description: &'static str,
}

impl ParamMeta {
    pub const fn count(
        name: &'static str,
        default: f64,
        range: (f64, f64),
        description: &'static str,
    ) -> Self {
        Self {
            name,
            param_type: ParamType::Count,
            default,
            range,
            description,
        }
    }

    pub const fn fraction(
        name: &'static str,
        default: f64,
        range: (f64, f64),
        description: &'static str,
    ) -> Self {
        Self {
            name,
            param_type: ParamType::Fraction,
            default,
            range,
            description,
        }
    }

    /// Validate a value for this parameter
    pub fn validate(&self, value: f64) -> Result<()> {
        let (min, max) = self.range;
        if value.is_nan() || value < min || value > max {
            return Err(SearchError::OutOfRange {
                field: self.name,
                value,
                min,
                max,
            });
        }
        match self.param_type {
            ParamType::Count => {
                if value.fract() != 0.0 {
                    return Err(SearchError::InvalidValue("Count must be an integer"));
                }
                Ok(())
            }
            ParamType::Fraction => Ok(()),
        }
    }
}

// ============================================================
// SEARCH PARAMETERS
// ============================================================

pub const LOOKBACK_SESSIONS: ParamMeta = ParamMeta::count(
    "lookback_sessions",
    1.0,
    (1.0, 3.0),
    "Number of consecutive sessions the target and candidate windows span",
);

pub const TOP_K: ParamMeta = ParamMeta::count(
    "top_k",
    5.0,
    (1.0, 10.0),
    "Number of best matches to return",
);

pub const PROGRESS_STEP: ParamMeta = ParamMeta::fraction(
    "progress_step",
    0.01,
    (0.0001, 1.0),
    "Minimum scan fraction advance between progress reports",
);

pub const SEARCH_PARAMS: &[ParamMeta] = &[LOOKBACK_SESSIONS, TOP_K, PROGRESS_STEP];

/// Look up a parameter by name
pub fn find(name: &str) -> Option<&'static ParamMeta> {
    SEARCH_PARAMS.iter().find(|p| p.name == name)
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Lookback from params with default fallback, checked against [`LOOKBACK_SESSIONS`]
pub fn get_lookback(params: &HashMap<&str, f64>) -> Result<LookbackSessions> {
    let value = params
        .get(LOOKBACK_SESSIONS.name)
        .copied()
        .unwrap_or(LOOKBACK_SESSIONS.default);
    LOOKBACK_SESSIONS.validate(value)?;
    LookbackSessions::new(value as usize)
}

/// Top-K from params with default fallback, checked against [`TOP_K`]
pub fn get_top_k(params: &HashMap<&str, f64>) -> Result<TopK> {
    let value = params.get(TOP_K.name).copied().unwrap_or(TOP_K.default);
    TOP_K.validate(value)?;
    TopK::new(value as usize)
}

/// Progress step from params with default fallback, checked against [`PROGRESS_STEP`]
pub fn get_progress_step(params: &HashMap<&str, f64>) -> Result<ProgressStep> {
    let value = params
        .get(PROGRESS_STEP.name)
        .copied()
        .unwrap_or(PROGRESS_STEP.default);
    PROGRESS_STEP.validate(value)?;
    ProgressStep::new(value)
}
