//! Error types for scoring runs.
//!
//! Two families:
//! - [`RejectReason`]: why one anchor attempt for one year failed. Always
//!   recovered by moving to the next anchor.
//! - [`ScoringError`]: structural problems that stop the whole run.

use serde::Serialize;
use thiserror::Error;

use drift_common::ValidationError;

/// Coarse taxonomy of recoverable attempt failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectCategory {
    AnchorUnavailable,
    InsufficientAnchorData,
    InsufficientInformation,
    EstimationFailure,
    DegenerateScores,
}

/// Why an anchor attempt was rejected.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// Candidate has no record in the year's roster
    #[error("anchor is not on the roster")]
    AnchorUnavailable,

    /// Candidate voted fewer times than its threshold
    #[error("anchor cast {votes} votes, needs {required}")]
    InsufficientAnchorVotes { votes: usize, required: usize },

    /// Every vote the candidate cast was the same
    #[error("anchor votes have no variance")]
    NoAnchorVariance,

    /// Too few divisions survived the informativeness and variance filters
    #[error("{items} informative items remain, needs {required}")]
    TooFewInformativeItems { items: usize, required: usize },

    /// Too few legislators survived the variance filter
    #[error("{legislators} variable legislators remain, needs {required}")]
    TooFewVariableLegislators { legislators: usize, required: usize },

    /// The fit failed on every attempt (or the matrix was not binary)
    #[error("estimation failed after {attempts} attempt(s): {last_error}")]
    EstimationFailure { attempts: u32, last_error: String },

    /// The fit succeeded but the score spread fell outside the accepted band
    #[error("score standard deviation {sd} outside accepted band after {attempts} attempt(s)")]
    DegenerateScores { attempts: u32, sd: f64 },
}

impl RejectReason {
    /// Map the detailed reason onto the coarse taxonomy.
    pub const fn category(&self) -> RejectCategory {
        match self {
            Self::AnchorUnavailable => RejectCategory::AnchorUnavailable,
            Self::InsufficientAnchorVotes { .. } | Self::NoAnchorVariance => {
                RejectCategory::InsufficientAnchorData
            }
            Self::TooFewInformativeItems { .. } | Self::TooFewVariableLegislators { .. } => {
                RejectCategory::InsufficientInformation
            }
            Self::EstimationFailure { .. } => RejectCategory::EstimationFailure,
            Self::DegenerateScores { .. } => RejectCategory::DegenerateScores,
        }
    }
}

/// Fatal errors that stop a scoring run.
#[derive(Debug, Error)]
pub enum ScoringError {
    /// No rows at all
    #[error("vote table is empty")]
    EmptyVoteTable,

    /// A row's vote was neither 0, 1, nor missing
    #[error("row {row}: vote_binary must be 0, 1 or null, got {value}")]
    InvalidVote { row: usize, value: u8 },

    /// A row had an empty legislator id
    #[error("row {row}: legislator_id is blank")]
    BlankLegislatorId { row: usize },

    /// Rows could not be decoded (missing columns, wrong types)
    #[error("malformed vote rows: {0}")]
    MalformedRows(#[from] serde_json::Error),

    /// A matrix was assembled from inconsistent parts
    #[error("matrix shape mismatch: {0}")]
    Shape(String),

    /// A matrix cell used the value reserved for absent cells
    #[error("cell ({row}, {col}) holds reserved value {value}")]
    ReservedCell { row: usize, col: usize, value: u8 },

    /// A trend threshold leaves no residual degrees of freedom
    #[error("min_years must be at least {minimum}, got {min_years}")]
    InvalidThreshold { min_years: usize, minimum: usize },

    /// Configuration failed validation
    #[error("invalid configuration: {0}")]
    Config(#[from] ValidationError),
}

impl From<ScoringError> for drift_common::Error {
    fn from(err: ScoringError) -> Self {
        match err {
            ScoringError::Config(e) => drift_common::Error::Validation(e),
            ScoringError::MalformedRows(e) => drift_common::Error::Json(e),
            other => drift_common::Error::InvalidInput(other.to_string()),
        }
    }
}
