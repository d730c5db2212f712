//! Drift Common - Shared configuration, errors, and logging for the drift workspace.
//!
//! This crate provides:
//! - Configuration types and loading (`~/.driftscore/config.json` + `DRIFT_*` overrides)
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    AnchorCandidate, Band, Config, EstimatorConfig, MatrixConfig, ObservabilityConfig,
    ScoreMethod, ScoringConfig, TrendConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::{Config, ScoringConfig, TrendConfig};
    pub use crate::error::{Error, Result};
    pub use crate::logging::init_logging;
    pub use crate::validation::{Validate, ValidationError};
}
