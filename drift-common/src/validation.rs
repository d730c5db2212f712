//! Configuration validation.
//!
//! Checks that every threshold is present and within a usable range before
//! a scoring run starts.

use std::collections::HashSet;
use thiserror::Error;

use crate::config::{
    Band, Config, EstimatorConfig, MatrixConfig, ObservabilityConfig, ScoringConfig, TrendConfig,
};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration conflict: {reason}")]
    Conflict { reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

/// Smallest `min_years` that leaves residual degrees of freedom for a slope test.
pub const MIN_TREND_YEARS: usize = 3;

fn collect(errors: Vec<ValidationError>) -> ValidationResult<()> {
    let mut errors: Vec<ValidationError> = errors
        .into_iter()
        .flat_map(|e| match e {
            ValidationError::Multiple(inner) => inner,
            other => vec![other],
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else if errors.len() == 1 {
        Err(errors.remove(0))
    } else {
        Err(ValidationError::Multiple(errors))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.into(),
        reason: reason.into(),
    }
}

fn check_band(field: &str, band: &Band, unit_interval: bool) -> Option<ValidationError> {
    if !(band.low.is_finite() && band.high.is_finite()) || band.low >= band.high {
        return Some(invalid(field, "low must be finite and below high"));
    }
    if unit_interval && (band.low < 0.0 || band.high > 1.0) {
        return Some(invalid(field, "must lie within [0, 1]"));
    }
    if !unit_interval && band.low < 0.0 {
        return Some(invalid(field, "low must not be negative"));
    }
    None
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.scoring.validate() {
            errors.push(e);
        }
        if let Err(e) = self.trend.validate() {
            errors.push(e);
        }
        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }

        collect(errors)
    }

    /// Load and validate configuration.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

impl Validate for ScoringConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.anchors.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "scoring.anchors".into(),
            });
        }

        let mut seen = HashSet::new();
        for (rank, anchor) in self.anchors.iter().enumerate() {
            if anchor.legislator_id.trim().is_empty() {
                errors.push(invalid(
                    &format!("scoring.anchors[{rank}].legislator_id"),
                    "must not be blank",
                ));
            } else if !seen.insert(anchor.legislator_id.as_str()) {
                errors.push(ValidationError::Conflict {
                    reason: format!("anchor {} is listed more than once", anchor.legislator_id),
                });
            }
            if anchor.min_votes == Some(0) {
                errors.push(invalid(
                    &format!("scoring.anchors[{rank}].min_votes"),
                    "must be greater than 0",
                ));
            }
        }

        if self.default_min_anchor_votes == 0 {
            errors.push(invalid(
                "scoring.default_min_anchor_votes",
                "must be greater than 0",
            ));
        }

        if let Some(e) = check_band("scoring.score_sd_band", &self.score_sd_band, false) {
            errors.push(e);
        }

        if let (Some(start), Some(end)) = (self.year_start, self.year_end) {
            if start > end {
                errors.push(ValidationError::Conflict {
                    reason: format!("scoring.year_start {start} is after scoring.year_end {end}"),
                });
            }
        }

        if let Err(e) = self.matrix.validate() {
            errors.push(e);
        }
        if let Err(e) = self.estimator.validate() {
            errors.push(e);
        }

        collect(errors)
    }
}

impl Validate for MatrixConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Some(e) = check_band("scoring.matrix.informative_band", &self.informative_band, true)
        {
            errors.push(e);
        }
        if self.min_items == 0 {
            errors.push(invalid("scoring.matrix.min_items", "must be greater than 0"));
        }
        if self.min_legislators < 2 {
            errors.push(invalid(
                "scoring.matrix.min_legislators",
                "must be at least 2",
            ));
        }

        collect(errors)
    }
}

impl Validate for EstimatorConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.max_attempts == 0 {
            errors.push(invalid(
                "scoring.estimator.max_attempts",
                "must be at least 1",
            ));
        }
        if self.em_iterations == 0 {
            errors.push(invalid(
                "scoring.estimator.em_iterations",
                "must be greater than 0",
            ));
        }
        if self.newton_iterations == 0 {
            errors.push(invalid(
                "scoring.estimator.newton_iterations",
                "must be greater than 0",
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            errors.push(invalid("scoring.estimator.tolerance", "must be positive"));
        }
        if !(self.ridge.is_finite() && self.ridge >= 0.0) {
            errors.push(invalid("scoring.estimator.ridge", "must not be negative"));
        }
        if !(self.max_discrimination.is_finite() && self.max_discrimination > 0.0) {
            errors.push(invalid(
                "scoring.estimator.max_discrimination",
                "must be positive",
            ));
        }

        collect(errors)
    }
}

impl Validate for TrendConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.min_years_thresholds.is_empty() {
            return Err(ValidationError::MissingField {
                field: "trend.min_years_thresholds".into(),
            });
        }

        let errors = self
            .min_years_thresholds
            .iter()
            .filter(|&&n| n < MIN_TREND_YEARS)
            .map(|n| {
                invalid(
                    "trend.min_years_thresholds",
                    format!("{n} is below the minimum of {MIN_TREND_YEARS}"),
                )
            })
            .collect();

        collect(errors)
    }
}

/// Output formats understood by `logging::init_logging`.
pub const LOG_FORMATS: [&str; 2] = ["json", "pretty"];

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.log_level.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "observability.log_level".into(),
            });
        }
        if !LOG_FORMATS.contains(&self.log_format.as_str()) {
            errors.push(invalid(
                "observability.log_format",
                format!("unknown format '{}', expected json or pretty", self.log_format),
            ));
        }

        collect(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnchorCandidate;
    use test_case::test_case;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.scoring.anchors = vec![
            AnchorCandidate::new("172").with_min_votes(5),
            AnchorCandidate::new("4514"),
        ];
        config
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_missing_anchors() {
        let err = Config::default().validate().unwrap_err();
        assert!(matches!(err, ValidationError::MissingField { ref field } if field == "scoring.anchors"));
    }

    #[test]
    fn test_duplicate_anchor_is_conflict() {
        let mut config = valid_config();
        config.scoring.anchors.push(AnchorCandidate::new("172"));
        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::Conflict { .. }
        ));
    }

    #[test_case(0.5, 0.4 ; "inverted")]
    #[test_case(-0.1, 0.9 ; "below zero")]
    #[test_case(0.05, 1.5 ; "above one")]
    fn test_bad_informative_band(low: f64, high: f64) {
        let mut config = valid_config();
        config.scoring.matrix.informative_band = Band::new(low, high);
        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_trend_threshold_floor() {
        let mut config = valid_config();
        config.trend.min_years_thresholds = vec![2, 5];
        assert!(config.validate().is_err());

        config.trend.min_years_thresholds = vec![3, 5];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_multiple_errors_are_flattened() {
        let mut config = Config::default();
        config.scoring.estimator.max_attempts = 0;
        config.scoring.year_start = Some(2024);
        config.scoring.year_end = Some(2019);

        match config.validate().unwrap_err() {
            ValidationError::Multiple(errors) => {
                assert_eq!(errors.len(), 3);
                assert!(errors
                    .iter()
                    .all(|e| !matches!(e, ValidationError::Multiple(_))));
            }
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test_case("json" => true ; "json")]
    #[test_case("pretty" => true ; "pretty")]
    #[test_case("jsn" => false ; "misspelled")]
    #[test_case("" => false ; "empty")]
    fn test_log_format_is_checked(format: &str) -> bool {
        let mut config = valid_config();
        config.observability.log_format = format.to_string();
        config.validate().is_ok()
    }

    #[test]
    fn test_blank_log_level_is_missing() {
        let mut config = valid_config();
        config.observability.log_level = "  ".into();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::MissingField { field }) if field == "observability.log_level"
        ));
    }
}
