//! Latent-trait estimation.
//!
//! [`LatentTraitEstimator`] wraps a [`LatentTraitModel`] with input checks, a
//! bounded retry loop, and the score-spread sanity check. Each attempt gets
//! its own seed so a stochastic fitter starts from a different point, while
//! the whole sequence stays reproducible for a given base seed.

mod quadrature;
mod two_pl;

pub use quadrature::Quadrature;
pub use two_pl::{ItemParameters, TwoPlFit, TwoParameterLogistic};

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use thiserror::Error;

use drift_common::{Band, ScoringConfig};

use crate::error::RejectReason;
use crate::matrix::AgreementMatrix;

/// Numerical failure inside one fit.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimationError {
    #[error("matrix has {rows} rows and {cols} columns, too small to fit")]
    EmptyMatrix { rows: usize, cols: usize },

    #[error("cell ({row}, {col}) holds {value}, expected 0 or 1")]
    NonBinary { row: usize, col: usize, value: u8 },

    #[error("non-finite {what} at EM iteration {iteration}")]
    NonFinite { iteration: usize, what: &'static str },

    #[error("information matrix for item {item} is singular")]
    SingularInformation { item: usize },

    #[error("EM did not converge in {iterations} iterations")]
    NotConverged { iterations: usize },

    #[error("model returned {got} scores for {expected} legislators")]
    ScoreCount { expected: usize, got: usize },
}

/// A fitter that maps an agreement matrix to one score per row.
pub trait LatentTraitModel: Send + Sync {
    /// Fit the model. `seed` drives any randomness in start values.
    fn fit(&self, matrix: &AgreementMatrix, seed: u64) -> Result<Vec<f64>, EstimationError>;
}

/// Scoring method tag carried on every score row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Method {
    #[default]
    #[serde(rename = "latent-trait")]
    LatentTrait,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LatentTrait => write!(f, "latent-trait"),
        }
    }
}

/// One legislator's estimated position in one year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeologyScore {
    pub legislator_id: String,
    pub year: i32,
    pub score: f64,
    pub anchor_id: String,
    #[serde(default)]
    pub method: Method,
}

/// Derive the seed for one attempt (splitmix64 over base, year and attempt).
pub fn attempt_seed(base: u64, year: i32, attempt: u32) -> u64 {
    let mut z = base
        ^ (year as i64 as u64).rotate_left(32)
        ^ u64::from(attempt).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Sample standard deviation of a score vector.
pub fn score_spread(scores: &[f64]) -> f64 {
    scores.iter().std_dev()
}

/// Retrying, sanity-checked estimator.
#[derive(Debug, Clone)]
pub struct LatentTraitEstimator<M = TwoParameterLogistic> {
    model: M,
    max_attempts: u32,
    sd_band: Band,
    base_seed: u64,
}

impl LatentTraitEstimator<TwoParameterLogistic> {
    /// Build the default two-parameter logistic estimator from config.
    pub fn from_config(config: &ScoringConfig) -> Self {
        Self::with_model(TwoParameterLogistic::new(config.estimator.clone()), config)
    }
}

impl<M: LatentTraitModel> LatentTraitEstimator<M> {
    /// Wrap an arbitrary model with the configured retry cap and score band.
    pub fn with_model(model: M, config: &ScoringConfig) -> Self {
        Self {
            model,
            max_attempts: config.estimator.max_attempts.max(1),
            sd_band: config.score_sd_band,
            base_seed: config.estimator.seed,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Score every row of `matrix`, retrying up to the attempt cap.
    pub fn estimate(&self, matrix: &AgreementMatrix) -> Result<Vec<IdeologyScore>, RejectReason> {
        if let Some((row, col, value)) = matrix.first_non_binary() {
            return Err(RejectReason::EstimationFailure {
                attempts: 0,
                last_error: EstimationError::NonBinary { row, col, value }.to_string(),
            });
        }

        let mut last = None;
        for attempt in 1..=self.max_attempts {
            let seed = attempt_seed(self.base_seed, matrix.year(), attempt);

            let outcome = self.model.fit(matrix, seed).and_then(|scores| {
                if scores.len() != matrix.n_rows() {
                    return Err(EstimationError::ScoreCount {
                        expected: matrix.n_rows(),
                        got: scores.len(),
                    });
                }
                if scores.iter().any(|s| !s.is_finite()) {
                    return Err(EstimationError::NonFinite {
                        iteration: 0,
                        what: "factor score",
                    });
                }
                Ok(scores)
            });

            match outcome {
                Ok(scores) => {
                    let sd = score_spread(&scores);
                    if self.sd_band.contains(sd) {
                        tracing::debug!(
                            year = matrix.year(),
                            anchor_id = matrix.anchor_id(),
                            attempt,
                            sd,
                            "Latent-trait scores accepted"
                        );
                        return Ok(self.to_rows(matrix, scores));
                    }
                    tracing::debug!(
                        year = matrix.year(),
                        anchor_id = matrix.anchor_id(),
                        attempt,
                        sd,
                        "Score spread outside accepted band"
                    );
                    last = Some(RejectReason::DegenerateScores {
                        attempts: attempt,
                        sd,
                    });
                }
                Err(e) => {
                    tracing::debug!(
                        year = matrix.year(),
                        anchor_id = matrix.anchor_id(),
                        attempt,
                        error = %e,
                        "Latent-trait fit failed"
                    );
                    last = Some(RejectReason::EstimationFailure {
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
            }
        }

        Err(last.unwrap_or(RejectReason::EstimationFailure {
            attempts: 0,
            last_error: "no attempts made".into(),
        }))
    }

    fn to_rows(&self, matrix: &AgreementMatrix, scores: Vec<f64>) -> Vec<IdeologyScore> {
        matrix
            .legislators()
            .iter()
            .zip(scores)
            .map(|(legislator, score)| IdeologyScore {
                legislator_id: legislator.clone(),
                year: matrix.year(),
                score,
                anchor_id: matrix.anchor_id().to_string(),
                method: Method::LatentTrait,
            })
            .collect()
    }
}
