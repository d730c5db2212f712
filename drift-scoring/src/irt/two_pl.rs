//! Two-parameter logistic model fitted by marginal maximum likelihood.
//!
//! `P(x_ij = 1 | θ_i) = logistic(a_j · θ_i + c_j)` with difficulty
//! `b_j = -c_j / a_j`, so the usual `logistic(a_j · (θ_i − b_j))` form holds.
//! The latent integral is taken over a Gauss-Hermite grid; EM alternates
//! posterior weights over the grid (E) with a damped Newton solve of each
//! item's expected log-likelihood (M).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use drift_common::{EstimatorConfig, ScoreMethod};

use super::quadrature::Quadrature;
use super::{EstimationError, LatentTraitModel};
use crate::matrix::AgreementMatrix;

/// Fitted item parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemParameters {
    /// Slope `a`
    pub discrimination: f64,
    /// Location `b`
    pub difficulty: f64,
}

/// Result of one EM fit.
#[derive(Debug, Clone)]
pub struct TwoPlFit {
    pub items: Vec<ItemParameters>,
    pub scores: Vec<f64>,
    pub log_likelihood: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Two-parameter logistic latent-trait model.
#[derive(Debug, Clone)]
pub struct TwoParameterLogistic {
    config: EstimatorConfig,
    quadrature: Quadrature,
}

impl TwoParameterLogistic {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            config,
            quadrature: Quadrature::standard_normal_7(),
        }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(EstimatorConfig::default())
    }

    /// Run EM from jittered start values derived from `seed`.
    pub fn fit_full(&self, matrix: &AgreementMatrix, seed: u64) -> Result<TwoPlFit, EstimationError> {
        let (n, m) = (matrix.n_rows(), matrix.n_cols());
        if n < 2 || m == 0 {
            return Err(EstimationError::EmptyMatrix { rows: n, cols: m });
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut slopes = vec![0.0; m];
        let mut intercepts = vec![0.0; m];
        for j in 0..m {
            let (ones, cast) = (0..n)
                .filter_map(|i| matrix.get(i, j))
                .fold((0.0, 0.0), |(ones, cast), v| (ones + f64::from(v), cast + 1.0));
            let p = ((ones + 0.5) / (cast + 1.0)).clamp(0.01, 0.99);
            slopes[j] = 1.0 + rng.gen_range(-0.25..0.25);
            intercepts[j] = (p / (1.0 - p)).ln() + rng.gen_range(-0.1..0.1);
        }

        let k = self.quadrature.len();
        let mut log_likelihood = f64::NEG_INFINITY;
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.config.em_iterations {
            iterations += 1;

            // E-step: expected counts at each node, per item
            let mut expected_n = vec![0.0; m * k];
            let mut expected_r = vec![0.0; m * k];
            log_likelihood = 0.0;

            for i in 0..n {
                let (posterior, marginal) = self.posterior(matrix.row(i), &slopes, &intercepts);
                log_likelihood += marginal;
                for j in 0..m {
                    if let Some(x) = matrix.get(i, j) {
                        for q in 0..k {
                            expected_n[j * k + q] += posterior[q];
                            expected_r[j * k + q] += posterior[q] * f64::from(x);
                        }
                    }
                }
            }

            if !log_likelihood.is_finite() {
                return Err(EstimationError::NonFinite {
                    iteration: iterations,
                    what: "log-likelihood",
                });
            }

            // M-step
            let mut max_change: f64 = 0.0;
            for j in 0..m {
                let (a, c) = self.maximize_item(
                    iterations,
                    j,
                    slopes[j],
                    intercepts[j],
                    &expected_n[j * k..(j + 1) * k],
                    &expected_r[j * k..(j + 1) * k],
                )?;
                max_change = max_change
                    .max((a - slopes[j]).abs())
                    .max((c - intercepts[j]).abs());
                slopes[j] = a;
                intercepts[j] = c;
            }

            if max_change < self.config.tolerance {
                converged = true;
                break;
            }
        }

        if !converged {
            tracing::debug!(
                iterations,
                log_likelihood,
                "EM stopped at the iteration cap before converging"
            );
            if self.config.require_convergence {
                return Err(EstimationError::NotConverged { iterations });
            }
        }

        let mut scores = (0..n)
            .map(|i| self.score_row(iterations, matrix.row(i), &slopes, &intercepts))
            .collect::<Result<Vec<f64>, _>>()?;

        // Orient the scale so higher means closer to the anchor.
        if slopes.iter().sum::<f64>() < 0.0 {
            scores.iter_mut().for_each(|s| *s = -*s);
        }

        let items = slopes
            .iter()
            .zip(&intercepts)
            .map(|(&a, &c)| ItemParameters {
                discrimination: a,
                difficulty: if a.abs() > f64::EPSILON { -c / a } else { f64::NAN },
            })
            .collect();

        Ok(TwoPlFit {
            items,
            scores,
            log_likelihood,
            iterations,
            converged,
        })
    }

    /// Normalized posterior over the grid and the log marginal likelihood.
    fn posterior(&self, row: &[u8], slopes: &[f64], intercepts: &[f64]) -> (Vec<f64>, f64) {
        let log_post: Vec<f64> = self
            .quadrature
            .nodes()
            .iter()
            .zip(self.quadrature.weights())
            .map(|(&theta, &w)| w.ln() + row_log_likelihood(row, theta, slopes, intercepts))
            .collect();

        let max = log_post.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let total: f64 = log_post.iter().map(|l| (l - max).exp()).sum();
        let marginal = max + total.ln();
        let posterior = log_post.iter().map(|l| (l - marginal).exp()).collect();

        (posterior, marginal)
    }

    /// Damped Newton ascent on one item's penalized expected log-likelihood.
    fn maximize_item(
        &self,
        iteration: usize,
        item: usize,
        mut a: f64,
        mut c: f64,
        expected_n: &[f64],
        expected_r: &[f64],
    ) -> Result<(f64, f64), EstimationError> {
        let nodes = self.quadrature.nodes();
        let ridge = self.config.ridge;
        let cap = self.config.max_discrimination;

        let objective = |a: f64, c: f64| -> f64 {
            let ll: f64 = nodes
                .iter()
                .zip(expected_n.iter().zip(expected_r))
                .map(|(&theta, (&n, &r))| {
                    let z = a * theta + c;
                    -r * softplus(-z) - (n - r) * softplus(z)
                })
                .sum();
            ll - 0.5 * ridge * (a * a + c * c)
        };

        let mut current = objective(a, c);
        for _ in 0..self.config.newton_iterations {
            let (mut g_a, mut g_c) = (-ridge * a, -ridge * c);
            let (mut h_aa, mut h_ac, mut h_cc) = (-ridge, 0.0, -ridge);
            for (&theta, (&n, &r)) in nodes.iter().zip(expected_n.iter().zip(expected_r)) {
                let p = logistic(a * theta + c);
                let resid = r - n * p;
                let info = n * p * (1.0 - p);
                g_a += resid * theta;
                g_c += resid;
                h_aa -= info * theta * theta;
                h_ac -= info * theta;
                h_cc -= info;
            }

            let det = h_aa * h_cc - h_ac * h_ac;
            if !(det.is_finite() && det > 1e-12 && h_aa < 0.0) {
                return Err(EstimationError::SingularInformation { item });
            }

            let step_a = -(h_cc * g_a - h_ac * g_c) / det;
            let step_c = -(h_aa * g_c - h_ac * g_a) / det;

            let mut scale = 1.0;
            let mut accepted = None;
            for _ in 0..20 {
                let next_a = (a + scale * step_a).clamp(-cap, cap);
                let next_c = c + scale * step_c;
                let value = objective(next_a, next_c);
                if value.is_finite() && value >= current - 1e-12 {
                    accepted = Some((next_a, next_c, value));
                    break;
                }
                scale *= 0.5;
            }

            let Some((next_a, next_c, value)) = accepted else {
                break;
            };
            let change = (next_a - a).abs().max((next_c - c).abs());
            a = next_a;
            c = next_c;
            current = value;

            if change < self.config.tolerance * 1e-2 {
                break;
            }
        }

        if !(a.is_finite() && c.is_finite()) {
            return Err(EstimationError::NonFinite {
                iteration,
                what: "item parameters",
            });
        }

        Ok((a, c))
    }

    fn score_row(
        &self,
        iteration: usize,
        row: &[u8],
        slopes: &[f64],
        intercepts: &[f64],
    ) -> Result<f64, EstimationError> {
        let (posterior, _) = self.posterior(row, slopes, intercepts);
        let eap: f64 = posterior
            .iter()
            .zip(self.quadrature.nodes())
            .map(|(p, theta)| p * theta)
            .sum();

        let score = match self.config.score_method {
            ScoreMethod::Eap => eap,
            ScoreMethod::Map => self.posterior_mode(row, slopes, intercepts, eap),
        };

        if score.is_finite() {
            Ok(score)
        } else {
            Err(EstimationError::NonFinite {
                iteration,
                what: "factor score",
            })
        }
    }

    /// Newton search for the posterior mode under a N(0, 1) prior, started at the EAP.
    fn posterior_mode(&self, row: &[u8], slopes: &[f64], intercepts: &[f64], start: f64) -> f64 {
        let mut theta = start;
        for _ in 0..self.config.newton_iterations {
            let mut grad = -theta;
            let mut hess = -1.0;
            for ((&x, &a), &c) in row.iter().zip(slopes).zip(intercepts) {
                if x > 1 {
                    continue;
                }
                let p = logistic(a * theta + c);
                grad += a * (f64::from(x) - p);
                hess -= a * a * p * (1.0 - p);
            }
            let step = -grad / hess;
            theta += step;
            if step.abs() < 1e-8 {
                break;
            }
        }
        theta
    }
}

impl LatentTraitModel for TwoParameterLogistic {
    fn fit(&self, matrix: &AgreementMatrix, seed: u64) -> Result<Vec<f64>, EstimationError> {
        let fit = self.fit_full(matrix, seed)?;
        tracing::trace!(
            year = matrix.year(),
            anchor_id = matrix.anchor_id(),
            iterations = fit.iterations,
            converged = fit.converged,
            log_likelihood = fit.log_likelihood,
            "Two-parameter logistic fit finished"
        );
        Ok(fit.scores)
    }
}

/// Log-likelihood of one response row at `theta`; absent cells are skipped.
fn row_log_likelihood(row: &[u8], theta: f64, slopes: &[f64], intercepts: &[f64]) -> f64 {
    row.iter()
        .zip(slopes)
        .zip(intercepts)
        .filter(|((&x, _), _)| x <= 1)
        .map(|((&x, &a), &c)| {
            let z = a * theta + c;
            if x == 1 {
                -softplus(-z)
            } else {
                -softplus(z)
            }
        })
        .sum()
}

fn logistic(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + e^z)` without overflow.
fn softplus(z: f64) -> f64 {
    z.max(0.0) + (-z.abs()).exp().ln_1p()
}
