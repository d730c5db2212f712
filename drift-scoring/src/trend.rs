//! Longitudinal trend analysis.
//!
//! For each legislator, regress yearly score on year by ordinary least
//! squares and test the slope against zero with a two-sided Student-t test.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

use drift_common::validation::MIN_TREND_YEARS;

use crate::error::ScoringError;
use crate::irt::IdeologyScore;

// ============================================================================
// Significance
// ============================================================================

/// Conventional significance stars for a p-value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignificanceBucket {
    #[serde(rename = "***")]
    VeryHigh,
    #[serde(rename = "**")]
    High,
    #[serde(rename = "*")]
    Moderate,
    #[serde(rename = ".")]
    Marginal,
    #[serde(rename = "ns")]
    NotSignificant,
}

impl SignificanceBucket {
    /// Bucket `p` at 0.001 / 0.01 / 0.05 / 0.1.
    pub fn from_p_value(p: f64) -> Self {
        if p < 0.001 {
            Self::VeryHigh
        } else if p < 0.01 {
            Self::High
        } else if p < 0.05 {
            Self::Moderate
        } else if p < 0.1 {
            Self::Marginal
        } else {
            Self::NotSignificant
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VeryHigh => "***",
            Self::High => "**",
            Self::Moderate => "*",
            Self::Marginal => ".",
            Self::NotSignificant => "ns",
        }
    }
}

impl fmt::Display for SignificanceBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Regression
// ============================================================================

/// Simple linear regression `y = intercept + slope · x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub std_error: f64,
    pub p_value: f64,
}

impl LinearFit {
    /// Fit by OLS. Needs at least three points and some spread in `x`.
    pub fn fit(points: &[(f64, f64)]) -> Option<Self> {
        let n = points.len();
        if n < MIN_TREND_YEARS {
            return None;
        }
        let nf = n as f64;

        let mean_x = points.iter().map(|p| p.0).sum::<f64>() / nf;
        let mean_y = points.iter().map(|p| p.1).sum::<f64>() / nf;

        let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
        for &(x, y) in points {
            let (dx, dy) = (x - mean_x, y - mean_y);
            sxx += dx * dx;
            sxy += dx * dy;
            syy += dy * dy;
        }
        if sxx <= 0.0 {
            return None;
        }

        let slope = sxy / sxx;
        let intercept = mean_y - slope * mean_x;
        let sse: f64 = points
            .iter()
            .map(|&(x, y)| (y - intercept - slope * x).powi(2))
            .sum();

        // Zero residual variance: the t statistic is undefined.
        if sse <= 1e-12 * syy {
            return Some(Self {
                slope,
                intercept,
                std_error: 0.0,
                p_value: if slope == 0.0 { 1.0 } else { 0.0 },
            });
        }

        let df = nf - 2.0;
        let std_error = (sse / df / sxx).sqrt();
        let t = slope / std_error;
        let p_value = StudentsT::new(0.0, 1.0, df)
            .map(|dist| (2.0 * dist.sf(t.abs())).min(1.0))
            .ok()?;

        Some(Self {
            slope,
            intercept,
            std_error,
            p_value,
        })
    }
}

// ============================================================================
// Results
// ============================================================================

/// One legislator's career trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    pub legislator_id: String,
    /// Score change per year
    pub slope: f64,
    pub std_error: f64,
    pub p_value: f64,
    pub significance_bucket: SignificanceBucket,
    pub years_observed: usize,
    pub first_year: i32,
    pub last_year: i32,
    pub career_span: i32,
}

/// Counts per significance bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrendSummary {
    pub legislators: usize,
    pub by_bucket: BTreeMap<SignificanceBucket, usize>,
}

impl TrendSummary {
    pub fn from_results(results: &[TrendResult]) -> Self {
        let mut by_bucket = BTreeMap::new();
        for r in results {
            *by_bucket.entry(r.significance_bucket).or_insert(0) += 1;
        }
        Self {
            legislators: results.len(),
            by_bucket,
        }
    }

    pub fn count(&self, bucket: SignificanceBucket) -> usize {
        self.by_bucket.get(&bucket).copied().unwrap_or(0)
    }
}

/// Trends for one `min_years` threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendTable {
    pub min_years: usize,
    pub results: Vec<TrendResult>,
    pub summary: TrendSummary,
}

// ============================================================================
// Analyzer
// ============================================================================

/// Fits per-legislator trends over a score table.
#[derive(Debug, Clone)]
pub struct LongitudinalTrendAnalyzer {
    min_years: usize,
    parallel: bool,
}

impl LongitudinalTrendAnalyzer {
    pub fn new(min_years: usize) -> Result<Self, ScoringError> {
        if min_years < MIN_TREND_YEARS {
            return Err(ScoringError::InvalidThreshold {
                min_years,
                minimum: MIN_TREND_YEARS,
            });
        }
        Ok(Self {
            min_years,
            parallel: true,
        })
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn min_years(&self) -> usize {
        self.min_years
    }

    /// Trend rows for every legislator observed in at least `min_years`
    /// years, sorted by legislator id.
    pub fn analyze(&self, scores: &[IdeologyScore]) -> Vec<TrendResult> {
        let series = group_by_legislator(scores);
        let eligible: Vec<(&str, Vec<(i32, f64)>)> = series
            .into_iter()
            .filter(|(_, points)| points.len() >= self.min_years)
            .collect();

        let mut results: Vec<TrendResult> = if self.parallel {
            eligible
                .par_iter()
                .filter_map(|(id, points)| fit_legislator(id, points))
                .collect()
        } else {
            eligible
                .iter()
                .filter_map(|(id, points)| fit_legislator(id, points))
                .collect()
        };
        results.sort_by(|a, b| a.legislator_id.cmp(&b.legislator_id));

        tracing::debug!(
            min_years = self.min_years,
            legislators = results.len(),
            "Trend analysis complete"
        );
        results
    }

    /// Results plus bucket counts.
    pub fn table(&self, scores: &[IdeologyScore]) -> TrendTable {
        let results = self.analyze(scores);
        TrendTable {
            min_years: self.min_years,
            summary: TrendSummary::from_results(&results),
            results,
        }
    }
}

/// Group scores into per-legislator `(year, score)` series ordered by year.
/// A repeated (legislator, year) keeps the first score.
fn group_by_legislator(scores: &[IdeologyScore]) -> BTreeMap<&str, Vec<(i32, f64)>> {
    let mut series: BTreeMap<&str, Vec<(i32, f64)>> = BTreeMap::new();
    let mut seen: HashSet<(&str, i32)> = HashSet::new();

    for s in scores {
        if !seen.insert((s.legislator_id.as_str(), s.year)) {
            tracing::debug!(
                legislator_id = %s.legislator_id,
                year = s.year,
                "Duplicate yearly score, keeping first"
            );
            continue;
        }
        series
            .entry(s.legislator_id.as_str())
            .or_default()
            .push((s.year, s.score));
    }

    for points in series.values_mut() {
        points.sort_by_key(|p| p.0);
    }
    series
}

fn fit_legislator(legislator_id: &str, points: &[(i32, f64)]) -> Option<TrendResult> {
    let xy: Vec<(f64, f64)> = points.iter().map(|&(y, s)| (f64::from(y), s)).collect();
    let fit = LinearFit::fit(&xy)?;
    let first_year = points.first()?.0;
    let last_year = points.last()?.0;

    Some(TrendResult {
        legislator_id: legislator_id.to_string(),
        slope: fit.slope,
        std_error: fit.std_error,
        p_value: fit.p_value,
        significance_bucket: SignificanceBucket::from_p_value(fit.p_value),
        years_observed: points.len(),
        first_year,
        last_year,
        career_span: last_year - first_year,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irt::Method;
    use test_case::test_case;

    fn score(id: &str, year: i32, value: f64) -> IdeologyScore {
        IdeologyScore {
            legislator_id: id.to_string(),
            year,
            score: value,
            anchor_id: "A".to_string(),
            method: Method::LatentTrait,
        }
    }

    fn series(id: &str, years: std::ops::Range<i32>, f: impl Fn(i32) -> f64) -> Vec<IdeologyScore> {
        years.map(|y| score(id, y, f(y))).collect()
    }

    #[test_case(0.0009 => SignificanceBucket::VeryHigh ; "below 0.001")]
    #[test_case(0.009 => SignificanceBucket::High ; "below 0.01")]
    #[test_case(0.04 => SignificanceBucket::Moderate ; "below 0.05")]
    #[test_case(0.08 => SignificanceBucket::Marginal ; "below 0.1")]
    #[test_case(0.5 => SignificanceBucket::NotSignificant ; "not significant")]
    #[test_case(0.05 => SignificanceBucket::Marginal ; "cut points are exclusive")]
    fn test_significance_mapping(p: f64) -> SignificanceBucket {
        SignificanceBucket::from_p_value(p)
    }

    #[test]
    fn test_bucket_labels_serialize_as_stars() {
        let labels: Vec<String> = [
            SignificanceBucket::VeryHigh,
            SignificanceBucket::High,
            SignificanceBucket::Moderate,
            SignificanceBucket::Marginal,
            SignificanceBucket::NotSignificant,
        ]
        .iter()
        .map(|b| serde_json::to_string(b).unwrap())
        .collect();
        assert_eq!(labels, vec!["\"***\"", "\"**\"", "\"*\"", "\".\"", "\"ns\""]);
        assert_eq!(SignificanceBucket::Marginal.to_string(), ".");
    }

    #[test]
    fn test_threshold_below_three_is_invalid() {
        assert!(matches!(
            LongitudinalTrendAnalyzer::new(2),
            Err(ScoringError::InvalidThreshold { min_years: 2, minimum: 3 })
        ));
        assert!(LongitudinalTrendAnalyzer::new(3).is_ok());
    }

    #[test]
    fn test_threshold_boundary() {
        let mut scores = series("short", 2000..2004, |y| f64::from(y - 2000) * 0.1);
        scores.extend(series("exact", 2000..2005, |y| f64::from(y % 3)));

        let results = LongitudinalTrendAnalyzer::new(5).unwrap().analyze(&scores);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].legislator_id, "exact");
        assert_eq!(results[0].years_observed, 5);
    }

    #[test]
    fn test_linear_series_recovers_slope() {
        let noise = [0.01, -0.02, 0.015, 0.0, -0.01, 0.02, -0.015, 0.005, -0.005, 0.01];
        let scores: Vec<_> = (0..10)
            .map(|k| score("L", 2000 + k, f64::from(k) + noise[k as usize]))
            .collect();

        let results = LongitudinalTrendAnalyzer::new(5).unwrap().analyze(&scores);
        let r = &results[0];
        assert!((r.slope - 1.0).abs() < 0.01, "slope = {}", r.slope);
        assert!(r.p_value < 1e-10);
        assert_eq!(r.significance_bucket, SignificanceBucket::VeryHigh);
        assert_eq!((r.first_year, r.last_year, r.career_span), (2000, 2009, 9));
    }

    #[test]
    fn test_flat_noise_is_not_significant() {
        let scores = series("F", 2000..2008, |y| if y % 2 == 0 { 0.5 } else { -0.5 });
        let r = &LongitudinalTrendAnalyzer::new(5).unwrap().analyze(&scores)[0];
        assert!(r.p_value > 0.1);
        assert_eq!(r.significance_bucket, SignificanceBucket::NotSignificant);
    }

    #[test]
    fn test_perfect_fit_has_zero_error() {
        let exact = LinearFit::fit(&[(0.0, 1.0), (1.0, 3.0), (2.0, 5.0)]).unwrap();
        assert_eq!(exact.std_error, 0.0);
        assert_eq!(exact.p_value, 0.0);
        assert!((exact.slope - 2.0).abs() < 1e-12);

        let constant = LinearFit::fit(&[(0.0, 4.0), (1.0, 4.0), (2.0, 4.0)]).unwrap();
        assert_eq!(constant.slope, 0.0);
        assert_eq!(constant.p_value, 1.0);
    }

    #[test]
    fn test_known_regression_values() {
        // x = 1..5, y = 2, 4, 5, 4, 5: slope 0.6, SE = sqrt(2.4 / 3 / 10)
        let fit =
            LinearFit::fit(&[(1.0, 2.0), (2.0, 4.0), (3.0, 5.0), (4.0, 4.0), (5.0, 5.0)]).unwrap();
        assert!((fit.slope - 0.6).abs() < 1e-12);
        assert!((fit.intercept - 2.2).abs() < 1e-12);
        assert!((fit.std_error - 0.08f64.sqrt()).abs() < 1e-12);
        assert!(fit.p_value > 0.1 && fit.p_value < 0.2, "p = {}", fit.p_value);
    }

    #[test]
    fn test_duplicate_years_keep_first() {
        let mut scores = series("D", 2000..2005, |y| f64::from(y - 2000));
        scores.push(score("D", 2002, 100.0));

        let r = &LongitudinalTrendAnalyzer::new(5).unwrap().analyze(&scores)[0];
        assert_eq!(r.years_observed, 5);
        assert!((r.slope - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut scores = Vec::new();
        for (i, id) in ["c", "a", "b", "e", "d"].iter().enumerate() {
            let tilt = i as f64 * 0.1 - 0.2;
            scores.extend(series(id, 1990..2002, |y| tilt * f64::from(y - 1990) + f64::from(y % 4) * 0.3));
        }

        let parallel = LongitudinalTrendAnalyzer::new(5).unwrap().analyze(&scores);
        let sequential = LongitudinalTrendAnalyzer::new(5)
            .unwrap()
            .with_parallel(false)
            .analyze(&scores);

        assert_eq!(parallel, sequential);
        let ids: Vec<_> = parallel.iter().map(|r| r.legislator_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_summary_counts_buckets() {
        let mut scores = series("up", 2000..2010, |y| f64::from(y - 2000) + if y % 2 == 0 { 0.01 } else { -0.01 });
        scores.extend(series("flat", 2000..2010, |y| if y % 2 == 0 { 0.5 } else { -0.5 }));

        let table = LongitudinalTrendAnalyzer::new(5).unwrap().table(&scores);
        assert_eq!(table.min_years, 5);
        assert_eq!(table.summary.legislators, 2);
        assert_eq!(table.summary.count(SignificanceBucket::VeryHigh), 1);
        assert_eq!(table.summary.count(SignificanceBucket::NotSignificant), 1);
        assert_eq!(table.summary.count(SignificanceBucket::High), 0);
    }
}
