//! Whole-run orchestration: score every year, then fit trends.

use rayon::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use drift_common::{Config, ScoringConfig};

use crate::error::ScoringError;
use crate::irt::{IdeologyScore, LatentTraitModel, TwoParameterLogistic};
use crate::pipeline::{YearOutcome, YearlyScoringPipeline};
use crate::trend::{LongitudinalTrendAnalyzer, TrendTable};
use crate::votes::VoteTable;

/// Output of one scoring run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    /// Score rows ordered by year, then legislator
    pub scores: Vec<IdeologyScore>,
    /// One entry per year in the scoring window
    pub outcomes: Vec<YearOutcome>,
    /// One table per configured `min_years` threshold
    pub trends: Vec<TrendTable>,
}

impl RunReport {
    pub fn scored_years(&self) -> Vec<i32> {
        self.outcomes
            .iter()
            .filter(|o| o.is_scored())
            .map(|o| o.year)
            .collect()
    }

    pub fn exhausted_years(&self) -> Vec<i32> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_scored())
            .map(|o| o.year)
            .collect()
    }

    pub fn trend_table(&self, min_years: usize) -> Option<&TrendTable> {
        self.trends.iter().find(|t| t.min_years == min_years)
    }
}

/// Scores a vote table year by year and analyzes career trends.
#[derive(Debug, Clone)]
pub struct ScoringService<M = TwoParameterLogistic> {
    scoring: ScoringConfig,
    pipeline: YearlyScoringPipeline<M>,
    analyzers: Vec<LongitudinalTrendAnalyzer>,
}

impl ScoringService<TwoParameterLogistic> {
    /// Validate `config` and build the default two-parameter logistic service.
    pub fn new(config: &Config) -> Result<Self, ScoringError> {
        config.validate()?;
        Self::assemble(YearlyScoringPipeline::new(&config.scoring), config)
    }
}

impl<M: LatentTraitModel> ScoringService<M> {
    /// Validate `config` and drive the pipeline with a custom model.
    pub fn with_model(model: M, config: &Config) -> Result<Self, ScoringError> {
        config.validate()?;
        Self::assemble(YearlyScoringPipeline::with_model(model, &config.scoring), config)
    }

    fn assemble(pipeline: YearlyScoringPipeline<M>, config: &Config) -> Result<Self, ScoringError> {
        let analyzers = config
            .trend
            .min_years_thresholds
            .iter()
            .map(|&n| {
                LongitudinalTrendAnalyzer::new(n).map(|a| a.with_parallel(config.scoring.parallel))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            scoring: config.scoring.clone(),
            pipeline,
            analyzers,
        })
    }

    pub fn pipeline(&self) -> &YearlyScoringPipeline<M> {
        &self.pipeline
    }

    /// Run the per-year pipeline over every year inside the scoring window.
    pub fn score_years(&self, table: &VoteTable) -> Vec<YearOutcome> {
        let years: Vec<i32> = table
            .years()
            .into_iter()
            .filter(|&y| self.scoring.includes_year(y))
            .collect();

        let score = |year: &i32| self.pipeline.score_year(&table.year_votes(*year));
        let mut outcomes: Vec<YearOutcome> = if self.scoring.parallel {
            years.par_iter().map(score).collect()
        } else {
            years.iter().map(score).collect()
        };
        outcomes.sort_by_key(|o| o.year);
        outcomes
    }

    /// Score every year, then fit trends at each configured threshold.
    pub fn run(&self, table: &VoteTable) -> RunReport {
        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("scoring_run", run_id = %run_id);
        let _guard = span.enter();

        tracing::info!(
            rows = table.len(),
            years = table.years().len(),
            anchors = self.pipeline.catalog().len(),
            "Scoring run started"
        );

        let outcomes = self.score_years(table);
        let mut scores: Vec<IdeologyScore> = outcomes
            .iter()
            .flat_map(|o| o.scores.iter().cloned())
            .collect();
        scores.sort_by(|a, b| {
            a.year
                .cmp(&b.year)
                .then_with(|| a.legislator_id.cmp(&b.legislator_id))
        });

        let trends: Vec<TrendTable> = self.analyzers.iter().map(|a| a.table(&scores)).collect();

        let scored = outcomes.iter().filter(|o| o.is_scored()).count();
        tracing::info!(
            years_scored = scored,
            years_exhausted = outcomes.len() - scored,
            scores = scores.len(),
            "Scoring run finished"
        );

        RunReport {
            run_id,
            scores,
            outcomes,
            trends,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irt::EstimationError;
    use crate::matrix::AgreementMatrix;
    use crate::votes::VoteRecord;
    use drift_common::AnchorCandidate;

    struct RowIndex;

    impl LatentTraitModel for RowIndex {
        fn fit(&self, m: &AgreementMatrix, _seed: u64) -> Result<Vec<f64>, EstimationError> {
            Ok((0..m.n_rows()).map(|r| r as f64 * 0.5).collect())
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.scoring.anchors = vec![AnchorCandidate::new("A")];
        config
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let mut bad = config();
        bad.scoring.anchors.clear();
        assert!(matches!(ScoringService::new(&bad), Err(ScoringError::Config(_))));

        let mut bad = config();
        bad.trend.min_years_thresholds = vec![2];
        assert!(matches!(
            ScoringService::with_model(RowIndex, &bad),
            Err(ScoringError::Config(_))
        ));
    }

    #[test]
    fn test_year_window_limits_outcomes() {
        let rows: Vec<VoteRecord> = (2000..2005)
            .map(|y| VoteRecord::new("A", i64::from(y), y, Some(1)))
            .collect();
        let table = VoteTable::from_records(rows).unwrap();

        let mut cfg = config();
        cfg.scoring.year_start = Some(2001);
        cfg.scoring.year_end = Some(2003);
        let service = ScoringService::with_model(RowIndex, &cfg).unwrap();

        let report = service.run(&table);
        assert_eq!(
            report.outcomes.iter().map(|o| o.year).collect::<Vec<_>>(),
            vec![2001, 2002, 2003]
        );
        assert!(report.scores.is_empty());
        assert_eq!(report.exhausted_years(), vec![2001, 2002, 2003]);
        assert_eq!(report.trends.len(), 2);
        assert!(report.trend_table(5).is_some_and(|t| t.results.is_empty()));
    }

    #[test]
    fn test_run_ids_are_unique() {
        let table = VoteTable::from_records(vec![VoteRecord::new("A", 1, 2000, Some(1))]).unwrap();
        let service = ScoringService::with_model(RowIndex, &config()).unwrap();
        assert_ne!(service.run(&table).run_id, service.run(&table).run_id);
    }
}
