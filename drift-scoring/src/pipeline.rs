//! Per-year scoring state machine.
//!
//! ```text
//! SelectAnchor ──► BuildMatrix ──► Estimate ──► Accept
//!      ▲  │              │             │
//!      │  │              └──────┬──────┘
//!      │  │                     ▼
//!      └──┼──────────────── Reject(reason)
//!         ▼
//!     Exhausted
//! ```
//!
//! Candidates are tried in catalog order and the first fully successful
//! attempt wins. A year where every candidate is rejected is exhausted and
//! produces no scores; that is a normal outcome, not an error.

use serde::Serialize;

use drift_common::ScoringConfig;

use crate::anchor::{AnchorCatalog, ResolvedAnchor};
use crate::error::RejectReason;
use crate::irt::{IdeologyScore, LatentTraitEstimator, LatentTraitModel, TwoParameterLogistic};
use crate::matrix::{AgreementMatrix, AgreementMatrixBuilder};
use crate::votes::YearVotes;

// ============================================================================
// Outcomes
// ============================================================================

/// How one anchor attempt ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptResult {
    Accepted,
    Rejected { reason: RejectReason },
}

/// One anchor tried for one year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnchorAttempt {
    pub anchor_id: String,
    /// Position in the catalog
    pub rank: usize,
    pub result: AttemptResult,
}

/// Final status of a year.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum YearStatus {
    Scored {
        anchor_id: String,
        legislators: usize,
        items: usize,
    },
    Exhausted,
}

/// Everything the pipeline learned about one year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearOutcome {
    pub year: i32,
    pub status: YearStatus,
    pub attempts: Vec<AnchorAttempt>,
    pub scores: Vec<IdeologyScore>,
    /// Duplicate vote rows collapsed for this year
    pub duplicates: usize,
}

impl YearOutcome {
    pub fn is_scored(&self) -> bool {
        matches!(self.status, YearStatus::Scored { .. })
    }

    /// Anchor whose attempt was accepted, if any.
    pub fn anchor_id(&self) -> Option<&str> {
        match &self.status {
            YearStatus::Scored { anchor_id, .. } => Some(anchor_id),
            YearStatus::Exhausted => None,
        }
    }
}

// ============================================================================
// State Machine
// ============================================================================

/// Pipeline states for one year.
#[derive(Debug)]
enum YearState<'a> {
    /// Pick the candidate at this catalog position
    SelectAnchor(usize),
    BuildMatrix(&'a ResolvedAnchor),
    Estimate(&'a ResolvedAnchor, AgreementMatrix),
    Accept(&'a ResolvedAnchor, AgreementMatrix, Vec<IdeologyScore>),
    Reject(&'a ResolvedAnchor, RejectReason),
    Exhausted,
}

/// Scores single years against an anchor catalog.
#[derive(Debug, Clone)]
pub struct YearlyScoringPipeline<M = TwoParameterLogistic> {
    catalog: AnchorCatalog,
    builder: AgreementMatrixBuilder,
    estimator: LatentTraitEstimator<M>,
}

impl YearlyScoringPipeline<TwoParameterLogistic> {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            catalog: AnchorCatalog::from_config(config),
            builder: AgreementMatrixBuilder::new(config.matrix.clone()),
            estimator: LatentTraitEstimator::from_config(config),
        }
    }
}

impl<M: LatentTraitModel> YearlyScoringPipeline<M> {
    /// Drive the pipeline with a custom latent-trait model.
    pub fn with_model(model: M, config: &ScoringConfig) -> Self {
        Self {
            catalog: AnchorCatalog::from_config(config),
            builder: AgreementMatrixBuilder::new(config.matrix.clone()),
            estimator: LatentTraitEstimator::with_model(model, config),
        }
    }

    pub fn catalog(&self) -> &AnchorCatalog {
        &self.catalog
    }

    /// Run the state machine for one year.
    pub fn score_year(&self, votes: &YearVotes) -> YearOutcome {
        let year = votes.year();
        let mut attempts = Vec::new();
        let mut state = YearState::SelectAnchor(0);

        loop {
            state = match state {
                YearState::SelectAnchor(next) => match self.catalog.get(next) {
                    None => YearState::Exhausted,
                    Some(anchor) if !anchor.is_on_roster(votes) => {
                        YearState::Reject(anchor, RejectReason::AnchorUnavailable)
                    }
                    Some(anchor) => YearState::BuildMatrix(anchor),
                },

                YearState::BuildMatrix(anchor) => {
                    match self.builder.build(votes, &anchor.legislator_id, anchor.min_votes) {
                        Ok(matrix) => YearState::Estimate(anchor, matrix),
                        Err(reason) => YearState::Reject(anchor, reason),
                    }
                }

                YearState::Estimate(anchor, matrix) => match self.estimator.estimate(&matrix) {
                    Ok(scores) => YearState::Accept(anchor, matrix, scores),
                    Err(reason) => YearState::Reject(anchor, reason),
                },

                YearState::Reject(anchor, reason) => {
                    tracing::debug!(
                        year,
                        anchor_id = %anchor.legislator_id,
                        rank = anchor.rank,
                        category = ?reason.category(),
                        reason = %reason,
                        "Anchor attempt rejected"
                    );
                    attempts.push(AnchorAttempt {
                        anchor_id: anchor.legislator_id.clone(),
                        rank: anchor.rank,
                        result: AttemptResult::Rejected { reason },
                    });
                    YearState::SelectAnchor(anchor.rank + 1)
                }

                YearState::Accept(anchor, matrix, scores) => {
                    attempts.push(AnchorAttempt {
                        anchor_id: anchor.legislator_id.clone(),
                        rank: anchor.rank,
                        result: AttemptResult::Accepted,
                    });
                    tracing::debug!(
                        year,
                        anchor_id = %anchor.legislator_id,
                        legislators = matrix.n_rows(),
                        items = matrix.n_cols(),
                        "Year scored"
                    );
                    return YearOutcome {
                        year,
                        status: YearStatus::Scored {
                            anchor_id: anchor.legislator_id.clone(),
                            legislators: matrix.n_rows(),
                            items: matrix.n_cols(),
                        },
                        attempts,
                        scores,
                        duplicates: votes.duplicates(),
                    };
                }

                YearState::Exhausted => {
                    tracing::info!(
                        year,
                        candidates = self.catalog.len(),
                        "Anchor catalog exhausted, year left unscored"
                    );
                    return YearOutcome {
                        year,
                        status: YearStatus::Exhausted,
                        attempts,
                        scores: Vec::new(),
                        duplicates: votes.duplicates(),
                    };
                }
            };
        }
    }
}
