//! Drift Scoring Library
//!
//! Turns roll-call votes into yearly latent-trait ideology scores measured
//! against a reference legislator, then fits each legislator's score over
//! time to detect ideological drift.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         ScoringService                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  VoteTable ──► per year (rayon) ──► YearlyScoringPipeline        │
//! │                                      │                           │
//! │           ┌──────────────────────────┼─────────────────────┐     │
//! │           ▼                          ▼                     ▼     │
//! │   ┌───────────────┐   ┌──────────────────────┐   ┌────────────┐  │
//! │   │ AnchorCatalog │──►│ AgreementMatrix      │──►│ LatentTrait│  │
//! │   │ (priority)    │   │ Builder (filters)    │   │ Estimator  │  │
//! │   └───────────────┘   └──────────────────────┘   └────────────┘  │
//! │                                      │                           │
//! │                                      ▼                           │
//! │   IdeologyScore rows ──► LongitudinalTrendAnalyzer ──► trends    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! ## Anchor
//! - A reference legislator; 1 in the agreement matrix means "voted like the anchor"
//! - Candidates are tried in priority order; the first accepted fit wins
//! - A year with no acceptable anchor is left unscored
//!
//! ## Latent trait
//! - Two-parameter logistic model fitted by EM over Gauss-Hermite quadrature
//! - Higher scores mean closer to the anchor
//! - Fits whose score spread falls outside the configured band are retried
//!
//! ## Trend
//! - OLS of score on year per legislator, two-sided t-test on the slope
//! - Significance stars at 0.001 / 0.01 / 0.05 / 0.1

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod anchor;
pub mod error;
pub mod irt;
pub mod matrix;
pub mod pipeline;
pub mod service;
pub mod trend;
pub mod votes;

pub use anchor::{AnchorCatalog, ResolvedAnchor};
pub use error::{RejectCategory, RejectReason, ScoringError};
pub use irt::{
    EstimationError, IdeologyScore, LatentTraitEstimator, LatentTraitModel, Method,
    TwoParameterLogistic,
};
pub use matrix::{AgreementMatrix, AgreementMatrixBuilder};
pub use pipeline::{AnchorAttempt, AttemptResult, YearOutcome, YearStatus, YearlyScoringPipeline};
pub use service::{RunReport, ScoringService};
pub use trend::{
    LinearFit, LongitudinalTrendAnalyzer, SignificanceBucket, TrendResult, TrendSummary,
    TrendTable,
};
pub use votes::{VoteCode, VoteRecord, VoteTable, YearVotes};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::irt::{IdeologyScore, LatentTraitModel};
    pub use crate::pipeline::{YearOutcome, YearlyScoringPipeline};
    pub use crate::service::{RunReport, ScoringService};
    pub use crate::trend::{LongitudinalTrendAnalyzer, SignificanceBucket, TrendResult};
    pub use crate::votes::{VoteRecord, VoteTable};
    pub use drift_common::prelude::*;
}
