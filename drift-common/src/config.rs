//! Configuration management for drift scoring runs.
//!
//! Runs read a single configuration file at `~/.driftscore/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (DRIFT_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `DRIFT_LOG_LEVEL` → observability.log_level
//! - `DRIFT_LOG_FORMAT` → observability.log_format
//! - `DRIFT_SEED` → scoring.estimator.seed
//! - `DRIFT_MAX_ATTEMPTS` → scoring.estimator.max_attempts
//! - `DRIFT_PARALLEL` → scoring.parallel

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".driftscore"),
        |dirs| dirs.home_dir().join(".driftscore"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Shared Types
// ============================================================================

/// An open numeric interval `(low, high)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    /// Exclusive lower bound
    pub low: f64,
    /// Exclusive upper bound
    pub high: f64,
}

impl Band {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// True when `value` lies strictly inside the band. NaN is never inside.
    pub fn contains(&self, value: f64) -> bool {
        value > self.low && value < self.high
    }
}

// ============================================================================
// Anchor Configuration
// ============================================================================

/// A candidate reference legislator.
///
/// Priority is the candidate's position in [`ScoringConfig::anchors`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorCandidate {
    /// Legislator identifier as it appears in the vote table
    pub legislator_id: String,

    /// Minimum non-missing votes this anchor needs in a year.
    /// Falls back to [`ScoringConfig::default_min_anchor_votes`] when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_votes: Option<usize>,
}

impl AnchorCandidate {
    pub fn new(legislator_id: impl Into<String>) -> Self {
        Self {
            legislator_id: legislator_id.into(),
            min_votes: None,
        }
    }

    /// Attach a per-anchor minimum-vote override.
    pub fn with_min_votes(mut self, min_votes: usize) -> Self {
        self.min_votes = Some(min_votes);
        self
    }
}

// ============================================================================
// Scoring Configuration
// ============================================================================

/// Per-year scoring configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Anchor candidates in priority order
    #[serde(default)]
    pub anchors: Vec<AnchorCandidate>,

    /// Minimum anchor votes for candidates without an override
    #[serde(default = "default_min_anchor_votes")]
    pub default_min_anchor_votes: usize,

    /// Agreement matrix filters
    #[serde(default)]
    pub matrix: MatrixConfig,

    /// Latent-trait estimator settings
    #[serde(default)]
    pub estimator: EstimatorConfig,

    /// Accepted band for the standard deviation of a year's scores
    #[serde(default = "default_score_sd_band")]
    pub score_sd_band: Band,

    /// First year to score (inclusive). Unset means no lower bound.
    #[serde(default)]
    pub year_start: Option<i32>,

    /// Last year to score (inclusive). Unset means no upper bound.
    #[serde(default)]
    pub year_end: Option<i32>,

    /// Score years and fit trends on the rayon pool
    #[serde(default = "default_true")]
    pub parallel: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            anchors: Vec::new(),
            default_min_anchor_votes: default_min_anchor_votes(),
            matrix: MatrixConfig::default(),
            estimator: EstimatorConfig::default(),
            score_sd_band: default_score_sd_band(),
            year_start: None,
            year_end: None,
            parallel: true,
        }
    }
}

impl ScoringConfig {
    /// Minimum votes required of `anchor`, honoring its override.
    pub fn min_votes_for(&self, anchor: &AnchorCandidate) -> usize {
        anchor.min_votes.unwrap_or(self.default_min_anchor_votes)
    }

    /// Whether `year` falls inside the configured scoring window.
    pub fn includes_year(&self, year: i32) -> bool {
        self.year_start.map_or(true, |start| year >= start)
            && self.year_end.map_or(true, |end| year <= end)
    }
}

fn default_true() -> bool {
    true
}

fn default_min_anchor_votes() -> usize {
    10
}

fn default_score_sd_band() -> Band {
    Band::new(0.1, 10.0)
}

/// Agreement matrix filter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixConfig {
    /// Aye-fraction band a division must fall strictly inside to be kept
    #[serde(default = "default_informative_band")]
    pub informative_band: Band,

    /// Minimum retained divisions (columns)
    #[serde(default = "default_min_items")]
    pub min_items: usize,

    /// Minimum retained legislators (rows)
    #[serde(default = "default_min_legislators")]
    pub min_legislators: usize,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            informative_band: default_informative_band(),
            min_items: default_min_items(),
            min_legislators: default_min_legislators(),
        }
    }
}

fn default_informative_band() -> Band {
    Band::new(0.05, 0.95)
}

fn default_min_items() -> usize {
    5
}

fn default_min_legislators() -> usize {
    10
}

/// How a legislator's point estimate is read off the posterior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreMethod {
    /// Expected a posteriori (posterior mean over the quadrature grid)
    #[default]
    Eap,
    /// Empirical-Bayes modal estimate (posterior mode)
    Map,
}

/// Latent-trait estimator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Total fit attempts per agreement matrix
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// EM iteration cap
    #[serde(default = "default_em_iterations")]
    pub em_iterations: usize,

    /// Newton iteration cap for each item's M-step
    #[serde(default = "default_newton_iterations")]
    pub newton_iterations: usize,

    /// Largest parameter change that counts as EM convergence
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Ridge penalty on item slope and intercept
    #[serde(default = "default_ridge")]
    pub ridge: f64,

    /// Absolute cap on item discrimination
    #[serde(default = "default_max_discrimination")]
    pub max_discrimination: f64,

    /// Base seed for start-value jitter; each attempt derives its own seed
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Point estimate extracted per legislator
    #[serde(default)]
    pub score_method: ScoreMethod,

    /// Treat hitting the EM cap without converging as a failed attempt
    #[serde(default)]
    pub require_convergence: bool,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            em_iterations: default_em_iterations(),
            newton_iterations: default_newton_iterations(),
            tolerance: default_tolerance(),
            ridge: default_ridge(),
            max_discrimination: default_max_discrimination(),
            seed: default_seed(),
            score_method: ScoreMethod::default(),
            require_convergence: false,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_em_iterations() -> usize {
    30
}

fn default_newton_iterations() -> usize {
    100
}

fn default_tolerance() -> f64 {
    1e-4
}

fn default_ridge() -> f64 {
    0.01
}

fn default_max_discrimination() -> f64 {
    20.0
}

fn default_seed() -> u64 {
    42
}

// ============================================================================
// Trend Configuration
// ============================================================================

/// Longitudinal trend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendConfig {
    /// Minimum scored years a legislator needs; one trend table per entry
    #[serde(default = "default_min_years_thresholds")]
    pub min_years_thresholds: Vec<usize>,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            min_years_thresholds: default_min_years_thresholds(),
        }
    }
}

fn default_min_years_thresholds() -> Vec<usize> {
    vec![5, 15]
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// JSON Schema reference
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Per-year scoring
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Longitudinal trend analysis
    #[serde(default)]
    pub trend: TrendConfig,

    /// Logging
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable fallbacks.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("DRIFT_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("DRIFT_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Some(seed) = lookup("DRIFT_SEED") {
            match seed.parse() {
                Ok(s) => self.scoring.estimator.seed = s,
                Err(_) => tracing::warn!(value = %seed, "Ignoring unparseable DRIFT_SEED"),
            }
        }
        if let Some(attempts) = lookup("DRIFT_MAX_ATTEMPTS") {
            match attempts.parse() {
                Ok(n) => self.scoring.estimator.max_attempts = n,
                Err(_) => {
                    tracing::warn!(value = %attempts, "Ignoring unparseable DRIFT_MAX_ATTEMPTS")
                }
            }
        }
        if let Some(parallel) = lookup("DRIFT_PARALLEL") {
            match parallel.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.scoring.parallel = true,
                "0" | "false" | "no" => self.scoring.parallel = false,
                _ => tracing::warn!(value = %parallel, "Ignoring unparseable DRIFT_PARALLEL"),
            }
        }
    }

    /// Save configuration to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;

        Ok(())
    }
}
