//! Ordered catalog of reference legislators.

use drift_common::ScoringConfig;

use crate::votes::YearVotes;

/// A candidate paired with its effective vote threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAnchor {
    pub legislator_id: String,
    pub min_votes: usize,
    /// Zero-based position in the catalog
    pub rank: usize,
}

/// Anchor candidates in priority order.
#[derive(Debug, Clone)]
pub struct AnchorCatalog {
    anchors: Vec<ResolvedAnchor>,
}

impl ResolvedAnchor {
    /// Whether the candidate has any row in this year's votes.
    pub fn is_on_roster(&self, votes: &YearVotes) -> bool {
        votes.legislator_row(&self.legislator_id).is_some()
    }
}

impl AnchorCatalog {
    /// Resolve every configured candidate's threshold, honoring overrides.
    pub fn from_config(config: &ScoringConfig) -> Self {
        let anchors = config
            .anchors
            .iter()
            .enumerate()
            .map(|(rank, c)| ResolvedAnchor {
                legislator_id: c.legislator_id.clone(),
                min_votes: config.min_votes_for(c),
                rank,
            })
            .collect();
        Self { anchors }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedAnchor> {
        self.anchors.iter()
    }

    /// Candidate at a catalog position.
    pub fn get(&self, rank: usize) -> Option<&ResolvedAnchor> {
        self.anchors.get(rank)
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}
