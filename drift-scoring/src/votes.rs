//! Vote table input and per-year vote indexes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::error::ScoringError;

/// Cell value for "no usable vote".
pub const MISSING: u8 = u8::MAX;

// ============================================================================
// Vote Codes
// ============================================================================

/// Native division vote codes as published by the Commons votes API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteCode {
    /// Vote not recorded / member absent
    Missing = -9,
    /// Voted aye and acted as teller
    AyeTeller = 1,
    /// Voted aye
    Aye = 2,
    /// Recorded on both sides
    Both = 3,
    /// Voted no
    No = 4,
    /// Voted no and acted as teller
    NoTeller = 5,
}

impl VoteCode {
    /// Parse a raw integer code.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -9 => Some(Self::Missing),
            1 => Some(Self::AyeTeller),
            2 => Some(Self::Aye),
            3 => Some(Self::Both),
            4 => Some(Self::No),
            5 => Some(Self::NoTeller),
            _ => None,
        }
    }

    /// Binary aye/no encoding. Tellers count with their side; `Both` and
    /// `Missing` carry no usable position.
    pub const fn to_binary(self) -> Option<u8> {
        match self {
            Self::Aye | Self::AyeTeller => Some(1),
            Self::No | Self::NoTeller => Some(0),
            Self::Both | Self::Missing => None,
        }
    }
}

// ============================================================================
// Vote Records
// ============================================================================

/// One legislator's vote on one division.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub legislator_id: String,
    pub division_id: i64,
    pub year: i32,
    /// 1 = aye, 0 = no, `None` = missing
    pub vote_binary: Option<u8>,
}

impl VoteRecord {
    pub fn new(
        legislator_id: impl Into<String>,
        division_id: i64,
        year: i32,
        vote_binary: Option<u8>,
    ) -> Self {
        Self {
            legislator_id: legislator_id.into(),
            division_id,
            year,
            vote_binary,
        }
    }

    /// Build a record from a native vote code.
    pub fn from_code(
        legislator_id: impl Into<String>,
        division_id: i64,
        year: i32,
        code: VoteCode,
    ) -> Self {
        Self::new(legislator_id, division_id, year, code.to_binary())
    }
}

/// The cleaned vote table. Immutable once built.
#[derive(Debug, Clone)]
pub struct VoteTable {
    records: Vec<VoteRecord>,
}

impl VoteTable {
    /// Validate and wrap a set of records.
    ///
    /// Fails on an empty table, a blank legislator id, or a vote outside {0, 1}.
    pub fn from_records(records: Vec<VoteRecord>) -> Result<Self, ScoringError> {
        if records.is_empty() {
            return Err(ScoringError::EmptyVoteTable);
        }

        for (row, record) in records.iter().enumerate() {
            if record.legislator_id.trim().is_empty() {
                return Err(ScoringError::BlankLegislatorId { row });
            }
            if let Some(value) = record.vote_binary {
                if value > 1 {
                    return Err(ScoringError::InvalidVote { row, value });
                }
            }
        }

        Ok(Self { records })
    }

    /// Decode a JSON array of row objects and validate it.
    pub fn from_json(json: &str) -> Result<Self, ScoringError> {
        let records: Vec<VoteRecord> = serde_json::from_str(json)?;
        Self::from_records(records)
    }

    pub fn records(&self) -> &[VoteRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct years, ascending.
    pub fn years(&self) -> Vec<i32> {
        self.records
            .iter()
            .map(|r| r.year)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Build the dense vote index for one year.
    ///
    /// Duplicate rows for the same (legislator, division) collapse to the
    /// first one seen.
    pub fn year_votes(&self, year: i32) -> YearVotes {
        let rows: Vec<&VoteRecord> = self.records.iter().filter(|r| r.year == year).collect();

        let legislators: Vec<String> = rows
            .iter()
            .map(|r| r.legislator_id.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect();
        let divisions: Vec<i64> = rows
            .iter()
            .map(|r| r.division_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let legislator_index: HashMap<String, usize> = legislators
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        let division_index: HashMap<i64, usize> =
            divisions.iter().enumerate().map(|(j, &id)| (id, j)).collect();

        let n_cols = divisions.len();
        let mut cells = vec![MISSING; legislators.len() * n_cols];
        let mut seen = vec![false; cells.len()];
        let mut duplicates = 0usize;

        for record in rows {
            let i = legislator_index[&record.legislator_id];
            let j = division_index[&record.division_id];
            let idx = i * n_cols + j;
            if seen[idx] {
                duplicates += 1;
                tracing::debug!(
                    year,
                    legislator_id = %record.legislator_id,
                    division_id = record.division_id,
                    "Duplicate vote row, keeping first"
                );
                continue;
            }
            seen[idx] = true;
            cells[idx] = record.vote_binary.unwrap_or(MISSING);
        }

        if duplicates > 0 {
            tracing::warn!(year, duplicates, "Collapsed duplicate vote rows");
        }

        YearVotes {
            year,
            legislators,
            legislator_index,
            divisions,
            cells,
            duplicates,
        }
    }
}

// ============================================================================
// Year Votes
// ============================================================================

/// Dense legislators × divisions vote grid for one year.
///
/// Rows and columns are sorted by id. Cells hold 0, 1 or [`MISSING`].
#[derive(Debug, Clone)]
pub struct YearVotes {
    year: i32,
    legislators: Vec<String>,
    legislator_index: HashMap<String, usize>,
    divisions: Vec<i64>,
    cells: Vec<u8>,
    duplicates: usize,
}

impl YearVotes {
    pub fn year(&self) -> i32 {
        self.year
    }

    /// Every legislator with at least one row this year, voted or not.
    pub fn roster(&self) -> &[String] {
        &self.legislators
    }

    pub fn divisions(&self) -> &[i64] {
        &self.divisions
    }

    /// Number of duplicate rows collapsed while indexing.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn legislator_row(&self, legislator_id: &str) -> Option<usize> {
        self.legislator_index.get(legislator_id).copied()
    }

    /// Vote cells for one legislator, one per division.
    pub fn row(&self, row: usize) -> &[u8] {
        let n = self.divisions.len();
        &self.cells[row * n..(row + 1) * n]
    }

    pub fn vote(&self, row: usize, col: usize) -> Option<u8> {
        match self.cells[row * self.divisions.len() + col] {
            MISSING => None,
            v => Some(v),
        }
    }

    /// Share of aye votes among non-missing votes on a division.
    pub fn aye_fraction(&self, col: usize) -> Option<f64> {
        let (ayes, cast) = (0..self.legislators.len())
            .filter_map(|row| self.vote(row, col))
            .fold((0usize, 0usize), |(ayes, cast), v| (ayes + v as usize, cast + 1));

        (cast > 0).then(|| ayes as f64 / cast as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(leg: &str, div: i64, year: i32, vote: Option<u8>) -> VoteRecord {
        VoteRecord::new(leg, div, year, vote)
    }

    #[test]
    fn test_vote_code_mapping() {
        assert_eq!(VoteCode::Aye.to_binary(), Some(1));
        assert_eq!(VoteCode::AyeTeller.to_binary(), Some(1));
        assert_eq!(VoteCode::No.to_binary(), Some(0));
        assert_eq!(VoteCode::NoTeller.to_binary(), Some(0));
        assert_eq!(VoteCode::Both.to_binary(), None);
        assert_eq!(VoteCode::Missing.to_binary(), None);
        assert_eq!(VoteCode::from_code(-9), Some(VoteCode::Missing));
        assert_eq!(VoteCode::from_code(6), None);
    }

    #[test]
    fn test_empty_table_is_fatal() {
        assert!(matches!(
            VoteTable::from_records(vec![]),
            Err(ScoringError::EmptyVoteTable)
        ));
    }

    #[test]
    fn test_out_of_range_vote_is_fatal() {
        let err = VoteTable::from_records(vec![
            record("a", 1, 2020, Some(1)),
            record("b", 1, 2020, Some(2)),
        ])
        .unwrap_err();
        assert!(matches!(err, ScoringError::InvalidVote { row: 1, value: 2 }));
    }

    #[test]
    fn test_blank_legislator_is_fatal() {
        let err = VoteTable::from_records(vec![record("  ", 1, 2020, Some(1))]).unwrap_err();
        assert!(matches!(err, ScoringError::BlankLegislatorId { row: 0 }));
    }

    #[test]
    fn test_from_json_requires_columns() {
        let ok = VoteTable::from_json(
            r#"[{"legislator_id": "a", "division_id": 7, "year": 2020, "vote_binary": null}]"#,
        )
        .unwrap();
        assert_eq!(ok.len(), 1);
        assert_eq!(ok.records()[0].vote_binary, None);

        let missing_year =
            VoteTable::from_json(r#"[{"legislator_id": "a", "division_id": 7, "vote_binary": 1}]"#);
        assert!(matches!(missing_year, Err(ScoringError::MalformedRows(_))));
    }

    #[test]
    fn test_years_are_sorted_and_distinct() {
        let table = VoteTable::from_records(vec![
            record("a", 1, 2021, Some(1)),
            record("a", 2, 2019, Some(0)),
            record("b", 3, 2021, None),
        ])
        .unwrap();
        assert_eq!(table.years(), vec![2019, 2021]);
    }

    #[test]
    fn test_year_votes_index_and_duplicates() {
        let table = VoteTable::from_records(vec![
            record("b", 20, 2020, Some(1)),
            record("a", 10, 2020, Some(0)),
            record("a", 10, 2020, Some(1)),
            record("a", 20, 2020, None),
            record("c", 10, 2021, Some(1)),
        ])
        .unwrap();

        let votes = table.year_votes(2020);
        assert_eq!(votes.roster(), &["a".to_string(), "b".to_string()]);
        assert_eq!(votes.divisions(), &[10i64, 20]);
        assert_eq!(votes.duplicates(), 1);

        let a = votes.legislator_row("a").unwrap();
        assert_eq!(votes.vote(a, 0), Some(0), "first row wins");
        assert_eq!(votes.vote(a, 1), None);
        assert!(votes.legislator_row("c").is_none());

        assert_eq!(votes.aye_fraction(0), Some(0.0));
        assert_eq!(votes.aye_fraction(1), Some(1.0));
    }
}
