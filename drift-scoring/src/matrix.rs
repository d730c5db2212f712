//! Agreement matrix construction.
//!
//! For one (year, anchor) pair, every cell records whether a legislator voted
//! the same way as the anchor on a division. The builder applies the filters
//! in order:
//!
//! 1. Anchor vote count and anchor variance
//! 2. Division informativeness (aye fraction inside the configured band)
//! 3. Agreement coding against the anchor's votes
//! 4. Zero-variance columns, then zero-variance rows, repeated to a fixed point
//! 5. Minimum size

use serde::Serialize;

use drift_common::MatrixConfig;

use crate::error::{RejectReason, ScoringError};
use crate::votes::{YearVotes, MISSING};

// ============================================================================
// Agreement Matrix
// ============================================================================

/// Dense binary legislators × divisions matrix.
///
/// Cells are stored row-major in one buffer and hold 0, 1 or [`MISSING`].
/// `legislators[r]` and `divisions[c]` map compact indices back to ids.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgreementMatrix {
    year: i32,
    anchor_id: String,
    legislators: Vec<String>,
    divisions: Vec<i64>,
    cells: Vec<u8>,
}

impl AgreementMatrix {
    /// Assemble a matrix from rows of cells (`None` = absent).
    ///
    /// Values other than 0 and 1 are kept so the estimator can report them;
    /// [`MISSING`] itself is reserved for absent cells and rejected.
    pub fn from_rows(
        year: i32,
        anchor_id: impl Into<String>,
        legislators: Vec<String>,
        divisions: Vec<i64>,
        rows: Vec<Vec<Option<u8>>>,
    ) -> Result<Self, ScoringError> {
        if rows.len() != legislators.len() {
            return Err(ScoringError::Shape(format!(
                "{} rows for {} legislators",
                rows.len(),
                legislators.len()
            )));
        }

        let mut cells = Vec::with_capacity(legislators.len() * divisions.len());
        for (r, row) in rows.into_iter().enumerate() {
            if row.len() != divisions.len() {
                return Err(ScoringError::Shape(format!(
                    "row {r} has {} cells for {} divisions",
                    row.len(),
                    divisions.len()
                )));
            }
            for (c, cell) in row.into_iter().enumerate() {
                match cell {
                    Some(MISSING) => {
                        return Err(ScoringError::ReservedCell {
                            row: r,
                            col: c,
                            value: MISSING,
                        })
                    }
                    Some(v) => cells.push(v),
                    None => cells.push(MISSING),
                }
            }
        }

        Ok(Self {
            year,
            anchor_id: anchor_id.into(),
            legislators,
            divisions,
            cells,
        })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn anchor_id(&self) -> &str {
        &self.anchor_id
    }

    pub fn legislators(&self) -> &[String] {
        &self.legislators
    }

    pub fn divisions(&self) -> &[i64] {
        &self.divisions
    }

    pub fn n_rows(&self) -> usize {
        self.legislators.len()
    }

    pub fn n_cols(&self) -> usize {
        self.divisions.len()
    }

    /// Raw cells of one row (including [`MISSING`]).
    pub fn row(&self, r: usize) -> &[u8] {
        let n = self.n_cols();
        &self.cells[r * n..(r + 1) * n]
    }

    pub fn get(&self, r: usize, c: usize) -> Option<u8> {
        match self.cells[r * self.n_cols() + c] {
            MISSING => None,
            v => Some(v),
        }
    }

    /// First observed cell that is not 0 or 1, as `(row, col, value)`.
    pub fn first_non_binary(&self) -> Option<(usize, usize, u8)> {
        let n = self.n_cols();
        self.cells
            .iter()
            .enumerate()
            .find(|(_, &v)| v != 0 && v != 1 && v != MISSING)
            .map(|(idx, &v)| (idx / n, idx % n, v))
    }

    /// True when every column and every row holds both a 0 and a 1.
    pub fn is_fully_variable(&self) -> bool {
        let rows = vec![true; self.n_rows()];
        let cols = vec![true; self.n_cols()];
        (0..self.n_cols()).all(|c| column_varies(self, c, &rows))
            && (0..self.n_rows()).all(|r| row_varies(self, r, &cols))
    }
}

fn column_varies(matrix: &AgreementMatrix, c: usize, rows: &[bool]) -> bool {
    let mut seen = [false; 2];
    for (r, _) in rows.iter().enumerate().filter(|(_, &keep)| keep) {
        if let Some(v @ (0 | 1)) = matrix.get(r, c) {
            seen[usize::from(v)] = true;
        }
    }
    seen[0] && seen[1]
}

fn row_varies(matrix: &AgreementMatrix, r: usize, cols: &[bool]) -> bool {
    let mut seen = [false; 2];
    for (c, _) in cols.iter().enumerate().filter(|(_, &keep)| keep) {
        if let Some(v @ (0 | 1)) = matrix.get(r, c) {
            seen[usize::from(v)] = true;
        }
    }
    seen[0] && seen[1]
}

// ============================================================================
// Builder
// ============================================================================

/// Builds filtered agreement matrices.
#[derive(Debug, Clone)]
pub struct AgreementMatrixBuilder {
    config: MatrixConfig,
}

impl AgreementMatrixBuilder {
    pub fn new(config: MatrixConfig) -> Self {
        Self { config }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(MatrixConfig::default())
    }

    /// Build the agreement matrix for `anchor_id` over one year's votes.
    pub fn build(
        &self,
        votes: &YearVotes,
        anchor_id: &str,
        min_anchor_votes: usize,
    ) -> Result<AgreementMatrix, RejectReason> {
        let anchor_row = votes
            .legislator_row(anchor_id)
            .ok_or(RejectReason::AnchorUnavailable)?;
        let anchor_votes = votes.row(anchor_row);

        // Stage 1: anchor sufficiency
        let cast: Vec<u8> = anchor_votes.iter().copied().filter(|&v| v != MISSING).collect();
        if cast.len() < min_anchor_votes {
            return Err(RejectReason::InsufficientAnchorVotes {
                votes: cast.len(),
                required: min_anchor_votes,
            });
        }
        if cast.iter().all(|&v| v == cast[0]) {
            return Err(RejectReason::NoAnchorVariance);
        }

        // Stage 2: informative divisions the anchor voted on
        let band = self.config.informative_band;
        let columns: Vec<usize> = (0..votes.divisions().len())
            .filter(|&c| anchor_votes[c] != MISSING)
            .filter(|&c| votes.aye_fraction(c).is_some_and(|p| band.contains(p)))
            .collect();

        if columns.len() < self.config.min_items {
            return Err(RejectReason::TooFewInformativeItems {
                items: columns.len(),
                required: self.config.min_items,
            });
        }

        // Stage 3: agreement coding; rows need at least one overlapping vote
        let mut legislators = Vec::new();
        let mut rows = Vec::new();
        for (r, legislator) in votes.roster().iter().enumerate() {
            let row: Vec<Option<u8>> = columns
                .iter()
                .map(|&c| votes.vote(r, c).map(|v| u8::from(v == anchor_votes[c])))
                .collect();
            if row.iter().any(Option::is_some) {
                legislators.push(legislator.clone());
                rows.push(row);
            }
        }

        let raw = AgreementMatrix {
            year: votes.year(),
            anchor_id: anchor_id.to_string(),
            legislators,
            divisions: columns.iter().map(|&c| votes.divisions()[c]).collect(),
            cells: rows
                .into_iter()
                .flatten()
                .map(|cell| cell.unwrap_or(MISSING))
                .collect(),
        };

        // Stage 4: variance filters
        let matrix = drop_constant(&raw);

        // Stage 5: size
        if matrix.n_cols() < self.config.min_items {
            return Err(RejectReason::TooFewInformativeItems {
                items: matrix.n_cols(),
                required: self.config.min_items,
            });
        }
        if matrix.n_rows() < self.config.min_legislators {
            return Err(RejectReason::TooFewVariableLegislators {
                legislators: matrix.n_rows(),
                required: self.config.min_legislators,
            });
        }

        tracing::debug!(
            year = votes.year(),
            anchor_id,
            legislators = matrix.n_rows(),
            items = matrix.n_cols(),
            "Agreement matrix built"
        );

        Ok(matrix)
    }
}

/// Drop constant columns, then constant rows, until neither pass removes
/// anything. A row removal can leave a column constant, so one pass is not
/// enough to guarantee every survivor holds both values.
fn drop_constant(matrix: &AgreementMatrix) -> AgreementMatrix {
    let mut rows = vec![true; matrix.n_rows()];
    let mut cols = vec![true; matrix.n_cols()];

    loop {
        let mut changed = false;

        for c in 0..matrix.n_cols() {
            if cols[c] && !column_varies(matrix, c, &rows) {
                cols[c] = false;
                changed = true;
            }
        }
        for r in 0..matrix.n_rows() {
            if rows[r] && !row_varies(matrix, r, &cols) {
                rows[r] = false;
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }

    let keep_rows: Vec<usize> = (0..matrix.n_rows()).filter(|&r| rows[r]).collect();
    let keep_cols: Vec<usize> = (0..matrix.n_cols()).filter(|&c| cols[c]).collect();

    let mut cells = Vec::with_capacity(keep_rows.len() * keep_cols.len());
    for &r in &keep_rows {
        let row = matrix.row(r);
        cells.extend(keep_cols.iter().map(|&c| row[c]));
    }

    AgreementMatrix {
        year: matrix.year,
        anchor_id: matrix.anchor_id.clone(),
        legislators: keep_rows.iter().map(|&r| matrix.legislators[r].clone()).collect(),
        divisions: keep_cols.iter().map(|&c| matrix.divisions[c]).collect(),
        cells,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::votes::{VoteRecord, VoteTable};
    use drift_common::Band;
    use proptest::prelude::*;

    /// Anchor "A" plus `camp` agreeing and `camp` opposing legislators over
    /// `divisions` divisions. Each camp member crosses over once so no row is
    /// constant.
    fn camps(camp: usize, divisions: i64) -> Vec<VoteRecord> {
        let mut records = Vec::new();
        for d in 0..divisions {
            let anchor_vote = (d % 2) as u8;
            records.push(VoteRecord::new("A", d, 2020, Some(anchor_vote)));
            for i in 0..camp {
                let crosses = (i as i64) % divisions == d;
                let agree = anchor_vote;
                let oppose = 1 - anchor_vote;
                let (p, n) = if crosses { (oppose, agree) } else { (agree, oppose) };
                records.push(VoteRecord::new(format!("P{i}"), d, 2020, Some(p)));
                records.push(VoteRecord::new(format!("N{i}"), d, 2020, Some(n)));
            }
        }
        records
    }

    fn votes(records: Vec<VoteRecord>) -> YearVotes {
        VoteTable::from_records(records).unwrap().year_votes(2020)
    }

    #[test]
    fn test_two_camps_keep_every_item_and_member() {
        let votes = votes(camps(6, 8));
        let matrix = AgreementMatrixBuilder::with_defaults()
            .build(&votes, "A", 5)
            .unwrap();

        assert_eq!(matrix.n_cols(), 8);
        assert_eq!(matrix.n_rows(), 12);
        assert!(!matrix.legislators().contains(&"A".to_string()), "anchor row is constant");
        assert!(matrix.is_fully_variable());
        assert_eq!(matrix.anchor_id(), "A");
        assert_eq!(matrix.year(), 2020);
    }

    #[test]
    fn test_missing_anchor() {
        let votes = votes(camps(6, 8));
        assert_eq!(
            AgreementMatrixBuilder::with_defaults().build(&votes, "Z", 5),
            Err(RejectReason::AnchorUnavailable)
        );
    }

    #[test]
    fn test_anchor_vote_threshold_uses_override() {
        let votes = votes(camps(6, 8));
        let builder = AgreementMatrixBuilder::with_defaults();

        assert_eq!(
            builder.build(&votes, "A", 10),
            Err(RejectReason::InsufficientAnchorVotes { votes: 8, required: 10 })
        );
        assert!(builder.build(&votes, "A", 5).is_ok());
    }

    #[test]
    fn test_anchor_without_variance() {
        let mut records = camps(6, 8);
        for r in records.iter_mut().filter(|r| r.legislator_id == "A") {
            r.vote_binary = Some(1);
        }
        assert_eq!(
            AgreementMatrixBuilder::with_defaults().build(&votes(records), "A", 5),
            Err(RejectReason::NoAnchorVariance)
        );
    }

    #[test]
    fn test_near_unanimous_divisions_are_dropped() {
        let mut records = camps(6, 8);
        // Division 100 passes 31 to 1, above the informative band.
        for i in 0..30 {
            records.push(VoteRecord::new(format!("X{i}"), 100, 2020, Some(1)));
        }
        records.push(VoteRecord::new("A", 100, 2020, Some(1)));
        records.push(VoteRecord::new("P0", 100, 2020, Some(0)));

        let votes = votes(records);
        let col = votes.divisions().iter().position(|&d| d == 100).unwrap();
        assert!(votes.aye_fraction(col).unwrap() > 0.95);

        let matrix = AgreementMatrixBuilder::with_defaults()
            .build(&votes, "A", 5)
            .unwrap();
        assert!(!matrix.divisions().contains(&100));
        assert!(
            !matrix.legislators().iter().any(|l| l.starts_with('X')),
            "legislators with no overlapping vote get no row"
        );
    }

    #[test]
    fn test_too_few_items() {
        let votes = votes(camps(6, 4));
        assert_eq!(
            AgreementMatrixBuilder::with_defaults().build(&votes, "A", 2),
            Err(RejectReason::TooFewInformativeItems { items: 4, required: 5 })
        );
    }

    #[test]
    fn test_too_few_legislators() {
        let votes = votes(camps(4, 8));
        assert_eq!(
            AgreementMatrixBuilder::with_defaults().build(&votes, "A", 5),
            Err(RejectReason::TooFewVariableLegislators { legislators: 8, required: 10 })
        );
    }

    #[test]
    fn test_missing_votes_are_absent_cells() {
        let mut records = camps(6, 8);
        records.retain(|r| !(r.legislator_id == "P3" && r.division_id == 5));
        records.push(VoteRecord::new("P3", 5, 2020, None));

        let matrix = AgreementMatrixBuilder::with_defaults()
            .build(&votes(records), "A", 5)
            .unwrap();
        let r = matrix.legislators().iter().position(|l| l == "P3").unwrap();
        let c = matrix.divisions().iter().position(|&d| d == 5).unwrap();
        assert_eq!(matrix.get(r, c), None);
    }

    #[test]
    fn test_drop_constant_reaches_fixed_point() {
        // Row 2 is all zeros and holds the only 0 in column 1. Dropping the
        // row leaves column 1 constant, which a second pass must remove.
        let matrix = AgreementMatrix::from_rows(
            2020,
            "A",
            vec!["r0".into(), "r1".into(), "r2".into()],
            vec![0, 1, 2],
            vec![
                vec![Some(1), Some(1), Some(0)],
                vec![Some(0), Some(1), Some(1)],
                vec![Some(0), Some(0), Some(0)],
            ],
        )
        .unwrap();

        let filtered = drop_constant(&matrix);
        assert!(filtered.is_fully_variable());
        assert!(!filtered.divisions().contains(&1));
    }

    #[test]
    fn test_from_rows_rejects_ragged_input() {
        let err = AgreementMatrix::from_rows(
            2020,
            "A",
            vec!["r0".into()],
            vec![0, 1],
            vec![vec![Some(1)]],
        )
        .unwrap_err();
        assert!(matches!(err, ScoringError::Shape(_)));
    }

    #[test]
    fn test_non_binary_cells_do_not_count_as_variation() {
        let matrix = AgreementMatrix::from_rows(
            2020,
            "A",
            vec!["r0".into(), "r1".into()],
            vec![0],
            vec![vec![Some(1)], vec![Some(3)]],
        )
        .unwrap();

        assert_eq!(matrix.get(1, 0), Some(3));
        assert_eq!(matrix.first_non_binary(), Some((1, 0, 3)));
        assert!(!matrix.is_fully_variable());
        assert_eq!(drop_constant(&matrix).n_rows(), 0);
    }

    #[test]
    fn test_from_rows_rejects_reserved_value() {
        let err = AgreementMatrix::from_rows(
            2020,
            "A",
            vec!["r0".into()],
            vec![0],
            vec![vec![Some(MISSING)]],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ScoringError::ReservedCell { row: 0, col: 0, value: MISSING }
        ));
    }

    proptest! {
        #[test]
        fn prop_accepted_matrices_are_fully_variable(
            grid in proptest::collection::vec(
                proptest::collection::vec(prop_oneof![Just(None), Just(Some(0u8)), Just(Some(1u8))], 12),
                14,
            )
        ) {
            let mut records = Vec::new();
            for (i, row) in grid.iter().enumerate() {
                for (d, vote) in row.iter().enumerate() {
                    records.push(VoteRecord::new(format!("L{i}"), d as i64, 2020, *vote));
                }
            }
            let votes = VoteTable::from_records(records).unwrap().year_votes(2020);
            let builder = AgreementMatrixBuilder::new(MatrixConfig {
                informative_band: Band::new(0.05, 0.95),
                min_items: 1,
                min_legislators: 2,
            });

            if let Ok(matrix) = builder.build(&votes, "L0", 1) {
                prop_assert!(matrix.is_fully_variable());
                prop_assert!(matrix.n_rows() >= 2);
                for r in 0..matrix.n_rows() {
                    prop_assert!((0..matrix.n_cols()).any(|c| matrix.get(r, c).is_some()));
                }
            }
        }
    }
}
