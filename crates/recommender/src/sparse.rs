//! Sparse object×user interaction matrix
//!
//! Population goes through `InteractionMatrixBuilder`, which accepts
//! coordinates in any order. `build()` freezes the result into an immutable
//! CSR snapshot that the factorization engine reads from.

use crate::error::RecommenderError;
use crate::types::InteractionCount;
use crate::Result;
use ndarray::{Array2, ArrayView2};
use sprs::{CsMat, TriMat};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::info;

/// What happens when the same cell is assigned twice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Later assignment replaces the earlier value
    #[default]
    Overwrite,
    /// Values for the same cell are summed
    Accumulate,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(DuplicatePolicy::Overwrite),
            "accumulate" => Ok(DuplicatePolicy::Accumulate),
            other => Err(format!(
                "unknown duplicate policy '{}' (expected overwrite or accumulate)",
                other
            )),
        }
    }
}

/// Mutable accumulator of (row, col, value) triples
#[derive(Debug, Clone)]
pub struct InteractionMatrixBuilder {
    rows: usize,
    cols: usize,
    policy: DuplicatePolicy,
    entries: HashMap<(usize, usize), f64>,
}

impl InteractionMatrixBuilder {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            policy: DuplicatePolicy::default(),
            entries: HashMap::new(),
        }
    }

    pub fn with_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Assign a value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        if row >= self.rows || col >= self.cols {
            return Err(RecommenderError::Dimension(format!(
                "coordinate ({}, {}) outside matrix of shape ({}, {})",
                row, col, self.rows, self.cols
            )));
        }

        match self.policy {
            DuplicatePolicy::Overwrite => {
                self.entries.insert((row, col), value);
            }
            DuplicatePolicy::Accumulate => {
                *self.entries.entry((row, col)).or_insert(0.0) += value;
            }
        }
        Ok(())
    }

    /// Assign every count at its (row_idx, col_idx)
    pub fn extend_counts(&mut self, counts: &[InteractionCount]) -> Result<()> {
        for count in counts {
            self.set(count.row_idx, count.col_idx, count.volume as f64)?;
        }
        Ok(())
    }

    /// Freeze into a compressed snapshot
    pub fn build(self) -> InteractionMatrix {
        let mut coords: Vec<((usize, usize), f64)> = self
            .entries
            .into_iter()
            .filter(|(_, v)| *v != 0.0)
            .collect();
        coords.sort_unstable_by_key(|(coord, _)| *coord);

        let mut tri = TriMat::new((self.rows, self.cols));
        for ((row, col), value) in coords {
            tri.add_triplet(row, col, value);
        }

        let csr: CsMat<f64> = tri.to_csr();
        let csc = csr.to_csc();
        info!(
            rows = csr.rows(),
            cols = csr.cols(),
            nnz = csr.nnz(),
            "Built object/user interaction matrix"
        );
        InteractionMatrix { csr, csc }
    }
}

/// Read-only R×C interaction matrix
///
/// Stored twice: row-major for the factorization products and column-major
/// for per-user lookups.
#[derive(Debug, Clone)]
pub struct InteractionMatrix {
    csr: CsMat<f64>,
    csc: CsMat<f64>,
}

impl InteractionMatrix {
    /// Build straight from aggregated counts with the default policy
    pub fn from_counts(rows: usize, cols: usize, counts: &[InteractionCount]) -> Result<Self> {
        let mut builder = InteractionMatrixBuilder::new(rows, cols);
        builder.extend_counts(counts)?;
        Ok(builder.build())
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.csr.rows(), self.csr.cols())
    }

    pub fn rows(&self) -> usize {
        self.csr.rows()
    }

    pub fn cols(&self) -> usize {
        self.csr.cols()
    }

    /// Number of stored (nonzero) cells
    pub fn nnz(&self) -> usize {
        self.csr.nnz()
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        if row >= self.rows() || col >= self.cols() {
            return 0.0;
        }
        self.csr.get(row, col).copied().unwrap_or(0.0)
    }

    /// Stored cells as (row, col, value), row-major
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.csr.iter().map(|(&value, (row, col))| (row, col, value))
    }

    pub fn sum(&self) -> f64 {
        self.csr.data().iter().sum()
    }

    pub fn sum_squares(&self) -> f64 {
        self.csr.data().iter().map(|v| v * v).sum()
    }

    /// Mean over all R×C cells, zeros included
    pub fn mean(&self) -> f64 {
        let cells = self.rows() * self.cols();
        if cells == 0 {
            0.0
        } else {
            self.sum() / cells as f64
        }
    }

    /// Rows with a nonzero value in column `col`, ascending; empty when out of range
    pub fn rows_in_column(&self, col: usize) -> Vec<usize> {
        self.csc
            .outer_view(col)
            .map(|column| column.indices().to_vec())
            .unwrap_or_default()
    }

    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros(self.shape());
        for (row, col, value) in self.iter() {
            dense[[row, col]] = value;
        }
        dense
    }

    /// X · B for a dense B of shape (C, k)
    pub fn mul_dense(&self, b: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if b.nrows() != self.cols() {
            return Err(RecommenderError::Dimension(format!(
                "cannot multiply ({}, {}) by ({}, {})",
                self.rows(),
                self.cols(),
                b.nrows(),
                b.ncols()
            )));
        }

        let mut out = Array2::zeros((self.rows(), b.ncols()));
        for (row, vec) in self.csr.outer_iterator().enumerate() {
            let mut out_row = out.row_mut(row);
            for (col, &value) in vec.iter() {
                out_row.scaled_add(value, &b.row(col));
            }
        }
        Ok(out)
    }

    /// Xᵀ · A for a dense A of shape (R, k)
    pub fn transpose_mul_dense(&self, a: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if a.nrows() != self.rows() {
            return Err(RecommenderError::Dimension(format!(
                "cannot multiply transpose of ({}, {}) by ({}, {})",
                self.rows(),
                self.cols(),
                a.nrows(),
                a.ncols()
            )));
        }

        let mut out = Array2::zeros((self.cols(), a.ncols()));
        for (row, vec) in self.csr.outer_iterator().enumerate() {
            let a_row = a.row(row);
            for (col, &value) in vec.iter() {
                out.row_mut(col).scaled_add(value, &a_row);
            }
        }
        Ok(out)
    }
}
