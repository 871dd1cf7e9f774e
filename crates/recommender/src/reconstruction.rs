//! Affinity reconstruction from trained factors
//!
//! The full product W·H is R×C and is only meant for bulk evaluation. The
//! per-user path multiplies W by the selected columns of H and never
//! materializes the rest of the matrix.

use crate::error::RecommenderError;
use crate::factorization::Factors;
use crate::Result;
use ndarray::{Array2, ArrayView1, Axis};
use std::time::{Duration, Instant};
use tracing::info;

/// Estimated affinity scores plus how long they took to compute
#[derive(Debug, Clone)]
pub struct Reconstruction {
    /// R×n scores; column j belongs to `users[j]`
    pub scores: Array2<f64>,
    /// User column indices the score columns correspond to
    pub users: Vec<usize>,
    pub elapsed: Duration,
}

impl Reconstruction {
    /// Scores for the j-th reconstructed user
    pub fn column(&self, j: usize) -> Option<ArrayView1<'_, f64>> {
        (j < self.scores.ncols()).then(|| self.scores.column(j))
    }
}

pub struct AffinityReconstructor<'a> {
    factors: &'a Factors,
}

impl<'a> AffinityReconstructor<'a> {
    pub fn new(factors: &'a Factors) -> Self {
        Self { factors }
    }

    /// W·H for every (object, user) pair
    pub fn full(&self) -> Reconstruction {
        let start = Instant::now();
        let scores = self.factors.w.dot(&self.factors.h);
        let elapsed = start.elapsed();

        info!(
            rows = scores.nrows(),
            cols = scores.ncols(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Processed estimated sales based on W x H"
        );

        Reconstruction {
            scores,
            users: (0..self.factors.num_users()).collect(),
            elapsed,
        }
    }

    /// W·H[:, users] for the selected user columns, in the order given
    pub fn users(&self, users: &[usize]) -> Result<Reconstruction> {
        let num_users = self.factors.num_users();
        if let Some(&bad) = users.iter().find(|&&u| u >= num_users) {
            return Err(RecommenderError::Dimension(format!(
                "user column {} out of range for {} users",
                bad, num_users
            )));
        }

        let start = Instant::now();
        let scores = if users.is_empty() {
            Array2::zeros((self.factors.num_objects(), 0))
        } else {
            let h_selected = self.factors.h.select(Axis(1), users);
            self.factors.w.dot(&h_selected)
        };
        let elapsed = start.elapsed();

        info!(
            users = users.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Processed estimated sales for selected users"
        );

        Ok(Reconstruction {
            scores,
            users: users.to_vec(),
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn factors() -> Factors {
        Factors::new(
            array![[1.0, 0.0], [0.5, 2.0], [0.0, 1.0]],
            array![[2.0, 0.0, 1.0, 0.5], [0.0, 1.0, 3.0, 0.5]],
        )
        .unwrap()
    }

    #[test]
    fn test_full_reconstruction() {
        let f = factors();
        let rec = AffinityReconstructor::new(&f).full();
        assert_eq!(rec.scores.dim(), (3, 4));
        assert_eq!(rec.scores, f.w.dot(&f.h));
        assert_eq!(rec.users, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_partial_matches_full_columns() {
        let f = factors();
        let reconstructor = AffinityReconstructor::new(&f);
        let full = reconstructor.full();
        let partial = reconstructor.users(&[2, 0]).unwrap();

        assert_eq!(partial.scores.dim(), (3, 2));
        for (j, &user) in partial.users.iter().enumerate() {
            for row in 0..3 {
                let diff = partial.scores[[row, j]] - full.scores[[row, user]];
                assert!(diff.abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_single_user() {
        let f = factors();
        let rec = AffinityReconstructor::new(&f).users(&[1]).unwrap();
        let column = rec.column(0).unwrap();
        assert_eq!(column.to_vec(), vec![0.0, 2.0, 1.0]);
        assert!(rec.column(1).is_none());
    }

    #[test]
    fn test_out_of_range_user() {
        let f = factors();
        assert!(matches!(
            AffinityReconstructor::new(&f).users(&[0, 4]),
            Err(RecommenderError::Dimension(_))
        ));
    }

    #[test]
    fn test_empty_selection() {
        let f = factors();
        let rec = AffinityReconstructor::new(&f).users(&[]).unwrap();
        assert_eq!(rec.scores.dim(), (3, 0));
    }
}
