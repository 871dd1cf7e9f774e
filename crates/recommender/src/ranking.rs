//! Top-N ranking of reconstructed affinity scores

use ndarray::ArrayView1;
use std::collections::HashSet;

/// One ranked object for a user
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredObject {
    pub row_idx: usize,
    pub object_key: String,
    pub score: f64,
}

/// Ranked objects for one user
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub user_key: String,
    pub col_idx: usize,
    pub objects: Vec<ScoredObject>,
}

impl Recommendation {
    /// Object keys, best first
    pub fn object_keys(&self) -> Vec<&str> {
        self.objects.iter().map(|o| o.object_key.as_str()).collect()
    }
}

/// Row indices of the `n` highest scores, best first
///
/// Rows listed in `excluded` are skipped. The sort is stable, so equal scores
/// keep ascending row order. NaN scores rank last.
pub fn top_n_rows(scores: ArrayView1<'_, f64>, n: usize, excluded: &HashSet<usize>) -> Vec<(usize, f64)> {
    let mut scored: Vec<(usize, f64)> = scores
        .iter()
        .copied()
        .enumerate()
        .filter(|(row, _)| !excluded.contains(row))
        .collect();

    scored.sort_by(|a, b| match (a.1.is_nan(), b.1.is_nan()) {
        (false, false) => b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal),
        (true, false) => std::cmp::Ordering::Greater,
        (false, true) => std::cmp::Ordering::Less,
        (true, true) => std::cmp::Ordering::Equal,
    });
    scored.truncate(n);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_descending_order() {
        let scores = array![0.1, 0.9, 0.5, 0.7];
        let top = top_n_rows(scores.view(), 3, &HashSet::new());
        assert_eq!(top, vec![(1, 0.9), (3, 0.7), (2, 0.5)]);
    }

    #[test]
    fn test_ties_keep_row_order() {
        let scores = array![0.5, 0.8, 0.5, 0.8, 0.5];
        let top = top_n_rows(scores.view(), 4, &HashSet::new());
        let rows: Vec<usize> = top.iter().map(|(r, _)| *r).collect();
        assert_eq!(rows, vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_excluded_rows_are_skipped() {
        let scores = array![0.9, 0.8, 0.7];
        let excluded: HashSet<usize> = [0].into_iter().collect();
        let top = top_n_rows(scores.view(), 2, &excluded);
        assert_eq!(top, vec![(1, 0.8), (2, 0.7)]);
    }

    #[test]
    fn test_n_larger_than_candidates() {
        let scores = array![0.2, 0.1];
        assert_eq!(top_n_rows(scores.view(), 12, &HashSet::new()).len(), 2);
        assert!(top_n_rows(scores.view(), 0, &HashSet::new()).is_empty());
    }

    #[test]
    fn test_nan_ranks_last() {
        let scores = array![f64::NAN, 0.1, 0.3];
        let top = top_n_rows(scores.view(), 3, &HashSet::new());
        assert_eq!(top[0], (2, 0.3));
        assert_eq!(top[1], (1, 0.1));
        assert_eq!(top[2].0, 0);
    }
}
