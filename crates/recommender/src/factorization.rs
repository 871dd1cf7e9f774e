//! Non-negative Matrix Factorization
//!
//! Factors the object×user interaction matrix X (R×C) into an object
//! embedding W (R×k) and a user embedding H (k×C) with X ≈ W·H, minimizing the
//! Frobenius reconstruction error under W, H ≥ 0.
//!
//! Uses the multiplicative update rules of Lee & Seung. Both factors stay
//! non-negative because every update multiplies by a ratio of non-negative
//! quantities. Convergence is checked every 10 iterations against the relative
//! decrease of the reconstruction error.

use crate::error::RecommenderError;
use crate::initialization::{initialize, InitStrategy};
use crate::sparse::InteractionMatrix;
use crate::Result;
use ndarray::{Array2, Zip};
use std::time::{Duration, Instant};
use tracing::{debug, info};

const EPSILON: f64 = 1e-10;
const CONVERGENCE_CHECK_INTERVAL: usize = 10;

/// NMF configuration parameters
#[derive(Debug, Clone, PartialEq)]
pub struct NmfConfig {
    /// Number of latent components (k)
    pub n_components: usize,
    /// How W and H are seeded before the first update
    pub init: InitStrategy,
    /// Seed for every random draw made during fitting
    pub random_state: u64,
    /// Iteration cap
    pub max_iter: usize,
    /// Relative error decrease below which fitting stops (0 disables the check)
    pub tol: f64,
    /// Log progress at INFO instead of DEBUG
    pub verbose: bool,
}

impl Default for NmfConfig {
    fn default() -> Self {
        Self {
            n_components: 10,
            init: InitStrategy::Random,
            random_state: 42,
            max_iter: 200,
            tol: 1e-4,
            verbose: false,
        }
    }
}

impl NmfConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_components == 0 {
            return Err(RecommenderError::Dimension(
                "n_components must be a positive integer".to_string(),
            ));
        }
        if self.max_iter == 0 {
            return Err(RecommenderError::Configuration {
                message: "max_iter must be greater than 0".to_string(),
                key: Some("max_iter".to_string()),
            });
        }
        if !self.tol.is_finite() || self.tol < 0.0 {
            return Err(RecommenderError::Configuration {
                message: format!("tol must be a non-negative number, got {}", self.tol),
                key: Some("tol".to_string()),
            });
        }
        Ok(())
    }
}

/// Trained factor matrices
#[derive(Debug, Clone, PartialEq)]
pub struct Factors {
    /// Object embedding, R×k
    pub w: Array2<f64>,
    /// User embedding, k×C
    pub h: Array2<f64>,
}

impl Factors {
    pub fn new(w: Array2<f64>, h: Array2<f64>) -> Result<Self> {
        if w.ncols() != h.nrows() {
            return Err(RecommenderError::Dimension(format!(
                "W has {} components but H has {}",
                w.ncols(),
                h.nrows()
            )));
        }
        Ok(Self { w, h })
    }

    pub fn n_components(&self) -> usize {
        self.w.ncols()
    }

    pub fn num_objects(&self) -> usize {
        self.w.nrows()
    }

    pub fn num_users(&self) -> usize {
        self.h.ncols()
    }

    pub fn is_non_negative(&self) -> bool {
        self.w.iter().chain(self.h.iter()).all(|&e| e >= 0.0)
    }
}

/// Summary of one fit
#[derive(Debug, Clone, PartialEq)]
pub struct FitReport {
    pub n_iter: usize,
    /// ‖X − W·H‖_F after the last iteration
    pub reconstruction_err: f64,
    pub elapsed: Duration,
}

/// NMF engine
#[derive(Debug, Clone, Default)]
pub struct Nmf {
    config: NmfConfig,
}

impl Nmf {
    pub fn new(config: NmfConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NmfConfig {
        &self.config
    }

    /// Fit W and H to `x`
    ///
    /// Blocks until the iteration cap or convergence is reached.
    ///
    /// # Errors
    /// - `Dimension` if X has no rows or columns, or k is 0 or exceeds min(R, C)
    /// - `DegenerateInput` if X has no nonzero cell
    pub fn fit(&self, x: &InteractionMatrix) -> Result<(Factors, FitReport)> {
        self.check_input(x)?;

        let config = &self.config;
        let start = Instant::now();

        let (mut w, mut h) = initialize(x, config.n_components, config.init, config.random_state)?;

        let x_norm_sq = x.sum_squares();
        let error_at_init = reconstruction_error(x, &w, &h, x_norm_sq);
        let mut previous_error = error_at_init;
        let mut error = error_at_init;
        let mut n_iter = 0;

        for iteration in 1..=config.max_iter {
            // W ← W ∘ (X·Hᵀ) / (W·H·Hᵀ)
            let x_ht = x.mul_dense(h.t())?;
            let w_hht = w.dot(&h.dot(&h.t()));
            multiplicative_update(&mut w, &x_ht, &w_hht);

            // H ← H ∘ (Wᵀ·X) / (Wᵀ·W·H)
            let wt_x = x.transpose_mul_dense(w.view())?.reversed_axes();
            let wtw_h = w.t().dot(&w).dot(&h);
            multiplicative_update(&mut h, &wt_x, &wtw_h);

            n_iter = iteration;

            if iteration % CONVERGENCE_CHECK_INTERVAL != 0 {
                continue;
            }

            error = reconstruction_error(x, &w, &h, x_norm_sq);
            let elapsed = start.elapsed().as_secs_f64();
            if config.verbose {
                info!(iteration, error, elapsed_secs = elapsed, "NMF epoch");
            } else {
                debug!(iteration, error, elapsed_secs = elapsed, "NMF epoch");
            }

            if config.tol > 0.0
                && (error_at_init <= 0.0 || (previous_error - error) / error_at_init < config.tol)
            {
                break;
            }
            previous_error = error;
        }

        // The last epoch check already measured the error when n_iter lands on it.
        if n_iter % CONVERGENCE_CHECK_INTERVAL != 0 {
            error = reconstruction_error(x, &w, &h, x_norm_sq);
        }

        let elapsed = start.elapsed();
        info!(
            n_components = config.n_components,
            init = %config.init,
            n_iter,
            reconstruction_err = error,
            elapsed_ms = elapsed.as_millis() as u64,
            "Fit NMF model"
        );

        Ok((
            Factors { w, h },
            FitReport {
                n_iter,
                reconstruction_err: error,
                elapsed,
            },
        ))
    }

    fn check_input(&self, x: &InteractionMatrix) -> Result<()> {
        self.config.validate()?;

        let (rows, cols) = x.shape();
        if rows == 0 || cols == 0 {
            return Err(RecommenderError::Dimension(format!(
                "cannot factor a matrix of shape ({}, {})",
                rows, cols
            )));
        }

        let k = self.config.n_components;
        if k > rows.min(cols) {
            return Err(RecommenderError::Dimension(format!(
                "n_components {} exceeds min(rows, cols) = {}",
                k,
                rows.min(cols)
            )));
        }

        if x.nnz() == 0 {
            return Err(RecommenderError::DegenerateInput(
                "interaction matrix has no nonzero entries".to_string(),
            ));
        }

        Ok(())
    }
}

/// base ← base ∘ numer / (denom + ε); non-finite results become 0
fn multiplicative_update(base: &mut Array2<f64>, numer: &Array2<f64>, denom: &Array2<f64>) {
    Zip::from(base)
        .and(numer)
        .and(denom)
        .par_for_each(|b, &n, &d| {
            let updated = *b * n / (d + EPSILON);
            *b = if updated.is_finite() { updated } else { 0.0 };
        });
}

/// ‖X − W·H‖_F without materializing W·H
///
/// Expands to ‖X‖² − 2⟨X, W·H⟩ + ⟨WᵀW, H·Hᵀ⟩, where the cross term only
/// visits the stored cells of X.
pub fn reconstruction_error(
    x: &InteractionMatrix,
    w: &Array2<f64>,
    h: &Array2<f64>,
    x_norm_sq: f64,
) -> f64 {
    let cross: f64 = x
        .iter()
        .map(|(row, col, value)| value * w.row(row).dot(&h.column(col)))
        .sum();
    let wtw = w.t().dot(w);
    let hht = h.dot(&h.t());
    let approx_norm_sq = (&wtw * &hht).sum();

    (x_norm_sq - 2.0 * cross + approx_norm_sq).max(0.0).sqrt()
}
