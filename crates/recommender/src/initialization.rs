//! Factor initialization for NMF
//!
//! `Random` scales absolute standard-normal draws by sqrt(mean(X) / k).
//! `Nndsvd` is the non-negative double SVD of Boutsidis & Gallopoulos, built
//! from the leading singular triplets of X found by power iteration with
//! deflation. `NndsvdA` additionally fills the zeros NNDSVD leaves behind with
//! mean(X) so multiplicative updates can still move them.
//!
//! All strategies are seeded and therefore reproducible.

use crate::sparse::InteractionMatrix;
use crate::Result;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::fmt;
use std::str::FromStr;

const POWER_ITERATIONS: usize = 300;
const POWER_TOLERANCE: f64 = 1e-10;
const NNDSVD_EPS: f64 = 1e-6;
const TINY: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitStrategy {
    #[default]
    Random,
    Nndsvd,
    NndsvdA,
}

impl FromStr for InitStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(InitStrategy::Random),
            "nndsvd" => Ok(InitStrategy::Nndsvd),
            "nndsvda" => Ok(InitStrategy::NndsvdA),
            other => Err(format!(
                "unknown init strategy '{}' (expected random, nndsvd or nndsvda)",
                other
            )),
        }
    }
}

impl fmt::Display for InitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InitStrategy::Random => "random",
            InitStrategy::Nndsvd => "nndsvd",
            InitStrategy::NndsvdA => "nndsvda",
        };
        f.write_str(name)
    }
}

/// Starting W (R×k) and H (k×C) for the given strategy
pub fn initialize(
    x: &InteractionMatrix,
    k: usize,
    strategy: InitStrategy,
    seed: u64,
) -> Result<(Array2<f64>, Array2<f64>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    match strategy {
        InitStrategy::Random => Ok(random_init(x, k, &mut rng)),
        InitStrategy::Nndsvd => nndsvd_init(x, k, &mut rng, false),
        InitStrategy::NndsvdA => nndsvd_init(x, k, &mut rng, true),
    }
}

fn random_init(x: &InteractionMatrix, k: usize, rng: &mut StdRng) -> (Array2<f64>, Array2<f64>) {
    let avg = (x.mean() / k as f64).sqrt();

    let h = Array2::from_shape_fn((k, x.cols()), |_| {
        avg * rng.sample::<f64, _>(StandardNormal).abs()
    });
    let w = Array2::from_shape_fn((x.rows(), k), |_| {
        avg * rng.sample::<f64, _>(StandardNormal).abs()
    });
    (w, h)
}

fn nndsvd_init(
    x: &InteractionMatrix,
    k: usize,
    rng: &mut StdRng,
    fill_zeros: bool,
) -> Result<(Array2<f64>, Array2<f64>)> {
    let triplets = leading_singular_triplets(x, k, rng)?;

    let mut w = Array2::<f64>::zeros((x.rows(), k));
    let mut h = Array2::<f64>::zeros((k, x.cols()));

    for (j, (sigma, u, v)) in triplets.iter().enumerate() {
        if j == 0 {
            // Leading singular vectors of a non-negative matrix share one sign.
            let scale = sigma.sqrt();
            w.column_mut(0).assign(&u.mapv(|e| scale * e.abs()));
            h.row_mut(0).assign(&v.mapv(|e| scale * e.abs()));
            continue;
        }

        let (u_pos, u_neg) = split_signs(u);
        let (v_pos, v_neg) = split_signs(v);
        let (u_pos_norm, v_pos_norm) = (norm(&u_pos), norm(&v_pos));
        let (u_neg_norm, v_neg_norm) = (norm(&u_neg), norm(&v_neg));

        let m_pos = u_pos_norm * v_pos_norm;
        let m_neg = u_neg_norm * v_neg_norm;

        let (uu, vv, magnitude) = if m_pos > m_neg {
            (scaled(&u_pos, u_pos_norm), scaled(&v_pos, v_pos_norm), m_pos)
        } else {
            (scaled(&u_neg, u_neg_norm), scaled(&v_neg, v_neg_norm), m_neg)
        };

        let lambda = (sigma * magnitude).sqrt();
        w.column_mut(j).assign(&(uu * lambda));
        h.row_mut(j).assign(&(vv * lambda));
    }

    w.mapv_inplace(|e| if e < NNDSVD_EPS { 0.0 } else { e });
    h.mapv_inplace(|e| if e < NNDSVD_EPS { 0.0 } else { e });

    if fill_zeros {
        let avg = x.mean();
        w.mapv_inplace(|e| if e == 0.0 { avg } else { e });
        h.mapv_inplace(|e| if e == 0.0 { avg } else { e });
    }

    Ok((w, h))
}

/// Top-k (sigma, u, v) of X by power iteration on the deflated matrix
fn leading_singular_triplets(
    x: &InteractionMatrix,
    k: usize,
    rng: &mut StdRng,
) -> Result<Vec<(f64, Array1<f64>, Array1<f64>)>> {
    let mut triplets: Vec<(f64, Array1<f64>, Array1<f64>)> = Vec::with_capacity(k);

    for _ in 0..k {
        let mut v = Array1::from_shape_fn(x.cols(), |_| rng.sample::<f64, _>(StandardNormal));
        let v_norm = norm(&v);
        v /= v_norm.max(TINY);

        let mut u = Array1::<f64>::zeros(x.rows());
        let mut sigma = 0.0;

        for _ in 0..POWER_ITERATIONS {
            // u = (X - Σ s u vᵀ) v
            let mut next_u = x
                .mul_dense(v.view().insert_axis(Axis(1)))?
                .index_axis_move(Axis(1), 0);
            for (s, u_l, v_l) in &triplets {
                next_u.scaled_add(-s * v_l.dot(&v), u_l);
            }
            let u_norm = norm(&next_u);
            if u_norm < TINY {
                sigma = 0.0;
                u.fill(0.0);
                v.fill(0.0);
                break;
            }
            next_u /= u_norm;

            // v = (X - Σ s u vᵀ)ᵀ u
            let mut next_v = x
                .transpose_mul_dense(next_u.view().insert_axis(Axis(1)))?
                .index_axis_move(Axis(1), 0);
            for (s, u_l, v_l) in &triplets {
                next_v.scaled_add(-s * u_l.dot(&next_u), v_l);
            }
            sigma = norm(&next_v);
            u = next_u;
            if sigma < TINY {
                sigma = 0.0;
                v.fill(0.0);
                break;
            }
            next_v /= sigma;

            let shift = norm(&(&next_v - &v));
            v = next_v;
            if shift < POWER_TOLERANCE {
                break;
            }
        }

        triplets.push((sigma, u, v));
    }

    Ok(triplets)
}

fn split_signs(a: &Array1<f64>) -> (Array1<f64>, Array1<f64>) {
    (a.mapv(|e| e.max(0.0)), a.mapv(|e| (-e).max(0.0)))
}

fn scaled(a: &Array1<f64>, by: f64) -> Array1<f64> {
    if by < TINY {
        Array1::zeros(a.len())
    } else {
        a / by
    }
}

fn norm(a: &Array1<f64>) -> f64 {
    a.dot(a).sqrt()
}
