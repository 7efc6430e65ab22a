//! Per-block state for the alternating solver.
//!
//! Each block runs in one of two mathematically equivalent regimes fixed up
//! front by its shape: primal (n ≥ p, weight lives in variable space) or
//! dual (n < p, a length-n dual weight and the cached n×n kernel stand in
//! for the p×p metric that would otherwise have to be formed). The state is
//! a tagged union so a dual block's kernel, metric and explicit metric
//! inverse travel together with its dual weight.

use anyhow::{anyhow, bail};
use ndarray::{Array1, Array2, ArrayView2};
use nshare::IntoNalgebra;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crate::cov::{matmul, scaled_crossprod, tmatvec};
use crate::metric::{identity_blend, pseudo_inverse};

/// How the starting weight vectors are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitMethod {
    /// Leading singular vector of the block.
    Svd,
    /// Standard-normal draws from the seeded generator.
    Random,
}

impl InitMethod {
    pub fn from_name(name: &str) -> anyhow::Result<Self> {
        match name {
            "svd" => Ok(InitMethod::Svd),
            "random" => Ok(InitMethod::Random),
            other => bail!("unknown init '{}': expected svd or random", other),
        }
    }
}

/// Regularized metric of a dual block. The inverse is applied explicitly in
/// the dual update, so both directions are kept.
pub(crate) struct DualMetric {
    pub m: Array2<f64>,
    pub minv: Array2<f64>,
}

pub(crate) enum BlockState {
    Primal {
        a: Array1<f64>,
        /// Pseudo-inverse of the regularized metric; `None` when tau = 1.
        minv: Option<Array2<f64>>,
    },
    Dual {
        a: Array1<f64>,
        alpha: Array1<f64>,
        kernel: Array2<f64>,
        /// `None` when tau = 1.
        metric: Option<DualMetric>,
    },
}

/// The regime partition: dual when there are more variables than rows.
pub(crate) fn is_dual(n: usize, p: usize) -> bool {
    n < p
}

fn leading_singular_vector(
    block: ArrayView2<f64>,
    left: bool,
    na_rm: bool,
) -> anyhow::Result<Array1<f64>> {
    // The SVD cannot digest NaN markers; a zero-filled copy is consistent
    // with the safe products treating a missing pair as contributing
    // nothing, and only the starting point depends on it.
    let filled = if na_rm && block.iter().any(|v| !v.is_finite()) {
        block.mapv(|v| if v.is_finite() { v } else { 0.0 })
    } else {
        block.to_owned()
    };
    let svd = filled.into_nalgebra().svd(true, true);
    if left {
        let u = svd
            .u
            .ok_or_else(|| anyhow!("SVD did not produce left singular vectors"))?;
        Ok(Array1::from_iter(u.column(0).iter().copied()))
    } else {
        let vt = svd
            .v_t
            .ok_or_else(|| anyhow!("SVD did not produce right singular vectors"))?;
        Ok(Array1::from_iter(vt.row(0).iter().copied()))
    }
}

fn random_vector(len: usize, rng: &mut ChaCha8Rng) -> Array1<f64> {
    Array1::from_iter((0..len).map(|_| rng.sample::<f64, _>(StandardNormal)))
}

/// Builds the iteration-0 state of one block: starting weight (SVD or
/// random), cached kernel and regularized metric where the regime and tau
/// call for them, and the metric-quadratic-form renormalization.
pub(crate) fn initialize(
    block: ArrayView2<f64>,
    dual: bool,
    tau: f64,
    init: InitMethod,
    rng: &mut ChaCha8Rng,
    bias: bool,
    na_rm: bool,
) -> anyhow::Result<BlockState> {
    let n = block.nrows();
    let p = block.ncols();
    if dual {
        let kernel = matmul(block, block.t(), na_rm);
        let mut alpha = match init {
            InitMethod::Svd => leading_singular_vector(block, true, na_rm)?,
            InitMethod::Random => random_vector(n, rng),
        };
        let metric = if tau < 1.0 {
            let scaled = scaled_crossprod(block.t(), bias, na_rm);
            let m = identity_blend(&scaled, tau);
            let minv = pseudo_inverse(&m)?;
            Some(DualMetric { m, minv })
        } else {
            None
        };
        match &metric {
            None => {
                let denom = alpha.dot(&kernel.dot(&alpha)).sqrt();
                alpha /= denom;
            }
            Some(dm) => {
                let denom = alpha.dot(&dm.m.dot(&kernel.dot(&alpha))).sqrt();
                alpha /= denom;
            }
        }
        let a = tmatvec(block, alpha.view(), na_rm);
        Ok(BlockState::Dual {
            a,
            alpha,
            kernel,
            metric,
        })
    } else {
        let mut a = match init {
            InitMethod::Svd => leading_singular_vector(block, false, na_rm)?,
            InitMethod::Random => random_vector(p, rng),
        };
        let minv = if tau < 1.0 {
            let scaled = scaled_crossprod(block, bias, na_rm);
            Some(pseudo_inverse(&identity_blend(&scaled, tau))?)
        } else {
            None
        };
        match &minv {
            None => {
                let nrm = a.dot(&a).sqrt();
                a /= nrm;
            }
            Some(mi) => {
                let ma = mi.dot(&a);
                let denom = a.dot(&ma).sqrt();
                a = ma / denom;
            }
        }
        Ok(BlockState::Primal { a, minv })
    }
}

impl BlockState {
    /// The outer weight vector (length p for both regimes).
    pub(crate) fn weight(&self) -> &Array1<f64> {
        match self {
            BlockState::Primal { a, .. } => a,
            BlockState::Dual { a, .. } => a,
        }
    }

    /// One fixed-point update from the inner component `z` (length n).
    ///
    /// NaN reaching a normalization denominator stays NaN: under heavy
    /// missingness a gap is allowed to propagate and possibly heal on a
    /// later sweep instead of aborting the run.
    pub(crate) fn update(&mut self, block: ArrayView2<f64>, z: &Array1<f64>, na_rm: bool) {
        match self {
            BlockState::Primal { a, minv } => {
                let w = tmatvec(block, z.view(), na_rm);
                match minv {
                    None => {
                        let nrm = w.dot(&w).sqrt();
                        *a = w / nrm;
                    }
                    Some(mi) => {
                        let mw = mi.dot(&w);
                        let denom = w.dot(&mw).sqrt();
                        *a = mw / denom;
                    }
                }
            }
            BlockState::Dual {
                a,
                alpha,
                kernel,
                metric,
            } => {
                match metric {
                    None => {
                        let denom = z.dot(&kernel.dot(z)).sqrt();
                        *alpha = z / denom;
                    }
                    Some(dm) => {
                        let mz = dm.minv.dot(z);
                        let denom = mz.dot(&kernel.dot(&mz)).sqrt();
                        *alpha = mz / denom;
                    }
                }
                *a = tmatvec(block, alpha.view(), na_rm);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::SeedableRng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    #[test]
    fn test_init_method_parsing() {
        assert_eq!(InitMethod::from_name("svd").unwrap(), InitMethod::Svd);
        assert_eq!(InitMethod::from_name("random").unwrap(), InitMethod::Random);
        assert!(InitMethod::from_name("warmstart").is_err());
    }

    #[test]
    fn test_primal_unit_norm_after_init() {
        let block = array![[1.0, 2.0], [3.0, 4.0], [5.0, 7.0], [2.0, 1.0]];
        let st = initialize(
            block.view(),
            false,
            1.0,
            InitMethod::Random,
            &mut rng(),
            true,
            false,
        )
        .unwrap();
        let a = st.weight();
        assert_relative_eq!(a.dot(a), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_primal_metric_norm_after_init() {
        let block = array![[1.0, 2.0], [3.0, 4.0], [5.0, 7.0], [2.0, 1.0]];
        let tau = 0.3;
        let st = initialize(
            block.view(),
            false,
            tau,
            InitMethod::Svd,
            &mut rng(),
            true,
            false,
        )
        .unwrap();
        // a must satisfy aᵀ M a = 1 with M the regularized metric itself
        let m = identity_blend(&scaled_crossprod(block.view(), true, false), tau);
        let a = st.weight();
        assert_relative_eq!(a.dot(&m.dot(a)), 1.0, epsilon = 1e-8);
    }

    #[test]
    fn test_dual_state_shapes() {
        // p > n forces the dual regime: metric objects must be n×n while
        // the outer weight keeps length p
        let block = array![
            [1.0, 2.0, 0.5, -1.0, 0.3],
            [0.2, 1.0, 2.0, 0.7, -0.5],
            [2.0, 0.1, 1.0, 0.4, 0.8]
        ];
        let st = initialize(
            block.view(),
            true,
            0.5,
            InitMethod::Svd,
            &mut rng(),
            true,
            false,
        )
        .unwrap();
        match &st {
            BlockState::Dual {
                a,
                alpha,
                kernel,
                metric,
            } => {
                assert_eq!(a.len(), 5);
                assert_eq!(alpha.len(), 3);
                assert_eq!(kernel.dim(), (3, 3));
                let dm = metric.as_ref().unwrap();
                assert_eq!(dm.m.dim(), (3, 3));
                assert_eq!(dm.minv.dim(), (3, 3));
            }
            _ => panic!("expected dual state"),
        }
    }

    #[test]
    fn test_dual_kernel_norm_after_init() {
        let block = array![
            [1.0, 2.0, 0.5, -1.0],
            [0.2, 1.0, 2.0, 0.7],
            [2.0, 0.1, 1.0, 0.4]
        ];
        let st = initialize(
            block.view(),
            true,
            1.0,
            InitMethod::Random,
            &mut rng(),
            true,
            false,
        )
        .unwrap();
        match &st {
            BlockState::Dual { alpha, kernel, .. } => {
                assert_relative_eq!(alpha.dot(&kernel.dot(alpha)), 1.0, epsilon = 1e-10);
            }
            _ => panic!("expected dual state"),
        }
    }

    #[test]
    fn test_update_keeps_unit_norm() {
        let block = array![[1.0, 2.0], [3.0, 4.0], [5.0, 7.0], [2.0, 1.0]];
        let mut st = initialize(
            block.view(),
            false,
            1.0,
            InitMethod::Svd,
            &mut rng(),
            true,
            false,
        )
        .unwrap();
        let z = array![0.3, -0.2, 1.0, 0.5];
        st.update(block.view(), &z, false);
        let a = st.weight();
        assert_relative_eq!(a.dot(a), 1.0, epsilon = 1e-12);
    }
}
