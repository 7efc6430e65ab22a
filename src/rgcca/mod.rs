//! # Regularized generalized canonical correlation analysis
//!
//! One full first-component extraction pass: every block gets an outer
//! weight vector whose component (block times weight) maximizes the
//! scheme-weighted sum of between-block covariances, subject to a per-block
//! shrinkage control. The solver alternates block-wise fixed-point updates
//! in a Gauss-Seidel sweep until the weight vectors or the objective stop
//! moving, with a hard iteration ceiling.

use anyhow::bail;
use ndarray::{Array1, Array2, ArrayView2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

use crate::block::{initialize, is_dual, BlockState, InitMethod};
use crate::cov::{cor_matrix, cov_matrix, cov_with, matvec, squared_distance};
use crate::scheme::Scheme;

/// Estimates a shrinkage intensity in [0, 1] from one block. The solver
/// treats the estimator as an opaque analytic formula; any closure from a
/// block view to a scalar satisfies it.
pub trait ShrinkageEstimator {
    fn estimate(&self, block: ArrayView2<f64>) -> f64;
}

impl<F> ShrinkageEstimator for F
where
    F: Fn(ArrayView2<f64>) -> f64,
{
    fn estimate(&self, block: ArrayView2<f64>) -> f64 {
        self(block)
    }
}

/// Per-block shrinkage request.
#[derive(Debug, Clone)]
pub enum Shrinkage {
    /// Explicit per-block intensities, each in [0, 1]; 1 means unpenalized.
    Values(Vec<f64>),
    /// Estimate per block through the injected [`ShrinkageEstimator`].
    Auto,
}

pub struct RgccaBuilder {
    connection: Array2<f64>,
    shrinkage: Option<Shrinkage>,
    estimator: Option<Arc<dyn ShrinkageEstimator + Send + Sync>>,
    scheme: Scheme,
    init: InitMethod,
    bias: bool,
    missing_aware: bool,
    tol: f64,
    max_iter: usize,
    random_seed: u64,
    verbose: bool,
}

impl RgccaBuilder {
    /// Starts a builder from the J×J connection matrix. Defaults: centroid
    /// scheme, SVD initialization, tau = 1 for every block, biased
    /// covariance denominators, missing-aware products off, tolerance 1e-8,
    /// at most 1000 iterations, seed 42.
    pub fn new(connection: Array2<f64>) -> Self {
        Self {
            connection,
            shrinkage: None,
            estimator: None,
            scheme: Scheme::Centroid,
            init: InitMethod::Svd,
            bias: true,
            missing_aware: false,
            tol: 1e-8,
            max_iter: 1000,
            random_seed: 42,
            verbose: false,
        }
    }

    pub fn shrinkage(mut self, shrinkage: Shrinkage) -> Self {
        self.shrinkage = Some(shrinkage);
        self
    }

    pub fn shrinkage_estimator(
        mut self,
        estimator: Arc<dyn ShrinkageEstimator + Send + Sync>,
    ) -> Self {
        self.estimator = Some(estimator);
        self
    }

    pub fn scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn init(mut self, init: InitMethod) -> Self {
        self.init = init;
        self
    }

    /// Biased estimator divides by the (pairwise) count, unbiased by the
    /// count less one.
    pub fn bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    /// Skip non-finite entries pairwise in every covariance-like product.
    pub fn missing_aware(mut self, missing_aware: bool) -> Self {
        self.missing_aware = missing_aware;
        self
    }

    pub fn tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn build(self) -> Rgcca {
        Rgcca {
            connection: self.connection,
            shrinkage: self.shrinkage,
            estimator: self.estimator,
            scheme: self.scheme,
            init: self.init,
            bias: self.bias,
            missing_aware: self.missing_aware,
            tol: self.tol,
            max_iter: self.max_iter,
            random_seed: self.random_seed,
            verbose: self.verbose,
        }
    }
}

pub struct Rgcca {
    connection: Array2<f64>,
    shrinkage: Option<Shrinkage>,
    estimator: Option<Arc<dyn ShrinkageEstimator + Send + Sync>>,
    scheme: Scheme,
    init: InitMethod,
    bias: bool,
    missing_aware: bool,
    tol: f64,
    max_iter: usize,
    random_seed: u64,
    verbose: bool,
}

/// Result bundle of one extraction pass.
#[derive(Debug, Clone)]
pub struct RgccaFit {
    /// n×J component matrix, column j = block_j · a_j.
    pub y: Array2<f64>,
    /// Outer weight vectors, length p_j each.
    pub a: Vec<Array1<f64>>,
    /// Objective value after each sweep, iteration 1 onward.
    pub crit: Vec<f64>,
    /// Average inner fit: Σ C·cor²(Y)/2 over Σ C/2.
    pub ave_inner: f64,
    /// Connection matrix, echoed for reporting.
    pub connection: Array2<f64>,
    /// Resolved per-block shrinkage intensities.
    pub tau: Vec<f64>,
    /// Scheme used, echoed for reporting.
    pub scheme: Scheme,
    pub converged: bool,
    pub n_iterations: usize,
}

impl Rgcca {
    /// Fits the first component of every block.
    ///
    /// Blocks are read as-is; centering and scaling are the caller's
    /// business. With missing-aware mode off, any non-finite entry will
    /// poison the products that touch it.
    pub fn fit(&self, blocks: &[Array2<f64>]) -> anyhow::Result<RgccaFit> {
        self.fit_inner(blocks, None)
    }

    /// `force_dual` overrides the shape-driven regime choice per block;
    /// both formulations are mathematically equivalent, so this only
    /// changes which matrices are formed.
    pub(crate) fn fit_inner(
        &self,
        blocks: &[Array2<f64>],
        force_dual: Option<&[bool]>,
    ) -> anyhow::Result<RgccaFit> {
        self.validate(blocks)?;
        let tau = self.resolve_shrinkage(blocks)?;

        let j_total = blocks.len();
        let n = blocks[0].nrows();
        let na_rm = self.missing_aware;
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_seed);

        let mut states: Vec<BlockState> = Vec::with_capacity(j_total);
        for (j, block) in blocks.iter().enumerate() {
            let dual = match force_dual {
                Some(flags) => flags[j],
                None => is_dual(n, block.ncols()),
            };
            states.push(initialize(
                block.view(),
                dual,
                tau[j],
                self.init,
                &mut rng,
                self.bias,
                na_rm,
            )?);
        }

        let mut y = Array2::zeros((n, j_total));
        for (j, block) in blocks.iter().enumerate() {
            y.column_mut(j)
                .assign(&matvec(block.view(), states[j].weight().view(), na_rm));
        }

        // iteration-0 baseline for the first convergence delta
        let mut crit_old = self.objective(&y);
        let mut a_old: Vec<Array1<f64>> = states.iter().map(|s| s.weight().clone()).collect();

        let mut crit = Vec::new();
        let mut converged = false;
        let mut iter = 1usize;
        loop {
            for j in 0..j_total {
                let dgx = cov_with(y.column(j), y.view(), self.bias, na_rm)
                    .mapv(|v| self.scheme.dg(v));
                let mut z = Array1::zeros(n);
                for k in 0..j_total {
                    let w = self.connection[[j, k]] * dgx[k];
                    if w != 0.0 {
                        for i in 0..n {
                            z[i] += w * y[[i, k]];
                        }
                    }
                }
                states[j].update(blocks[j].view(), &z, na_rm);
                y.column_mut(j)
                    .assign(&matvec(blocks[j].view(), states[j].weight().view(), na_rm));
            }

            let crit_iter = self.objective(&y);
            crit.push(crit_iter);

            let a_diff: f64 = states
                .iter()
                .zip(a_old.iter())
                .map(|(s, old)| squared_distance(s.weight(), old))
                .sum();
            let crit_diff = (crit_iter - crit_old).abs();
            if self.verbose {
                println!(
                    "Iter: {:4}  Fit: {:.8}  Dif: {:.8}",
                    iter, crit_iter, crit_diff
                );
            }

            if a_diff < self.tol || crit_diff < self.tol {
                converged = true;
                break;
            }
            if iter >= self.max_iter {
                log::warn!(
                    "RGCCA did not converge after {} iterations; returning the last iterate",
                    self.max_iter
                );
                break;
            }
            crit_old = crit_iter;
            for (old, s) in a_old.iter_mut().zip(states.iter()) {
                old.clone_from(s.weight());
            }
            iter += 1;
        }

        let r = cor_matrix(y.view(), na_rm);
        let mut num = 0.0;
        let mut den = 0.0;
        for j in 0..j_total {
            for k in 0..j_total {
                num += self.connection[[j, k]] * r[[j, k]] * r[[j, k]] / 2.0;
                den += self.connection[[j, k]] / 2.0;
            }
        }

        Ok(RgccaFit {
            y,
            a: states.into_iter().map(|s| s.weight().clone()).collect(),
            crit,
            ave_inner: num / den,
            connection: self.connection.clone(),
            tau,
            scheme: self.scheme.clone(),
            converged,
            n_iterations: iter,
        })
    }

    fn objective(&self, y: &Array2<f64>) -> f64 {
        let covm = cov_matrix(y.view(), self.bias, self.missing_aware);
        let j_total = y.ncols();
        let mut s = 0.0;
        for j in 0..j_total {
            for k in 0..j_total {
                s += self.connection[[j, k]] * self.scheme.g(covm[[j, k]]);
            }
        }
        s
    }

    fn validate(&self, blocks: &[Array2<f64>]) -> anyhow::Result<()> {
        if blocks.is_empty() {
            bail!("no blocks supplied");
        }
        let n = blocks[0].nrows();
        if n == 0 {
            bail!("blocks must have at least one row");
        }
        for (j, block) in blocks.iter().enumerate() {
            if block.nrows() != n {
                bail!(
                    "block {} has {} rows but block 0 has {}: blocks must be row-aligned",
                    j,
                    block.nrows(),
                    n
                );
            }
            if block.ncols() == 0 {
                bail!("block {} has no columns", j);
            }
        }
        if self.connection.dim() != (blocks.len(), blocks.len()) {
            bail!(
                "connection matrix is {:?} but {} blocks were supplied",
                self.connection.dim(),
                blocks.len()
            );
        }
        if !(self.tol > 0.0) {
            bail!("tolerance must be positive, got {}", self.tol);
        }
        if self.max_iter == 0 {
            bail!("max_iter must be at least 1");
        }
        Ok(())
    }

    fn resolve_shrinkage(&self, blocks: &[Array2<f64>]) -> anyhow::Result<Vec<f64>> {
        let resolved = match &self.shrinkage {
            None => vec![1.0; blocks.len()],
            Some(Shrinkage::Values(values)) => {
                if values.len() != blocks.len() {
                    bail!(
                        "shrinkage vector has length {} but {} blocks were supplied",
                        values.len(),
                        blocks.len()
                    );
                }
                values.clone()
            }
            Some(Shrinkage::Auto) => {
                let estimator = self.estimator.as_ref().ok_or_else(|| {
                    anyhow::anyhow!("auto shrinkage requested but no estimator was supplied")
                })?;
                blocks
                    .iter()
                    .map(|block| estimator.estimate(block.view()))
                    .collect()
            }
        };
        for (j, &t) in resolved.iter().enumerate() {
            if !(0.0..=1.0).contains(&t) {
                bail!("shrinkage for block {} is {} but must lie in [0, 1]", j, t);
            }
        }
        Ok(resolved)
    }
}
