//! Regularized metric construction.
//!
//! For a block with shrinkage tau < 1 the inner product used to normalize
//! its weight vector is `tau·I + (1−tau)·S`, where S is the scaled
//! cross-product (primal, p×p) or the scaled kernel (dual, n×n). The blend
//! keeps the metric well conditioned when the empirical part is rank
//! deficient, and its inverse is taken as a generalized (pseudo-)inverse so
//! that residual rank deficiency is tolerated rather than fatal.

use anyhow::anyhow;
use ndarray::Array2;
use nshare::{IntoNalgebra, IntoNdarray2};

const PINV_EPS: f64 = 1e-12;

/// `tau·I + (1−tau)·scaled`, the regularized inner-product operator.
pub fn identity_blend(scaled: &Array2<f64>, tau: f64) -> Array2<f64> {
    let mut m = scaled * (1.0 - tau);
    for d in m.diag_mut() {
        *d += tau;
    }
    m
}

/// Generalized inverse via SVD.
///
/// A metric carrying NaN entries (missing-data gaps where a pairwise count
/// was zero) gets a NaN-filled inverse of the same shape instead of an
/// error, so the gap propagates softly and the run keeps going. A finite
/// metric whose SVD fails is a genuine numerical failure and is surfaced.
pub fn pseudo_inverse(m: &Array2<f64>) -> anyhow::Result<Array2<f64>> {
    if m.iter().any(|v| !v.is_finite()) {
        return Ok(Array2::from_elem(m.dim(), f64::NAN));
    }
    let nal = m.clone().into_nalgebra();
    let pinv = nal
        .pseudo_inverse(PINV_EPS)
        .map_err(|e| anyhow!("singular metric: pseudo-inverse failed: {}", e))?;
    Ok(pinv.into_ndarray2())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_identity_blend_extremes() {
        let s = array![[2.0, 1.0], [1.0, 3.0]];
        let full = identity_blend(&s, 1.0);
        assert_relative_eq!(full[[0, 0]], 1.0);
        assert_relative_eq!(full[[0, 1]], 0.0);
        let none = identity_blend(&s, 0.0);
        assert_relative_eq!(none[[0, 1]], 1.0);
        assert_relative_eq!(none[[1, 1]], 3.0);
        let half = identity_blend(&s, 0.5);
        assert_relative_eq!(half[[0, 0]], 0.5 + 1.0);
        assert_relative_eq!(half[[0, 1]], 0.5);
    }

    #[test]
    fn test_pseudo_inverse_of_invertible_matrix() {
        let m = array![[2.0, 0.0], [0.0, 4.0]];
        let inv = pseudo_inverse(&m).unwrap();
        assert_relative_eq!(inv[[0, 0]], 0.5, epsilon = 1e-10);
        assert_relative_eq!(inv[[1, 1]], 0.25, epsilon = 1e-10);
        assert_relative_eq!(inv[[0, 1]], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_pseudo_inverse_tolerates_rank_deficiency() {
        // rank-1 matrix: pinv satisfies M * M+ * M = M
        let m = array![[1.0, 2.0], [2.0, 4.0]];
        let pinv = pseudo_inverse(&m).unwrap();
        let back = m.dot(&pinv).dot(&m);
        for u in 0..2 {
            for v in 0..2 {
                assert_relative_eq!(back[[u, v]], m[[u, v]], epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn test_pseudo_inverse_propagates_nan_gaps() {
        let m = array![[1.0, f64::NAN], [f64::NAN, 1.0]];
        let inv = pseudo_inverse(&m).unwrap();
        assert_eq!(inv.dim(), (2, 2));
        assert!(inv.iter().all(|v| v.is_nan()));
    }
}
