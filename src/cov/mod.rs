//! # Missing-data-aware covariance arithmetic
//!
//! Every covariance-like product in the crate goes through this module so
//! that the missing-data handling lives in exactly one place. With
//! `na_rm = true`, entries marked as missing (any non-finite value, NaN by
//! convention) are skipped pairwise: a product term contributes only when
//! both operands are observed, and covariance denominators count the jointly
//! observed pairs instead of the full length. Where that pairwise count
//! leaves no usable denominator the result is NaN, never a silent zero.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Dot product over pairs where both entries are finite. An empty overlap
/// sums to zero, matching the skip-as-zero-contribution product semantics.
pub fn safe_dot(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| x * y)
        .sum()
}

/// `x · v` (length `nrows`), skipping non-finite pairs when `na_rm` is set.
pub fn matvec(x: ArrayView2<f64>, v: ArrayView1<f64>, na_rm: bool) -> Array1<f64> {
    if na_rm {
        Array1::from_iter(x.rows().into_iter().map(|row| safe_dot(row, v)))
    } else {
        x.dot(&v)
    }
}

/// `xᵀ · v` (length `ncols`), skipping non-finite pairs when `na_rm` is set.
pub fn tmatvec(x: ArrayView2<f64>, v: ArrayView1<f64>, na_rm: bool) -> Array1<f64> {
    if na_rm {
        Array1::from_iter(x.columns().into_iter().map(|col| safe_dot(col, v)))
    } else {
        x.t().dot(&v)
    }
}

/// `a · b`, skipping non-finite pairs entrywise when `na_rm` is set.
pub fn matmul(a: ArrayView2<f64>, b: ArrayView2<f64>, na_rm: bool) -> Array2<f64> {
    if !na_rm {
        return a.dot(&b);
    }
    let mut out = Array2::zeros((a.nrows(), b.ncols()));
    for (i, row) in a.rows().into_iter().enumerate() {
        for (j, col) in b.columns().into_iter().enumerate() {
            out[[i, j]] = safe_dot(row, col);
        }
    }
    out
}

/// Covariance of two equally long vectors.
///
/// With `na_rm`, means and the cross term are taken over the jointly finite
/// pairs and the denominator is the pairwise count (biased) or the pairwise
/// count less one (unbiased). A non-positive denominator yields NaN.
pub fn pairwise_cov(x: ArrayView1<f64>, y: ArrayView1<f64>, bias: bool, na_rm: bool) -> f64 {
    let (sx, sy, sxy, m) = if na_rm {
        let mut sx = 0.0;
        let mut sy = 0.0;
        let mut sxy = 0.0;
        let mut m = 0usize;
        for (&a, &b) in x.iter().zip(y.iter()) {
            if a.is_finite() && b.is_finite() {
                sx += a;
                sy += b;
                sxy += a * b;
                m += 1;
            }
        }
        (sx, sy, sxy, m)
    } else {
        (x.sum(), y.sum(), x.dot(&y), x.len())
    };
    let denom = if bias { m as f64 } else { m as f64 - 1.0 };
    if m == 0 || denom <= 0.0 {
        return f64::NAN;
    }
    (sxy - sx * sy / m as f64) / denom
}

/// Pearson correlation over the jointly finite pairs.
pub fn pairwise_cor(x: ArrayView1<f64>, y: ArrayView1<f64>, na_rm: bool) -> f64 {
    let cxy = pairwise_cov(x, y, true, na_rm);
    let cx = pairwise_cov(x, x, true, na_rm);
    let cy = pairwise_cov(y, y, true, na_rm);
    cxy / (cx * cy).sqrt()
}

/// Covariances between one column and every column of `y` (length J).
pub fn cov_with(x: ArrayView1<f64>, y: ArrayView2<f64>, bias: bool, na_rm: bool) -> Array1<f64> {
    Array1::from_iter(
        y.columns()
            .into_iter()
            .map(|col| pairwise_cov(x, col, bias, na_rm)),
    )
}

/// Full J×J covariance matrix of the columns of `y`.
pub fn cov_matrix(y: ArrayView2<f64>, bias: bool, na_rm: bool) -> Array2<f64> {
    let j = y.ncols();
    let mut out = Array2::zeros((j, j));
    for a in 0..j {
        for b in a..j {
            let c = pairwise_cov(y.column(a), y.column(b), bias, na_rm);
            out[[a, b]] = c;
            out[[b, a]] = c;
        }
    }
    out
}

/// Full J×J correlation matrix of the columns of `y`.
pub fn cor_matrix(y: ArrayView2<f64>, na_rm: bool) -> Array2<f64> {
    let j = y.ncols();
    let mut out = Array2::zeros((j, j));
    for a in 0..j {
        for b in a..j {
            let c = pairwise_cor(y.column(a), y.column(b), na_rm);
            out[[a, b]] = c;
            out[[b, a]] = c;
        }
    }
    out
}

/// Uncentered cross-product `xᵀx`, normalized entrywise.
///
/// Without `na_rm` every entry is divided by n (biased) or n−1. With
/// `na_rm`, entry (u, v) sums products over rows where both columns are
/// observed and divides by that pairwise count (less one when unbiased);
/// entries whose denominator is not positive come out NaN so that the gap is
/// visible downstream instead of being zero-filled.
pub fn scaled_crossprod(x: ArrayView2<f64>, bias: bool, na_rm: bool) -> Array2<f64> {
    let n = x.nrows();
    let p = x.ncols();
    if !na_rm {
        let denom = if bias { n as f64 } else { n as f64 - 1.0 };
        return x.t().dot(&x) / denom;
    }
    let mut out = Array2::zeros((p, p));
    for u in 0..p {
        for v in u..p {
            let mut s = 0.0;
            let mut m = 0usize;
            for i in 0..n {
                let a = x[[i, u]];
                let b = x[[i, v]];
                if a.is_finite() && b.is_finite() {
                    s += a * b;
                    m += 1;
                }
            }
            let denom = if bias { m as f64 } else { m as f64 - 1.0 };
            let c = if denom > 0.0 { s / denom } else { f64::NAN };
            out[[u, v]] = c;
            out[[v, u]] = c;
        }
    }
    out
}

/// Sum of squared differences between two equally shaped weight vectors.
pub fn squared_distance(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}
