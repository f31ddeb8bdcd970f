//! # Rank-revealing QR
//!
//! Column-pivoted Householder QR with early termination: factorization
//! stops as soon as the largest trailing column norm drops below the
//! truncation threshold, so the returned rank `k` is the smallest rank
//! meeting the tolerance.

/**
 * File: /src/rrqr.rs
 * Created Date: Wednesday, March 12th 2025
 * Author: Zihan
 * -----
 * Last Modified: Wednesday, 12th March 2025 11:55:19 pm
 * Modified By: the developer formerly known as Zihan at <wzh4464@gmail.com>
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
 */

use ndarray::{Array1, Array2};
use ndarray::ArrayView2;

use crate::error::HssError;

/// Result of [`rrqr`]: `A[:, p] ≈ q * r` with `q` of shape `(m, k)`
/// orthonormal and `r` of shape `(k, n)` upper triangular in its leading
/// `k` columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Rrqr {
    pub q: Array2<f64>,
    pub r: Array2<f64>,
    pub p: Vec<usize>,
    pub k: usize,
}

/// Rank-revealing QR of `a`.
///
/// With `reltol` the threshold is `tol` times the largest column norm of
/// `a`, otherwise `tol` itself. The zero matrix yields `k = 0`.
pub fn rrqr(a: &ArrayView2<f64>, tol: f64, reltol: bool) -> Result<Rrqr, HssError> {
    if !tol.is_finite() || tol < 0.0 {
        return Err(HssError::InvalidArgument(format!(
            "tolerance must be finite and nonnegative, got {}",
            tol
        )));
    }
    if a.iter().any(|x| !x.is_finite()) {
        return Err(HssError::InvalidArgument(
            "matrix contains NaN or Inf entries".to_string(),
        ));
    }

    let (m, n) = a.dim();
    let kmax = m.min(n);
    let mut work = a.to_owned();
    let mut p: Vec<usize> = (0..n).collect();
    let mut reflectors: Vec<(Array1<f64>, f64)> = Vec::new();

    let norm0 = (0..n)
        .map(|j| work.column(j).iter().map(|x| x * x).sum::<f64>())
        .fold(0.0f64, f64::max)
        .sqrt();
    let thresh = if reltol { tol * norm0 } else { tol };

    let mut k = kmax;
    for t in 0..kmax {
        // exact trailing column norms; recomputing keeps the pivot choice
        // deterministic and immune to downdating cancellation
        let mut jmax = t;
        let mut numax = 0.0f64;
        for j in t..n {
            let nu: f64 = (t..m).map(|i| work[[i, j]] * work[[i, j]]).sum();
            if nu > numax {
                numax = nu;
                jmax = j;
            }
        }
        if numax.sqrt() <= thresh {
            k = t;
            break;
        }
        if jmax != t {
            for i in 0..m {
                work.swap([i, t], [i, jmax]);
            }
            p.swap(t, jmax);
        }

        let alpha = work[[t, t]];
        let sigma: f64 = (t + 1..m).map(|i| work[[i, t]] * work[[i, t]]).sum();
        if sigma == 0.0 {
            reflectors.push((Array1::zeros(m - t), 0.0));
            continue;
        }
        let beta = -alpha.signum() * (alpha * alpha + sigma).sqrt();
        let mut v = Array1::zeros(m - t);
        v[0] = 1.0;
        for i in t + 1..m {
            v[i - t] = work[[i, t]] / (alpha - beta);
        }
        let tau = (beta - alpha) / beta;
        for c in t + 1..n {
            let mut w = 0.0;
            for i in t..m {
                w += v[i - t] * work[[i, c]];
            }
            if w != 0.0 {
                for i in t..m {
                    work[[i, c]] -= tau * w * v[i - t];
                }
            }
        }
        work[[t, t]] = beta;
        for i in t + 1..m {
            work[[i, t]] = 0.0;
        }
        reflectors.push((v, tau));
    }

    // materialize the thin Q by applying the reflectors to [I_k; 0]
    let mut q = Array2::zeros((m, k));
    for j in 0..k {
        q[[j, j]] = 1.0;
    }
    for (t, (v, tau)) in reflectors.iter().enumerate().take(k).rev() {
        if *tau == 0.0 {
            continue;
        }
        for col in 0..k {
            let mut w = 0.0;
            for i in t..m {
                w += v[i - t] * q[[i, col]];
            }
            if w != 0.0 {
                for i in t..m {
                    q[[i, col]] -= tau * w * v[i - t];
                }
            }
        }
    }

    let r = work.slice(ndarray::s![..k, ..]).to_owned();
    Ok(Rrqr { q, r, p, k })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense::fro_norm;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    fn permuted(a: &Array2<f64>, p: &[usize]) -> Array2<f64> {
        let mut out = Array2::zeros(a.dim());
        for (j, &pj) in p.iter().enumerate() {
            out.column_mut(j).assign(&a.column(pj));
        }
        out
    }

    #[test]
    fn test_full_rank_reconstruction() {
        let a = Array2::random((10, 6), Uniform::new(-1.0, 1.0));
        let f = rrqr(&a.view(), 0.0, false).unwrap();
        assert_eq!(f.k, 6);
        let rec = f.q.dot(&f.r);
        let ap = permuted(&a, &f.p);
        assert!(fro_norm(&(&rec - &ap).view()) < 1e-12);
    }

    #[test]
    fn test_orthonormal_q() {
        let a = Array2::random((12, 5), Uniform::new(-1.0, 1.0));
        let f = rrqr(&a.view(), 0.0, false).unwrap();
        let qtq = f.q.t().dot(&f.q);
        for i in 0..5 {
            for j in 0..5 {
                let expect = if i == j { 1.0 } else { 0.0 };
                assert!((qtq[[i, j]] - expect).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_low_rank_truncation() {
        let b = Array2::random((9, 3), Uniform::new(-1.0, 1.0));
        let c = Array2::random((3, 7), Uniform::new(-1.0, 1.0));
        let a = b.dot(&c);
        let f = rrqr(&a.view(), 1e-12, true).unwrap();
        assert_eq!(f.k, 3);
        let rec = f.q.dot(&f.r);
        let ap = permuted(&a, &f.p);
        let scale = fro_norm(&a.view());
        assert!(fro_norm(&(&rec - &ap).view()) <= 1e-10 * scale);
    }

    #[test]
    fn test_smallest_rank_wins() {
        let mut a = Array2::<f64>::zeros((4, 2));
        a[[0, 0]] = 1.0;
        a[[1, 1]] = 1e-3;
        let f = rrqr(&a.view(), 1e-2, false).unwrap();
        assert_eq!(f.k, 1);
    }

    #[test]
    fn test_zero_input() {
        let a = Array2::<f64>::zeros((5, 4));
        let f = rrqr(&a.view(), 1e-10, true).unwrap();
        assert_eq!(f.k, 0);
        assert_eq!(f.q.dim(), (5, 0));
        assert_eq!(f.r.dim(), (0, 4));
    }

    #[test]
    fn test_invalid_arguments() {
        let a = Array2::<f64>::zeros((3, 3));
        assert!(matches!(
            rrqr(&a.view(), -1.0, false),
            Err(HssError::InvalidArgument(_))
        ));
        let mut a = Array2::<f64>::zeros((3, 3));
        a[[1, 1]] = f64::NAN;
        assert!(matches!(
            rrqr(&a.view(), 1e-8, false),
            Err(HssError::InvalidArgument(_))
        ));
    }
}
