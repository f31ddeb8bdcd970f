//! # Dense kernels
//!
//! The small set of dense linear-algebra operations the HSS algorithms
//! consume: Householder QL and LQ factorizations with their Q appliers,
//! a lower triangular solve and a general LU solve. Factorizations keep
//! the reflectors in compact form; Q is never materialized.
//!
//! LU and triangular solves are delegated to nalgebra; blocks cross the
//! boundary through a row-major conversion.

/**
 * File: /src/dense.rs
 * Created Date: Wednesday, March 12th 2025
 * Author: Zihan
 * -----
 * Last Modified: Saturday, 14th June 2025 10:17:45 am
 * Modified By: the developer formerly known as Zihan at <wzh4464@gmail.com>
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
 * 14-06-2025		Zihan	singular triangular solves now report NumericalFailure
 */

use nalgebra::DMatrix;
use ndarray::{concatenate, Array1, Array2, ArrayView2, Axis};

use crate::error::HssError;

/// One Householder reflector in compact form. `v` covers a contiguous
/// index window; entries outside the window are implicitly zero.
#[derive(Debug, Clone)]
struct Reflector {
    v: Array1<f64>,
    tau: f64,
}

/// Compact QL factorization `A = Q * L`.
///
/// Reflectors are generated column by column from the right; reflector `t`
/// acts on rows `0..=m-1-t`.
#[derive(Debug, Clone)]
pub struct QlFactors {
    reflectors: Vec<Reflector>,
    m: usize,
}

/// In-place QL factorization. On return `a` holds `Qᵀ * A`, i.e. zeros on
/// top of a lower triangular tail.
pub fn geqlf(a: &mut Array2<f64>) -> QlFactors {
    let (m, n) = a.dim();
    let kq = m.min(n);
    let mut reflectors = Vec::with_capacity(kq);
    for t in 0..kq {
        let j = n - 1 - t;
        let ip = m - 1 - t;
        let alpha = a[[ip, j]];
        let sigma: f64 = (0..ip).map(|i| a[[i, j]] * a[[i, j]]).sum();
        if sigma == 0.0 {
            reflectors.push(Reflector {
                v: Array1::zeros(ip + 1),
                tau: 0.0,
            });
            continue;
        }
        let beta = -alpha.signum() * (alpha * alpha + sigma).sqrt();
        let mut v = Array1::zeros(ip + 1);
        for i in 0..ip {
            v[i] = a[[i, j]] / (alpha - beta);
        }
        v[ip] = 1.0;
        let tau = (beta - alpha) / beta;
        for c in 0..j {
            let w: f64 = (0..=ip).map(|i| v[i] * a[[i, c]]).sum();
            if w != 0.0 {
                for i in 0..=ip {
                    a[[i, c]] -= tau * w * v[i];
                }
            }
        }
        for i in 0..ip {
            a[[i, j]] = 0.0;
        }
        a[[ip, j]] = beta;
        reflectors.push(Reflector { v, tau });
    }
    QlFactors { reflectors, m }
}

impl QlFactors {
    fn house_left(r: &Reflector, c: &mut Array2<f64>) {
        if r.tau == 0.0 {
            return;
        }
        let rows = r.v.len();
        for col in 0..c.ncols() {
            let mut w = 0.0;
            for i in 0..rows {
                w += r.v[i] * c[[i, col]];
            }
            if w != 0.0 {
                for i in 0..rows {
                    c[[i, col]] -= r.tau * w * r.v[i];
                }
            }
        }
    }

    /// `C <- Qᵀ C`.
    pub fn apply_qt_left(&self, c: &mut Array2<f64>) {
        debug_assert_eq!(c.nrows(), self.m);
        for r in &self.reflectors {
            Self::house_left(r, c);
        }
    }

    /// `C <- Q C`.
    pub fn apply_q_left(&self, c: &mut Array2<f64>) {
        debug_assert_eq!(c.nrows(), self.m);
        for r in self.reflectors.iter().rev() {
            Self::house_left(r, c);
        }
    }
}

/// Compact LQ factorization `A = L * Q`.
///
/// Reflector `t` acts on coordinate indices `t..n`.
#[derive(Debug, Clone)]
pub struct LqFactors {
    reflectors: Vec<Reflector>,
    n: usize,
}

/// In-place LQ factorization. On return `a` holds `A * Qᵀ`, lower
/// triangular (trapezoidal when rectangular).
pub fn gelqf(a: &mut Array2<f64>) -> LqFactors {
    let (p, n) = a.dim();
    let kq = p.min(n);
    let mut reflectors = Vec::with_capacity(kq);
    for t in 0..kq {
        let alpha = a[[t, t]];
        let sigma: f64 = (t + 1..n).map(|j| a[[t, j]] * a[[t, j]]).sum();
        if sigma == 0.0 {
            reflectors.push(Reflector {
                v: Array1::zeros(n - t),
                tau: 0.0,
            });
            continue;
        }
        let beta = -alpha.signum() * (alpha * alpha + sigma).sqrt();
        let mut v = Array1::zeros(n - t);
        v[0] = 1.0;
        for j in t + 1..n {
            v[j - t] = a[[t, j]] / (alpha - beta);
        }
        let tau = (beta - alpha) / beta;
        for r in t + 1..p {
            let mut w = 0.0;
            for j in t..n {
                w += v[j - t] * a[[r, j]];
            }
            if w != 0.0 {
                for j in t..n {
                    a[[r, j]] -= tau * w * v[j - t];
                }
            }
        }
        a[[t, t]] = beta;
        for j in t + 1..n {
            a[[t, j]] = 0.0;
        }
        reflectors.push(Reflector { v, tau });
    }
    LqFactors { reflectors, n }
}

impl LqFactors {
    /// Rows touched by reflector `t` start at coordinate `t`.
    fn house_left(t: usize, r: &Reflector, c: &mut Array2<f64>) {
        if r.tau == 0.0 {
            return;
        }
        let len = r.v.len();
        for col in 0..c.ncols() {
            let mut w = 0.0;
            for i in 0..len {
                w += r.v[i] * c[[t + i, col]];
            }
            if w != 0.0 {
                for i in 0..len {
                    c[[t + i, col]] -= r.tau * w * r.v[i];
                }
            }
        }
    }

    fn house_right(t: usize, r: &Reflector, c: &mut Array2<f64>) {
        if r.tau == 0.0 {
            return;
        }
        let len = r.v.len();
        for row in 0..c.nrows() {
            let mut w = 0.0;
            for j in 0..len {
                w += c[[row, t + j]] * r.v[j];
            }
            if w != 0.0 {
                for j in 0..len {
                    c[[row, t + j]] -= r.tau * w * r.v[j];
                }
            }
        }
    }

    /// `C <- Q C` where `C` has `n` rows.
    pub fn apply_q_left(&self, c: &mut Array2<f64>) {
        debug_assert_eq!(c.nrows(), self.n);
        for (t, r) in self.reflectors.iter().enumerate() {
            Self::house_left(t, r, c);
        }
    }

    /// `C <- Qᵀ C`.
    pub fn apply_qt_left(&self, c: &mut Array2<f64>) {
        debug_assert_eq!(c.nrows(), self.n);
        for (t, r) in self.reflectors.iter().enumerate().rev() {
            Self::house_left(t, r, c);
        }
    }

    /// `C <- C Q` where `C` has `n` columns.
    pub fn apply_q_right(&self, c: &mut Array2<f64>) {
        debug_assert_eq!(c.ncols(), self.n);
        for (t, r) in self.reflectors.iter().enumerate().rev() {
            Self::house_right(t, r, c);
        }
    }

    /// `C <- C Qᵀ`.
    pub fn apply_qt_right(&self, c: &mut Array2<f64>) {
        debug_assert_eq!(c.ncols(), self.n);
        for (t, r) in self.reflectors.iter().enumerate() {
            Self::house_right(t, r, c);
        }
    }
}

/// Solve `L x = b` with `L` square lower triangular.
pub fn trsm_lower(l: &ArrayView2<f64>, b: &ArrayView2<f64>) -> Result<Array2<f64>, HssError> {
    let ln = to_dmatrix(l);
    let bn = to_dmatrix(b);
    match ln.solve_lower_triangular(&bn) {
        Some(x) => Ok(from_dmatrix(&x)),
        None => Err(HssError::NumericalFailure(format!(
            "singular {}x{} triangular block",
            l.nrows(),
            l.ncols()
        ))),
    }
}

/// Solve `A x = b` with `A` square, via LU with partial pivoting.
pub fn gesv(a: &ArrayView2<f64>, b: &ArrayView2<f64>) -> Result<Array2<f64>, HssError> {
    if a.nrows() == 0 {
        return Ok(Array2::zeros((0, b.ncols())));
    }
    let lu = to_dmatrix(a).lu();
    match lu.solve(&to_dmatrix(b)) {
        Some(x) => Ok(from_dmatrix(&x)),
        None => Err(HssError::NumericalFailure(format!(
            "singular {}x{} dense block",
            a.nrows(),
            a.ncols()
        ))),
    }
}

pub fn to_dmatrix(a: &ArrayView2<f64>) -> DMatrix<f64> {
    DMatrix::from_row_iterator(a.nrows(), a.ncols(), a.iter().cloned())
}

pub fn from_dmatrix(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// `[a b]`; row counts must agree.
pub fn hstack<'a>(a: ArrayView2<'a, f64>, b: ArrayView2<'a, f64>) -> Array2<f64> {
    concatenate(Axis(1), &[a, b]).expect("hstack: row counts must match")
}

/// `[a; b]`; column counts must agree.
pub fn vstack<'a>(a: ArrayView2<'a, f64>, b: ArrayView2<'a, f64>) -> Array2<f64> {
    concatenate(Axis(0), &[a, b]).expect("vstack: column counts must match")
}

pub fn block2x2<'a>(
    a11: ArrayView2<'a, f64>,
    a12: ArrayView2<'a, f64>,
    a21: ArrayView2<'a, f64>,
    a22: ArrayView2<'a, f64>,
) -> Array2<f64> {
    vstack(hstack(a11, a12).view(), hstack(a21, a22).view())
}

pub fn fro_norm(a: &ArrayView2<f64>) -> f64 {
    a.iter().map(|x| x * x).sum::<f64>().sqrt()
}
