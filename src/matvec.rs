//! # Mat-vec
//!
//! Two-pass HSS matrix-vector product. The upward pass contracts the
//! right generators against `x` and folds the results through the `W`
//! translations; the downward pass expands the accumulated couplings
//! through the `R` translations and finishes at the leaves with
//! `y = D x + U f`. Work is linear in the storage of the representation.

/**
 * File: /src/matvec.rs
 * Created Date: Friday, March 14th 2025
 * Author: Zihan
 * -----
 * Last Modified: Friday, 14th March 2025 8:19:56 pm
 * Modified By: the developer formerly known as Zihan at <wzh4464@gmail.com>
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
 */

use std::thread;

use ndarray::{s, Array2, ArrayViewMut2, Axis};

use crate::error::HssError;
use crate::hss::{HssMatrix, HssNode};
use crate::scheduler::TaskContext;

/// Per-branch contractions retained between the two passes.
enum GTree {
    Leaf,
    Branch {
        g1: Array2<f64>,
        g2: Array2<f64>,
        c1: Box<GTree>,
        c2: Box<GTree>,
    },
}

impl HssMatrix {
    /// Multiply `self * x` where `x` has `self.cols()` rows and any number
    /// of columns.
    pub fn matvec(&self, x: &Array2<f64>) -> Result<Array2<f64>, HssError> {
        if x.nrows() != self.cols {
            return Err(HssError::DimensionMismatch(format!(
                "matvec expects {} rows in x, got {}",
                self.cols,
                x.nrows()
            )));
        }
        let gtree = thread::scope(|s| {
            let ctx = TaskContext::new(s);
            up_sweep(ctx, self, x, 0).0
        });
        let mut y = Array2::zeros((self.rows, x.ncols()));
        thread::scope(|s| {
            let ctx = TaskContext::new(s);
            let f0 = Array2::zeros((self.u_rank(), x.ncols()));
            down_sweep(ctx, self, &gtree, x, 0, f0, y.view_mut());
        });
        Ok(y)
    }
}

/// Returns the retained contraction tree and `g = Vᵀ x` of this node.
fn up_sweep<'scope, 'env>(
    ctx: TaskContext<'scope, 'env>,
    hss: &'env HssMatrix,
    x: &'env Array2<f64>,
    col_off: usize,
) -> (GTree, Array2<f64>) {
    match &hss.node {
        HssNode::Leaf(l) => {
            let xs = x.slice(s![col_off..col_off + hss.cols, ..]);
            (GTree::Leaf, l.v.t().dot(&xs))
        }
        HssNode::Branch(b) => {
            let n1 = b.child1.cols();
            let handle = ctx.spawn(move |cx| up_sweep(cx, &b.child1, x, col_off));
            let (t2, g2) = up_sweep(ctx.descend(), &b.child2, x, col_off + n1);
            let (t1, g1) = handle.fetch();
            // empty W at the root contracts to a zero-row g, which nobody reads
            let g = b.w1.t().dot(&g1) + b.w2.t().dot(&g2);
            (
                GTree::Branch {
                    g1,
                    g2,
                    c1: Box::new(t1),
                    c2: Box::new(t2),
                },
                g,
            )
        }
    }
}

/// `f` is the incoming expansion in this node's left generator basis,
/// zero-width at the root.
fn down_sweep<'scope, 'env>(
    ctx: TaskContext<'scope, 'env>,
    hss: &'env HssMatrix,
    gtree: &'env GTree,
    x: &'env Array2<f64>,
    col_off: usize,
    f: Array2<f64>,
    mut y: ArrayViewMut2<'env, f64>,
) {
    match (&hss.node, gtree) {
        (HssNode::Leaf(l), GTree::Leaf) => {
            let xs = x.slice(s![col_off..col_off + hss.cols, ..]);
            let mut out = l.d.dot(&xs);
            out = out + l.u.dot(&f);
            y.assign(&out);
        }
        (HssNode::Branch(b), GTree::Branch { g1, g2, c1, c2 }) => {
            let f1 = b.b12.dot(g2) + b.r1.dot(&f);
            let f2 = b.b21.dot(g1) + b.r2.dot(&f);
            let m1 = b.child1.rows();
            let n1 = b.child1.cols();
            let (y1, y2) = y.split_at(Axis(0), m1);
            let handle = ctx.spawn(move |cx| down_sweep(cx, &b.child1, c1, x, col_off, f1, y1));
            down_sweep(ctx.descend(), &b.child2, c2, x, col_off + n1, f2, y2);
            handle.wait();
        }
        _ => unreachable!("contraction tree mirrors the hss tree"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::bisection_cluster;
    use crate::compress::compress;
    use crate::config::HssConfig;
    use crate::dense::fro_norm;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    fn compress_with(a: &Array2<f64>, leafsize: usize, tol: f64) -> HssMatrix {
        let rt = bisection_cluster(0..a.nrows(), leafsize).unwrap();
        let ct = bisection_cluster(0..a.ncols(), leafsize).unwrap();
        compress(a, &rt, &ct, &HssConfig::new(tol, true, leafsize)).unwrap()
    }

    #[test]
    fn test_matvec_matches_dense() {
        let a = Array2::random((96, 96), Uniform::new(-1.0, 1.0));
        let hss = compress_with(&a, 16, 1e-10);
        let x = Array2::random((96, 3), Uniform::new(-1.0, 1.0));
        let y = hss.matvec(&x).unwrap();
        let yd = a.dot(&x);
        let err = fro_norm(&(&y - &yd).view()) / fro_norm(&yd.view());
        assert!(err < 1e-7, "relative error {}", err);
    }

    #[test]
    fn test_matvec_rectangular() {
        // 128 rows split as [64, 64] -> [32 x 4], 96 columns as [48, 48]
        // -> [24 x 4]: same topology, different ranges
        let a = Array2::random((128, 96), Uniform::new(-1.0, 1.0));
        let hss = compress_with(&a, 32, 1e-10);
        let x = Array2::random((96, 2), Uniform::new(-1.0, 1.0));
        let y = hss.matvec(&x).unwrap();
        let yd = a.dot(&x);
        let err = fro_norm(&(&y - &yd).view()) / fro_norm(&yd.view());
        assert!(err < 1e-7, "relative error {}", err);
    }

    #[test]
    fn test_matvec_on_root_leaf() {
        let a = Array2::random((8, 8), Uniform::new(-1.0, 1.0));
        let hss = compress_with(&a, 8, 1e-9);
        let x = Array2::random((8, 1), Uniform::new(-1.0, 1.0));
        let y = hss.matvec(&x).unwrap();
        assert!(fro_norm(&(&y - &a.dot(&x)).view()) < 1e-12);
    }

    #[test]
    fn test_matvec_shape_mismatch() {
        let a = Array2::random((32, 32), Uniform::new(-1.0, 1.0));
        let hss = compress_with(&a, 8, 1e-9);
        let x = Array2::random((16, 1), Uniform::new(-1.0, 1.0));
        assert!(matches!(
            hss.matvec(&x),
            Err(HssError::DimensionMismatch(_))
        ));
    }
}
