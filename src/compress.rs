//! # Direct compression
//!
//! Top-down construction of an HSS tree from a dense matrix and a pair of
//! cluster trees. Every node factors its off-diagonal block row and block
//! column with a rank-revealing QR sharing one `(tol, reltol)` pair:
//!
//! - a node over rows `r` and columns `c` takes its left generator from
//!   `A[r, outside(c)]` and its right generator from `A[outside(r), c]ᵀ`,
//!   so the generator captures the sibling block and everything above it;
//! - couplings are orthonormal projections `B12 = U1ᵀ A[r1, c2] V2`;
//! - translation operators are the least-squares fit of the parent
//!   generator in the children's bases, `R1 = U1ᵀ Q[..m1]` and so on.
//!
//! Subtrees compress in parallel through the recursion harness.

/**
 * File: /src/compress.rs
 * Created Date: Friday, March 14th 2025
 * Author: Zihan
 * -----
 * Last Modified: Thursday, 10th July 2025 4:26:30 pm
 * Modified By: the developer formerly known as Zihan at <wzh4464@gmail.com>
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
 * 10-07-2025		Zihan	root skips its own generator factorization
 */

use std::thread;

use log::{debug, info};
use ndarray::{s, Array2};

use crate::cluster::ClusterTree;
use crate::config::HssConfig;
use crate::dense::{hstack, vstack};
use crate::error::HssError;
use crate::hss::{HssBranch, HssLeaf, HssMatrix, HssNode};
use crate::rrqr::rrqr;
use crate::scheduler::TaskContext;

/// Compress `a` into an HSS tree over the given row and column cluster
/// trees. The trees must cover `0..a.nrows()` and `0..a.ncols()` and share
/// one binary topology.
pub fn compress(
    a: &Array2<f64>,
    row_tree: &ClusterTree,
    col_tree: &ClusterTree,
    config: &HssConfig,
) -> Result<HssMatrix, HssError> {
    config.validate()?;
    if row_tree.range() != (0..a.nrows()) {
        return Err(HssError::DimensionMismatch(format!(
            "row tree covers {:?} but the matrix has {} rows",
            row_tree.range(),
            a.nrows()
        )));
    }
    if col_tree.range() != (0..a.ncols()) {
        return Err(HssError::DimensionMismatch(format!(
            "column tree covers {:?} but the matrix has {} columns",
            col_tree.range(),
            a.ncols()
        )));
    }
    debug!(
        "compressing {}x{} matrix, tol {:e} ({}), leafsize {}",
        a.nrows(),
        a.ncols(),
        config.tol,
        if config.reltol { "relative" } else { "absolute" },
        config.leafsize
    );

    let (hss, _, _) = thread::scope(|s| {
        let ctx = TaskContext::new(s);
        compress_node(ctx, a, row_tree, col_tree, config, true)
    })?;
    info!(
        "compressed {}x{}: depth {}, hss rank {}",
        hss.rows(),
        hss.cols(),
        hss.depth(),
        hss.hss_rank()
    );
    Ok(hss)
}

/// Off-diagonal block row `A[r, outside(c)]`.
fn offdiag_row_block(
    a: &Array2<f64>,
    r: std::ops::Range<usize>,
    c: std::ops::Range<usize>,
) -> Array2<f64> {
    let left = a.slice(s![r.clone(), ..c.start]);
    let right = a.slice(s![r, c.end..]);
    hstack(left, right)
}

/// Transposed off-diagonal block column `A[outside(r), c]ᵀ`.
fn offdiag_col_block_t(
    a: &Array2<f64>,
    r: std::ops::Range<usize>,
    c: std::ops::Range<usize>,
) -> Array2<f64> {
    let top = a.slice(s![..r.start, c.clone()]);
    let bottom = a.slice(s![r.end.., c]);
    vstack(top, bottom).t().to_owned()
}

/// Recursive worker. Besides the finished node it hands the parent the
/// explicit generators of this level, which the parent consumes for its
/// couplings and translation operators.
fn compress_node<'scope, 'env>(
    ctx: TaskContext<'scope, 'env>,
    a: &'env Array2<f64>,
    row: &'env ClusterTree,
    col: &'env ClusterTree,
    config: &'env HssConfig,
    is_root: bool,
) -> Result<(HssMatrix, Array2<f64>, Array2<f64>), HssError> {
    let r = row.range();
    let c = col.range();
    let m = row.len();
    let n = col.len();

    match (row.children(), col.children()) {
        (None, None) => {
            let d = a.slice(s![r.clone(), c.clone()]).to_owned();
            let (u, v) = if is_root {
                (Array2::zeros((m, 0)), Array2::zeros((n, 0)))
            } else {
                let xrow = offdiag_row_block(a, r.clone(), c.clone());
                let u = rrqr(&xrow.view(), config.tol, config.reltol)?.q;
                let xcol = offdiag_col_block_t(a, r, c);
                let v = rrqr(&xcol.view(), config.tol, config.reltol)?.q;
                (u, v)
            };
            let node = HssMatrix {
                rows: m,
                cols: n,
                root: is_root,
                node: HssNode::Leaf(HssLeaf {
                    d,
                    u: u.clone(),
                    v: v.clone(),
                }),
            };
            Ok((node, u, v))
        }
        (Some((row1, row2)), Some((col1, col2))) => {
            let handle =
                ctx.spawn(move |cx| compress_node(cx, a, row1, col1, config, false));
            let (node2, u2, v2) = compress_node(ctx.descend(), a, row2, col2, config, false)?;
            let (node1, u1, v1) = handle.fetch()?;

            let m1 = node1.rows();
            let n1 = node1.cols();
            let a12 = a.slice(s![row1.range(), col2.range()]);
            let a21 = a.slice(s![row2.range(), col1.range()]);
            let b12 = u1.t().dot(&a12).dot(&v2);
            let b21 = u2.t().dot(&a21).dot(&v1);

            let (r1, r2, w1, w2, u_exp, v_exp) = if is_root {
                (
                    Array2::zeros((u1.ncols(), 0)),
                    Array2::zeros((u2.ncols(), 0)),
                    Array2::zeros((v1.ncols(), 0)),
                    Array2::zeros((v2.ncols(), 0)),
                    Array2::zeros((m, 0)),
                    Array2::zeros((n, 0)),
                )
            } else {
                let xrow = offdiag_row_block(a, r.clone(), c.clone());
                let qu = rrqr(&xrow.view(), config.tol, config.reltol)?.q;
                let xcol = offdiag_col_block_t(a, r, c);
                let qv = rrqr(&xcol.view(), config.tol, config.reltol)?.q;
                let r1 = u1.t().dot(&qu.slice(s![..m1, ..]));
                let r2 = u2.t().dot(&qu.slice(s![m1.., ..]));
                let w1 = v1.t().dot(&qv.slice(s![..n1, ..]));
                let w2 = v2.t().dot(&qv.slice(s![n1.., ..]));
                (r1, r2, w1, w2, qu, qv)
            };

            let node = HssMatrix {
                rows: m,
                cols: n,
                root: is_root,
                node: HssNode::Branch(Box::new(HssBranch {
                    child1: node1,
                    child2: node2,
                    b12,
                    b21,
                    r1,
                    r2,
                    w1,
                    w2,
                })),
            };
            Ok((node, u_exp, v_exp))
        }
        _ => Err(HssError::DimensionMismatch(format!(
            "row and column cluster trees differ in structure at rows {:?} / columns {:?}",
            r, c
        ))),
    }
}
