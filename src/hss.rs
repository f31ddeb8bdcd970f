//! # HSS tree
//!
//! The recursive container for a compressed matrix. A node is either a
//! leaf holding the dense diagonal block and its generators, or a branch
//! holding two children, the coupling blocks of its off-diagonal parts
//! and the translation operators expressing its own (implicit) generators
//! through the children's:
//!
//! - off-diagonal blocks: `A12 = U1 · B12 · V2ᵀ`, `A21 = U2 · B21 · V1ᵀ`
//! - generators of a non-root branch: `U = [U1·R1; U2·R2]`, `V = [V1·W1; V2·W2]`
//!
//! The root carries no translation operators. A tree is produced by
//! [`crate::compress::compress`] and is immutable afterwards; the solve
//! copies any block it transforms.

/**
 * File: /src/hss.rs
 * Created Date: Thursday, March 13th 2025
 * Author: Zihan
 * -----
 * Last Modified: Thursday, 10th July 2025 3:02:51 pm
 * Modified By: the developer formerly known as Zihan at <wzh4464@gmail.com>
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
 */

use ndarray::Array2;

use crate::dense::block2x2;

/// A compressed matrix over a pair of matching binary cluster trees.
#[derive(Debug, Clone, PartialEq)]
pub struct HssMatrix {
    pub(crate) rows: usize,
    pub(crate) cols: usize,
    pub(crate) root: bool,
    pub(crate) node: HssNode,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum HssNode {
    Leaf(HssLeaf),
    Branch(Box<HssBranch>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HssLeaf {
    /// Dense diagonal block, `(m, n)`.
    pub d: Array2<f64>,
    /// Left generator, `(m, ru)`.
    pub u: Array2<f64>,
    /// Right generator, `(n, rv)`.
    pub v: Array2<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HssBranch {
    pub child1: HssMatrix,
    pub child2: HssMatrix,
    /// Coupling of the (1,2) off-diagonal, `(ru(child1), rv(child2))`.
    pub b12: Array2<f64>,
    /// Coupling of the (2,1) off-diagonal, `(ru(child2), rv(child1))`.
    pub b21: Array2<f64>,
    /// Row translation operators; empty with zero width at the root.
    pub r1: Array2<f64>,
    pub r2: Array2<f64>,
    /// Column translation operators; empty with zero width at the root.
    pub w1: Array2<f64>,
    pub w2: Array2<f64>,
}

impl HssMatrix {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.node, HssNode::Leaf(_))
    }

    pub fn is_root(&self) -> bool {
        self.root
    }

    /// Cached shape of the first child; `None` at a leaf.
    pub fn sz1(&self) -> Option<(usize, usize)> {
        match &self.node {
            HssNode::Leaf(_) => None,
            HssNode::Branch(b) => Some(b.child1.shape()),
        }
    }

    /// Cached shape of the second child; `None` at a leaf.
    pub fn sz2(&self) -> Option<(usize, usize)> {
        match &self.node {
            HssNode::Leaf(_) => None,
            HssNode::Branch(b) => Some(b.child2.shape()),
        }
    }

    /// Width of this node's left generator.
    pub(crate) fn u_rank(&self) -> usize {
        match &self.node {
            HssNode::Leaf(l) => l.u.ncols(),
            HssNode::Branch(b) => b.r1.ncols(),
        }
    }

    /// Width of this node's right generator.
    pub(crate) fn v_rank(&self) -> usize {
        match &self.node {
            HssNode::Leaf(l) => l.v.ncols(),
            HssNode::Branch(b) => b.w1.ncols(),
        }
    }

    /// Largest generator width anywhere in the tree. Zero means the matrix
    /// is block diagonal down to the leaves.
    pub fn hss_rank(&self) -> usize {
        let own = if self.root {
            0
        } else {
            self.u_rank().max(self.v_rank())
        };
        match &self.node {
            HssNode::Leaf(_) => own,
            HssNode::Branch(b) => own.max(b.child1.hss_rank()).max(b.child2.hss_rank()),
        }
    }

    pub fn depth(&self) -> usize {
        match &self.node {
            HssNode::Leaf(_) => 0,
            HssNode::Branch(b) => 1 + b.child1.depth().max(b.child2.depth()),
        }
    }

    /// Materialize this node's generators. Branch generators are composed
    /// through the translation operators, so the result at the root of a
    /// tree has zero width.
    pub(crate) fn generators(&self) -> (Array2<f64>, Array2<f64>) {
        match &self.node {
            HssNode::Leaf(l) => (l.u.clone(), l.v.clone()),
            HssNode::Branch(b) => {
                let (u1, v1) = b.child1.generators();
                let (u2, v2) = b.child2.generators();
                let u = crate::dense::vstack(u1.dot(&b.r1).view(), u2.dot(&b.r2).view());
                let v = crate::dense::vstack(v1.dot(&b.w1).view(), v2.dot(&b.w2).view());
                (u, v)
            }
        }
    }

    /// Reconstruct the dense matrix this tree represents.
    pub fn to_dense(&self) -> Array2<f64> {
        match &self.node {
            HssNode::Leaf(l) => l.d.clone(),
            HssNode::Branch(b) => {
                let a11 = b.child1.to_dense();
                let a22 = b.child2.to_dense();
                let (u1, v1) = b.child1.generators();
                let (u2, v2) = b.child2.generators();
                let a12 = u1.dot(&b.b12).dot(&v2.t());
                let a21 = u2.dot(&b.b21).dot(&v1.t());
                block2x2(a11.view(), a12.view(), a21.view(), a22.view())
            }
        }
    }
}
