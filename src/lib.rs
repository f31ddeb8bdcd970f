//! # fast_hss
//!
//! Hierarchically semiseparable (HSS) matrices: compression of a dense
//! matrix into a nested low-rank tree, fast matrix-vector products and a
//! direct solver built on an implicit ULV factorization.
//!
//! ```
//! use fast_hss::{bisection_cluster, compress, HssConfig};
//! use ndarray::Array2;
//!
//! let n = 64;
//! let a = Array2::from_shape_fn((n, n), |(i, j)| {
//!     if i == j { 8.0 } else { 1.0 / (i as f64 - j as f64) }
//! });
//! let tree = bisection_cluster(0..n, 16).unwrap();
//! let hss = compress(&a, &tree, &tree, &HssConfig::default()).unwrap();
//!
//! let b = Array2::from_elem((n, 1), 1.0);
//! let x = hss.solve(&b).unwrap();
//! let y = hss.matvec(&x).unwrap();
//! assert!((&y - &b).iter().all(|e| e.abs() < 1e-6));
//! ```

/**
 * File: /src/lib.rs
 * Created Date: Tuesday, March 11th 2025
 * Author: Zihan
 * -----
 * Last Modified: Thursday, 10th July 2025 6:12:40 pm
 * Modified By: the developer formerly known as Zihan at <wzh4464@gmail.com>
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
 * 15-03-2025		Zihan	ulv solve wired into the public surface
 */

pub mod cluster;
pub mod config;
pub mod dense;
pub mod error;
pub mod hss;
pub mod rrqr;
pub mod scheduler;

mod compress;
mod matvec;
mod solve;

pub use cluster::{bisection_cluster, ClusterTree};
pub use compress::compress;
pub use config::HssConfig;
pub use error::HssError;
pub use hss::HssMatrix;
pub use rrqr::{rrqr, Rrqr};
