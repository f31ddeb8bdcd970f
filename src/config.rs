/**
 * File: /src/config.rs
 * Created Date: Tuesday, March 11th 2025
 * Author: Zihan
 * -----
 * Last Modified: Thursday, 10th July 2025 2:41:08 pm
 * Modified By: the developer formerly known as Zihan at <wzh4464@gmail.com>
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
 * 10-07-2025		Zihan	kestimate reserved for the adaptive variant
 */

use serde::{Deserialize, Serialize};

use crate::error::HssError;

/// Compression configuration, threaded explicitly through every public
/// entry point. There is no process-wide default state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HssConfig {
    // 字段定义
    /// Truncation threshold for all rank-revealing factorizations.
    pub tol: f64,
    /// When true, `tol` is taken relative to the largest singular value
    /// encountered; when false, absolute.
    pub reltol: bool,
    /// Maximum index-range length at a cluster-tree leaf.
    pub leafsize: usize,
    /// Initial sampling rank for adaptive compression. Unused by the
    /// direct variant, kept so configurations round-trip.
    pub kestimate: Option<usize>,
}

impl Default for HssConfig {
    fn default() -> Self {
        Self {
            tol: 1e-9,
            reltol: true,
            leafsize: 64,
            kestimate: None,
        }
    }
}

impl HssConfig {
    pub fn new(tol: f64, reltol: bool, leafsize: usize) -> Self {
        Self {
            tol,
            reltol,
            leafsize,
            kestimate: None,
        }
    }

    pub fn validate(&self) -> Result<(), HssError> {
        if !self.tol.is_finite() || self.tol < 0.0 {
            return Err(HssError::InvalidArgument(format!(
                "tolerance must be finite and nonnegative, got {}",
                self.tol
            )));
        }
        if self.leafsize == 0 {
            return Err(HssError::InvalidArgument(
                "leafsize must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
