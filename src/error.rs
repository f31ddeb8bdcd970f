/**
 * File: /src/error.rs
 * Created Date: Tuesday, March 11th 2025
 * Author: Zihan
 * -----
 * Last Modified: Saturday, 14th June 2025 9:02:11 am
 * Modified By: the developer formerly known as Zihan at <wzh4464@gmail.com>
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
 */

use std::error::Error;
use std::fmt;

/// Errors surfaced by compression, mat-vec and the ULV solve.
#[derive(Debug, Clone, PartialEq)]
pub enum HssError {
    /// Input shapes contradict the cluster trees or each other.
    DimensionMismatch(String),
    /// Negative tolerance, empty range, zero leaf size, non-finite data.
    InvalidArgument(String),
    /// A known edge of the ULV merge that is deliberately unsupported.
    NotImplemented(String),
    /// A dense solve reported a singular system.
    NumericalFailure(String),
}

impl fmt::Display for HssError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HssError::DimensionMismatch(msg) => write!(f, "dimension mismatch: {}", msg),
            HssError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            HssError::NotImplemented(msg) => write!(f, "not implemented: {}", msg),
            HssError::NumericalFailure(msg) => write!(f, "numerical failure: {}", msg),
        }
    }
}

impl Error for HssError {}
