/*! # kintrack

A kinematics and target tracking toolkit.

The two pillars of this library are a hierarchical reference frame engine with
motion state transformation (cf. the [kinematics] module) and a family of
recursive estimation filters driven by pluggable applied filters, with a radar
tracking application (cf. the [estimation] module).
*/

#[macro_use]
extern crate log;

pub extern crate nalgebra as na;

/// Re-export of the commonly used nalgebra types and dimensions.
pub mod dimensions {
    pub use crate::na::base::dimension::*;
    pub use crate::na::{DMatrix, DVector, Matrix3, Vector3};
}

/// Provides all of the errors which may be raised by this library.
pub mod errors;

/// Provides shape-checked operations, decompositions and serialization over
/// dynamically sized matrices.
pub mod linalg;

/// Provides closed-form root solvers for low-order polynomials with real
/// coefficients.
pub mod polynomial;

/// Provides the identifier-and-time-sorted container and the state map.
pub mod containers;

/// Provides reference frames, frame states and motion states, along with the
/// transformation engine between them.
pub mod kinematics;

/// Provides the Kalman filter family, the applied radar track filters and the
/// measurement aggregation strategies.
pub mod estimation;

/// Provides configuration reading for the estimation filters.
pub mod io;

/// Provides several common math helpers (axis rotations, angle wrapping, Euler
/// rate mappings).
pub mod utils;

pub use crate::errors::KinError;
