//! Batch orbit determination by weighted nonlinear least squares.
//!
//! Observations from tracking sensors are fitted with a Gauss-Newton iteration
//! ([`estimation::controller::BatchLeastSquares`]) around a pluggable
//! [`propagation::Propagator`], using finite-difference partials and an SVD-based
//! normal-equation solver ([`linalg`]).

pub mod constants;
pub mod estimation;
pub mod geometry;
mod kepler;
pub mod linalg;
pub mod observations;
pub mod observers;
pub mod od_errors;
pub mod orbit_type;
pub mod parameterization;
pub mod propagation;
pub mod time;
