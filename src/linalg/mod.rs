//! # Dense linear algebra for the normal equations
//!
//! * [`svd`]: from-scratch Golub–Reinsch singular value decomposition.
//! * [`solver`]: the [`LinearSolver`](solver::LinearSolver) strategies used by the
//!   estimator, direct Gauss-Jordan inversion and the SVD pseudo-inverse.

pub mod solver;
pub mod svd;
