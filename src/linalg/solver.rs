//! # Normal-equation solvers
//!
//! Both strategies solve `AtWA · Δx = AtWb` and also return the inverse of `AtWA`, the
//! covariance approximation of the fit:
//!
//! * [`DirectInverse`]: Gauss-Jordan inversion with partial pivoting. Fast, but a
//!   near-singular normal matrix yields a huge, meaningless correction.
//! * [`SvdPseudoInverse`]: `AtWA⁺ = V · Σ⁺ · Uᵗ` from [`SvdDecomposition`]. Singular values
//!   below `1e-14 · Σmax` get a tiny fixed reciprocal, so unobservable directions receive
//!   no correction. This is the default.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::{linalg::svd::SvdDecomposition, od_errors::OdError};

/// Singular values below this fraction of the largest one are treated as null.
pub const SVD_RELATIVE_THRESHOLD: f64 = 1e-14;

/// Reciprocal substituted for a null singular value.
pub const SVD_NULL_RECIPROCAL: f64 = 1e-18;

/// Correction and inverse normal matrix returned by a [`LinearSolver`].
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub correction: DVector<f64>,
    pub inverse: DMatrix<f64>,
}

/// Solver strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SolverMode {
    DirectInverse,
    #[default]
    Svd,
}

impl SolverMode {
    /// Solver implementing this mode.
    pub fn solver(&self) -> &'static dyn LinearSolver {
        match self {
            SolverMode::DirectInverse => &DirectInverse,
            SolverMode::Svd => &SvdPseudoInverse,
        }
    }
}

impl std::fmt::Display for SolverMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolverMode::DirectInverse => f.pad("direct inverse"),
            SolverMode::Svd => f.pad("svd"),
        }
    }
}

/// Strategy for solving the normal equations.
pub trait LinearSolver: Send + Sync {
    fn mode(&self) -> SolverMode;

    /// Solve `normal · Δx = rhs`.
    ///
    /// Errors
    /// ------
    /// * [`OdError::InvalidMatrixShape`] if `normal` is not square.
    /// * [`OdError::DimensionMismatch`] if `rhs` does not match `normal`.
    /// * Strategy-specific failures ([`OdError::SingularNormalMatrix`],
    ///   [`OdError::SvdNoConvergence`]).
    fn solve(&self, normal: &DMatrix<f64>, rhs: &DVector<f64>) -> Result<Solution, OdError>;
}

fn check_system(normal: &DMatrix<f64>, rhs: &DVector<f64>) -> Result<usize, OdError> {
    let (rows, cols) = normal.shape();
    if rows != cols || rows == 0 {
        return Err(OdError::InvalidMatrixShape {
            rows,
            cols,
            reason: "normal matrix must be square and non-empty",
        });
    }
    if rhs.len() != rows {
        return Err(OdError::DimensionMismatch {
            expected: rows,
            actual: rhs.len(),
        });
    }
    Ok(rows)
}

/// Gauss-Jordan inversion with partial pivoting.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectInverse;

impl LinearSolver for DirectInverse {
    fn mode(&self) -> SolverMode {
        SolverMode::DirectInverse
    }

    fn solve(&self, normal: &DMatrix<f64>, rhs: &DVector<f64>) -> Result<Solution, OdError> {
        let n = check_system(normal, rhs)?;

        let mut a = normal.clone();
        let mut inverse = DMatrix::<f64>::identity(n, n);

        for col in 0..n {
            let pivot_row = (col..n)
                .max_by(|&r1, &r2| a[(r1, col)].abs().total_cmp(&a[(r2, col)].abs()))
                .unwrap_or(col);
            let pivot = a[(pivot_row, col)];
            if pivot == 0.0 {
                return Err(OdError::SingularNormalMatrix(col));
            }
            if pivot_row != col {
                a.swap_rows(pivot_row, col);
                inverse.swap_rows(pivot_row, col);
            }

            let scale = 1.0 / pivot;
            a.row_mut(col).scale_mut(scale);
            inverse.row_mut(col).scale_mut(scale);

            for row in 0..n {
                if row == col {
                    continue;
                }
                let factor = a[(row, col)];
                if factor == 0.0 {
                    continue;
                }
                for k in 0..n {
                    a[(row, k)] -= factor * a[(col, k)];
                    inverse[(row, k)] -= factor * inverse[(col, k)];
                }
            }
        }

        let correction = &inverse * rhs;
        Ok(Solution {
            correction,
            inverse,
        })
    }
}

/// Pseudo-inverse through the singular value decomposition.
#[derive(Debug, Clone, Copy, Default)]
pub struct SvdPseudoInverse;

impl SvdPseudoInverse {
    /// `V · Σ⁺ · Uᵗ` of a decomposition.
    pub fn pseudo_inverse(svd: &SvdDecomposition) -> DMatrix<f64> {
        let wmax = svd.w.iter().copied().fold(0.0_f64, f64::max);
        let reciprocal = svd.w.map(|wi| {
            if wmax == 0.0 || wi / wmax < SVD_RELATIVE_THRESHOLD {
                SVD_NULL_RECIPROCAL
            } else {
                1.0 / wi
            }
        });
        &svd.v * DMatrix::from_diagonal(&reciprocal) * svd.u.transpose()
    }
}

impl LinearSolver for SvdPseudoInverse {
    fn mode(&self) -> SolverMode {
        SolverMode::Svd
    }

    fn solve(&self, normal: &DMatrix<f64>, rhs: &DVector<f64>) -> Result<Solution, OdError> {
        check_system(normal, rhs)?;
        let svd = SvdDecomposition::new(normal)?;
        let inverse = Self::pseudo_inverse(&svd);
        let correction = &inverse * rhs;
        Ok(Solution {
            correction,
            inverse,
        })
    }
}
