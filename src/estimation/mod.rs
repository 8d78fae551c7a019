//! # Batch least-squares estimation
//!
//! This module hosts the Gauss-Newton orbit estimator and its configuration,
//! [`EstimatorOptions`].
//!
//! ## Pipeline overview
//!
//! Every outer iteration of [`BatchLeastSquares::run`](controller::BatchLeastSquares::run):
//!
//! 1. **Jacobian** ([`jacobian`]): the nominal fit vector and one perturbed copy per fit
//!    component are converted to the propagator's native form, propagated to every
//!    observation epoch and turned into predicted measurements. One-sided differences give
//!    the sensitivity rows.
//! 2. **Normal equations** ([`normal_equations`]): rows, weights and residuals are
//!    accumulated into `AtWA`/`AtWb` together with per-type residual statistics.
//! 3. **Solve**: a [`LinearSolver`](crate::linalg::solver::LinearSolver) returns the
//!    correction and the covariance approximation.
//! 4. **Step limit and update**: the correction is clamped ([`controller::limit_step`])
//!    and applied.
//! 5. **Tests**: convergence, divergence (with a single restart) and the iteration cap.
//!
//! ## Example
//!
//! ```rust,no_run
//! use batch_od::estimation::EstimatorOptions;
//! use batch_od::linalg::solver::SolverMode;
//!
//! let options = EstimatorOptions::builder()
//!     .solver_mode(SolverMode::Svd)
//!     .max_iterations(20)
//!     .convergence_epsilon(1e-8)
//!     .build()
//!     .unwrap();
//! println!("{options:#}");
//! ```
use serde::{Deserialize, Serialize};
use std::cmp::Ordering::{Equal, Greater};
use std::fmt;
use std::ops::Range;

use crate::{linalg::solver::SolverMode, od_errors::OdError};

pub mod controller;
pub mod jacobian;
pub mod normal_equations;
pub mod result;

/// Configuration of [`BatchLeastSquares`](controller::BatchLeastSquares).
///
/// Fields
/// -----------------
/// * `solver_mode` – strategy used to solve the normal equations. A divergence restart
///   always switches to [`SolverMode::Svd`].
/// * `percent_change` – relative finite-difference step `δ = x[j]·percent_change`.
/// * `delta_amount_floor` – smallest absolute step. Smaller steps are grown ×1.4 up to five
///   times, then replaced by the floor itself.
/// * `convergence_epsilon` – the fit has converged when `RMS < ε` and
///   `ΔRMS / RMS_prev < ε`.
/// * `max_iterations` – cap on Gauss-Newton updates per attempt (a restart resets it). The
///   vector after the last update is still evaluated and tested for convergence.
/// * `observation_range` – optional sub-range of the observation batch to fit.
/// * `divergence_threshold` – RMS above which three increasing samples mean divergence.
/// * `parallel` – build the Jacobian on the rayon thread pool.
///
/// Defaults
/// -----------------
/// * `solver_mode`: `Svd`
/// * `percent_change`: 1.0e-3
/// * `delta_amount_floor`: 1.0e-7
/// * `convergence_epsilon`: 1.0e-6
/// * `max_iterations`: 5
/// * `observation_range`: `None` (whole batch)
/// * `divergence_threshold`: 5.0e5
/// * `parallel`: `true`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorOptions {
    pub solver_mode: SolverMode,
    pub percent_change: f64,
    pub delta_amount_floor: f64,
    pub convergence_epsilon: f64,
    pub max_iterations: usize,
    pub observation_range: Option<Range<usize>>,
    pub divergence_threshold: f64,
    pub parallel: bool,
}

impl EstimatorOptions {
    pub fn builder() -> EstimatorOptionsBuilder {
        EstimatorOptionsBuilder::new()
    }
}

impl Default for EstimatorOptions {
    fn default() -> Self {
        EstimatorOptions {
            solver_mode: SolverMode::Svd,
            percent_change: 1.0e-3,
            delta_amount_floor: 1.0e-7,
            convergence_epsilon: 1.0e-6,
            max_iterations: 5,
            observation_range: None,
            divergence_threshold: 5.0e5,
            parallel: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EstimatorOptionsBuilder {
    options: EstimatorOptions,
}

impl Default for EstimatorOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EstimatorOptionsBuilder {
    pub fn new() -> Self {
        Self {
            options: EstimatorOptions::default(),
        }
    }

    pub fn solver_mode(mut self, v: SolverMode) -> Self {
        self.options.solver_mode = v;
        self
    }
    pub fn percent_change(mut self, v: f64) -> Self {
        self.options.percent_change = v;
        self
    }
    pub fn delta_amount_floor(mut self, v: f64) -> Self {
        self.options.delta_amount_floor = v;
        self
    }
    pub fn convergence_epsilon(mut self, v: f64) -> Self {
        self.options.convergence_epsilon = v;
        self
    }
    pub fn max_iterations(mut self, v: usize) -> Self {
        self.options.max_iterations = v;
        self
    }
    pub fn observation_range(mut self, v: Range<usize>) -> Self {
        self.options.observation_range = Some(v);
        self
    }
    pub fn divergence_threshold(mut self, v: f64) -> Self {
        self.options.divergence_threshold = v;
        self
    }
    pub fn parallel(mut self, v: bool) -> Self {
        self.options.parallel = v;
        self
    }

    // ---- Numeric helpers for PartialOrd (handle NaN as invalid) ----

    #[inline]
    fn gt0(x: f64) -> bool {
        x.partial_cmp(&0.0) == Some(Greater)
    }

    #[inline]
    fn ge0(x: f64) -> bool {
        matches!(x.partial_cmp(&0.0), Some(Greater) | Some(Equal))
    }

    pub fn build(self) -> Result<EstimatorOptions, OdError> {
        let p = &self.options;

        if !Self::gt0(p.percent_change) {
            return Err(OdError::InvalidEstimatorParameter(
                "percent_change must be > 0".into(),
            ));
        }
        if !Self::gt0(p.delta_amount_floor) {
            return Err(OdError::InvalidEstimatorParameter(
                "delta_amount_floor must be > 0".into(),
            ));
        }
        if !Self::ge0(p.convergence_epsilon) {
            return Err(OdError::InvalidEstimatorParameter(
                "convergence_epsilon must be >= 0".into(),
            ));
        }
        if !Self::gt0(p.divergence_threshold) {
            return Err(OdError::InvalidEstimatorParameter(
                "divergence_threshold must be > 0".into(),
            ));
        }
        if p.max_iterations == 0 {
            return Err(OdError::InvalidEstimatorParameter(
                "max_iterations must be >= 1".into(),
            ));
        }
        if let Some(range) = &p.observation_range {
            if range.start >= range.end {
                return Err(OdError::InvalidEstimatorParameter(
                    "observation_range must not be empty".into(),
                ));
            }
        }

        Ok(self.options)
    }
}

impl fmt::Display for EstimatorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let range = match &self.observation_range {
            Some(r) => format!("{}..{}", r.start, r.end),
            None => "all".to_string(),
        };

        if f.alternate() {
            const PARAM_COL: usize = 44;
            writeln!(f, "Batch Least-Squares Options")?;
            writeln!(f, "---------------------------")?;

            macro_rules! line {
                ($fmt:expr, $val:expr, $comment:expr) => {{
                    let s = format!($fmt, $val);
                    let pad = if s.len() < PARAM_COL {
                        " ".repeat(PARAM_COL - s.len())
                    } else {
                        " ".to_string()
                    };
                    writeln!(f, "  {}{}# {}", s, pad, $comment)
                }};
            }

            writeln!(f, "[Linear algebra]")?;
            line!(
                "solver_mode          = {}",
                self.solver_mode,
                "Normal-equation solver"
            )?;

            writeln!(f, "\n[Finite differences]")?;
            line!(
                "percent_change       = {:.1e}",
                self.percent_change,
                "Relative Jacobian step"
            )?;
            line!(
                "delta_amount_floor   = {:.1e}",
                self.delta_amount_floor,
                "Smallest absolute Jacobian step"
            )?;

            writeln!(f, "\n[Iteration control]")?;
            line!(
                "convergence_epsilon  = {:.1e}",
                self.convergence_epsilon,
                "RMS / relative RMS change tolerance"
            )?;
            line!(
                "max_iterations       = {}",
                self.max_iterations,
                "Gauss-Newton iteration cap"
            )?;
            line!(
                "divergence_threshold = {:.1e}",
                self.divergence_threshold,
                "RMS level flagging divergence"
            )?;
            line!(
                "observation_range    = {}",
                range,
                "Observations used in the fit"
            )?;
            line!(
                "parallel             = {}",
                self.parallel,
                "Jacobian on the rayon pool"
            )?;

            Ok(())
        } else {
            write!(
                f,
                "EstimatorOptions(solver={}, percent_change={:.1e}, floor={:.1e}, eps={:.1e}, max_it={}, obs={}, divergence>{:.1e}, parallel={})",
                self.solver_mode,
                self.percent_change,
                self.delta_amount_floor,
                self.convergence_epsilon,
                self.max_iterations,
                range,
                self.divergence_threshold,
                self.parallel,
            )
        }
    }
}

#[cfg(test)]
mod estimator_options_test {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let options = EstimatorOptions::builder().build().unwrap();
        assert_eq!(options, EstimatorOptions::default());
        assert_eq!(options.solver_mode, SolverMode::Svd);
        assert_eq!(options.max_iterations, 5);
    }

    #[test]
    fn test_builder_setters() {
        let options = EstimatorOptions::builder()
            .solver_mode(SolverMode::DirectInverse)
            .percent_change(1e-4)
            .delta_amount_floor(1e-9)
            .convergence_epsilon(1e-8)
            .max_iterations(25)
            .observation_range(2..10)
            .divergence_threshold(1e6)
            .parallel(false)
            .build()
            .unwrap();

        assert_eq!(options.solver_mode, SolverMode::DirectInverse);
        assert_eq!(options.observation_range, Some(2..10));
        assert_eq!(options.max_iterations, 25);
        assert!(!options.parallel);
    }

    #[test]
    fn test_builder_rejects_invalid() {
        let cases = [
            EstimatorOptions::builder().percent_change(0.0),
            EstimatorOptions::builder().percent_change(f64::NAN),
            EstimatorOptions::builder().delta_amount_floor(-1e-7),
            EstimatorOptions::builder().convergence_epsilon(-1.0),
            EstimatorOptions::builder().divergence_threshold(0.0),
            EstimatorOptions::builder().max_iterations(0),
            EstimatorOptions::builder().observation_range(4..4),
        ];
        for builder in cases {
            assert!(matches!(
                builder.build(),
                Err(OdError::InvalidEstimatorParameter(_))
            ));
        }
    }

    #[test]
    fn test_display() {
        let options = EstimatorOptions::default();
        let compact = format!("{options}");
        assert!(compact.starts_with("EstimatorOptions(solver=svd"));
        assert!(compact.contains("obs=all"));

        let pretty = format!("{options:#}");
        assert!(pretty.contains("[Iteration control]"));
        assert!(pretty.contains("max_iterations       = 5"));
    }
}
