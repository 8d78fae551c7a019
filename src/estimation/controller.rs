//! # Gauss-Newton iteration controller
//!
//! [`BatchLeastSquares`] drives the outer loop of the fit: Jacobian pass, normal equations,
//! linear solve, step limiting, update, then the termination tests.
//!
//! ## Termination
//!
//! * **Converged**: `RMS < ε` and `ΔRMS / RMS_prev < ε`, with the pooled weighted RMS at the
//!   current fit vector and at the previous one. A shrinking RMS always passes the relative
//!   test, so a fit stalled above `ε` never converges.
//! * **Divergence**: the last three RMS samples strictly increase and the latest exceeds
//!   `divergence_threshold`. The first divergence restarts from the initial guess with the
//!   iteration counters cleared and the solver forced to SVD. A second divergence ends the
//!   run with [`TerminalStatus::DivergedRestarted`] and the lowest-RMS state seen.
//! * **Max iterations**: `max_iterations` updates were applied and the RMS at the last
//!   updated vector still fails the convergence test.
//!
//! An SVD failure also consumes the restart; if the restart has already been used it is
//! returned as [`OdError::SvdNoConvergence`].
//!
//! Every pass evaluates and solves at the current fit vector before any termination test, so
//! the returned covariance belongs to the returned vector. The residuals are evaluated once
//! more after termination for [`FitResult::rms_by_kind`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use tracing::{debug, info, warn};

use crate::{
    constants::FitVector,
    estimation::{
        jacobian::JacobianBuilder,
        normal_equations::NormalEquations,
        result::{FitDiagnostics, FitResult, TerminalStatus},
        EstimatorOptions,
    },
    geometry::Geometry,
    linalg::solver::SolverMode,
    observations::Observation,
    observers::sensors::SensorRegistry,
    od_errors::OdError,
    orbit_type::{ElementSet, NativeState},
    parameterization::StateParameterization,
    propagation::Propagator,
    time::JulianDate,
};

/// `(|Δ/x| above, clamp to fraction of |x|)`, checked in order, for element fits.
const ELEMENT_STEP_TIERS: [(f64, f64); 4] =
    [(1000.0, 0.10), (200.0, 0.30), (100.0, 0.70), (10.0, 0.90)];

/// Largest Cartesian correction as a fraction of `|x|`.
const CARTESIAN_STEP_FRACTION: f64 = 0.01;

/// Clamp a Gauss-Newton correction relative to the current fit vector.
///
/// Element fits use a tiered clamp: a component whose `|Δ/x|` exceeds 1000, 200, 100 or 10
/// is limited to 10 %, 30 %, 70 % or 90 % of `|x|`. Cartesian fits limit every component to
/// 1 % of `|x|`. The clamped step keeps the sign of `Δ`, and components with `x = 0` are
/// never clamped.
///
/// Arguments
/// ---------
/// * `set`: element set of the fit vector.
/// * `x`: current fit vector.
/// * `dx`: raw correction from the linear solver.
///
/// Return
/// ------
/// * The correction to add to `x`.
pub fn limit_step(set: ElementSet, x: &FitVector, dx: &DVector<f64>) -> DVector<f64> {
    dx.zip_map(x, |d, xi| {
        if xi == 0.0 {
            return d;
        }
        let ratio = (d / xi).abs();
        let fraction = match set {
            ElementSet::Cartesian => {
                (ratio > CARTESIAN_STEP_FRACTION).then_some(CARTESIAN_STEP_FRACTION)
            }
            ElementSet::Keplerian | ElementSet::Equinoctial => ELEMENT_STEP_TIERS
                .iter()
                .find(|(above, _)| ratio > *above)
                .map(|(_, fraction)| *fraction),
        };
        match fraction {
            Some(fraction) => fraction * xi.abs() * d.signum(),
            None => d,
        }
    })
}

/// `rms < ε` and the RMS has not grown by `ε` or more relative to the previous sample.
fn has_converged(history: &[f64], epsilon: f64) -> bool {
    match history {
        [.., previous, rms] if *rms < epsilon => {
            rms <= previous || rms - previous < epsilon * previous
        }
        _ => false,
    }
}

/// Three strictly increasing samples, the latest above `threshold`.
fn is_diverging(history: &[f64], threshold: f64) -> bool {
    match history {
        [.., a, b, c] => a < b && b < c && *c > threshold,
        _ => false,
    }
}

enum AttemptEnd {
    Converged,
    MaxIterations,
    Diverged,
    SvdFailed(OdError),
}

/// Lowest-RMS state seen, with the covariance of its own solve.
struct BestState {
    x: FitVector,
    rms: f64,
    covariance: DMatrix<f64>,
}

/// Batch weighted least-squares orbit estimator.
///
/// The estimator borrows its collaborators and can be run any number of times; each
/// [`run`](Self::run) is independent.
pub struct BatchLeastSquares<'a, P: Propagator, G: Geometry> {
    propagator: &'a P,
    geometry: &'a G,
    sensors: &'a SensorRegistry,
    options: EstimatorOptions,
    abort: Option<Arc<AtomicBool>>,
}

impl<'a, P: Propagator, G: Geometry> BatchLeastSquares<'a, P, G> {
    pub fn new(
        propagator: &'a P,
        geometry: &'a G,
        sensors: &'a SensorRegistry,
        options: EstimatorOptions,
    ) -> Self {
        BatchLeastSquares {
            propagator,
            geometry,
            sensors,
            options,
            abort: None,
        }
    }

    /// Cooperative cancellation: once `flag` is set the run returns [`OdError::Aborted`]
    /// at the next iteration or observation.
    pub fn with_abort_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort = Some(flag);
        self
    }

    pub fn options(&self) -> &EstimatorOptions {
        &self.options
    }

    fn check_abort(&self) -> Result<(), OdError> {
        match &self.abort {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(OdError::Aborted),
            _ => Ok(()),
        }
    }

    fn select<'o>(
        &self,
        observations: &'o [Observation],
    ) -> Result<(&'o [Observation], usize), OdError> {
        let (batch, offset) = match &self.options.observation_range {
            None => (observations, 0),
            Some(range) => {
                let batch = observations.get(range.clone()).ok_or_else(|| {
                    OdError::InvalidEstimatorParameter(format!(
                        "observation_range {}..{} exceeds a batch of {} observations",
                        range.start,
                        range.end,
                        observations.len()
                    ))
                })?;
                (batch, range.start)
            }
        };
        if batch.is_empty() {
            return Err(OdError::EmptyObservationBatch);
        }
        Ok((batch, offset))
    }

    /// Fit `observations` starting from `initial_guess`.
    ///
    /// Arguments
    /// ---------
    /// * `initial_guess`: a priori state at `epoch`, in any element set.
    /// * `epoch`: estimation epoch.
    /// * `parameterization`: fit element set and drag handling. Its native form is taken
    ///   from the propagator.
    /// * `observations`: the batch, restricted to `observation_range` when one is set.
    ///
    /// Return
    /// ------
    /// * A [`FitResult`] for every terminal status, including divergence after the restart.
    ///
    /// Errors
    /// ------
    /// * [`OdError::EmptyObservationBatch`] if no observation is selected.
    /// * [`OdError::Aborted`] when the abort flag is raised.
    /// * [`OdError::SvdNoConvergence`] if the SVD fails after the restart was used.
    /// * [`OdError::SingularNormalMatrix`] from the direct-inverse solver.
    /// * Per-observation errors ([`OdError::UnknownSensor`], [`OdError::MissingSite`]) and
    ///   propagation or conversion failures.
    pub fn run(
        &self,
        initial_guess: &NativeState,
        epoch: &JulianDate,
        parameterization: &StateParameterization,
        observations: &[Observation],
    ) -> Result<FitResult, OdError> {
        let (batch, offset) = self.select(observations)?;

        let parameterization = StateParameterization {
            native: self.propagator.native_form(),
            ..*parameterization
        };
        let jacobian = JacobianBuilder {
            propagator: self.propagator,
            geometry: self.geometry,
            sensors: self.sensors,
            parameterization: &parameterization,
            options: &self.options,
            abort: self.abort.as_deref(),
        };

        let x0 = parameterization.to_fit(initial_guess)?;
        let n = x0.len();

        let mut diagnostics = FitDiagnostics::default();
        let mut solver_mode = self.options.solver_mode;
        let mut restarts = 0;
        let mut total_iterations = 0;
        let mut rms_history = Vec::new();
        let mut best: Option<BestState> = None;

        let (status, mut x, covariance, iterations) = loop {
            let mut x = x0.clone();
            let mut covariance = DMatrix::zeros(n, n);
            let mut attempt_history: Vec<f64> = Vec::new();
            let mut iterations = 0;

            let end = loop {
                self.check_abort()?;

                let pass = jacobian.build(&mut x, epoch, batch, offset)?;
                diagnostics.degenerate_inputs += pass.degenerate_inputs;
                diagnostics.small_steps += pass.small_steps;

                let normal = NormalEquations::from_blocks(n, &pass.blocks);
                let rms = normal.weighted_rms();
                attempt_history.push(rms);
                rms_history.push(rms);
                debug!(
                    iteration = iterations,
                    restart = restarts,
                    solver = %solver_mode,
                    rms,
                    "Gauss-Newton iteration"
                );

                let solution = match solver_mode.solver().solve(&normal.atwa, &normal.atwb) {
                    Ok(solution) => solution,
                    Err(err @ OdError::SvdNoConvergence { .. }) => {
                        break AttemptEnd::SvdFailed(err)
                    }
                    Err(err) => return Err(err),
                };

                if best.as_ref().map_or(true, |b| rms < b.rms) {
                    best = Some(BestState {
                        x: x.clone(),
                        rms,
                        covariance: solution.inverse.clone(),
                    });
                }
                covariance = solution.inverse;

                if has_converged(&attempt_history, self.options.convergence_epsilon) {
                    break AttemptEnd::Converged;
                }
                if is_diverging(&attempt_history, self.options.divergence_threshold) {
                    break AttemptEnd::Diverged;
                }
                if iterations == self.options.max_iterations {
                    break AttemptEnd::MaxIterations;
                }

                let step = limit_step(parameterization.fit, &x, &solution.correction);
                x += step;
                iterations += 1;
                total_iterations += 1;
            };

            match end {
                AttemptEnd::Converged => {
                    break (TerminalStatus::Converged, x, covariance, iterations)
                }
                AttemptEnd::MaxIterations => {
                    break (TerminalStatus::MaxIterStopped, x, covariance, iterations)
                }
                AttemptEnd::SvdFailed(err) => {
                    diagnostics.svd_failures += 1;
                    if restarts > 0 {
                        warn!("SVD failed after the restart: {err}");
                        return Err(err);
                    }
                    warn!("SVD failed at iteration {iterations}, restarting: {err}");
                }
                AttemptEnd::Diverged => {
                    if restarts > 0 {
                        warn!(
                            "Diverged again at iteration {iterations}, keeping the lowest-RMS state"
                        );
                        let (x, covariance) = match best.take() {
                            Some(b) => (b.x, b.covariance),
                            None => (x, covariance),
                        };
                        break (TerminalStatus::DivergedRestarted, x, covariance, iterations);
                    }
                    warn!(
                        "Divergence at iteration {iterations} (RMS {:.3e}), restarting with SVD",
                        attempt_history.last().copied().unwrap_or_default()
                    );
                }
            }

            restarts += 1;
            solver_mode = SolverMode::Svd;
        };

        let evaluation = jacobian.evaluate(&mut x, epoch, batch, offset)?;
        diagnostics.degenerate_inputs += evaluation.degenerate_inputs;
        let normal = NormalEquations::from_blocks(n, &evaluation.blocks);
        let (native_state, _) = parameterization.to_native(&mut x)?;

        let result = FitResult {
            epoch: *epoch,
            fit_set: parameterization.fit,
            fit_vector: x,
            native_state,
            covariance,
            status,
            iterations,
            total_iterations,
            restarts,
            rms: normal.weighted_rms(),
            rms_by_kind: normal.rms_by_kind(),
            rms_history,
            diagnostics,
        };
        info!(
            status = %result.status,
            iterations = result.total_iterations,
            restarts = result.restarts,
            rms = result.rms,
            "Batch least-squares fit finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod controller_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_limit_step_element_tiers() {
        let x = DVector::from_row_slice(&[1.0, 1.0, 1.0, 1.0, 1.0, -2.0]);
        let dx = DVector::from_row_slice(&[5.0, -20.0, 150.0, -500.0, 2000.0, 30.0]);
        let step = limit_step(ElementSet::Keplerian, &x, &dx);

        assert_eq!(step[0], 5.0);
        assert_relative_eq!(step[1], -0.9);
        assert_relative_eq!(step[2], 0.7);
        assert_relative_eq!(step[3], -0.3);
        assert_relative_eq!(step[4], 0.1);
        // |Δ/x| = 15 on a negative component: 0.9·|x| with the sign of Δ
        assert_relative_eq!(step[5], 1.8);
    }

    #[test]
    fn test_limit_step_cartesian() {
        let x = DVector::from_row_slice(&[7000.0, 0.0, -100.0, 7.5, 0.0, 0.0]);
        let dx = DVector::from_row_slice(&[50.0, 3.0, 0.5, -1.0, 0.0, -0.2]);
        let step = limit_step(ElementSet::Cartesian, &x, &dx);

        assert_eq!(step[0], 50.0);
        // zero components are never clamped
        assert_eq!(step[1], 3.0);
        assert_relative_eq!(step[2], 0.5);
        assert_relative_eq!(step[3], -0.075);
        assert_eq!(step[5], -0.2);
    }

    #[test]
    fn test_convergence_test() {
        assert!(!has_converged(&[], 1e-6));
        // a single sample has nothing to compare with
        assert!(!has_converged(&[1e-7], 1e-6));
        assert!(has_converged(&[14257.0, 1.59e-5, 5.57e-8], 1e-6));
        assert!(has_converged(&[1e-7, 1e-7], 1e-6));
        assert!(has_converged(&[0.0, 0.0], 1e-6));
        // stalled above ε
        assert!(!has_converged(&[10.0, 1.0, 1.0 + 1e-8], 1e-6));
        assert!(!has_converged(&[4.08e4, 4.08e4], 1e-6));
        // below ε but growing
        assert!(!has_converged(&[1e-8, 5e-7], 1e-6));
        assert!(!has_converged(&[0.0, 1e-7], 1e-6));
    }

    #[test]
    fn test_divergence_test() {
        assert!(!is_diverging(&[1e6, 2e6], 5e5));
        assert!(is_diverging(&[1e6, 2e6, 3e6], 5e5));
        assert!(is_diverging(&[1.0, 1e6, 2e6, 3e6], 5e5));
        // not strictly increasing
        assert!(!is_diverging(&[1e6, 1e6, 3e6], 5e5));
        // below the threshold
        assert!(!is_diverging(&[1.0, 2.0, 3.0], 5e5));
    }
}
