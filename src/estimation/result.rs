//! # Fit results
//!
//! [`FitResult`] is what [`BatchLeastSquares::run`](crate::estimation::controller::BatchLeastSquares::run)
//! hands back: the final fit vector and its native-form state, the covariance approximation,
//! the residual statistics and the iteration bookkeeping. [`FinalStateRecord`] is its
//! serializable summary.

use std::collections::BTreeMap;
use std::fmt;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::{
    constants::FitVector,
    observations::ObservationKind,
    orbit_type::{ElementSet, NativeState},
    time::JulianDate,
};

/// Why the iteration stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalStatus {
    /// `RMS < ε` and `ΔRMS / RMS_prev < ε`.
    Converged,
    /// Diverged again after the restart; the lowest-RMS state seen is returned.
    DivergedRestarted,
    /// Hit `max_iterations` without meeting the convergence test.
    MaxIterStopped,
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalStatus::Converged => f.pad("converged"),
            TerminalStatus::DivergedRestarted => f.pad("diverged after restart"),
            TerminalStatus::MaxIterStopped => f.pad("stopped at max iterations"),
        }
    }
}

/// Warning counters collected over the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FitDiagnostics {
    /// Degenerate fit components replaced before conversion.
    pub degenerate_inputs: usize,
    /// Finite-difference steps that fell back to the floor.
    pub small_steps: usize,
    /// SVD failures that triggered a restart.
    pub svd_failures: usize,
}

/// Outcome of a batch fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub epoch: JulianDate,
    pub fit_set: ElementSet,
    pub fit_vector: FitVector,
    /// `fit_vector` in the propagator's native element set.
    pub native_state: NativeState,
    /// Inverse normal matrix of the solve at `fit_vector`.
    pub covariance: DMatrix<f64>,
    pub status: TerminalStatus,
    /// Gauss-Newton updates applied in the final attempt.
    pub iterations: usize,
    /// Updates over all attempts.
    pub total_iterations: usize,
    pub restarts: usize,
    /// Pooled weighted RMS of the residuals at `fit_vector`.
    pub rms: f64,
    pub rms_by_kind: BTreeMap<ObservationKind, f64>,
    /// Pooled RMS of every evaluated fit vector, restarts included. Each attempt holds one
    /// more sample than its update count.
    pub rms_history: Vec<f64>,
    pub diagnostics: FitDiagnostics,
}

impl FitResult {
    /// One-sigma uncertainties, `sqrt(diag(covariance))`.
    pub fn sigmas(&self) -> DVector<f64> {
        self.covariance.diagonal().map(|v| v.max(0.0).sqrt())
    }

    pub fn is_converged(&self) -> bool {
        self.status == TerminalStatus::Converged
    }

    pub fn record(&self) -> FinalStateRecord {
        FinalStateRecord {
            epoch: self.epoch,
            element_set: self.fit_set,
            components: self.fit_vector.clone(),
            covariance: self.covariance.clone(),
            status: self.status,
            iterations: self.total_iterations,
            restarts: self.restarts,
            rms: self.rms,
            rms_by_kind: self.rms_by_kind.clone(),
        }
    }
}

/// Serializable summary of a fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalStateRecord {
    pub epoch: JulianDate,
    pub element_set: ElementSet,
    pub components: DVector<f64>,
    pub covariance: DMatrix<f64>,
    pub status: TerminalStatus,
    pub iterations: usize,
    pub restarts: usize,
    pub rms: f64,
    pub rms_by_kind: BTreeMap<ObservationKind, f64>,
}

impl fmt::Display for FitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sigmas = self.sigmas();

        writeln!(f, "Batch least-squares fit ({})", self.status)?;
        writeln!(f, "-------------------------------")?;
        writeln!(
            f,
            "  epoch (MJD)   = {:.8}\n  element set   = {}",
            self.epoch.to_mjd(),
            self.fit_set
        )?;
        writeln!(
            f,
            "  iterations    = {} ({} total, {} restart(s))",
            self.iterations, self.total_iterations, self.restarts
        )?;
        writeln!(f, "  weighted RMS  = {:.6e}", self.rms)?;
        for (kind, rms) in &self.rms_by_kind {
            writeln!(f, "    {kind:<14}= {rms:.6e}")?;
        }
        writeln!(f, "  components (value ± 1σ):")?;
        for (i, (value, sigma)) in self.fit_vector.iter().zip(sigmas.iter()).enumerate() {
            writeln!(f, "    [{i}] {value:>20.12e} ± {sigma:.3e}")?;
        }
        if self.diagnostics != FitDiagnostics::default() {
            write!(
                f,
                "  warnings: {} degenerate input(s), {} small step(s), {} SVD failure(s)",
                self.diagnostics.degenerate_inputs,
                self.diagnostics.small_steps,
                self.diagnostics.svd_failures
            )?;
        }
        Ok(())
    }
}
