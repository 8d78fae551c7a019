//! # Finite-difference Jacobian
//!
//! For a fit vector `x` the builder produces one [`ObservationBlock`] per observation: the
//! measured-minus-predicted residuals, the weights, and the sensitivity rows
//! `∂predicted/∂x` (one row per scalar component, one column per fit component).
//!
//! ## Step selection
//!
//! For every fit component `j`, `δ = x[j]·percent_change`. While `|δ|` is below
//! `delta_amount_floor` the relative step is grown ×1.4, at most five times; if it is still
//! too small the floor itself is used (signed like `x[j]`) and a `JacobianStepTooSmall`
//! warning is counted. The perturbed copy goes through
//! [`StateParameterization::to_native`], and the step actually left in the copy after any
//! degenerate-input repair is the one the difference quotient divides by.
//!
//! The perturbed native states depend only on `x`, so they are derived once per call and
//! shared by all observations. Angular differences are wrapped before dividing.
//!
//! ## Parallelism
//!
//! With `parallel` set, observations are processed on the rayon pool. Blocks are collected
//! in batch order, so the accumulated normal equations do not depend on scheduling.

use std::sync::atomic::{AtomicBool, Ordering};

use nalgebra::DMatrix;
use rayon::prelude::*;
use tracing::warn;

use crate::{
    constants::FitVector,
    estimation::EstimatorOptions,
    geometry::Geometry,
    kepler::wrap_angle_difference,
    observations::{models::Components, Observation, ObservationKind},
    observers::sensors::SensorRegistry,
    od_errors::OdError,
    orbit_type::NativeState,
    parameterization::StateParameterization,
    propagation::Propagator,
    time::JulianDate,
};

/// Growth factor applied to the relative step while it is below the floor.
const STEP_GROWTH: f64 = 1.4;

/// Number of growth attempts before falling back to the floor.
const STEP_GROWTH_ATTEMPTS: usize = 5;

/// Residuals, weights and sensitivity rows of one observation.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationBlock {
    pub kind: ObservationKind,
    /// `component_count × n` sensitivity rows (no column for a residual-only evaluation).
    pub rows: DMatrix<f64>,
    pub residuals: Components,
    pub weights: Components,
}

/// Output of one Jacobian pass.
#[derive(Debug, Clone, PartialEq)]
pub struct JacobianPass {
    pub blocks: Vec<ObservationBlock>,
    /// Degenerate-input repairs applied while converting the nominal and perturbed vectors.
    pub degenerate_inputs: usize,
    /// Fit components whose step fell back to the floor.
    pub small_steps: usize,
}

/// Finite-difference step for a component value.
///
/// Return
/// ------
/// * `(δ, fell_back_to_floor)`.
pub fn finite_difference_step(value: f64, percent_change: f64, floor: f64) -> (f64, bool) {
    let mut relative = percent_change;
    let mut delta = value * relative;
    let mut attempts = 0;
    while delta.abs() < floor && attempts < STEP_GROWTH_ATTEMPTS {
        relative *= STEP_GROWTH;
        delta = value * relative;
        attempts += 1;
    }
    if delta.abs() < floor {
        let signed = if value < 0.0 { -floor } else { floor };
        (signed, true)
    } else {
        (delta, false)
    }
}

/// Builds observation blocks around a fit vector.
pub struct JacobianBuilder<'a, P: Propagator, G: Geometry> {
    pub propagator: &'a P,
    pub geometry: &'a G,
    pub sensors: &'a SensorRegistry,
    pub parameterization: &'a StateParameterization,
    pub options: &'a EstimatorOptions,
    pub abort: Option<&'a AtomicBool>,
}

impl<P: Propagator, G: Geometry> JacobianBuilder<'_, P, G> {
    fn check_abort(&self) -> Result<(), OdError> {
        match self.abort {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(OdError::Aborted),
            _ => Ok(()),
        }
    }

    /// Residuals, weights and sensitivity rows of every observation at `x`.
    ///
    /// Arguments
    /// ---------
    /// * `x`: current fit vector; degenerate components are repaired in place.
    /// * `epoch`: epoch of the fit vector.
    /// * `observations`: the batch slice being fitted.
    /// * `offset`: index of `observations[0]` in the caller's full batch (for errors).
    pub fn build(
        &self,
        x: &mut FitVector,
        epoch: &JulianDate,
        observations: &[Observation],
        offset: usize,
    ) -> Result<JacobianPass, OdError> {
        let (nominal, mut degenerate_inputs) = self.parameterization.to_native(x)?;

        let mut small_steps = 0;
        let mut perturbations = Vec::with_capacity(x.len());
        for j in 0..x.len() {
            let (delta, fell_back) = finite_difference_step(
                x[j],
                self.options.percent_change,
                self.options.delta_amount_floor,
            );
            if fell_back {
                warn!(
                    "JacobianStepTooSmall: component {j} = {:e}, using the floor step {delta:e}",
                    x[j]
                );
                small_steps += 1;
            }

            let mut perturbed = x.clone();
            perturbed[j] += delta;
            let (native, repaired) = self.parameterization.to_native(&mut perturbed)?;
            degenerate_inputs += repaired;

            let applied = perturbed[j] - x[j];
            if applied == 0.0 {
                warn!("JacobianStepTooSmall: component {j} step cancelled by input repair");
                small_steps += 1;
            }
            perturbations.push((native, applied));
        }

        let blocks = self.blocks(&nominal, &perturbations, epoch, observations, offset)?;
        Ok(JacobianPass {
            blocks,
            degenerate_inputs,
            small_steps,
        })
    }

    /// Residuals and weights at `x`, without sensitivity rows.
    pub fn evaluate(
        &self,
        x: &mut FitVector,
        epoch: &JulianDate,
        observations: &[Observation],
        offset: usize,
    ) -> Result<JacobianPass, OdError> {
        let (nominal, degenerate_inputs) = self.parameterization.to_native(x)?;
        let blocks = self.blocks(&nominal, &[], epoch, observations, offset)?;
        Ok(JacobianPass {
            blocks,
            degenerate_inputs,
            small_steps: 0,
        })
    }

    fn blocks(
        &self,
        nominal: &NativeState,
        perturbations: &[(NativeState, f64)],
        epoch: &JulianDate,
        observations: &[Observation],
        offset: usize,
    ) -> Result<Vec<ObservationBlock>, OdError> {
        let block_of = |(i, obs): (usize, &Observation)| {
            self.observation_block(offset + i, obs, nominal, perturbations, epoch)
        };

        if self.options.parallel {
            observations.par_iter().enumerate().map(block_of).collect()
        } else {
            observations.iter().enumerate().map(block_of).collect()
        }
    }

    fn observation_block(
        &self,
        index: usize,
        obs: &Observation,
        nominal: &NativeState,
        perturbations: &[(NativeState, f64)],
        epoch: &JulianDate,
    ) -> Result<ObservationBlock, OdError> {
        self.check_abort()?;

        let model = obs.measurement.model();
        let profile = self.sensors.profile(obs.sensor_id)?;
        let dt = obs.epoch.seconds_since(epoch);
        let mu = self.parameterization.earth.mu;

        let predict = |state: &NativeState| -> Result<Components, OdError> {
            let propagated = self.propagator.propagate(state, epoch, dt)?;
            let cartesian = propagated.cartesian(mu)?;
            model
                .predict(
                    &cartesian,
                    propagated.drag_scale,
                    obs.site.as_ref(),
                    self.geometry,
                )
                .ok_or(OdError::MissingSite(index))
        };

        let predicted = predict(nominal)?;
        let measured = model.measured(&obs.measurement);
        if measured.len() != predicted.len() {
            return Err(OdError::DimensionMismatch {
                expected: predicted.len(),
                actual: measured.len(),
            });
        }
        let residuals = model.residual(&measured, &predicted);
        let angular = model.angular_components();

        let mut rows = DMatrix::zeros(predicted.len(), perturbations.len());
        for (j, (state, delta)) in perturbations.iter().enumerate() {
            if *delta == 0.0 {
                continue;
            }
            let shifted = predict(state)?;
            for (c, (&after, &before)) in shifted.iter().zip(predicted.iter()).enumerate() {
                let diff = if angular[c] {
                    wrap_angle_difference(after - before)
                } else {
                    after - before
                };
                rows[(c, j)] = diff / delta;
            }
        }

        Ok(ObservationBlock {
            kind: model.kind(),
            rows,
            residuals,
            weights: model.weights(profile),
        })
    }
}
