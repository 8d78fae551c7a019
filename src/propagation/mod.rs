//! # Propagation collaborator
//!
//! The estimator never integrates orbits itself: it asks a [`Propagator`] to move a
//! [`NativeState`] from the estimation epoch to each observation epoch. A propagator
//! declares the element set it consumes through [`Propagator::native_form`], and the
//! [`StateParameterization`](crate::parameterization::StateParameterization) converts the
//! fit vector into that form before every call.
//!
//! Propagators are shared across the rayon workers that build the Jacobian, hence the
//! `Send + Sync` bound. Implementations must be pure functions of their arguments.
//!
//! [`TwoBodyPropagator`] is the analytic Keplerian reference implementation.

use crate::{
    constants::{EarthModel, Seconds},
    kepler::principal_angle,
    od_errors::OdError,
    orbit_type::{ElementSet, NativeState, OrbitalElements},
    time::JulianDate,
};

/// State propagation seam of the estimator.
pub trait Propagator: Send + Sync {
    /// Element set expected by [`Propagator::propagate`].
    fn native_form(&self) -> ElementSet;

    /// Propagate `state`, defined at `epoch`, by `dt` seconds.
    ///
    /// Arguments
    /// ---------
    /// * `state`: native state at `epoch`.
    /// * `epoch`: reference epoch of `state`.
    /// * `dt`: signed time offset in seconds.
    ///
    /// Return
    /// ------
    /// * The propagated state, in any element set (the estimator only reads its Cartesian
    ///   position and velocity, and the drag scale for state-vector observations).
    fn propagate(
        &self,
        state: &NativeState,
        epoch: &JulianDate,
        dt: Seconds,
    ) -> Result<NativeState, OdError>;
}

/// Unperturbed two-body motion: the mean anomaly advances by `n·dt`.
///
/// The drag scale is carried through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TwoBodyPropagator {
    pub earth: EarthModel,
}

impl TwoBodyPropagator {
    pub fn new(earth: EarthModel) -> Self {
        TwoBodyPropagator { earth }
    }
}

impl Propagator for TwoBodyPropagator {
    fn native_form(&self) -> ElementSet {
        ElementSet::Keplerian
    }

    fn propagate(
        &self,
        state: &NativeState,
        _epoch: &JulianDate,
        dt: Seconds,
    ) -> Result<NativeState, OdError> {
        let mut kepler = state.elements.to_keplerian(self.earth.mu)?;
        kepler.mean_anomaly = principal_angle(
            kepler.mean_anomaly + self.earth.mean_motion(kepler.semi_major_axis) * dt,
        );
        Ok(NativeState::new(
            OrbitalElements::Keplerian(kepler),
            state.drag_scale,
        ))
    }
}
