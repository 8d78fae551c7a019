//! # Observation models
//!
//! One [`ObservationModel`] per measurement type. A model knows how many scalar components
//! its measurement has, which of them are angles, how to predict them from a propagated
//! state through the [`Geometry`] collaborator, and how to weight them from a
//! [`SensorProfile`].
//!
//! Residuals are `observed − predicted`. Angular residuals larger than π in magnitude are
//! brought back with a single ±2π correction, so an azimuth of 359.99° against a
//! prediction of 0.01° gives −0.02°, not 359.98°.

use smallvec::{smallvec, SmallVec};

use crate::{
    geometry::Geometry,
    kepler::wrap_angle_difference,
    observations::{Measurement, ObservationKind},
    observers::{sensors::SensorProfile, Site},
    orbit_type::cartesian_element::CartesianState,
};

/// Scalar components of one observation (at most 7).
pub type Components = SmallVec<[f64; 7]>;

/// Predict/residual/weight behaviour of one measurement type.
pub trait ObservationModel: Send + Sync {
    fn kind(&self) -> ObservationKind;

    fn component_count(&self) -> usize;

    /// `true` for every component that is an angle in radians.
    fn angular_components(&self) -> &'static [bool];

    /// Measured components of `measurement` (empty if it is of another kind).
    fn measured(&self, measurement: &Measurement) -> Components;

    /// Predicted components for a propagated state.
    ///
    /// Arguments
    /// ---------
    /// * `state`: propagated position/velocity at the observation epoch.
    /// * `drag_scale`: propagated drag scale, if any.
    /// * `site`: tracking site of the observation.
    /// * `geometry`: topocentric geometry collaborator.
    ///
    /// Return
    /// ------
    /// * `None` if the model needs a site and `site` is `None`.
    fn predict(
        &self,
        state: &CartesianState,
        drag_scale: Option<f64>,
        site: Option<&Site>,
        geometry: &dyn Geometry,
    ) -> Option<Components>;

    /// Weights `1/σ²` of every component.
    fn weights(&self, profile: &SensorProfile) -> Components;

    /// `observed − predicted`, with angular components wrapped into `[-π, π]`.
    fn residual(&self, observed: &[f64], predicted: &[f64]) -> Components {
        observed
            .iter()
            .zip(predicted)
            .zip(self.angular_components())
            .map(|((obs, pred), &angular)| {
                let diff = obs - pred;
                if angular {
                    wrap_angle_difference(diff)
                } else {
                    diff
                }
            })
            .collect()
    }
}

fn inverse_variance(sigma: f64) -> f64 {
    1.0 / (sigma * sigma)
}

pub struct RangeModel;
pub struct AzElModel;
pub struct RangeAzElModel;
pub struct RaDecModel;

/// Cartesian state observation, with or without the drag scale component.
pub struct StateVectorModel {
    pub with_drag: bool,
}

static RANGE: RangeModel = RangeModel;
static AZ_EL: AzElModel = AzElModel;
static RANGE_AZ_EL: RangeAzElModel = RangeAzElModel;
static RA_DEC: RaDecModel = RaDecModel;
static STATE6: StateVectorModel = StateVectorModel { with_drag: false };
static STATE7: StateVectorModel = StateVectorModel { with_drag: true };

static NOT_ANGULAR: [bool; 7] = [false; 7];

/// Model matching a measurement.
pub fn model_for(measurement: &Measurement) -> &'static dyn ObservationModel {
    match measurement {
        Measurement::Range(_) => &RANGE,
        Measurement::AzEl { .. } => &AZ_EL,
        Measurement::RangeAzEl { .. } => &RANGE_AZ_EL,
        Measurement::RaDec { .. } => &RA_DEC,
        Measurement::StateVector {
            drag_scale: Some(_),
            ..
        } => &STATE7,
        Measurement::StateVector {
            drag_scale: None, ..
        } => &STATE6,
    }
}

impl ObservationModel for RangeModel {
    fn kind(&self) -> ObservationKind {
        ObservationKind::Range
    }

    fn component_count(&self) -> usize {
        1
    }

    fn angular_components(&self) -> &'static [bool] {
        &[false]
    }

    fn measured(&self, measurement: &Measurement) -> Components {
        match measurement {
            Measurement::Range(range) => smallvec![*range],
            _ => Components::new(),
        }
    }

    fn predict(
        &self,
        state: &CartesianState,
        _drag_scale: Option<f64>,
        site: Option<&Site>,
        geometry: &dyn Geometry,
    ) -> Option<Components> {
        let view = geometry.observe(state, site?);
        Some(smallvec![view.range])
    }

    fn weights(&self, profile: &SensorProfile) -> Components {
        smallvec![inverse_variance(profile.range)]
    }
}

impl ObservationModel for AzElModel {
    fn kind(&self) -> ObservationKind {
        ObservationKind::AzEl
    }

    fn component_count(&self) -> usize {
        2
    }

    fn angular_components(&self) -> &'static [bool] {
        &[true, true]
    }

    fn measured(&self, measurement: &Measurement) -> Components {
        match measurement {
            Measurement::AzEl { azimuth, elevation } => smallvec![*azimuth, *elevation],
            _ => Components::new(),
        }
    }

    fn predict(
        &self,
        state: &CartesianState,
        _drag_scale: Option<f64>,
        site: Option<&Site>,
        geometry: &dyn Geometry,
    ) -> Option<Components> {
        let view = geometry.observe(state, site?);
        Some(smallvec![view.azimuth, view.elevation])
    }

    fn weights(&self, profile: &SensorProfile) -> Components {
        smallvec![
            inverse_variance(profile.azimuth),
            inverse_variance(profile.elevation)
        ]
    }
}

impl ObservationModel for RangeAzElModel {
    fn kind(&self) -> ObservationKind {
        ObservationKind::RangeAzEl
    }

    fn component_count(&self) -> usize {
        3
    }

    fn angular_components(&self) -> &'static [bool] {
        &[false, true, true]
    }

    fn measured(&self, measurement: &Measurement) -> Components {
        match measurement {
            Measurement::RangeAzEl {
                range,
                azimuth,
                elevation,
            } => smallvec![*range, *azimuth, *elevation],
            _ => Components::new(),
        }
    }

    fn predict(
        &self,
        state: &CartesianState,
        _drag_scale: Option<f64>,
        site: Option<&Site>,
        geometry: &dyn Geometry,
    ) -> Option<Components> {
        let view = geometry.observe(state, site?);
        Some(smallvec![view.range, view.azimuth, view.elevation])
    }

    fn weights(&self, profile: &SensorProfile) -> Components {
        smallvec![
            inverse_variance(profile.range),
            inverse_variance(profile.azimuth),
            inverse_variance(profile.elevation)
        ]
    }
}

impl ObservationModel for RaDecModel {
    fn kind(&self) -> ObservationKind {
        ObservationKind::RaDec
    }

    fn component_count(&self) -> usize {
        2
    }

    fn angular_components(&self) -> &'static [bool] {
        &[true, true]
    }

    fn measured(&self, measurement: &Measurement) -> Components {
        match measurement {
            Measurement::RaDec {
                right_ascension,
                declination,
            } => smallvec![*right_ascension, *declination],
            _ => Components::new(),
        }
    }

    fn predict(
        &self,
        state: &CartesianState,
        _drag_scale: Option<f64>,
        site: Option<&Site>,
        geometry: &dyn Geometry,
    ) -> Option<Components> {
        let view = geometry.observe(state, site?);
        Some(smallvec![view.right_ascension, view.declination])
    }

    fn weights(&self, profile: &SensorProfile) -> Components {
        smallvec![
            inverse_variance(profile.right_ascension),
            inverse_variance(profile.declination)
        ]
    }
}

impl ObservationModel for StateVectorModel {
    fn kind(&self) -> ObservationKind {
        ObservationKind::StateVector
    }

    fn component_count(&self) -> usize {
        if self.with_drag {
            7
        } else {
            6
        }
    }

    fn angular_components(&self) -> &'static [bool] {
        &NOT_ANGULAR[..self.component_count()]
    }

    fn measured(&self, measurement: &Measurement) -> Components {
        match measurement {
            Measurement::StateVector {
                position,
                velocity,
                drag_scale,
            } => {
                let mut values: Components =
                    position.iter().chain(velocity.iter()).copied().collect();
                if self.with_drag {
                    values.extend(*drag_scale);
                }
                values
            }
            _ => Components::new(),
        }
    }

    fn predict(
        &self,
        state: &CartesianState,
        drag_scale: Option<f64>,
        _site: Option<&Site>,
        _geometry: &dyn Geometry,
    ) -> Option<Components> {
        let mut values: Components = state
            .position
            .iter()
            .chain(state.velocity.iter())
            .copied()
            .collect();
        if self.with_drag {
            values.push(drag_scale.unwrap_or(0.0));
        }
        Some(values)
    }

    fn weights(&self, profile: &SensorProfile) -> Components {
        let mut weights = Components::new();
        weights.extend([inverse_variance(profile.position); 3]);
        weights.extend([inverse_variance(profile.velocity); 3]);
        if self.with_drag {
            weights.push(inverse_variance(profile.drag_scale));
        }
        weights
    }
}

#[cfg(test)]
mod models_test {
    use super::*;
    use crate::{constants::EarthModel, geometry::TopocentricGeometry};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn test_azimuth_residual_wraps() {
        let observed = [359.99_f64.to_radians(), 0.3];
        let predicted = [0.01_f64.to_radians(), 0.3];
        let residual = AZ_EL.residual(&observed, &predicted);

        assert_relative_eq!(residual[0].to_degrees(), -0.02, epsilon = 1e-9);
        assert_eq!(residual[1], 0.0);
    }

    #[test]
    fn test_range_residual_is_not_wrapped() {
        let residual = RANGE_AZ_EL.residual(&[1_000.0, 0.1, 0.2], &[990.0, 0.1, 0.2]);
        assert_relative_eq!(residual[0], 10.0);
    }

    #[test]
    fn test_model_dispatch() {
        let with_drag = Measurement::StateVector {
            position: Vector3::new(1.0, 2.0, 3.0),
            velocity: Vector3::new(4.0, 5.0, 6.0),
            drag_scale: Some(0.7),
        };
        let model = model_for(&with_drag);
        assert_eq!(model.kind(), ObservationKind::StateVector);
        assert_eq!(model.component_count(), 7);
        assert_eq!(
            model.measured(&with_drag).as_slice(),
            &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 0.7]
        );
        assert_eq!(model.angular_components().len(), 7);

        let radec = Measurement::RaDec {
            right_ascension: 1.0,
            declination: 0.5,
        };
        assert_eq!(model_for(&radec).kind(), ObservationKind::RaDec);
        assert!(model_for(&radec).measured(&with_drag).is_empty());
    }

    #[test]
    fn test_predict_needs_site() {
        let geometry = TopocentricGeometry::new(&EarthModel::default());
        let state = CartesianState::new(Vector3::new(7_000.0, 0.0, 0.0), Vector3::zeros());
        assert!(RANGE.predict(&state, None, None, &geometry).is_none());

        let site = Site::new(Vector3::new(6_378.0, 0.0, 0.0), Vector3::zeros());
        let predicted = RANGE.predict(&state, None, Some(&site), &geometry).unwrap();
        assert_relative_eq!(predicted[0], 622.0, epsilon = 1e-9);

        assert!(STATE6.predict(&state, None, None, &geometry).is_some());
    }

    #[test]
    fn test_weights_are_inverse_variances() {
        let profile = SensorProfile {
            range: 0.01,
            ..SensorProfile::default()
        };
        let weights = RANGE_AZ_EL.weights(&profile);
        assert_relative_eq!(weights[0], 1e4, max_relative = 1e-12);
        assert_eq!(weights.len(), 3);
        assert_eq!(STATE7.weights(&profile).len(), 7);
    }
}
