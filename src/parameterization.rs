//! # Fit-space parameterization
//!
//! A [`StateParameterization`] links the vector the estimator adjusts (the **fit space**) to
//! the state a [`Propagator`](crate::propagation::Propagator) consumes (the **native form**).
//!
//! ## Component layout
//!
//! | set           | 0 | 1  | 2  | 3  | 4  | 5 | 6 (optional) |
//! |---------------|---|----|----|----|----|---|--------------|
//! | `Cartesian`   | x | y  | z  | ẋ  | ẏ  | ż | drag scale   |
//! | `Keplerian`   | a | e  | i  | Ω  | ω  | M | drag scale   |
//! | `Equinoctial` | a | af | ag | χ  | ψ  | L | drag scale   |
//!
//! Lengths are in km, velocities in km/s and angles in radians.
//!
//! ## Degenerate inputs
//!
//! Gauss-Newton corrections may push a trial vector outside the physical domain. Before
//! converting, [`StateParameterization::to_native`] repairs the vector in place:
//!
//! * semi-major axis below one Earth radius → 1.01 Earth radii,
//! * mean motion below `1e-5 rad/s` → semi-major axis damped by ×0.9,
//! * eccentricity ≥ 1 → scaled back to 0.9, negative Keplerian eccentricity → `|e|`,
//! * Cartesian position inside the Earth → pushed out radially to 1.01 Earth radii,
//!   unbound or sub-surface Cartesian velocities rescaled to a bound orbit.
//!
//! Each repair is logged with `tracing::warn!` and counted; none of them is an error.

use nalgebra::Vector3;
use tracing::warn;

use crate::{
    constants::{EarthModel, FitVector},
    od_errors::OdError,
    orbit_type::{
        cartesian_element::CartesianState, equinoctial_element::EquinoctialElements,
        keplerian_element::KeplerianElements, ElementSet, NativeState, OrbitalElements,
    },
};

/// Lowest mean motion (rad/s) accepted before the semi-major axis is damped.
const MIN_MEAN_MOTION: f64 = 1e-5;

/// Eccentricity substituted for unbound trial vectors.
const ECCENTRICITY_FALLBACK: f64 = 0.9;

/// Fraction of the escape speed kept when a Cartesian trial state is unbound.
const ESCAPE_SPEED_FRACTION: f64 = 0.99;

/// Mapping between the fit vector and the propagator's native state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateParameterization {
    /// Element set of the fit vector.
    pub fit: ElementSet,
    /// Element set consumed by the propagator.
    pub native: ElementSet,
    /// Whether the drag scale is the 7th fit component.
    pub fit_drag: bool,
    /// Drag scale handed to the propagator when it is not fitted.
    pub fixed_drag: Option<f64>,
    pub earth: EarthModel,
}

impl StateParameterization {
    pub fn new(fit: ElementSet, native: ElementSet, earth: EarthModel) -> Self {
        StateParameterization {
            fit,
            native,
            fit_drag: false,
            fixed_drag: None,
            earth,
        }
    }

    /// Fit the drag scale as a 7th component.
    pub fn with_fitted_drag(mut self) -> Self {
        self.fit_drag = true;
        self
    }

    /// Pass a constant drag scale to the propagator without fitting it.
    pub fn with_fixed_drag(mut self, drag_scale: f64) -> Self {
        self.fixed_drag = Some(drag_scale);
        self
    }

    /// Number of fit components (6, or 7 with a fitted drag scale).
    pub fn dimension(&self) -> usize {
        if self.fit_drag {
            7
        } else {
            6
        }
    }

    /// Convert a fit vector to the native state, repairing degenerate components in place.
    ///
    /// Arguments
    /// ---------
    /// * `x`: fit vector in the `fit` element set. Any substituted component is written back.
    ///
    /// Return
    /// ------
    /// * The native state and the number of substitutions applied.
    ///
    /// Errors
    /// ------
    /// * [`OdError::DimensionMismatch`] if `x` does not have [`Self::dimension`] components.
    /// * Conversion errors from the element sets (unbound orbit, Kepler solver failure).
    pub fn to_native(&self, x: &mut FitVector) -> Result<(NativeState, usize), OdError> {
        if x.len() != self.dimension() {
            return Err(OdError::DimensionMismatch {
                expected: self.dimension(),
                actual: x.len(),
            });
        }

        let degenerate = match self.fit {
            ElementSet::Cartesian => self.repair_cartesian(x),
            ElementSet::Keplerian => self.repair_keplerian(x),
            ElementSet::Equinoctial => self.repair_equinoctial(x),
        };

        let elements = unpack(self.fit, x.as_slice());
        let drag_scale = if self.fit_drag {
            Some(x[6])
        } else {
            self.fixed_drag
        };

        let native = elements.convert(self.native, self.earth.mu)?;
        Ok((NativeState::new(native, drag_scale), degenerate))
    }

    /// Fit vector of a native state, used to seed the estimator from an initial guess.
    ///
    /// When the drag scale is fitted but the state carries none, the fixed drag scale (or 0)
    /// seeds the 7th component.
    pub fn to_fit(&self, native: &NativeState) -> Result<FitVector, OdError> {
        let elements = native.elements.convert(self.fit, self.earth.mu)?;
        let mut x = FitVector::zeros(self.dimension());
        x.rows_mut(0, 6).copy_from_slice(&pack(&elements));
        if self.fit_drag {
            x[6] = native.drag_scale.or(self.fixed_drag).unwrap_or(0.0);
        }
        Ok(x)
    }

    /// Semi-major axis and mean motion guards shared by the element fits.
    fn repair_semi_major_axis(&self, x: &mut FitVector) -> usize {
        let mut count = 0;
        let floor = self.earth.equatorial_radius;
        if x[0] < floor {
            warn!(
                "InputDegenerate: semi-major axis {:.3} km below one Earth radius, using {:.3} km",
                x[0],
                1.01 * floor
            );
            x[0] = 1.01 * floor;
            count += 1;
        }
        if self.earth.mean_motion(x[0]) < MIN_MEAN_MOTION {
            warn!(
                "InputDegenerate: mean motion below {MIN_MEAN_MOTION:e} rad/s at a = {:.3} km, damping semi-major axis",
                x[0]
            );
            x[0] *= 0.9;
            count += 1;
        }
        count
    }

    fn repair_keplerian(&self, x: &mut FitVector) -> usize {
        let mut count = self.repair_semi_major_axis(x);
        if x[1] < 0.0 {
            warn!("InputDegenerate: negative eccentricity {:.6}, using |e|", x[1]);
            x[1] = x[1].abs();
            count += 1;
        }
        if x[1] >= 1.0 {
            warn!(
                "InputDegenerate: eccentricity {:.6} is unbound, using {ECCENTRICITY_FALLBACK}",
                x[1]
            );
            x[1] = ECCENTRICITY_FALLBACK;
            count += 1;
        }
        count
    }

    fn repair_equinoctial(&self, x: &mut FitVector) -> usize {
        let mut count = self.repair_semi_major_axis(x);
        let ecc = x[1].hypot(x[2]);
        if ecc >= 1.0 {
            warn!(
                "InputDegenerate: eccentricity {ecc:.6} is unbound, scaling (af, ag) to {ECCENTRICITY_FALLBACK}"
            );
            let scale = ECCENTRICITY_FALLBACK / ecc;
            x[1] *= scale;
            x[2] *= scale;
            count += 1;
        }
        count
    }

    fn repair_cartesian(&self, x: &mut FitVector) -> usize {
        let mu = self.earth.mu;
        let floor = self.earth.equatorial_radius;
        let mut count = 0;

        let mut position = Vector3::new(x[0], x[1], x[2]);
        let mut velocity = Vector3::new(x[3], x[4], x[5]);

        let radius = position.norm();
        if radius < floor {
            warn!(
                "InputDegenerate: position radius {radius:.3} km is inside the Earth, pushing out to {:.3} km",
                1.01 * floor
            );
            position = if radius > 0.0 {
                position * (1.01 * floor / radius)
            } else {
                Vector3::new(1.01 * floor, 0.0, 0.0)
            };
            count += 1;
        }

        let radius = position.norm();
        let speed = velocity.norm();
        let state = CartesianState::new(position, velocity);
        let sma = state.semi_major_axis(mu);

        // Bound states always satisfy r <= 2a, so the target speed below is real
        let target_speed = if sma <= 0.0 || !sma.is_finite() {
            warn!(
                "InputDegenerate: unbound Cartesian state (a = {sma:.3} km), keeping {ESCAPE_SPEED_FRACTION} of escape speed"
            );
            Some(ESCAPE_SPEED_FRACTION * (2.0 * mu / radius).sqrt())
        } else if sma < floor {
            warn!(
                "InputDegenerate: semi-major axis {sma:.3} km below one Earth radius, using {:.3} km",
                1.01 * floor
            );
            Some((mu * (2.0 / radius - 1.0 / (1.01 * floor))).sqrt())
        } else {
            None
        };

        if let Some(target) = target_speed {
            velocity = if speed > 0.0 {
                velocity * (target / speed)
            } else {
                // Radial fallback is degenerate in angular momentum but still bound
                position.normalize() * target
            };
            count += 1;
        }

        if count > 0 {
            x.rows_mut(0, 3).copy_from(&position);
            x.rows_mut(3, 3).copy_from(&velocity);
        }
        count
    }
}

fn pack(elements: &OrbitalElements) -> [f64; 6] {
    match elements {
        OrbitalElements::Cartesian(c) => [
            c.position.x,
            c.position.y,
            c.position.z,
            c.velocity.x,
            c.velocity.y,
            c.velocity.z,
        ],
        OrbitalElements::Keplerian(k) => [
            k.semi_major_axis,
            k.eccentricity,
            k.inclination,
            k.ascending_node_longitude,
            k.periapsis_argument,
            k.mean_anomaly,
        ],
        OrbitalElements::Equinoctial(e) => [
            e.semi_major_axis,
            e.eccentricity_cos_lon,
            e.eccentricity_sin_lon,
            e.tan_half_incl_sin_node,
            e.tan_half_incl_cos_node,
            e.mean_longitude,
        ],
    }
}

fn unpack(set: ElementSet, x: &[f64]) -> OrbitalElements {
    match set {
        ElementSet::Cartesian => OrbitalElements::Cartesian(CartesianState::new(
            Vector3::new(x[0], x[1], x[2]),
            Vector3::new(x[3], x[4], x[5]),
        )),
        ElementSet::Keplerian => OrbitalElements::Keplerian(KeplerianElements {
            semi_major_axis: x[0],
            eccentricity: x[1],
            inclination: x[2],
            ascending_node_longitude: x[3],
            periapsis_argument: x[4],
            mean_anomaly: x[5],
        }),
        ElementSet::Equinoctial => OrbitalElements::Equinoctial(EquinoctialElements {
            semi_major_axis: x[0],
            eccentricity_cos_lon: x[1],
            eccentricity_sin_lon: x[2],
            tan_half_incl_sin_node: x[3],
            tan_half_incl_cos_node: x[4],
            mean_longitude: x[5],
        }),
    }
}

#[cfg(test)]
mod parameterization_test {
    use super::*;
    use crate::constants::EARTH_RADIUS;
    use crate::orbit_type::keplerian_element::test_keplerian_element::leo_elements;
    use approx::assert_relative_eq;

    fn leo_native() -> NativeState {
        NativeState::new(OrbitalElements::Keplerian(leo_elements()), None)
    }

    #[test]
    fn test_round_trip_every_fit_set() {
        let native = leo_native();
        let reference = native.cartesian(EarthModel::default().mu).unwrap();

        for fit in [
            ElementSet::Cartesian,
            ElementSet::Keplerian,
            ElementSet::Equinoctial,
        ] {
            let param =
                StateParameterization::new(fit, ElementSet::Keplerian, EarthModel::default());
            let mut x = param.to_fit(&native).unwrap();
            let seeded = x.clone();
            let (back, degenerate) = param.to_native(&mut x).unwrap();

            assert_eq!(degenerate, 0, "fit set {fit}");
            assert_eq!(x, seeded);
            let state = back.cartesian(param.earth.mu).unwrap();
            assert_relative_eq!(state.position, reference.position, epsilon = 1e-6);
            assert_relative_eq!(state.velocity, reference.velocity, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_fit_space_round_trip_every_native_form() {
        let sets = [
            ElementSet::Cartesian,
            ElementSet::Keplerian,
            ElementSet::Equinoctial,
        ];
        let seed = NativeState::new(OrbitalElements::Keplerian(leo_elements()), Some(0.3));

        for native in sets {
            for fit in sets {
                let param = StateParameterization::new(fit, native, EarthModel::default())
                    .with_fitted_drag();
                let x = param.to_fit(&seed).unwrap();

                let mut repaired = x.clone();
                let (state, degenerate) = param.to_native(&mut repaired).unwrap();
                assert_eq!(degenerate, 0, "fit {fit}, native {native}");
                assert_eq!(state.elements.element_set(), native);

                let back = param.to_fit(&state).unwrap();
                assert_eq!(back.len(), 7);
                assert_relative_eq!(back, x, epsilon = 1e-8, max_relative = 1e-10);
            }
        }
    }

    #[test]
    fn test_drag_component() {
        let param = StateParameterization::new(
            ElementSet::Equinoctial,
            ElementSet::Keplerian,
            EarthModel::default(),
        )
        .with_fitted_drag()
        .with_fixed_drag(2.2);

        assert_eq!(param.dimension(), 7);
        let mut x = param.to_fit(&leo_native()).unwrap();
        assert_eq!(x[6], 2.2);

        x[6] = 1.5;
        let (native, _) = param.to_native(&mut x).unwrap();
        assert_eq!(native.drag_scale, Some(1.5));

        let fixed = StateParameterization::new(
            ElementSet::Keplerian,
            ElementSet::Keplerian,
            EarthModel::default(),
        )
        .with_fixed_drag(2.2);
        let mut x = fixed.to_fit(&leo_native()).unwrap();
        let (native, _) = fixed.to_native(&mut x).unwrap();
        assert_eq!(native.drag_scale, Some(2.2));
    }

    #[test]
    fn test_dimension_mismatch() {
        let param = StateParameterization::new(
            ElementSet::Keplerian,
            ElementSet::Keplerian,
            EarthModel::default(),
        );
        let mut x = FitVector::zeros(7);
        assert_eq!(
            param.to_native(&mut x),
            Err(OdError::DimensionMismatch {
                expected: 6,
                actual: 7
            })
        );
    }

    #[test]
    fn test_sub_surface_semi_major_axis_is_raised() {
        let param = StateParameterization::new(
            ElementSet::Keplerian,
            ElementSet::Keplerian,
            EarthModel::default(),
        );
        let mut x = FitVector::from_row_slice(&[5_000.0, 0.01, 0.9, 0.5, 1.0, 0.3]);
        let (_, degenerate) = param.to_native(&mut x).unwrap();

        assert_eq!(degenerate, 1);
        assert_relative_eq!(x[0], 1.01 * EARTH_RADIUS);
    }

    #[test]
    fn test_slow_mean_motion_is_damped() {
        let param = StateParameterization::new(
            ElementSet::Keplerian,
            ElementSet::Keplerian,
            EarthModel::default(),
        );
        let mut x = FitVector::from_row_slice(&[400_000.0, 0.01, 0.9, 0.5, 1.0, 0.3]);
        let (_, degenerate) = param.to_native(&mut x).unwrap();

        assert_eq!(degenerate, 1);
        assert_relative_eq!(x[0], 360_000.0);
    }

    #[test]
    fn test_unbound_eccentricity_is_scaled_back() {
        let param = StateParameterization::new(
            ElementSet::Keplerian,
            ElementSet::Cartesian,
            EarthModel::default(),
        );
        let mut x = FitVector::from_row_slice(&[7_000.0, -1.3, 0.9, 0.5, 1.0, 0.3]);
        let (_, degenerate) = param.to_native(&mut x).unwrap();
        assert_eq!(degenerate, 2);
        assert_eq!(x[1], ECCENTRICITY_FALLBACK);

        let param = StateParameterization::new(
            ElementSet::Equinoctial,
            ElementSet::Cartesian,
            EarthModel::default(),
        );
        let mut x = FitVector::from_row_slice(&[7_000.0, 0.6, 0.8, 0.1, 0.2, 0.3]);
        let (_, degenerate) = param.to_native(&mut x).unwrap();
        assert_eq!(degenerate, 1);
        assert_relative_eq!(x[1].hypot(x[2]), ECCENTRICITY_FALLBACK, epsilon = 1e-12);
        assert_relative_eq!(x[2] / x[1], 0.8 / 0.6, epsilon = 1e-12);
    }

    #[test]
    fn test_cartesian_position_inside_earth() {
        let param = StateParameterization::new(
            ElementSet::Cartesian,
            ElementSet::Keplerian,
            EarthModel::default(),
        );
        let mut x = FitVector::from_row_slice(&[3_000.0, 4_000.0, 0.0, -6.0, 4.5, 1.0]);
        let (native, degenerate) = param.to_native(&mut x).unwrap();

        assert!(degenerate >= 1);
        let radius = Vector3::new(x[0], x[1], x[2]).norm();
        assert_relative_eq!(radius, 1.01 * EARTH_RADIUS, max_relative = 1e-12);
        assert_relative_eq!(x[1] / x[0], 4.0 / 3.0, epsilon = 1e-12);

        let kepler = native.elements.to_keplerian(param.earth.mu).unwrap();
        assert!(kepler.semi_major_axis >= EARTH_RADIUS);
        assert!(kepler.eccentricity < 1.0);
    }

    #[test]
    fn test_cartesian_hyperbolic_velocity_is_bound() {
        let param = StateParameterization::new(
            ElementSet::Cartesian,
            ElementSet::Keplerian,
            EarthModel::default(),
        );
        let mut x = FitVector::from_row_slice(&[7_000.0, 0.0, 0.0, 0.0, 15.0, 0.0]);
        let (native, degenerate) = param.to_native(&mut x).unwrap();

        assert_eq!(degenerate, 1);
        let escape = (2.0 * param.earth.mu / 7_000.0).sqrt();
        assert_relative_eq!(x[4], ESCAPE_SPEED_FRACTION * escape, max_relative = 1e-12);
        assert!(native.elements.to_keplerian(param.earth.mu).is_ok());
    }
}
