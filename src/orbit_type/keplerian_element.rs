//! # Keplerian orbital elements
//!
//! This module defines the [`KeplerianElements`] struct and its conversions, providing the
//! **classical orbital element representation** `(a, e, i, Ω, ω, M)` of a bound geocentric
//! orbit.
//!
//! ## Units
//!
//! - Lengths: **km**
//! - Angles: **radians**
//!
//! ## Degeneracies
//!
//! Classical Keplerian elements suffer from singularities:
//!
//! - **Circular orbits (`e → 0`)**: periapsis argument ω becomes undefined.
//!   → conventionally set to `0.0` during conversion.
//! - **Equatorial orbits (`i → 0`)**: ascending node Ω becomes undefined.
//!   → conventionally set to `0.0` during conversion.
//!
//! For fits near these configurations, the
//! [`EquinoctialElements`](crate::orbit_type::equinoctial_element::EquinoctialElements)
//! parameterization is recommended.
//!
//! ## See also
//!
//! - [`EquinoctialElements`](crate::orbit_type::equinoctial_element::EquinoctialElements): regularized, non-singular form.
//! - [`CartesianState`](crate::orbit_type::cartesian_element::CartesianState): position/velocity form.

use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    kepler::{principal_angle, solve_kepler_equation},
    od_errors::OdError,
    orbit_type::{cartesian_element::CartesianState, equinoctial_element::EquinoctialElements},
};

/// Keplerian orbital elements (osculating, two-body).
///
/// Units
/// -----
/// * `semi_major_axis`: km.
/// * `eccentricity`: unitless, `[0, 1)`.
/// * `inclination`: radians.
/// * `ascending_node_longitude`: radians (Ω).
/// * `periapsis_argument`: radians (ω).
/// * `mean_anomaly`: radians (M).
///
/// See also
/// --------
/// * [`EquinoctialElements`]: Regularized element set.
/// * [`principal_angle`]: Angle normalization helper to [0, 2π).
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct KeplerianElements {
    pub semi_major_axis: f64,
    pub eccentricity: f64,
    pub inclination: f64,
    pub ascending_node_longitude: f64,
    pub periapsis_argument: f64,
    pub mean_anomaly: f64,
}

impl KeplerianElements {
    /// Convert equinoctial elements to Keplerian elements.
    ///
    /// Inverse mapping from `(a, af ≡ e·cos(ϖ), ag ≡ e·sin(ϖ), χ ≡ tan(i/2)·sin(Ω),
    /// ψ ≡ tan(i/2)·cos(Ω), L ≡ M+ϖ)` to `(a, e, i, Ω, ω, M)`, where ϖ = ω + Ω.
    ///
    /// Degenerate cases
    /// ----------------
    /// * `e < 1e-12`: ϖ is set to 0, so ω = −Ω and M = L.
    /// * `tan(i/2) < 1e-12`: Ω is set to 0.
    pub(crate) fn from_equinoctial_internal(
        semi_major_axis: f64,
        eccentricity_cos_lon: f64,
        eccentricity_sin_lon: f64,
        tan_half_incl_sin_node: f64,
        tan_half_incl_cos_node: f64,
        mean_longitude: f64,
    ) -> Self {
        let eps = 1.0e-12;
        let ecc = (eccentricity_sin_lon.powi(2) + eccentricity_cos_lon.powi(2)).sqrt();

        // ϖ = atan2(ag, af), undefined when e ~ 0
        let dig = if ecc < eps {
            0.0
        } else {
            eccentricity_sin_lon.atan2(eccentricity_cos_lon)
        };

        // t = tan(i/2) = sqrt(χ^2 + ψ^2)
        let tgi2 = (tan_half_incl_sin_node.powi(2) + tan_half_incl_cos_node.powi(2)).sqrt();

        // Ω = atan2(χ, ψ), undefined when t ~ 0
        let omega_node = if tgi2 < eps {
            0.0
        } else {
            tan_half_incl_sin_node.atan2(tan_half_incl_cos_node)
        };

        Self {
            semi_major_axis,
            eccentricity: ecc,
            inclination: 2.0 * tgi2.atan(),
            ascending_node_longitude: principal_angle(omega_node),
            periapsis_argument: principal_angle(dig - omega_node),
            mean_anomaly: principal_angle(mean_longitude - dig),
        }
    }

    /// Position and velocity (km, km/s) of the elements in the inertial frame.
    ///
    /// Arguments
    /// ---------
    /// * `mu`: gravitational parameter of the central body (km³/s²).
    ///
    /// Return
    /// ------
    /// * The [`CartesianState`], or [`OdError::UnboundOrbit`] if `e ∉ [0, 1)`.
    pub fn to_cartesian(&self, mu: f64) -> Result<CartesianState, OdError> {
        let a = self.semi_major_axis;
        let e = self.eccentricity;
        let ecc_anom = solve_kepler_equation(self.mean_anomaly, e)?;
        let (sin_e, cos_e) = ecc_anom.sin_cos();
        let beta = (1.0 - e * e).sqrt();

        let radius = a * (1.0 - e * cos_e);
        let vel_scale = (mu * a).sqrt() / radius;

        let pos_perifocal = Vector3::new(a * (cos_e - e), a * beta * sin_e, 0.0);
        let vel_perifocal = Vector3::new(-vel_scale * sin_e, vel_scale * beta * cos_e, 0.0);

        let rot = Rotation3::from_axis_angle(&Vector3::z_axis(), self.ascending_node_longitude)
            * Rotation3::from_axis_angle(&Vector3::x_axis(), self.inclination)
            * Rotation3::from_axis_angle(&Vector3::z_axis(), self.periapsis_argument);

        Ok(CartesianState {
            position: rot * pos_perifocal,
            velocity: rot * vel_perifocal,
        })
    }

    /// Mean motion (rad/s).
    pub fn mean_motion(&self, mu: f64) -> f64 {
        (mu / self.semi_major_axis.powi(3)).sqrt()
    }
}

impl From<&KeplerianElements> for EquinoctialElements {
    /// Forward conversion to equinoctial elements.
    ///
    /// Arguments
    /// ---------
    /// * `k`: Keplerian elements `(a, e, i, Ω, ω, M)`.
    ///
    /// Return
    /// ------
    /// * [`EquinoctialElements`] with components `(a, af, ag, χ, ψ, L)`.
    fn from(k: &KeplerianElements) -> Self {
        EquinoctialElements::from_kepler_internal(
            k.semi_major_axis,
            k.eccentricity,
            k.inclination,
            k.ascending_node_longitude,
            k.periapsis_argument,
            k.mean_anomaly,
        )
    }
}

impl fmt::Display for KeplerianElements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rad_to_deg = 180.0 / std::f64::consts::PI;
        writeln!(f, "Keplerian Elements")?;
        writeln!(f, "-------------------------------------------")?;
        writeln!(
            f,
            "  a   (semi-major axis)       = {:.6} km",
            self.semi_major_axis
        )?;
        writeln!(
            f,
            "  e   (eccentricity)          = {:.8}",
            self.eccentricity
        )?;
        writeln!(
            f,
            "  i   (inclination)           = {:.6} rad ({:.6}°)",
            self.inclination,
            self.inclination * rad_to_deg
        )?;
        writeln!(
            f,
            "  Ω   (longitude of node)     = {:.6} rad ({:.6}°)",
            self.ascending_node_longitude,
            self.ascending_node_longitude * rad_to_deg
        )?;
        writeln!(
            f,
            "  ω   (argument of periapsis) = {:.6} rad ({:.6}°)",
            self.periapsis_argument,
            self.periapsis_argument * rad_to_deg
        )?;
        writeln!(
            f,
            "  M   (mean anomaly)          = {:.6} rad ({:.6}°)",
            self.mean_anomaly,
            self.mean_anomaly * rad_to_deg
        )
    }
}
