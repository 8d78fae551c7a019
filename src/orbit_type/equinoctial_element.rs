//! # Equinoctial orbital elements
//!
//! Non-singular element set `(a, af, ag, χ, ψ, L)`:
//!
//! ```text
//! af = e·cos(ω+Ω)      ag = e·sin(ω+Ω)
//! χ  = tan(i/2)·sin(Ω) ψ  = tan(i/2)·cos(Ω)
//! L  = wrap(M + ω + Ω, 2π)
//! ```
//!
//! The set stays well defined at zero eccentricity and zero inclination, which is why it is
//! the preferred fit-space parameterization for near-circular or near-equatorial orbits.
//! The retrograde-equatorial case (i = π) remains singular.

use nalgebra::Vector3;
use roots::{find_root_newton_raphson, SimpleConvergency};
use serde::{Deserialize, Serialize};
use std::{f64::consts::PI, fmt};

use crate::{
    constants::DPI,
    kepler::principal_angle,
    od_errors::OdError,
    orbit_type::{cartesian_element::CartesianState, keplerian_element::KeplerianElements},
};

/// Equinoctial orbital elements.
///
/// Units
/// -----
/// * `semi_major_axis`: km
/// * `eccentricity_cos_lon`, `eccentricity_sin_lon`: unitless
/// * `tan_half_incl_sin_node`, `tan_half_incl_cos_node`: unitless
/// * `mean_longitude`: radians
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct EquinoctialElements {
    pub semi_major_axis: f64,        // a
    pub eccentricity_cos_lon: f64,   // af = e * cos(Ω + ω)
    pub eccentricity_sin_lon: f64,   // ag = e * sin(Ω + ω)
    pub tan_half_incl_sin_node: f64, // χ = tan(i/2) * sin(Ω)
    pub tan_half_incl_cos_node: f64, // ψ = tan(i/2) * cos(Ω)
    pub mean_longitude: f64,         // L = Ω + ω + M
}

impl EquinoctialElements {
    pub(crate) fn from_kepler_internal(
        semi_major_axis: f64,
        eccentricity: f64,
        inclination: f64,
        ascending_node_longitude: f64,
        periapsis_argument: f64,
        mean_anomaly: f64,
    ) -> Self {
        let dig = ascending_node_longitude + periapsis_argument;
        let tgi2 = (inclination / 2.0).tan();

        EquinoctialElements {
            semi_major_axis,
            eccentricity_cos_lon: eccentricity * dig.cos(),
            eccentricity_sin_lon: eccentricity * dig.sin(),
            tan_half_incl_sin_node: tgi2 * ascending_node_longitude.sin(),
            tan_half_incl_cos_node: tgi2 * ascending_node_longitude.cos(),
            mean_longitude: principal_angle(dig + mean_anomaly),
        }
    }

    /// Eccentricity magnitude `sqrt(af² + ag²)`.
    pub fn eccentricity(&self) -> f64 {
        self.eccentricity_cos_lon.hypot(self.eccentricity_sin_lon)
    }

    /// Solve the equinoctial Kepler equation `F − af·sin(F) + ag·cos(F) = L` for the
    /// eccentric longitude F.
    fn solve_kepler_equation(
        &self,
        mean_longitude: f64,
        longitude_of_periapsis: f64,
    ) -> Result<f64, OdError> {
        let f = |fval: f64| -> f64 {
            fval - self.eccentricity_cos_lon * fval.sin() + self.eccentricity_sin_lon * fval.cos()
                - mean_longitude
        };

        let df = |fval: f64| -> f64 {
            1.0 - self.eccentricity_cos_lon * fval.cos() - self.eccentricity_sin_lon * fval.sin()
        };

        let x0 = PI + longitude_of_periapsis;

        let mut tol = SimpleConvergency {
            eps: f64::EPSILON * 1e2,
            max_iter: 50,
        };

        Ok(find_root_newton_raphson(x0, &f, &df, &mut tol)?)
    }

    /// Position and velocity (km, km/s) computed directly from the equinoctial set.
    ///
    /// Arguments
    /// ---------
    /// * `mu`: gravitational parameter of the central body (km³/s²).
    ///
    /// Return
    /// ------
    /// * The [`CartesianState`], or [`OdError::UnboundOrbit`] if `af² + ag² ≥ 1`.
    pub fn to_cartesian(&self, mu: f64) -> Result<CartesianState, OdError> {
        let eccentricity_pow2 =
            self.eccentricity_sin_lon.powi(2) + self.eccentricity_cos_lon.powi(2);
        if eccentricity_pow2 >= 1.0 {
            return Err(OdError::UnboundOrbit(eccentricity_pow2.sqrt()));
        }

        let mut longitude_of_periapsis = 0.0;
        if eccentricity_pow2 > f64::EPSILON * 1e2 {
            longitude_of_periapsis =
                principal_angle(self.eccentricity_sin_lon.atan2(self.eccentricity_cos_lon));
        }

        let mut mean_longitude = principal_angle(self.mean_longitude);
        if mean_longitude < longitude_of_periapsis {
            mean_longitude += DPI;
        }

        let eccentric_longitude =
            self.solve_kepler_equation(mean_longitude, longitude_of_periapsis)?;
        let mean_motion = (mu / self.semi_major_axis.powi(3)).sqrt();

        Ok(self.compute_cartesian_position_and_velocity(
            mean_motion,
            eccentric_longitude,
            eccentricity_pow2,
        ))
    }

    fn compute_cartesian_position_and_velocity(
        &self,
        mean_motion: f64,
        eccentric_longitude: f64,
        eccentricity_pow2: f64,
    ) -> CartesianState {
        let ag = self.eccentricity_sin_lon;
        let af = self.eccentricity_cos_lon;
        let beta = 1. / (1. + (1. - eccentricity_pow2).sqrt());
        let beta_ecc_term = beta * ag * af;

        let (sin_f, cos_f) = eccentric_longitude.sin_cos();

        let xe = self.semi_major_axis
            * ((1. - beta * ag.powi(2)) * cos_f + beta_ecc_term * sin_f - af);
        let ye = self.semi_major_axis
            * ((1. - beta * af.powi(2)) * sin_f + beta_ecc_term * cos_f - ag);

        let chi = self.tan_half_incl_sin_node;
        let psi = self.tan_half_incl_cos_node;
        let inv_u = 1.0 / (1. + chi.powi(2) + psi.powi(2));
        let common_component = 2. * chi * psi * inv_u;

        let f_vector = Vector3::new(
            (1. - chi.powi(2) + psi.powi(2)) * inv_u,
            common_component,
            -2. * chi * inv_u,
        );
        let g_vector = Vector3::new(
            common_component,
            (1. + chi.powi(2) - psi.powi(2)) * inv_u,
            2. * psi * inv_u,
        );

        let v_const = mean_motion * self.semi_major_axis.powi(2) / (xe.powi(2) + ye.powi(2)).sqrt();
        let v_xe = v_const * (beta_ecc_term * cos_f - (1. - beta * ag.powi(2)) * sin_f);
        let v_ye = v_const * ((1. - beta * af.powi(2)) * cos_f - beta_ecc_term * sin_f);

        CartesianState {
            position: xe * f_vector + ye * g_vector,
            velocity: v_xe * f_vector + v_ye * g_vector,
        }
    }
}

impl From<&EquinoctialElements> for KeplerianElements {
    fn from(equinoctial: &EquinoctialElements) -> Self {
        KeplerianElements::from_equinoctial_internal(
            equinoctial.semi_major_axis,
            equinoctial.eccentricity_cos_lon,
            equinoctial.eccentricity_sin_lon,
            equinoctial.tan_half_incl_sin_node,
            equinoctial.tan_half_incl_cos_node,
            equinoctial.mean_longitude,
        )
    }
}

impl fmt::Display for EquinoctialElements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Equinoctial Elements")?;
        writeln!(f, "-------------------------------------------")?;
        writeln!(f, "  a   (semi-major axis)  = {:.6} km", self.semi_major_axis)?;
        writeln!(f, "  af  (e·cos ϖ)          = {:.8}", self.eccentricity_cos_lon)?;
        writeln!(f, "  ag  (e·sin ϖ)          = {:.8}", self.eccentricity_sin_lon)?;
        writeln!(f, "  χ   (tan(i/2)·sin Ω)   = {:.8}", self.tan_half_incl_sin_node)?;
        writeln!(f, "  ψ   (tan(i/2)·cos Ω)   = {:.8}", self.tan_half_incl_cos_node)?;
        writeln!(f, "  L   (mean longitude)   = {:.6} rad", self.mean_longitude)
    }
}

#[cfg(test)]
mod test_equinoctial_element {
    use super::*;
    use crate::constants::MU_EARTH;
    use crate::orbit_type::keplerian_element::test_keplerian_element::leo_elements;
    use approx::assert_relative_eq;

    #[test]
    fn test_equinoctial_to_keplerian() {
        let kepler = leo_elements();
        let equ: EquinoctialElements = (&kepler).into();
        let back: KeplerianElements = (&equ).into();

        assert_relative_eq!(back.semi_major_axis, kepler.semi_major_axis);
        assert_relative_eq!(back.eccentricity, kepler.eccentricity, epsilon = 1e-15);
        assert_relative_eq!(back.inclination, kepler.inclination, epsilon = 1e-14);
        assert_relative_eq!(
            back.ascending_node_longitude,
            kepler.ascending_node_longitude,
            epsilon = 1e-14
        );
        assert_relative_eq!(
            back.periapsis_argument,
            kepler.periapsis_argument,
            epsilon = 1e-12
        );
        assert_relative_eq!(back.mean_anomaly, kepler.mean_anomaly, epsilon = 1e-12);
    }

    #[test]
    fn test_direct_cartesian_matches_keplerian_path() {
        let kepler = leo_elements();
        let equ: EquinoctialElements = (&kepler).into();

        let via_kepler = kepler.to_cartesian(MU_EARTH).unwrap();
        let direct = equ.to_cartesian(MU_EARTH).unwrap();

        assert_relative_eq!(direct.position, via_kepler.position, epsilon = 1e-7);
        assert_relative_eq!(direct.velocity, via_kepler.velocity, epsilon = 1e-10);
    }

    #[test]
    fn test_circular_equatorial_is_regular() {
        let equ = EquinoctialElements {
            semi_major_axis: 42_164.0,
            eccentricity_cos_lon: 0.0,
            eccentricity_sin_lon: 0.0,
            tan_half_incl_sin_node: 0.0,
            tan_half_incl_cos_node: 0.0,
            mean_longitude: 1.0,
        };
        let state = equ.to_cartesian(MU_EARTH).unwrap();
        assert_relative_eq!(state.position.norm(), 42_164.0, max_relative = 1e-12);
        assert_relative_eq!(state.position.y.atan2(state.position.x), 1.0, epsilon = 1e-12);
        assert_relative_eq!(state.position.z, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_unbound_is_rejected() {
        let equ = EquinoctialElements {
            semi_major_axis: 7_000.0,
            eccentricity_cos_lon: 0.9,
            eccentricity_sin_lon: 0.9,
            tan_half_incl_sin_node: 0.1,
            tan_half_incl_cos_node: 0.1,
            mean_longitude: 1.0,
        };
        assert!(matches!(
            equ.to_cartesian(MU_EARTH),
            Err(OdError::UnboundOrbit(_))
        ));
    }
}
