//! # Tracking sites and sensors
//!
//! * [`Site`]: inertial position and velocity of a tracking station at an observation
//!   epoch. Range and angle observations are measured from it.
//! * [`sensors`]: per-sensor noise profiles and the registry the estimator queries for
//!   observation weights.
//!
//! A site can be given directly (already in the inertial frame) or built from geodetic
//! coordinates with [`Site::from_geodetic`]. The latter rotates the body-fixed position by
//! the Greenwich mean sidereal time; precession, nutation and polar motion are ignored.

use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};

use crate::{
    constants::{Degree, EarthModel, Kilometer},
    time::{gmst, JulianDate},
};

/// Sensor noise profiles and registry.
pub mod sensors;

/// Inertial position (km) and velocity (km/s) of a tracking site.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
}

impl Site {
    pub fn new(position: Vector3<f64>, velocity: Vector3<f64>) -> Self {
        Site { position, velocity }
    }

    /// Inertial site state from geodetic coordinates.
    ///
    /// Arguments
    /// ---------
    /// * `latitude`: geodetic latitude in degrees.
    /// * `longitude`: longitude in degrees east of Greenwich.
    /// * `height`: height above the ellipsoid in km.
    /// * `epoch`: observation epoch (UTC, used as UT1).
    /// * `earth`: Earth model providing the ellipsoid and rotation rate.
    ///
    /// Return
    /// ------
    /// * The site position rotated by GMST, and its velocity `ω × r` from Earth rotation.
    pub fn from_geodetic(
        latitude: Degree,
        longitude: Degree,
        height: Kilometer,
        epoch: &JulianDate,
        earth: &EarthModel,
    ) -> Self {
        let (rho_cos_phi, rho_sin_phi) = lat_alt_to_parallax(latitude.to_radians(), height, earth);

        let (sin_lon, cos_lon) = longitude.to_radians().sin_cos();
        let body_fixed = earth.equatorial_radius
            * Vector3::new(rho_cos_phi * cos_lon, rho_cos_phi * sin_lon, rho_sin_phi);

        let rot = Rotation3::from_axis_angle(&Vector3::z_axis(), gmst(epoch.to_mjd()));
        let position = rot * body_fixed;

        let omega = Vector3::new(0.0, 0.0, earth.rotation_rate);
        Site {
            position,
            velocity: omega.cross(&position),
        }
    }
}

/// Geocentric parallax constants `(ρ·cos φ', ρ·sin φ')` in Earth radii.
///
/// ```text
/// u = atan( (sin φ * (b/a)) / cos φ )
/// ρ_sinφ = (b/a) * sin u + (h/a) * sin φ
/// ρ_cosφ = cos u + (h/a) * cos φ
/// ```
fn lat_alt_to_parallax(lat: f64, height: Kilometer, earth: &EarthModel) -> (f64, f64) {
    let axis_ratio = 1.0 - earth.flattening;

    // Parametric latitude
    let u = (lat.sin() * axis_ratio).atan2(lat.cos());

    let rho_sin_phi = axis_ratio * u.sin() + (height / earth.equatorial_radius) * lat.sin();
    let rho_cos_phi = u.cos() + (height / earth.equatorial_radius) * lat.cos();

    (rho_cos_phi, rho_sin_phi)
}

#[cfg(test)]
mod observers_test {
    use super::*;
    use crate::constants::EARTH_RADIUS;
    use approx::assert_relative_eq;

    #[test]
    fn test_parallax_haleakala() {
        // Pan-STARRS 1, Haleakala: 20.707233557° N, 3.067694 km
        let (pxy, pz) =
            lat_alt_to_parallax(20.707233557_f64.to_radians(), 3.067694, &EarthModel::default());
        assert_relative_eq!(pxy, 0.9362410003, epsilon = 1e-6);
        assert_relative_eq!(pz, 0.3515429986, epsilon = 1e-6);
    }

    #[test]
    fn test_equatorial_site() {
        let earth = EarthModel::default();
        let epoch = JulianDate::new(2460000.0, 0.5);
        let site = Site::from_geodetic(0.0, 0.0, 0.0, &epoch, &earth);

        assert_relative_eq!(site.position.norm(), EARTH_RADIUS, epsilon = 1e-9);
        assert_relative_eq!(site.position.z, 0.0, epsilon = 1e-12);
        assert_relative_eq!(
            site.position.y.atan2(site.position.x).rem_euclid(crate::constants::DPI),
            gmst(epoch.to_mjd()),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            site.velocity.norm(),
            earth.rotation_rate * EARTH_RADIUS,
            epsilon = 1e-12
        );
        assert_relative_eq!(site.velocity.dot(&site.position), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_polar_site() {
        let earth = EarthModel::default();
        let epoch = JulianDate::new(2460000.0, 0.5);
        let site = Site::from_geodetic(90.0, 0.0, 0.0, &epoch, &earth);
        let polar_radius = EARTH_RADIUS * (1.0 - earth.flattening);

        assert_relative_eq!(site.position.z, polar_radius, epsilon = 1e-6);
        assert_relative_eq!(site.velocity.norm(), 0.0, epsilon = 1e-9);
    }
}
