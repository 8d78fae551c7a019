//! # Topocentric geometry
//!
//! Maps an inertial satellite state and a tracking [`Site`] to the quantities a sensor
//! measures: range, azimuth, elevation, topocentric right ascension and declination, and
//! their time derivatives.
//!
//! ## Frames
//!
//! * Azimuth/elevation use a local east-north-up basis built on the **geocentric** vertical
//!   of the site (`up = r̂_site`, `east = ẑ × up`, `north = up × east`). Azimuth is
//!   measured from north towards east in `[0, 2π)`, elevation in `[-π/2, π/2]`.
//! * Right ascension/declination are the angles of the site-to-satellite vector in the
//!   inertial frame, right ascension in `[0, 2π)`.
//!
//! The local basis rotates with the Earth; its rate enters the azimuth/elevation rates
//! through the [`EarthModel`] rotation rate.

use nalgebra::Vector3;

use crate::{
    constants::{EarthModel, Kilometer, Radian, DPI},
    observers::Site,
    orbit_type::cartesian_element::CartesianState,
};

/// Everything a sensor can observe of a satellite from a site.
///
/// Units: km, km/s, rad, rad/s.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TopocentricView {
    pub range: Kilometer,
    pub range_rate: f64,
    pub azimuth: Radian,
    pub azimuth_rate: f64,
    pub elevation: Radian,
    pub elevation_rate: f64,
    pub right_ascension: Radian,
    pub right_ascension_rate: f64,
    pub declination: Radian,
    pub declination_rate: f64,
}

/// Measurement geometry seam of the estimator.
pub trait Geometry: Send + Sync {
    /// Topocentric view of `state` from `site`.
    fn observe(&self, state: &CartesianState, site: &Site) -> TopocentricView;
}

/// Spherical-Earth topocentric geometry.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TopocentricGeometry {
    earth: EarthModel,
}

/// Local east, north, up unit vectors of a site.
struct LocalBasis {
    east: Vector3<f64>,
    north: Vector3<f64>,
    up: Vector3<f64>,
}

impl LocalBasis {
    fn at(site: &Site) -> Self {
        let up = site.position.normalize();
        let east = Vector3::z().cross(&up);
        // At the poles any horizontal direction will do
        let east = if east.norm() < 1e-12 {
            Vector3::x()
        } else {
            east.normalize()
        };
        let north = up.cross(&east);
        LocalBasis { east, north, up }
    }
}

impl TopocentricGeometry {
    pub fn new(earth: &EarthModel) -> Self {
        TopocentricGeometry { earth: *earth }
    }

    /// Inertial position seen at `range`, `azimuth`, `elevation` from `site`.
    ///
    /// Inverse of the azimuth/elevation part of [`Geometry::observe`], used to seed initial
    /// guesses from radar tracks.
    pub fn position_from_range_az_el(
        &self,
        range: Kilometer,
        azimuth: Radian,
        elevation: Radian,
        site: &Site,
    ) -> Vector3<f64> {
        let basis = LocalBasis::at(site);
        let (sin_az, cos_az) = azimuth.sin_cos();
        let (sin_el, cos_el) = elevation.sin_cos();
        site.position
            + range
                * (cos_el * sin_az * basis.east + cos_el * cos_az * basis.north + sin_el * basis.up)
    }

    /// Inertial position seen at `range` in the direction (`right_ascension`, `declination`)
    /// from `site`.
    pub fn position_from_radec(
        &self,
        range: Kilometer,
        right_ascension: Radian,
        declination: Radian,
        site: &Site,
    ) -> Vector3<f64> {
        let (sin_ra, cos_ra) = right_ascension.sin_cos();
        let (sin_dec, cos_dec) = declination.sin_cos();
        site.position + range * Vector3::new(cos_dec * cos_ra, cos_dec * sin_ra, sin_dec)
    }
}

impl Geometry for TopocentricGeometry {
    fn observe(&self, state: &CartesianState, site: &Site) -> TopocentricView {
        let rel = state.position - site.position;
        let rel_vel = state.velocity - site.velocity;

        let range = rel.norm();
        if range == 0.0 {
            return TopocentricView::default();
        }
        let range_rate = rel.dot(&rel_vel) / range;

        // Local horizon
        let basis = LocalBasis::at(site);
        let omega = Vector3::new(0.0, 0.0, self.earth.rotation_rate);
        let (e, n, u) = (rel.dot(&basis.east), rel.dot(&basis.north), rel.dot(&basis.up));
        let e_dot = rel_vel.dot(&basis.east) + rel.dot(&omega.cross(&basis.east));
        let n_dot = rel_vel.dot(&basis.north) + rel.dot(&omega.cross(&basis.north));
        let u_dot = rel_vel.dot(&basis.up) + rel.dot(&omega.cross(&basis.up));

        let horizontal = e.hypot(n);
        let azimuth = e.atan2(n).rem_euclid(DPI);
        let elevation = (u / range).clamp(-1.0, 1.0).asin();
        let (azimuth_rate, elevation_rate) = if horizontal > 0.0 {
            (
                (n * e_dot - e * n_dot) / (horizontal * horizontal),
                (u_dot * range - u * range_rate) / (range * horizontal),
            )
        } else {
            (0.0, 0.0)
        };

        // Inertial direction
        let equatorial = rel.x.hypot(rel.y);
        let right_ascension = rel.y.atan2(rel.x).rem_euclid(DPI);
        let declination = (rel.z / range).clamp(-1.0, 1.0).asin();
        let (right_ascension_rate, declination_rate) = if equatorial > 0.0 {
            (
                (rel.x * rel_vel.y - rel.y * rel_vel.x) / (equatorial * equatorial),
                (rel_vel.z * range - rel.z * range_rate) / (range * equatorial),
            )
        } else {
            (0.0, 0.0)
        };

        TopocentricView {
            range,
            range_rate,
            azimuth,
            azimuth_rate,
            elevation,
            elevation_rate,
            right_ascension,
            right_ascension_rate,
            declination,
            declination_rate,
        }
    }
}
