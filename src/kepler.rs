use roots::{find_root_newton_raphson, SimpleConvergency};
use std::f64::consts::PI;

use crate::{constants::DPI, od_errors::OdError};

/// Principal value of an angle in radians, in `[0, 2π)`.
pub(crate) fn principal_angle(a: f64) -> f64 {
    a.rem_euclid(DPI)
}

/// Bring an angular difference back into `[-π, π]` with a single ±2π correction.
///
/// Measured and predicted angles are both in a `[0, 2π)` (or `[-π/2, π/2]`) range, so their
/// raw difference never exceeds 2π in magnitude and one correction is enough.
pub(crate) fn wrap_angle_difference(diff: f64) -> f64 {
    if diff.abs() > PI {
        diff - diff.signum() * DPI
    } else {
        diff
    }
}

/// Solve Kepler's equation `E − e·sin(E) = M` for the eccentric anomaly.
///
/// Arguments
/// ---------
/// * `mean_anomaly`: mean anomaly M (radians, any range).
/// * `eccentricity`: e in `[0, 1)`.
///
/// Return
/// ------
/// * The eccentric anomaly E in `[0, 2π)`, or [`OdError::UnboundOrbit`] / the root finder
///   error when the iteration fails.
pub(crate) fn solve_kepler_equation(mean_anomaly: f64, eccentricity: f64) -> Result<f64, OdError> {
    if !(0.0..1.0).contains(&eccentricity) {
        return Err(OdError::UnboundOrbit(eccentricity));
    }
    let m = principal_angle(mean_anomaly);

    let f = |e_anom: f64| -> f64 { e_anom - eccentricity * e_anom.sin() - m };
    let df = |e_anom: f64| -> f64 { 1.0 - eccentricity * e_anom.cos() };

    // Starting at π keeps Newton monotone for high eccentricities
    let x0 = if eccentricity > 0.8 { PI } else { m };

    let mut tol = SimpleConvergency {
        eps: f64::EPSILON * 1e2,
        max_iter: 50,
    };

    Ok(principal_angle(find_root_newton_raphson(
        x0, &f, &df, &mut tol,
    )?))
}
