use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{kepler::principal_angle, od_errors::OdError};

use super::keplerian_element::KeplerianElements;

const EPS: f64 = 5e-15;

/// Inertial position (km) and velocity (km/s).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CartesianState {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
}

impl CartesianState {
    pub fn new(position: Vector3<f64>, velocity: Vector3<f64>) -> Self {
        CartesianState { position, velocity }
    }

    /// Semi-major axis from the vis-viva energy; negative for hyperbolic states.
    pub fn semi_major_axis(&self, mu: f64) -> f64 {
        1.0 / (2.0 / self.position.norm() - self.velocity.norm_squared() / mu)
    }

    /// Convert the state to Keplerian elements.
    ///
    /// The state is first rotated into the orbital frame (X axis along the line of nodes),
    /// where eccentricity, eccentric anomaly and the argument of pericenter are read off the
    /// in-plane components.
    ///
    /// Conventions
    /// -----------
    /// * Equatorial orbit: Ω = 0.
    /// * Circular orbit: the eccentric anomaly is 0, so ω carries the argument of latitude.
    ///
    /// Errors
    /// ------
    /// * [`OdError::UnboundOrbit`] for parabolic or hyperbolic states.
    pub fn to_keplerian(&self, mu: f64) -> Result<KeplerianElements, OdError> {
        let elle = self.position.cross(&self.velocity);
        let elv = elle.normalize();

        // Orbital inclination and longitude of the node
        let sini = elv.x.hypot(elv.y);
        let ainc = principal_angle(sini.atan2(elv.z));
        let anod = if sini == 0.0 {
            0.0
        } else {
            principal_angle(elv.x.atan2(-elv.y))
        };

        // Cartesian coordinates in the orbital frame
        let rot = Rotation3::from_axis_angle(&Vector3::x_axis(), -ainc)
            * Rotation3::from_axis_angle(&Vector3::z_axis(), -anod);
        let xorb = rot * self.position;
        let vorb = rot * self.velocity;

        let rv = xorb.x * vorb.x + xorb.y * vorb.y;
        let rs = xorb.x.hypot(xorb.y);
        let v2 = vorb.x * vorb.x + vorb.y * vorb.y;

        // Reciprocal semimajor axis
        let reca = 2.0 / rs - v2 / mu;
        if reca <= 0.0 {
            let p = elle.norm_squared() / mu;
            let ecc = ((p / rs - 1.0).powi(2) + (rv * p / (elle.norm() * rs)).powi(2)).sqrt();
            return Err(OdError::UnboundOrbit(ecc));
        }

        let sma = 1.0 / reca;
        let enne = (mu / sma.powi(3)).sqrt();

        // Eccentricity
        let esine = rv / (enne * sma * sma);
        let ecose = v2 * rs / mu - 1.0;
        let ecc = esine.hypot(ecose);
        if ecc >= 1.0 - EPS {
            return Err(OdError::UnboundOrbit(ecc));
        }

        let anec = esine.atan2(ecose);
        let emme = principal_angle(anec - ecc * anec.sin());

        // Argument of pericenter
        let x1 = anec.cos() - ecc;
        let x2 = (1.0 - ecc * ecc).sqrt() * anec.sin();
        let xm = x1.hypot(x2);
        let (x1, x2) = (x1 / xm, x2 / xm);
        let sinper = x1 * xorb.y - x2 * xorb.x;
        let cosper = x1 * xorb.x + x2 * xorb.y;
        let argper = principal_angle(sinper.atan2(cosper));

        Ok(KeplerianElements {
            semi_major_axis: sma,
            eccentricity: ecc,
            inclination: ainc,
            ascending_node_longitude: anod,
            periapsis_argument: argper,
            mean_anomaly: emme,
        })
    }
}

impl fmt::Display for CartesianState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cartesian State")?;
        writeln!(f, "-------------------------------------------")?;
        writeln!(
            f,
            "  r   = [{:.6}, {:.6}, {:.6}] km",
            self.position.x, self.position.y, self.position.z
        )?;
        writeln!(
            f,
            "  v   = [{:.9}, {:.9}, {:.9}] km/s",
            self.velocity.x, self.velocity.y, self.velocity.z
        )
    }
}
