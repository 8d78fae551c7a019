//! # Tracking observations
//!
//! An [`Observation`] is one tracking measurement: an epoch, the sensor that produced it,
//! the site it was measured from (for range and angle types) and the measured values.
//!
//! Supported measurement types and their scalar components:
//!
//! | kind          | components                          | site required |
//! |---------------|-------------------------------------|---------------|
//! | `Range`       | ρ                                   | yes           |
//! | `AzEl`        | az, el                              | yes           |
//! | `RangeAzEl`   | ρ, az, el                           | yes           |
//! | `RaDec`       | α, δ                                | yes           |
//! | `StateVector` | x, y, z, ẋ, ẏ, ż (, drag scale)     | no            |
//!
//! Units are km, km/s and radians. The predict/residual/weight logic of every type lives
//! in [`models`].

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    constants::{Kilometer, Radian, SensorId},
    observers::Site,
    time::JulianDate,
};

/// Per-type observation models.
pub mod models;

use models::ObservationModel;

/// Measured values of an observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Measurement {
    Range(Kilometer),
    AzEl {
        azimuth: Radian,
        elevation: Radian,
    },
    RangeAzEl {
        range: Kilometer,
        azimuth: Radian,
        elevation: Radian,
    },
    RaDec {
        right_ascension: Radian,
        declination: Radian,
    },
    StateVector {
        position: Vector3<f64>,
        velocity: Vector3<f64>,
        drag_scale: Option<f64>,
    },
}

/// Type tag of a measurement, used to group residual statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObservationKind {
    Range,
    AzEl,
    RangeAzEl,
    RaDec,
    StateVector,
}

impl fmt::Display for ObservationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObservationKind::Range => "range",
            ObservationKind::AzEl => "az/el",
            ObservationKind::RangeAzEl => "range/az/el",
            ObservationKind::RaDec => "ra/dec",
            ObservationKind::StateVector => "state vector",
        };
        f.pad(name)
    }
}

impl Measurement {
    pub fn kind(&self) -> ObservationKind {
        match self {
            Measurement::Range(_) => ObservationKind::Range,
            Measurement::AzEl { .. } => ObservationKind::AzEl,
            Measurement::RangeAzEl { .. } => ObservationKind::RangeAzEl,
            Measurement::RaDec { .. } => ObservationKind::RaDec,
            Measurement::StateVector { .. } => ObservationKind::StateVector,
        }
    }

    /// Observation model handling this measurement.
    pub fn model(&self) -> &'static dyn ObservationModel {
        models::model_for(self)
    }
}

/// A single tracking observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub epoch: JulianDate,
    pub sensor_id: SensorId,
    pub site: Option<Site>,
    pub measurement: Measurement,
}

impl Observation {
    /// Observation taken from a tracking site.
    pub fn from_site(
        epoch: JulianDate,
        sensor_id: SensorId,
        site: Site,
        measurement: Measurement,
    ) -> Self {
        Observation {
            epoch,
            sensor_id,
            site: Some(site),
            measurement,
        }
    }

    /// Cartesian state-vector observation (no site).
    pub fn state_vector(
        epoch: JulianDate,
        sensor_id: SensorId,
        position: Vector3<f64>,
        velocity: Vector3<f64>,
        drag_scale: Option<f64>,
    ) -> Self {
        Observation {
            epoch,
            sensor_id,
            site: None,
            measurement: Measurement::StateVector {
                position,
                velocity,
                drag_scale,
            },
        }
    }

    pub fn kind(&self) -> ObservationKind {
        self.measurement.kind()
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:<12}] MJD {:.8} sensor {:>5} :",
            self.kind(),
            self.epoch.to_mjd(),
            self.sensor_id
        )?;
        match self.measurement {
            Measurement::Range(range) => write!(f, " ρ = {range:.6} km"),
            Measurement::AzEl { azimuth, elevation } => write!(
                f,
                " az = {:.6}°, el = {:.6}°",
                azimuth.to_degrees(),
                elevation.to_degrees()
            ),
            Measurement::RangeAzEl {
                range,
                azimuth,
                elevation,
            } => write!(
                f,
                " ρ = {range:.6} km, az = {:.6}°, el = {:.6}°",
                azimuth.to_degrees(),
                elevation.to_degrees()
            ),
            Measurement::RaDec {
                right_ascension,
                declination,
            } => write!(
                f,
                " α = {:.6}°, δ = {:.6}°",
                right_ascension.to_degrees(),
                declination.to_degrees()
            ),
            Measurement::StateVector {
                position,
                velocity,
                drag_scale,
            } => {
                write!(
                    f,
                    " r = [{:.3}, {:.3}, {:.3}] km, v = [{:.6}, {:.6}, {:.6}] km/s",
                    position.x, position.y, position.z, velocity.x, velocity.y, velocity.z
                )?;
                match drag_scale {
                    Some(drag) => write!(f, ", drag = {drag:.4}"),
                    None => Ok(()),
                }
            }
        }
    }
}

#[cfg(test)]
mod observations_test {
    use super::*;

    #[test]
    fn test_display() {
        let obs = Observation::from_site(
            JulianDate::new(2460000.0, 0.5),
            12,
            Site::new(Vector3::new(6_378.0, 0.0, 0.0), Vector3::zeros()),
            Measurement::Range(1_234.5),
        );
        let text = format!("{obs}");
        assert!(text.starts_with("[range       ] MJD 60000.00000000"));
        assert!(text.ends_with("ρ = 1234.500000 km"));
    }

    #[test]
    fn test_kind_ordering() {
        assert!(ObservationKind::Range < ObservationKind::StateVector);
        let obs = Observation::state_vector(
            JulianDate::new(2460000.0, 0.5),
            1,
            Vector3::zeros(),
            Vector3::zeros(),
            None,
        );
        assert_eq!(obs.kind(), ObservationKind::StateVector);
        assert!(obs.site.is_none());
    }
}
