//! # Sensor noise profiles
//!
//! Every observation names the sensor that produced it. The [`SensorRegistry`] maps that id
//! to a [`SensorProfile`] holding the 1-σ noise of each measured component; observation
//! weights are `1/σ²`.
//!
//! Profiles can be registered programmatically or read from CSV with
//! [`SensorRegistry::from_csv_reader`]. The CSV header is:
//!
//! ```text
//! sensor_id,range_km,azimuth_deg,elevation_deg,right_ascension_deg,declination_deg,position_km,velocity_km_s,drag_scale
//! ```
//!
//! Angular sigmas are given in degrees in the file and stored in radians.

use std::{collections::HashMap, io::Read};

use serde::Deserialize;

use crate::{
    constants::{Kilometer, Radian, SensorId},
    od_errors::OdError,
};

/// 1-σ measurement noise of a sensor, per observation component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorProfile {
    pub range: Kilometer,
    pub azimuth: Radian,
    pub elevation: Radian,
    pub right_ascension: Radian,
    pub declination: Radian,
    /// Cartesian position component, km.
    pub position: Kilometer,
    /// Cartesian velocity component, km/s.
    pub velocity: f64,
    pub drag_scale: f64,
}

impl Default for SensorProfile {
    fn default() -> Self {
        SensorProfile {
            range: 0.01,
            azimuth: 0.01_f64.to_radians(),
            elevation: 0.01_f64.to_radians(),
            right_ascension: 0.001_f64.to_radians(),
            declination: 0.001_f64.to_radians(),
            position: 0.1,
            velocity: 1e-4,
            drag_scale: 0.1,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SensorRecord {
    sensor_id: SensorId,
    range_km: f64,
    azimuth_deg: f64,
    elevation_deg: f64,
    right_ascension_deg: f64,
    declination_deg: f64,
    position_km: f64,
    velocity_km_s: f64,
    drag_scale: f64,
}

impl From<SensorRecord> for SensorProfile {
    fn from(record: SensorRecord) -> Self {
        SensorProfile {
            range: record.range_km,
            azimuth: record.azimuth_deg.to_radians(),
            elevation: record.elevation_deg.to_radians(),
            right_ascension: record.right_ascension_deg.to_radians(),
            declination: record.declination_deg.to_radians(),
            position: record.position_km,
            velocity: record.velocity_km_s,
            drag_scale: record.drag_scale,
        }
    }
}

/// Lookup table `sensor id → noise profile`.
#[derive(Debug, Clone, Default)]
pub struct SensorRegistry {
    profiles: HashMap<SensorId, SensorProfile>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the profile of `id`.
    pub fn insert(&mut self, id: SensorId, profile: SensorProfile) -> Option<SensorProfile> {
        self.profiles.insert(id, profile)
    }

    /// Noise profile of a sensor.
    ///
    /// Errors
    /// ------
    /// * [`OdError::UnknownSensor`] if no profile is registered for `id`.
    pub fn profile(&self, id: SensorId) -> Result<&SensorProfile, OdError> {
        self.profiles.get(&id).ok_or(OdError::UnknownSensor(id))
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Build a registry from CSV records (header required).
    ///
    /// A duplicated sensor id keeps the last record.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, OdError> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut registry = SensorRegistry::new();
        for record in csv_reader.deserialize::<SensorRecord>() {
            let record = record?;
            registry.insert(record.sensor_id, record.into());
        }
        Ok(registry)
    }
}

impl FromIterator<(SensorId, SensorProfile)> for SensorRegistry {
    fn from_iter<T: IntoIterator<Item = (SensorId, SensorProfile)>>(iter: T) -> Self {
        SensorRegistry {
            profiles: iter.into_iter().collect(),
        }
    }
}
