//! # Constants and type definitions for batch orbit determination
//!
//! This module centralizes the **physical constants**, **conversion factors**, and **common type
//! definitions** used throughout the crate.
//!
//! ## Overview
//!
//! - Geophysical constants (WGS-84 Earth model)
//! - Unit conversions (degrees ↔ radians, days ↔ seconds)
//! - Core type aliases used across the crate
//! - [`EarthModel`], the explicit physical-constants object handed to the estimator
//!
//! Nothing here is global mutable state: every routine that depends on the Earth model
//! receives an [`EarthModel`] by reference.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

// -------------------------------------------------------------------------------------------------
// Physical constants and unit conversions
// -------------------------------------------------------------------------------------------------

/// 2π, useful for trigonometric conversions
pub const DPI: f64 = 2. * std::f64::consts::PI;

/// Number of seconds in a Julian day
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Offset between Julian Date and Modified Julian Date
pub const JDTOMJD: f64 = 2400000.5;

/// MJD epoch of J2000.0 (2000-01-01 12:00:00 TT)
pub const T2000: f64 = 51544.5;

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

/// Earth gravitational parameter in km³/s² (WGS-84)
pub const MU_EARTH: f64 = 398_600.4418;

/// Earth equatorial radius in km (WGS-84)
pub const EARTH_RADIUS: f64 = 6_378.137;

/// Earth flattening (WGS-84)
pub const EARTH_FLATTENING: f64 = 1.0 / 298.257_223_563;

/// Earth rotation rate in rad/s
pub const EARTH_ROTATION_RATE: f64 = 7.292_115_146_706_979e-5;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Angle in radians
pub type Radian = f64;
/// Distance in kilometers
pub type Kilometer = f64;
/// Duration in seconds
pub type Seconds = f64;
/// Identifier of a tracking sensor
pub type SensorId = u32;

/// Fit-space state vector (6 or 7 components, meaning given by the parameterization).
pub type FitVector = DVector<f64>;

// -------------------------------------------------------------------------------------------------
// Earth model
// -------------------------------------------------------------------------------------------------

/// Physical constants of the central body.
///
/// Units
/// -----
/// * `mu`: km³/s²
/// * `equatorial_radius`: km
/// * `flattening`: unitless
/// * `rotation_rate`: rad/s
///
/// The default is WGS-84.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EarthModel {
    pub mu: f64,
    pub equatorial_radius: Kilometer,
    pub flattening: f64,
    pub rotation_rate: f64,
}

impl EarthModel {
    /// Mean motion (rad/s) of a Keplerian orbit of semi-major axis `a` (km).
    pub fn mean_motion(&self, semi_major_axis: Kilometer) -> f64 {
        (self.mu / semi_major_axis.powi(3)).sqrt()
    }
}

impl Default for EarthModel {
    fn default() -> Self {
        EarthModel {
            mu: MU_EARTH,
            equatorial_radius: EARTH_RADIUS,
            flattening: EARTH_FLATTENING,
            rotation_rate: EARTH_ROTATION_RATE,
        }
    }
}
