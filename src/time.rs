//! # Observation epochs
//!
//! Epochs are carried as a split Julian date ([`JulianDate`]): an integral Julian day
//! number plus the fraction of day. Keeping the two parts apart preserves sub-millisecond
//! resolution when differences of a few seconds are taken between epochs near JD 2.46e6.
//!
//! Conversions to and from [`hifitime::Epoch`] are provided for callers building
//! observation batches from calendar dates.

use hifitime::Epoch;
use serde::{Deserialize, Serialize};

use crate::constants::{Seconds, DPI, JDTOMJD, SECONDS_PER_DAY, T2000};

/// Julian date split into an integral day and a day fraction.
///
/// The fraction is kept in `[0, 1)` by [`JulianDate::new`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JulianDate {
    pub day: f64,
    pub fraction: f64,
}

impl JulianDate {
    /// Build a normalized Julian date.
    ///
    /// Arguments
    /// ---------
    /// * `day`: Julian day (any fractional part is moved into `fraction`).
    /// * `fraction`: fraction of day, may lie outside `[0, 1)`.
    pub fn new(day: f64, fraction: f64) -> Self {
        let whole = day.floor();
        let mut fraction = fraction + (day - whole);
        let carry = fraction.floor();
        fraction -= carry;
        JulianDate {
            day: whole + carry,
            fraction,
        }
    }

    /// Convert a `hifitime` epoch (UTC scale) into a split Julian date.
    pub fn from_epoch(epoch: &Epoch) -> Self {
        let mjd = epoch.to_mjd_utc_days();
        let whole = mjd.floor();
        // JD = MJD + 2400000.5: move the half day into the fraction
        JulianDate::new(whole + (JDTOMJD - 0.5), mjd - whole + 0.5)
    }

    /// Convert back to a `hifitime` epoch in the UTC scale.
    pub fn to_epoch(&self) -> Epoch {
        Epoch::from_mjd_utc(self.to_mjd())
    }

    /// Modified Julian Date as a single float.
    pub fn to_mjd(&self) -> f64 {
        (self.day - JDTOMJD) + self.fraction
    }

    /// Signed elapsed time from `origin` to `self`, in seconds.
    pub fn seconds_since(&self, origin: &JulianDate) -> Seconds {
        ((self.day - origin.day) + (self.fraction - origin.fraction)) * SECONDS_PER_DAY
    }

    /// Epoch shifted by `dt` seconds.
    pub fn add_seconds(&self, dt: Seconds) -> JulianDate {
        JulianDate::new(self.day, self.fraction + dt / SECONDS_PER_DAY)
    }
}

/// Compute the Greenwich Mean Sidereal Time (GMST) at a given MJD (UT1 ≈ UTC here).
///
/// Arguments
/// ---------
/// * `tjm`: Modified Julian Date.
///
/// Return
/// ------
/// * GMST in radians, normalized to `[0, 2π)`.
///
/// # References
/// * IAU 1982, Explanatory Supplement to the Astronomical Almanac (1992).
pub fn gmst(tjm: f64) -> f64 {
    // Polynomial coefficients for GMST at 0h UT1 (in seconds)
    const C0: f64 = 24110.54841;
    const C1: f64 = 8640184.812866;
    const C2: f64 = 9.3104e-2;
    const C3: f64 = -6.2e-6;

    // Ratio of sidereal day to solar day
    const RAP: f64 = 1.00273790934;

    let itjm = tjm.floor();
    let t = (itjm - T2000) / 36525.0;

    let gmst0 = (((C3 * t + C2) * t + C1) * t + C0) * DPI / SECONDS_PER_DAY;

    let h = (tjm - itjm) * DPI;
    (gmst0 + h * RAP).rem_euclid(DPI)
}
