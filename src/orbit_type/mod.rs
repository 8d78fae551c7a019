//! # Orbital element representations
//!
//! This module defines the **orbital state representations** handled by the estimator and
//! the conversions between them:
//!
//! - [`cartesian_element`](crate::orbit_type::cartesian_element): Inertial position/velocity `(r, v)`.
//! - [`keplerian_element`](crate::orbit_type::keplerian_element): Classical elements `(a, e, i, Ω, ω, M)`.
//! - [`equinoctial_element`](crate::orbit_type::equinoctial_element): Non-singular elements
//!   `(a, af, ag, χ, ψ, L)`, well suited to fits near zero eccentricity or inclination.
//!
//! The [`OrbitalElements`] enum is a **type-erased wrapper** over the three sets, and
//! [`ElementSet`] is its data-less tag, used to name a parameterization or the form a
//! propagator consumes.
//!
//! ## Typical workflow
//!
//! ```rust, no_run
//! use nalgebra::Vector3;
//! use batch_od::constants::MU_EARTH;
//! use batch_od::orbit_type::{ElementSet, OrbitalElements};
//! use batch_od::orbit_type::cartesian_element::CartesianState;
//!
//! let state = CartesianState::new(
//!     Vector3::new(7000.0, 0.0, 0.0),
//!     Vector3::new(0.0, 7.5, 1.0),
//! );
//! let elements = OrbitalElements::Cartesian(state);
//! let equinoctial = elements.convert(ElementSet::Equinoctial, MU_EARTH).unwrap();
//! println!("{equinoctial}");
//! ```
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    od_errors::OdError,
    orbit_type::{
        cartesian_element::CartesianState, equinoctial_element::EquinoctialElements,
        keplerian_element::KeplerianElements,
    },
};

/// Inertial position/velocity state.
pub mod cartesian_element;

/// Equinoctial orbital elements and related conversions.
pub mod equinoctial_element;

/// Classical Keplerian elements structure and utilities.
pub mod keplerian_element;

/// Tag naming one of the supported element sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementSet {
    Cartesian,
    Keplerian,
    Equinoctial,
}

impl fmt::Display for ElementSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementSet::Cartesian => "cartesian",
            ElementSet::Keplerian => "keplerian",
            ElementSet::Equinoctial => "equinoctial",
        };
        write!(f, "{name}")
    }
}

/// Orbital state in one of several representations.
///
/// Variants
/// --------
/// * `Cartesian`  : Position/velocity `(r, v)`.
/// * `Keplerian`  : Classical elements `(a, e, i, Ω, ω, M)`; singular at e≈0 and i≈0.
/// * `Equinoctial`: Non-singular elements `(a, af, ag, χ, ψ, L)`.
///
/// All conversions take the gravitational parameter `mu` (km³/s²) explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrbitalElements {
    Cartesian(CartesianState),
    Keplerian(KeplerianElements),
    Equinoctial(EquinoctialElements),
}

impl OrbitalElements {
    /// Tag of the current representation.
    pub fn element_set(&self) -> ElementSet {
        match self {
            OrbitalElements::Cartesian(_) => ElementSet::Cartesian,
            OrbitalElements::Keplerian(_) => ElementSet::Keplerian,
            OrbitalElements::Equinoctial(_) => ElementSet::Equinoctial,
        }
    }

    /// Position and velocity of the state.
    pub fn to_cartesian(&self, mu: f64) -> Result<CartesianState, OdError> {
        match self {
            OrbitalElements::Cartesian(c) => Ok(*c),
            OrbitalElements::Keplerian(k) => k.to_cartesian(mu),
            OrbitalElements::Equinoctial(e) => e.to_cartesian(mu),
        }
    }

    /// Keplerian elements of the state.
    ///
    /// Errors
    /// ------
    /// Returns [`OdError::UnboundOrbit`] if a Cartesian state is not elliptic.
    pub fn to_keplerian(&self, mu: f64) -> Result<KeplerianElements, OdError> {
        match self {
            OrbitalElements::Cartesian(c) => c.to_keplerian(mu),
            OrbitalElements::Keplerian(k) => Ok(*k),
            OrbitalElements::Equinoctial(e) => Ok(KeplerianElements::from(e)),
        }
    }

    /// Equinoctial elements of the state.
    pub fn to_equinoctial(&self, mu: f64) -> Result<EquinoctialElements, OdError> {
        match self {
            OrbitalElements::Cartesian(c) => Ok(EquinoctialElements::from(&c.to_keplerian(mu)?)),
            OrbitalElements::Keplerian(k) => Ok(EquinoctialElements::from(k)),
            OrbitalElements::Equinoctial(e) => Ok(*e),
        }
    }

    /// Convert to the representation named by `set`.
    pub fn convert(&self, set: ElementSet, mu: f64) -> Result<OrbitalElements, OdError> {
        if self.element_set() == set {
            return Ok(*self);
        }
        Ok(match set {
            ElementSet::Cartesian => OrbitalElements::Cartesian(self.to_cartesian(mu)?),
            ElementSet::Keplerian => OrbitalElements::Keplerian(self.to_keplerian(mu)?),
            ElementSet::Equinoctial => OrbitalElements::Equinoctial(self.to_equinoctial(mu)?),
        })
    }
}

/// State handed to and returned by a propagator.
///
/// `elements` is expressed in the propagator's native element set, `drag_scale` carries the
/// optional drag-like seventh fit component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NativeState {
    pub elements: OrbitalElements,
    pub drag_scale: Option<f64>,
}

impl NativeState {
    pub fn new(elements: OrbitalElements, drag_scale: Option<f64>) -> Self {
        NativeState {
            elements,
            drag_scale,
        }
    }

    /// Position and velocity of the state.
    pub fn cartesian(&self, mu: f64) -> Result<CartesianState, OdError> {
        self.elements.to_cartesian(mu)
    }
}

impl fmt::Display for OrbitalElements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrbitalElements::Cartesian(c) => {
                writeln!(f, "[Cartesian representation]")?;
                write!(f, "{c}")
            }
            OrbitalElements::Keplerian(k) => {
                writeln!(f, "[Keplerian representation]")?;
                write!(f, "{k}")
            }
            OrbitalElements::Equinoctial(e) => {
                writeln!(f, "[Equinoctial representation]")?;
                write!(f, "{e}")
            }
        }
    }
}
