#![allow(dead_code)]

use approx::assert_relative_eq;
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use batch_od::constants::{EarthModel, SensorId};
use batch_od::geometry::{Geometry, TopocentricGeometry};
use batch_od::observations::{Measurement, Observation};
use batch_od::observers::sensors::{SensorProfile, SensorRegistry};
use batch_od::observers::Site;
use batch_od::orbit_type::cartesian_element::CartesianState;
use batch_od::orbit_type::keplerian_element::KeplerianElements;
use batch_od::orbit_type::{NativeState, OrbitalElements};
use batch_od::propagation::{Propagator, TwoBodyPropagator};
use batch_od::time::JulianDate;

/// Geodetic tracking station: `(sensor id, latitude °, longitude °, height km)`.
pub type Station = (SensorId, f64, f64, f64);

pub const STATIONS: [Station; 2] = [(1, 20.7, -156.3, 3.0), (2, -31.3, 149.1, 1.1)];

pub fn epoch() -> JulianDate {
    JulianDate::new(2460000.0, 0.5)
}

pub fn leo_elements() -> KeplerianElements {
    KeplerianElements {
        semi_major_axis: 7000.0,
        eccentricity: 0.01,
        inclination: 0.9,
        ascending_node_longitude: 0.5,
        periapsis_argument: 1.0,
        mean_anomaly: 0.3,
    }
}

pub fn leo_truth() -> NativeState {
    NativeState::new(OrbitalElements::Keplerian(leo_elements()), None)
}

/// Every Keplerian element of the truth scaled by 1.01.
pub fn one_percent_guess() -> NativeState {
    let k = leo_elements();
    NativeState::new(
        OrbitalElements::Keplerian(KeplerianElements {
            semi_major_axis: k.semi_major_axis * 1.01,
            eccentricity: k.eccentricity * 1.01,
            inclination: k.inclination * 1.01,
            ascending_node_longitude: k.ascending_node_longitude * 1.01,
            periapsis_argument: k.periapsis_argument * 1.01,
            mean_anomaly: k.mean_anomaly * 1.01,
        }),
        None,
    )
}

/// Truth perturbed by a few kilometres in every element.
pub fn perturbed_guess() -> NativeState {
    let k = leo_elements();
    NativeState::new(
        OrbitalElements::Keplerian(KeplerianElements {
            semi_major_axis: k.semi_major_axis * 1.002,
            eccentricity: k.eccentricity * 1.01,
            inclination: k.inclination + 0.002,
            ascending_node_longitude: k.ascending_node_longitude + 0.002,
            periapsis_argument: k.periapsis_argument + 0.01,
            mean_anomaly: k.mean_anomaly - 0.01,
        }),
        None,
    )
}

pub fn registry(profile: SensorProfile) -> SensorRegistry {
    STATIONS.iter().map(|(id, ..)| (*id, profile)).collect()
}

/// Range/azimuth/elevation tracks from every station, `count` epochs `step` seconds apart.
///
/// With `noise`, Gaussian noise with the profile's standard deviations is added.
pub fn simulate_range_az_el(
    truth: &NativeState,
    count: usize,
    step: f64,
    profile: &SensorProfile,
    mut noise: Option<&mut StdRng>,
) -> Vec<Observation> {
    let earth = EarthModel::default();
    let propagator = TwoBodyPropagator::new(earth);
    let geometry = TopocentricGeometry::new(&earth);
    let t0 = epoch();

    let range_noise = Normal::new(0.0, profile.range).unwrap();
    let azimuth_noise = Normal::new(0.0, profile.azimuth).unwrap();
    let elevation_noise = Normal::new(0.0, profile.elevation).unwrap();

    let mut observations = Vec::with_capacity(count * STATIONS.len());
    for k in 0..count {
        let dt = step * k as f64;
        let t = t0.add_seconds(dt);
        let state = propagator
            .propagate(truth, &t0, dt)
            .unwrap()
            .cartesian(earth.mu)
            .unwrap();

        for (id, lat, lon, height) in STATIONS {
            let site = Site::from_geodetic(lat, lon, height, &t, &earth);
            let view = geometry.observe(&state, &site);
            let (mut range, mut azimuth, mut elevation) =
                (view.range, view.azimuth, view.elevation);
            if let Some(rng) = noise.as_deref_mut() {
                range += range_noise.sample(rng);
                azimuth += azimuth_noise.sample(rng);
                elevation += elevation_noise.sample(rng);
            }
            observations.push(Observation::from_site(
                t,
                id,
                site,
                Measurement::RangeAzEl {
                    range,
                    azimuth,
                    elevation,
                },
            ));
        }
    }
    observations
}

/// State-vector observations of a fixed state at `count` epochs one minute apart.
pub fn fixed_state_vectors(
    position: Vector3<f64>,
    drag_scale: Option<f64>,
    count: usize,
) -> Vec<Observation> {
    (0..count)
        .map(|k| {
            Observation::state_vector(
                epoch().add_seconds(60.0 * k as f64),
                1,
                position,
                Vector3::zeros(),
                drag_scale,
            )
        })
        .collect()
}

pub fn assert_position_close(actual: &CartesianState, expected: &CartesianState, epsilon: f64) {
    assert_relative_eq!(actual.position, expected.position, epsilon = epsilon);
}
