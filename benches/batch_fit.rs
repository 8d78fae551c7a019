use criterion::{black_box, criterion_group, criterion_main, Criterion};

use batch_od::constants::EarthModel;
use batch_od::estimation::controller::BatchLeastSquares;
use batch_od::estimation::EstimatorOptions;
use batch_od::geometry::{Geometry, TopocentricGeometry};
use batch_od::observations::{Measurement, Observation};
use batch_od::observers::sensors::{SensorProfile, SensorRegistry};
use batch_od::observers::Site;
use batch_od::orbit_type::keplerian_element::KeplerianElements;
use batch_od::orbit_type::{ElementSet, NativeState, OrbitalElements};
use batch_od::parameterization::StateParameterization;
use batch_od::propagation::{Propagator, TwoBodyPropagator};
use batch_od::time::JulianDate;

fn leo(semi_major_axis: f64, mean_anomaly: f64) -> NativeState {
    NativeState::new(
        OrbitalElements::Keplerian(KeplerianElements {
            semi_major_axis,
            eccentricity: 0.01,
            inclination: 0.9,
            ascending_node_longitude: 0.5,
            periapsis_argument: 1.0,
            mean_anomaly,
        }),
        None,
    )
}

/// Noiseless range/azimuth/elevation track from a single station.
fn track(truth: &NativeState, epoch: &JulianDate, count: usize) -> Vec<Observation> {
    let earth = EarthModel::default();
    let propagator = TwoBodyPropagator::new(earth);
    let geometry = TopocentricGeometry::new(&earth);

    (0..count)
        .map(|k| {
            let dt = 60.0 * k as f64;
            let t = epoch.add_seconds(dt);
            let state = propagator
                .propagate(truth, epoch, dt)
                .unwrap()
                .cartesian(earth.mu)
                .unwrap();
            let site = Site::from_geodetic(20.7, -156.3, 3.0, &t, &earth);
            let view = geometry.observe(&state, &site);
            Observation::from_site(
                t,
                1,
                site,
                Measurement::RangeAzEl {
                    range: view.range,
                    azimuth: view.azimuth,
                    elevation: view.elevation,
                },
            )
        })
        .collect()
}

fn bench_batch_fit(c: &mut Criterion) {
    let earth = EarthModel::default();
    let epoch = JulianDate::new(2460000.0, 0.5);
    let propagator = TwoBodyPropagator::new(earth);
    let geometry = TopocentricGeometry::new(&earth);
    let sensors: SensorRegistry = [(1, SensorProfile::default())].into_iter().collect();
    let parameterization =
        StateParameterization::new(ElementSet::Equinoctial, ElementSet::Keplerian, earth);

    let observations = track(&leo(7000.0, 0.3), &epoch, 200);
    let guess = leo(7010.0, 0.29);

    for parallel in [false, true] {
        let options = EstimatorOptions::builder()
            .max_iterations(10)
            .parallel(parallel)
            .build()
            .unwrap();
        let estimator = BatchLeastSquares::new(&propagator, &geometry, &sensors, options);

        let name = if parallel {
            "batch_fit/200_obs_rayon"
        } else {
            "batch_fit/200_obs_sequential"
        };
        c.bench_function(name, |b| {
            b.iter(|| {
                black_box(
                    estimator
                        .run(&guess, &epoch, &parameterization, black_box(&observations))
                        .unwrap(),
                )
            })
        });
    }
}

criterion_group!(benches, bench_batch_fit);
criterion_main!(benches);
