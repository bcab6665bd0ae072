extern crate kintrack;

use kintrack::containers::StateMap;
use kintrack::dimensions::{DVector, Vector3};
use kintrack::estimation::applied::measurement::keys;
use kintrack::estimation::applied::{
    ConvertedRadarEstimateTrackFilter, ConvertedRadarMeasurementTrackFilter, RadarMeasurement,
    RadarSensor, RadarTrackFilter,
};
use kintrack::estimation::{
    AppliedFilter, ExtendedKalman, Filter, FilterCore, StrategyKind, UnscentedKalman,
};
use kintrack::io::FilterConfig;
use kintrack::kinematics::{KinematicsConfig, MotionState};

use approx::assert_relative_eq;
use std::f64::consts::FRAC_PI_2;

fn sigmas() -> StateMap {
    let mut sigmas = StateMap::new();
    sigmas.set(keys::AZIMUTH, 1e-3);
    sigmas.set(keys::ZENITH, 1e-3);
    sigmas.set(keys::RANGE, 5.0);
    sigmas.set(keys::RANGE_RATE, 1.0);
    sigmas
}

fn burst(track_filter: &mut RadarTrackFilter) {
    // boresight target at 1 km closing at 20 m/s, three returns
    for i in 0..3 {
        let t = i as f64 * 0.5;
        let mut sample = StateMap::at_time(t);
        sample.set(keys::AZIMUTH, 0.0);
        sample.set(keys::ZENITH, FRAC_PI_2);
        sample.set(keys::RANGE, 1000.0 - 20.0 * t);
        sample.set(keys::RANGE_RATE, -20.0);
        track_filter.push_measurement(sample);
    }
}

fn radar_filter() -> RadarTrackFilter {
    let mut track_filter = RadarTrackFilter::new(StrategyKind::LeastSquares.build());
    track_filter.set_measurement_sigmas(sigmas());
    track_filter.set_maneuver_variance([1.0, 1.0, 1.0]);
    burst(&mut track_filter);
    track_filter
}

#[test]
fn converted_measurement_preprocessing() {
    // az = 0, ze = pi/2, r = 1000 lies on the +X axis
    let base = RadarTrackFilter::new(StrategyKind::Latest.build());
    let mut converted = ConvertedRadarMeasurementTrackFilter::new(base);
    let mut z = DVector::from_column_slice(&[0.0, FRAC_PI_2, 1000.0, -20.0]);
    converted.pre_process_measurement(&mut z, 0.5);

    assert_eq!(z.len(), 3);
    assert_relative_eq!(z[0], 1000.0, epsilon = 1e-9);
    assert_relative_eq!(z[1], 0.0, epsilon = 1e-9);
    assert_relative_eq!(z[2], 0.0, epsilon = 1e-9);
}

#[test]
fn measurement_jacobian_range_row_on_x_axis() {
    let track_filter = radar_filter();
    let x = DVector::from_column_slice(&[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    let h = track_filter.measurement_jacobian(&x);

    let expected = [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
    for (j, &value) in expected.iter().enumerate() {
        assert_relative_eq!(h[(2, j)], value, epsilon = 1e-12);
    }
}

#[test]
fn measurement_jacobian_guards_degenerate_states() {
    let track_filter = radar_filter();
    // on the Z axis the azimuthal partials are indeterminate
    let x = DVector::from_column_slice(&[0.0, 0.0, 10.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    let h = track_filter.measurement_jacobian(&x);
    assert_eq!(h[(0, 0)], 0.0);
    assert_eq!(h[(0, 1)], 0.0);
    assert_eq!(h[(1, 0)], 0.0);

    // at the origin everything is guarded
    let origin = DVector::zeros(9);
    let h = track_filter.measurement_jacobian(&origin);
    for i in 0..4 {
        for j in 0..9 {
            assert_eq!(h[(i, j)], 0.0);
        }
    }
}

#[test]
fn dynamics_jacobian_block_structure() {
    let track_filter = radar_filter();
    let dt = 0.25;
    let f = track_filter.dynamics_jacobian(dt, &DVector::zeros(9));
    for axis in 0..3 {
        assert_relative_eq!(f[(axis, axis)], 1.0);
        assert_relative_eq!(f[(axis, axis + 3)], dt);
        assert_relative_eq!(f[(axis, axis + 6)], 0.5 * dt * dt);
        assert_relative_eq!(f[(axis + 3, axis + 6)], dt);
        assert_relative_eq!(f[(axis + 6, axis + 6)], 1.0);
    }
}

#[test]
fn process_covariance_singer_profile() {
    let mut track_filter = radar_filter();
    track_filter.set_maneuver_variance([2.0, 3.0, 4.0]);
    let dt: f64 = 0.5;
    let q = track_filter.compute_process_covariance(dt);

    assert_relative_eq!(q[(0, 0)], 2.0 * dt.powi(5) / 20.0, epsilon = 1e-15);
    assert_relative_eq!(q[(0, 3)], 2.0 * dt.powi(4) / 8.0, epsilon = 1e-15);
    assert_relative_eq!(q[(1, 7)], 3.0 * dt.powi(3) / 6.0, epsilon = 1e-15);
    assert_relative_eq!(q[(4, 4)], 3.0 * dt.powi(3) / 3.0, epsilon = 1e-15);
    assert_relative_eq!(q[(5, 8)], 4.0 * dt.powi(2) / 2.0, epsilon = 1e-15);
    assert_relative_eq!(q[(8, 8)], 4.0 * dt, epsilon = 1e-15);
    // symmetry
    for i in 0..9 {
        for j in 0..9 {
            assert_relative_eq!(q[(i, j)], q[(j, i)], epsilon = 1e-15);
        }
    }
}

#[test]
fn measurement_covariance_correlation() {
    let mut track_filter = radar_filter();
    track_filter.set_range_rate_correlation(0.5);
    let r = track_filter.compute_measurement_covariance(0.5);

    assert_relative_eq!(r[(0, 0)], 1e-6, epsilon = 1e-18);
    assert_relative_eq!(r[(2, 2)], 25.0);
    assert_relative_eq!(r[(3, 3)], 1.0);
    assert_relative_eq!(r[(2, 3)], 0.5 * 5.0 * 1.0);
    assert_relative_eq!(r[(3, 2)], r[(2, 3)]);

    // out of range correlation resets to zero
    track_filter.set_range_rate_correlation(1.5);
    assert_eq!(track_filter.range_rate_correlation(), 0.0);
}

#[test]
fn initialization_from_measurement_burst() {
    let mut ekf = ExtendedKalman::with_applied(Box::new(radar_filter()));
    ekf.initialize(0.5).unwrap();

    let xh = &ekf.core().xh;
    assert_eq!(xh.len(), 9);
    // boresight target on the +X axis, closing at 20 m/s
    assert_relative_eq!(xh[0], 1000.0 - 20.0, epsilon = 1e-6);
    assert_relative_eq!(xh[1], 0.0, epsilon = 1e-9);
    assert_relative_eq!(xh[2], 0.0, epsilon = 1e-6);
    assert_relative_eq!(xh[3], -20.0, epsilon = 1e-6);

    assert_eq!(ekf.core().p.nrows(), 9);
    assert_eq!(ekf.core().q.nrows(), 9);
    assert_eq!(ekf.core().r.nrows(), 4);
}

#[test]
fn radar_track_filter_converges_on_constant_velocity_target() {
    let mut ekf = ExtendedKalman::with_applied(Box::new(radar_filter()));
    let dt = 0.5;
    ekf.initialize(dt).unwrap();

    // continue the same trajectory: range closing at exactly 20 m/s
    for step in 1..40 {
        let t = 1.0 + step as f64 * dt;
        let range = 1000.0 - 20.0 * t;
        let z = DVector::from_column_slice(&[0.0, FRAC_PI_2, range, -20.0]);
        ekf.time_update(None).unwrap();
        ekf.measurement_update(&z).unwrap();
    }

    let t_final = 1.0 + 39.0 * dt;
    let xh = &ekf.core().xh;
    assert_relative_eq!(xh[0], 1000.0 - 20.0 * t_final, max_relative = 1e-2);
    assert_relative_eq!(xh[3], -20.0, max_relative = 5e-2);
}

#[test]
fn unscented_radar_track_runs() {
    let mut ukf = UnscentedKalman::with_applied(Box::new(radar_filter()));
    ukf.set_alpha(0.5);
    ukf.initialize(0.5).unwrap();

    for step in 1..10 {
        let t = 1.0 + step as f64 * 0.5;
        let range = 1000.0 - 20.0 * t;
        let z = DVector::from_column_slice(&[0.0, FRAC_PI_2, range, -20.0]);
        ukf.time_update(None).unwrap();
        ukf.measurement_update(&z).unwrap();
    }
    assert!(ukf.core().xh[0] > 0.0);
    assert!(ukf.core().xh[3] < 0.0);
}

#[test]
fn converted_estimate_post_processing_expands_to_cartesian() {
    let base = RadarTrackFilter::new(StrategyKind::Latest.build());
    let converted = ConvertedRadarEstimateTrackFilter::new(base);

    // spherical state on the +X axis closing at 20 m/s
    let mut xh = DVector::zeros(9);
    xh[0] = 0.0; // azimuth
    xh[1] = FRAC_PI_2; // zenith
    xh[2] = 1000.0; // range
    xh[5] = -20.0; // range rate
    converted.post_process_filtered(&mut xh, 0.5);

    assert_relative_eq!(xh[0], 1000.0, epsilon = 1e-9);
    assert_relative_eq!(xh[1], 0.0, epsilon = 1e-9);
    assert_relative_eq!(xh[2], 0.0, epsilon = 1e-9);
    assert_relative_eq!(xh[3], -20.0, epsilon = 1e-9);
    assert_relative_eq!(xh[4], 0.0, epsilon = 1e-9);
    assert_relative_eq!(xh[5], 0.0, epsilon = 1e-9);
}

#[test]
fn converted_estimate_initializes_spherical_state() {
    let mut base = RadarTrackFilter::new(StrategyKind::Latest.build());
    base.set_measurement_sigmas(sigmas());
    burst(&mut base);
    let mut converted = ConvertedRadarEstimateTrackFilter::new(base);

    let mut core = FilterCore::new();
    core.dt = 0.5;
    converted.initialize(&mut core).unwrap();

    assert_relative_eq!(core.xh[1], FRAC_PI_2, epsilon = 1e-9);
    assert_relative_eq!(core.xh[2], 1000.0 - 20.0, epsilon = 1e-9);
    assert_relative_eq!(core.xh[5], -20.0, epsilon = 1e-9);
    assert_eq!(core.r.nrows(), 4);
    // the measurement map selects directly out of the spherical state
    let h = core.h.as_ref().unwrap();
    assert_eq!(h.nrows(), 4);
    assert_eq!(h[(3, 5)], 1.0);
}

#[test]
fn sensor_burst_initializes_filter_end_to_end() {
    let _ = pretty_env_logger::try_init();
    let config = KinematicsConfig::default();
    let sensor = RadarSensor::from_noise_values("fan-1", 1e-4, 1e-4, 0.5, 0.1);

    let mut track_filter = RadarTrackFilter::new(StrategyKind::LeastSquares.build());
    track_filter.set_measurement_sigmas(sensor.measurement_sigmas().clone());
    track_filter.set_maneuver_variance([0.5, 0.5, 0.5]);

    // truth: straight and level at (2000, 500, 100), closing
    for i in 0..5 {
        let t = i as f64 * 0.25;
        let mut truth = MotionState::new(&config);
        truth.set_t(t);
        {
            let payload = truth.state_mut();
            payload.position = Vector3::new(2000.0 - 50.0 * t, 500.0, 100.0);
            payload.velocity = Vector3::new(-50.0, 0.0, 0.0);
        }
        let measurement: RadarMeasurement = sensor.measure("fan-1", &truth);
        track_filter.push_measurement(measurement.state_map().clone());
    }

    let mut ekf = ExtendedKalman::with_applied(Box::new(track_filter));
    ekf.initialize(0.25).unwrap();
    let xh = &ekf.core().xh;
    assert_relative_eq!(xh[0], 2000.0 - 50.0, max_relative = 0.05);
    assert_relative_eq!(xh[1], 500.0, max_relative = 0.05);
    assert_relative_eq!(xh[2], 100.0, max_relative = 0.2);
}

#[test]
fn configuration_surface_applies() {
    let toml_content = r#"
        rangeRateMeasurementCorrelationCoefficient = 0.25
        xManeuverVariance = 4.0
        adaptiveProcessNoiseWindowSize = 50.0
        alpha = 0.7
    "#;
    let config = FilterConfig::from_toml_str(toml_content).unwrap();

    let mut track_filter = radar_filter();
    config.apply_to_track_filter(&mut track_filter);
    assert_eq!(track_filter.range_rate_correlation(), 0.25);
    assert_eq!(track_filter.maneuver_variance()[0], 4.0);

    let mut ekf = ExtendedKalman::new();
    config.apply_to_extended(&mut ekf);
    assert_eq!(ekf.adaptive_window(), 50.0);

    let mut ukf = UnscentedKalman::new();
    config.apply_to_unscented(&mut ukf);
    assert_eq!(ukf.alpha(), 0.7);
}
