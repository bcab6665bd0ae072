use crate::containers::{ContainerEntry, StateMap};
use crate::dimensions::DVector;
use crate::kinematics::{cartesian_to_spherical, AngleUnit, CoordinateSystem, MotionState};
use rand::thread_rng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::FRAC_PI_2;

/// The fixed state names of a radar measurement.
pub mod keys {
    pub const AZIMUTH: &str = "azimuth";
    pub const ZENITH: &str = "zenith";
    pub const ELEVATION: &str = "elevation";
    pub const RANGE: &str = "range";
    pub const RANGE_RATE: &str = "rangeRate";
}

/// A radar measurement: a state map with the fixed keys azimuth, zenith,
/// range and range rate, an angle unit discriminator and a timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct RadarMeasurement {
    track_id: String,
    angle_units: AngleUnit,
    state: StateMap,
}

impl RadarMeasurement {
    /// Initializes a zeroed measurement for a track at the given time, in
    /// radians.
    pub fn new(track_id: &str, time: f64) -> Self {
        let mut state = StateMap::at_time(time);
        state.set(keys::AZIMUTH, 0.0);
        state.set(keys::ZENITH, 0.0);
        state.set(keys::RANGE, 0.0);
        state.set(keys::RANGE_RATE, 0.0);
        Self {
            track_id: track_id.to_string(),
            angle_units: AngleUnit::Radians,
            state,
        }
    }

    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    pub fn angle_units(&self) -> AngleUnit {
        self.angle_units
    }

    pub fn azimuth(&self) -> f64 {
        self.state.get_or_zero(keys::AZIMUTH)
    }

    pub fn zenith(&self) -> f64 {
        self.state.get_or_zero(keys::ZENITH)
    }

    /// The elevation angle derived from the zenith.
    pub fn elevation(&self) -> f64 {
        let quarter_turn = match self.angle_units {
            AngleUnit::Degrees => 90.0,
            AngleUnit::Radians => FRAC_PI_2,
        };
        quarter_turn - self.zenith()
    }

    pub fn range(&self) -> f64 {
        self.state.get_or_zero(keys::RANGE)
    }

    pub fn range_rate(&self) -> f64 {
        self.state.get_or_zero(keys::RANGE_RATE)
    }

    pub fn set_azimuth(&mut self, azimuth: f64) {
        self.state.set(keys::AZIMUTH, azimuth);
    }

    pub fn set_zenith(&mut self, zenith: f64) {
        self.state.set(keys::ZENITH, zenith);
    }

    pub fn set_range(&mut self, range: f64) {
        self.state.set(keys::RANGE, range);
    }

    pub fn set_range_rate(&mut self, range_rate: f64) {
        self.state.set(keys::RANGE_RATE, range_rate);
    }

    pub fn time(&self) -> f64 {
        self.state.time()
    }

    pub fn state_map(&self) -> &StateMap {
        &self.state
    }

    /// Converts the angular states between degrees and radians.
    pub fn convert_angle_units(&mut self, units: AngleUnit) {
        if self.angle_units != units {
            let factor = self.angle_units.to_radians_factor() / units.to_radians_factor();
            self.state.set(keys::AZIMUTH, self.azimuth() * factor);
            self.state.set(keys::ZENITH, self.zenith() * factor);
            self.angle_units = units;
        }
    }

    /// The measurement as a filter observation vector ordered as
    /// `(azimuth, zenith, range, range rate)`, with angles in radians.
    pub fn to_observation(&self) -> DVector<f64> {
        let factor = self.angle_units.to_radians_factor();
        DVector::from_column_slice(&[
            self.azimuth() * factor,
            self.zenith() * factor,
            self.range(),
            self.range_rate(),
        ])
    }
}

impl ContainerEntry for RadarMeasurement {
    type Id = String;

    fn entry_id(&self) -> String {
        self.track_id.clone()
    }

    fn time(&self) -> f64 {
        self.state.time()
    }
}

/// A radar sensor simulator: observes a truth motion state and produces a
/// noisy measurement per channel.
#[derive(Debug, Clone)]
pub struct RadarSensor {
    pub name: String,
    azimuth_noise: Normal<f64>,
    zenith_noise: Normal<f64>,
    range_noise: Normal<f64>,
    range_rate_noise: Normal<f64>,
    sigmas: StateMap,
}

impl RadarSensor {
    /// Initializes a sensor from the per-channel standard deviations (angles
    /// in radians).
    pub fn from_noise_values(
        name: &str,
        azimuth_sigma: f64,
        zenith_sigma: f64,
        range_sigma: f64,
        range_rate_sigma: f64,
    ) -> Self {
        let mut sigmas = StateMap::new();
        sigmas.set(keys::AZIMUTH, azimuth_sigma);
        sigmas.set(keys::ZENITH, zenith_sigma);
        sigmas.set(keys::RANGE, range_sigma);
        sigmas.set(keys::RANGE_RATE, range_rate_sigma);
        Self {
            name: name.to_string(),
            azimuth_noise: Normal::new(0.0, azimuth_sigma).unwrap(),
            zenith_noise: Normal::new(0.0, zenith_sigma).unwrap(),
            range_noise: Normal::new(0.0, range_sigma).unwrap(),
            range_rate_noise: Normal::new(0.0, range_rate_sigma).unwrap(),
            sigmas,
        }
    }

    /// The per-channel measurement standard deviations.
    pub fn measurement_sigmas(&self) -> &StateMap {
        &self.sigmas
    }

    /// Performs a measurement of the truth motion state (whose payload must
    /// be expressed relative to this sensor).
    pub fn measure(&self, track_id: &str, truth: &MotionState) -> RadarMeasurement {
        let mut rng = thread_rng();
        let mut cart = truth.clone();
        cart.to_coordinate_system(CoordinateSystem::Cartesian);
        let triples = cartesian_to_spherical(
            &cart.state().position,
            &cart.state().velocity,
            &cart.state().acceleration,
        );

        let mut measurement = RadarMeasurement::new(track_id, truth.t());
        measurement.set_azimuth(triples.angles[0] + self.azimuth_noise.sample(&mut rng));
        measurement.set_zenith(triples.angles[1] + self.zenith_noise.sample(&mut rng));
        measurement.set_range(triples.angles[2] + self.range_noise.sample(&mut rng));
        measurement.set_range_rate(triples.rates[2] + self.range_rate_noise.sample(&mut rng));
        measurement
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elevation_complements_zenith() {
        let mut measurement = RadarMeasurement::new("trk-1", 0.0);
        measurement.set_zenith(FRAC_PI_2);
        assert!(measurement.elevation().abs() < 1e-12);
        measurement.convert_angle_units(AngleUnit::Degrees);
        assert!((measurement.zenith() - 90.0).abs() < 1e-9);
        assert!(measurement.elevation().abs() < 1e-9);
    }

    #[test]
    fn observation_ordering() {
        let mut measurement = RadarMeasurement::new("trk-1", 1.0);
        measurement.set_azimuth(0.1);
        measurement.set_zenith(0.2);
        measurement.set_range(500.0);
        measurement.set_range_rate(-10.0);
        let z = measurement.to_observation();
        assert_eq!(z.len(), 4);
        assert_eq!(z[2], 500.0);
        assert_eq!(z[3], -10.0);
    }
}
