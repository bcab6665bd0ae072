use crate::dimensions::Vector3;
use crate::errors::KinError;
use bytes::{Buf, BufMut};
use std::fmt;

/// Provides the hierarchical reference frame tree and frame states.
pub mod frame;

/// Provides the motion state and the transformation engine across frames.
pub mod motion;

pub use self::frame::{FrameHandle, FrameState, FrameStateKind, FrameTree, TimeReference};
pub use self::motion::{KinematicsConfig, MotionState, MotionStateMap};

/// The default perturbation state tag of a reference frame.
pub const DEFAULT_FRAME_STATE: &str = "default";

/// The unit in which Euler angles, rates and accelerations are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AngleUnit {
    Degrees,
    Radians,
}

impl AngleUnit {
    /// Conversion factor from this unit into radians.
    pub fn to_radians_factor(self) -> f64 {
        match self {
            Self::Degrees => std::f64::consts::PI / 180.0,
            Self::Radians => 1.0,
        }
    }
}

impl fmt::Display for AngleUnit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Degrees => write!(f, "Degrees"),
            Self::Radians => write!(f, "Radians"),
        }
    }
}

/// The type of coordinate system in which a motion state is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinateSystem {
    Cartesian,
    Spherical,
}

impl fmt::Display for CoordinateSystem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Cartesian => write!(f, "Cartesian"),
            Self::Spherical => write!(f, "Spherical"),
        }
    }
}

/// The convention used for the polar angle of a spherical state: measured
/// down from the +Z axis (zenith) or up from the XY plane (elevation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SphericalConvention {
    ZenithFromZ,
    ElevationFromXY,
}

impl Default for SphericalConvention {
    fn default() -> Self {
        Self::ZenithFromZ
    }
}

/// The nine-quantity kinematic payload shared by frame states and motion
/// states: position, velocity, acceleration, and Euler orientation with its
/// first and second time derivatives.
///
/// When the coordinate system of the owning motion state is spherical, the
/// `position` triple holds `(azimuth, polar, range)` and the derivative
/// triples hold the corresponding rates and accelerations.
#[derive(Debug, Clone, PartialEq)]
pub struct KinematicState {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub acceleration: Vector3<f64>,
    /// Euler angles in roll, pitch, yaw order
    pub eulers: Vector3<f64>,
    pub euler_rates: Vector3<f64>,
    pub euler_accels: Vector3<f64>,
    pub angle_units: AngleUnit,
}

impl Default for KinematicState {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            acceleration: Vector3::zeros(),
            eulers: Vector3::zeros(),
            euler_rates: Vector3::zeros(),
            euler_accels: Vector3::zeros(),
            angle_units: AngleUnit::Radians,
        }
    }
}

impl KinematicState {
    /// Projects this state forward by `dt` seconds under constant
    /// acceleration, with the Euler angles integrated under constant angular
    /// acceleration.
    pub fn project(&self, dt: f64) -> Self {
        let mut projected = self.clone();
        projected.position += self.velocity * dt + self.acceleration * (0.5 * dt * dt);
        projected.velocity += self.acceleration * dt;
        projected.eulers += self.euler_rates * dt + self.euler_accels * (0.5 * dt * dt);
        projected.euler_rates += self.euler_accels * dt;
        projected
    }

    /// Converts the Euler quantities to the requested angle unit.
    pub fn convert_angle_units(&mut self, units: AngleUnit) {
        if self.angle_units != units {
            let factor = self.angle_units.to_radians_factor() / units.to_radians_factor();
            self.eulers *= factor;
            self.euler_rates *= factor;
            self.euler_accels *= factor;
            self.angle_units = units;
        }
    }

    /// Returns the Euler angles, rates and accelerations in radians.
    pub fn eulers_rad(&self) -> (Vector3<f64>, Vector3<f64>, Vector3<f64>) {
        let factor = self.angle_units.to_radians_factor();
        (
            self.eulers * factor,
            self.euler_rates * factor,
            self.euler_accels * factor,
        )
    }

    /// Serializes the kinematic fields in schema order (position, velocity,
    /// acceleration, Euler angles, rates, accelerations) followed by the
    /// angle unit as a small integer.
    pub fn serialize<B: BufMut>(&self, buf: &mut B) {
        for vector in &[
            &self.position,
            &self.velocity,
            &self.acceleration,
            &self.eulers,
            &self.euler_rates,
            &self.euler_accels,
        ] {
            for i in 0..3 {
                buf.put_f64_le(vector[i]);
            }
        }
        buf.put_u8(match self.angle_units {
            AngleUnit::Degrees => 0,
            AngleUnit::Radians => 1,
        });
    }

    /// Deserializes a payload written by [KinematicState::serialize].
    pub fn deserialize<B: Buf>(buf: &mut B) -> Result<Self, KinError> {
        if buf.remaining() < 18 * 8 + 1 {
            return Err(KinError::LoadingError(
                "truncated kinematic state".to_string(),
            ));
        }
        let mut fields = [Vector3::zeros(); 6];
        for vector in fields.iter_mut() {
            for i in 0..3 {
                vector[i] = buf.get_f64_le();
            }
        }
        let angle_units = match buf.get_u8() {
            0 => AngleUnit::Degrees,
            _ => AngleUnit::Radians,
        };
        Ok(Self {
            position: fields[0],
            velocity: fields[1],
            acceleration: fields[2],
            eulers: fields[3],
            euler_rates: fields[4],
            euler_accels: fields[5],
            angle_units,
        })
    }
}

/// A spherical kinematic triple set: `(azimuth, zenith, range)` and its first
/// and second time derivatives, with the zenith measured down from +Z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphericalTriples {
    pub angles: Vector3<f64>,
    pub rates: Vector3<f64>,
    pub accels: Vector3<f64>,
}

/// Expands spherical position, velocity and acceleration triples into their
/// Cartesian counterparts.
pub fn spherical_to_cartesian(spherical: &SphericalTriples) -> (Vector3<f64>, Vector3<f64>, Vector3<f64>) {
    let (az, ze, r) = (spherical.angles[0], spherical.angles[1], spherical.angles[2]);
    let (azd, zed, rd) = (spherical.rates[0], spherical.rates[1], spherical.rates[2]);
    let (azdd, zedd, rdd) = (spherical.accels[0], spherical.accels[1], spherical.accels[2]);

    let (sin_az, cos_az) = az.sin_cos();
    let (sin_ze, cos_ze) = ze.sin_cos();

    let r_sin_ze = r * sin_ze;
    let x = r_sin_ze * cos_az;
    let y = r_sin_ze * sin_az;
    let z = r * cos_ze;

    let rd_sin_ze = rd * sin_ze;
    let r_zed_cos_ze = z * zed;
    let r_azd_sin_ze = r_sin_ze * azd;
    let xd = (rd_sin_ze + r_zed_cos_ze) * cos_az - r_azd_sin_ze * sin_az;
    let yd = (rd_sin_ze + r_zed_cos_ze) * sin_az + r_azd_sin_ze * cos_az;
    let zd = rd * cos_ze - r * zed * sin_ze;

    let r_azd = r * azd;
    let r_azd_sq = r_azd * azd;
    let r_zed_sq = r * zed * zed;
    let radial = (rdd - r_azd_sq - r_zed_sq) * sin_ze;
    let two_rd_zed_r_zedd = 2.0 * rd * zed + r * zedd;
    let polar = two_rd_zed_r_zedd * cos_ze;
    let azimuthal = (2.0 * rd * azd + r * azdd) * sin_ze;
    let coupling = 2.0 * r_azd * zed * cos_ze;
    let xdd = (radial + polar) * cos_az - (azimuthal + coupling) * sin_az;
    let ydd = (radial + polar) * sin_az + (azimuthal + coupling) * cos_az;
    let zdd = (rdd - r_zed_sq) * cos_ze - two_rd_zed_r_zedd * sin_ze;

    (
        Vector3::new(x, y, z),
        Vector3::new(xd, yd, zd),
        Vector3::new(xdd, ydd, zdd),
    )
}

/// Reduces Cartesian position, velocity and acceleration to the spherical
/// triples. At `range == 0` (and on the Z axis for the azimuthal quantities)
/// the indeterminate angular derivatives are reported as zero.
pub fn cartesian_to_spherical(
    position: &Vector3<f64>,
    velocity: &Vector3<f64>,
    acceleration: &Vector3<f64>,
) -> SphericalTriples {
    let (x, y, z) = (position[0], position[1], position[2]);
    let (xd, yd, zd) = (velocity[0], velocity[1], velocity[2]);
    let (xdd, ydd, zdd) = (acceleration[0], acceleration[1], acceleration[2]);

    let rxy_sq = x * x + y * y;
    let r_sq = rxy_sq + z * z;
    let r = r_sq.sqrt();

    if r == 0.0 {
        return SphericalTriples {
            angles: Vector3::zeros(),
            rates: Vector3::zeros(),
            accels: Vector3::zeros(),
        };
    }

    let az = y.atan2(x);
    let ze = (z / r).max(-1.0).min(1.0).acos();

    let rd = position.dot(velocity) / r;
    let rdd = (velocity.dot(velocity) + position.dot(acceleration)) / r - rd * rd / r;

    let (azd, azdd) = if rxy_sq > 0.0 {
        let cross = x * yd - y * xd;
        let azd = cross / rxy_sq;
        let cross_dot = x * ydd - y * xdd;
        let azdd = cross_dot / rxy_sq - cross * 2.0 * (x * xd + y * yd) / (rxy_sq * rxy_sq);
        (azd, azdd)
    } else {
        (0.0, 0.0)
    };

    let sin_ze = ze.sin();
    let (zed, zedd) = if sin_ze > 0.0 {
        // u = z / r; zenith = acos(u)
        let u_dot = (zd * r - z * rd) / r_sq;
        let zed = -u_dot / sin_ze;
        let u_ddot = (zdd * r - z * rdd) / r_sq - 2.0 * rd * u_dot / r;
        let zedd = (-u_ddot - zed * zed * ze.cos()) / sin_ze;
        (zed, zedd)
    } else {
        (0.0, 0.0)
    };

    SphericalTriples {
        angles: Vector3::new(az, ze, r),
        rates: Vector3::new(azd, zed, rd),
        accels: Vector3::new(azdd, zedd, rdd),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn spherical_round_trip_with_derivatives() {
        let spherical = SphericalTriples {
            angles: Vector3::new(0.4, 1.2, 1500.0),
            rates: Vector3::new(0.01, -0.02, -35.0),
            accels: Vector3::new(1e-4, 2e-4, 0.5),
        };
        let (p, v, a) = spherical_to_cartesian(&spherical);
        let back = cartesian_to_spherical(&p, &v, &a);
        for i in 0..3 {
            assert_relative_eq!(spherical.angles[i], back.angles[i], max_relative = 1e-9);
            assert_relative_eq!(spherical.rates[i], back.rates[i], max_relative = 1e-9);
            assert_relative_eq!(spherical.accels[i], back.accels[i], max_relative = 1e-7);
        }
    }

    #[test]
    fn boresight_measurement_maps_to_x_axis() {
        let spherical = SphericalTriples {
            angles: Vector3::new(0.0, std::f64::consts::FRAC_PI_2, 1000.0),
            rates: Vector3::zeros(),
            accels: Vector3::zeros(),
        };
        let (p, _, _) = spherical_to_cartesian(&spherical);
        assert_relative_eq!(p[0], 1000.0, epsilon = 1e-9);
        assert_relative_eq!(p[1], 0.0, epsilon = 1e-9);
        assert_relative_eq!(p[2], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn zero_range_reports_zero_angular_derivatives() {
        let triples = cartesian_to_spherical(
            &Vector3::zeros(),
            &Vector3::new(1.0, 2.0, 3.0),
            &Vector3::zeros(),
        );
        assert_eq!(triples.rates, Vector3::zeros());
        assert_eq!(triples.accels, Vector3::zeros());
    }

    #[test]
    fn projection_is_constant_acceleration() {
        let mut state = KinematicState::default();
        state.position = Vector3::new(1.0, 0.0, 0.0);
        state.velocity = Vector3::new(1.0, 1.0, 0.0);
        state.acceleration = Vector3::new(0.0, 2.0, 0.0);
        let projected = state.project(2.0);
        assert_relative_eq!(projected.position[0], 3.0);
        assert_relative_eq!(projected.position[1], 6.0);
        assert_relative_eq!(projected.velocity[1], 5.0);
    }

    #[test]
    fn payload_binary_round_trip() {
        let mut state = KinematicState::default();
        state.position = Vector3::new(1.0, 2.0, 3.0);
        state.euler_rates = Vector3::new(0.1, 0.0, -0.3);
        state.angle_units = AngleUnit::Degrees;
        let mut buf = bytes::BytesMut::new();
        state.serialize(&mut buf);
        let back = KinematicState::deserialize(&mut buf.freeze()).unwrap();
        assert_eq!(state, back);
    }
}
