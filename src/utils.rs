use crate::dimensions::{Matrix3, Vector3};

/// Returns the right-handed rotation matrix about the first axis (positive
/// angle rotates vectors counterclockwise when looking down the axis).
pub fn r1(angle_rad: f64) -> Matrix3<f64> {
    let (s, c) = angle_rad.sin_cos();
    Matrix3::new(1.0, 0.0, 0.0, 0.0, c, -s, 0.0, s, c)
}

/// Returns the right-handed rotation matrix about the second axis.
pub fn r2(angle_rad: f64) -> Matrix3<f64> {
    let (s, c) = angle_rad.sin_cos();
    Matrix3::new(c, 0.0, s, 0.0, 1.0, 0.0, -s, 0.0, c)
}

/// Returns the right-handed rotation matrix about the third axis.
pub fn r3(angle_rad: f64) -> Matrix3<f64> {
    let (s, c) = angle_rad.sin_cos();
    Matrix3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0)
}

/// Direction cosine matrix from body to parent coordinates for a
/// roll-pitch-yaw Euler sequence (yaw about Z, then pitch about Y, then roll
/// about X).
pub fn dcm_from_eulers(roll: f64, pitch: f64, yaw: f64) -> Matrix3<f64> {
    r3(yaw) * r2(pitch) * r1(roll)
}

/// Mapping matrix `E` from Euler angle rates to body angular rates for the
/// roll-pitch-yaw sequence: `omega_body = E * eulers_dot`.
pub fn euler_rate_map(roll: f64, pitch: f64) -> Matrix3<f64> {
    let (s_phi, c_phi) = roll.sin_cos();
    let (s_tht, c_tht) = pitch.sin_cos();
    Matrix3::new(
        1.0,
        0.0,
        -s_tht,
        0.0,
        c_phi,
        s_phi * c_tht,
        0.0,
        -s_phi,
        c_phi * c_tht,
    )
}

/// Time derivative of [euler_rate_map] for the given Euler angles and rates,
/// needed to map Euler accelerations to body angular accelerations:
/// `alpha_body = E * eulers_ddot + E_dot * eulers_dot`.
pub fn euler_rate_map_dot(roll: f64, pitch: f64, roll_dt: f64, pitch_dt: f64) -> Matrix3<f64> {
    let (s_phi, c_phi) = roll.sin_cos();
    let (s_tht, c_tht) = pitch.sin_cos();
    Matrix3::new(
        0.0,
        0.0,
        -c_tht * pitch_dt,
        0.0,
        -s_phi * roll_dt,
        c_phi * roll_dt * c_tht - s_phi * s_tht * pitch_dt,
        0.0,
        -c_phi * roll_dt,
        -s_phi * roll_dt * c_tht - c_phi * s_tht * pitch_dt,
    )
}

/// Wraps the provided angle into (-pi, pi].
pub fn wrap_angle_rad(angle: f64) -> f64 {
    use std::f64::consts::PI;
    let mut wrapped = angle % (2.0 * PI);
    if wrapped > PI {
        wrapped -= 2.0 * PI;
    } else if wrapped <= -PI {
        wrapped += 2.0 * PI;
    }
    wrapped
}

/// Extracts the roll-pitch-yaw Euler angles from a body-to-parent direction
/// cosine matrix. At the pitch singularity (`|cos(pitch)| ~ 0`), the roll
/// angle is reported as zero and yaw absorbs the full in-plane rotation.
pub fn eulers_from_dcm(dcm: &Matrix3<f64>) -> Vector3<f64> {
    let pitch = (-dcm[(2, 0)]).asin();
    if dcm[(2, 0)].abs() > 1.0 - 1e-12 {
        let yaw = (-dcm[(0, 1)]).atan2(dcm[(1, 1)]);
        Vector3::new(0.0, pitch, yaw)
    } else {
        let roll = dcm[(2, 1)].atan2(dcm[(2, 2)]);
        let yaw = dcm[(1, 0)].atan2(dcm[(0, 0)]);
        Vector3::new(roll, pitch, yaw)
    }
}
