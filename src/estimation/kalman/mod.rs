use crate::dimensions::{DMatrix, DVector};
use crate::errors::KinError;
use crate::estimation::{AppliedFilter, FilterCore};
use crate::linalg::{outer_product, MatrixExt};

/// Provides the extended Kalman filter with adaptive process noise and
/// reverse-prediction covariance inflation.
pub mod extended;

/// Provides the linear Kalman filter.
pub mod linear;

/// Provides the unscented Kalman filter.
pub mod unscented;

/// Reverse prediction diagnostic shared by the extended and linear filters:
/// the posterior estimate is retrocast one step, and when the normalized
/// residual mismatch between the two steps exceeds `lambda`, the residual
/// covariance is inflated and returned for a gain recomputation.
///
/// Must be called with `core.xh` already holding the posterior estimate and
/// `core.p` still holding the pre-update covariance.
pub(crate) fn reverse_prediction(
    applied: &dyn AppliedFilter,
    core: &FilterCore,
    h: &DMatrix<f64>,
    s: &DMatrix<f64>,
    v: &DVector<f64>,
    z: &DVector<f64>,
    lambda: f64,
) -> Result<Option<DMatrix<f64>>, KinError> {
    let a = applied.dynamics_jacobian(core.dt, &core.xh);
    let x_retro = a.try_inverse_or_err()? * &core.xh;
    let yh_retro = applied.measurement_model(core, &x_retro, None);
    let w = applied.measurement_residual(&yh_retro, z);

    let s_inv = s.try_inverse_or_err()?;
    let eps_k = (w.transpose() * &s_inv * &w)[(0, 0)];
    let eps_k1 = (v.transpose() * &s_inv * v)[(0, 0)];
    if eps_k1 == 0.0 {
        return Ok(None);
    }

    let ratio = (eps_k - eps_k1).abs() / eps_k1;
    if ratio <= lambda {
        return Ok(None);
    }

    // S = H (A P A^T + ratio Q) H^T + R, with the pre-update covariance
    let inflated = (&a * &core.p).post_multiply_transpose(&a)? + &core.q * ratio;
    let s_new = (h * inflated).post_multiply_transpose(h)? + &core.r;
    Ok(Some(s_new))
}

/// Moving-window adaptive estimation of the process covariance, applied after
/// the measurement update when the window `gamma` is positive.
pub(crate) fn adapt_process_covariance(
    core: &mut FilterCore,
    x_prior: &DVector<f64>,
    p_prior: &DMatrix<f64>,
    gamma: f64,
) {
    if gamma <= 0.0 {
        return;
    }
    let q_residual = &core.xh - x_prior;
    let estimate = outer_product(&q_residual, &q_residual) + &core.p - p_prior - &core.q;
    core.q += estimate / gamma;
}
