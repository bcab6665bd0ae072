use super::{adapt_process_covariance, reverse_prediction};
use crate::dimensions::{DMatrix, DVector};
use crate::errors::KinError;
use crate::estimation::{AppliedFilter, Filter, FilterCore};
use crate::linalg::MatrixExt;

/// An extended Kalman filter driven by a pluggable applied filter, with
/// optional adaptive process noise estimation and reverse-prediction
/// covariance inflation.
pub struct ExtendedKalman {
    pub(crate) core: FilterCore,
    pub(crate) applied: Option<Box<dyn AppliedFilter>>,
    /// Adaptive process noise window size; zero disables
    pub(crate) gamma: f64,
    /// Reverse prediction norm residual ratio threshold; zero disables
    pub(crate) lambda: f64,
}

impl Default for ExtendedKalman {
    fn default() -> Self {
        Self {
            core: FilterCore::new(),
            applied: None,
            gamma: 0.0,
            lambda: 0.0,
        }
    }
}

impl ExtendedKalman {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_applied(applied: Box<dyn AppliedFilter>) -> Self {
        Self {
            applied: Some(applied),
            ..Self::default()
        }
    }

    pub fn set_applied(&mut self, applied: Box<dyn AppliedFilter>) {
        self.applied = Some(applied);
    }

    /// Drops the applied filter, returning it to the caller. The filter is
    /// uninitialized afterwards.
    pub fn take_applied(&mut self) -> Option<Box<dyn AppliedFilter>> {
        self.core.initialized = false;
        self.applied.take()
    }

    pub fn applied(&self) -> Option<&dyn AppliedFilter> {
        self.applied.as_deref()
    }

    pub fn adaptive_window(&self) -> f64 {
        self.gamma
    }

    /// Sets the adaptive process noise window size; negative values reset to
    /// zero with a warning.
    pub fn set_adaptive_window(&mut self, window: f64) {
        if window >= 0.0 {
            self.gamma = window;
        } else {
            self.gamma = 0.0;
            warn!(
                "invalid adaptive window size specified in configuration, resetting to {}",
                self.gamma
            );
        }
    }

    pub fn adaptive_norm_residual_threshold(&self) -> f64 {
        self.lambda
    }

    /// Sets the reverse prediction norm residual ratio threshold; a value
    /// greater than zero enables the diagnostic.
    pub fn set_adaptive_norm_residual_threshold(&mut self, lambda: f64) {
        self.lambda = if lambda > 0.0 { lambda } else { 0.0 };
    }

    fn applied_or_warn(&self) -> Result<&dyn AppliedFilter, KinError> {
        match self.applied.as_deref() {
            Some(applied) => Ok(applied),
            None => {
                warn!("applied estimation filter is null! A selection must be made before the object can be used");
                Err(KinError::Uninitialized)
            }
        }
    }

    fn check_ready(&self) -> Result<(), KinError> {
        self.applied_or_warn()?;
        if !self.core.initialized {
            warn!("filter has not been initialized");
            return Err(KinError::Uninitialized);
        }
        Ok(())
    }
}

impl Filter for ExtendedKalman {
    fn initialize(&mut self, dt: f64) -> Result<(), KinError> {
        self.core.dt = dt;
        self.core.initialized = false;
        self.applied_or_warn()?;
        let mut applied = self.applied.take().unwrap();
        let outcome = applied.initialize(&mut self.core);
        self.applied = Some(applied);
        outcome?;
        if self.core.xh.is_empty() {
            warn!("a non-empty initial state estimate must be supplied for initialization");
            return Err(KinError::Uninitialized);
        }
        self.core.initialized = true;
        Ok(())
    }

    fn time_update(&mut self, u: Option<&DVector<f64>>) -> Result<(), KinError> {
        self.check_ready()?;
        let applied = self.applied.as_deref().unwrap();
        let a = applied.dynamics_jacobian(self.core.dt, &self.core.xh);
        // project the state ahead
        let projected = applied.dynamics_model(&self.core, self.core.dt, &self.core.xh, u);
        // project the error covariance ahead
        self.core.p = (&a * &self.core.p).post_multiply_transpose(&a)? + &self.core.q;
        self.core.xh = projected;
        Ok(())
    }

    fn measurement_update(&mut self, z: &DVector<f64>) -> Result<(), KinError> {
        self.check_ready()?;
        if z.is_empty() {
            warn!("measurement vector is empty");
            return Err(KinError::EmptyMeasurement);
        }

        let mut z = z.clone();
        {
            let dt = self.core.dt;
            let applied = self.applied.as_deref_mut().unwrap();
            applied.pre_process_measurement(&mut z, dt);
        }
        let applied = self.applied.as_deref().unwrap();

        let p_prior = self.core.p.clone();
        let x_prior = self.core.xh.clone();

        let h = applied.measurement_jacobian(&x_prior);
        let mut s = (&h * &p_prior).post_multiply_transpose(&h)? + &self.core.r;
        let mut gain = p_prior.post_multiply_transpose(&h)?.try_mul(&s.try_inverse_or_err()?)?;

        let yh = applied.measurement_model(&self.core, &x_prior, None);
        let v = applied.measurement_residual(&yh, &z);
        self.core.xh = &x_prior + &gain * &v;

        if self.lambda > 0.0 {
            if let Some(inflated) =
                reverse_prediction(applied, &self.core, &h, &s, &v, &z, self.lambda)?
            {
                s = inflated;
                gain = p_prior.post_multiply_transpose(&h)?.try_mul(&s.try_inverse_or_err()?)?;
                self.core.xh = &x_prior + &gain * &v;
            }
        }

        let identity = DMatrix::<f64>::identity(x_prior.len(), x_prior.len());
        self.core.p = (identity - &gain * &h).try_mul(&p_prior)?;

        adapt_process_covariance(&mut self.core, &x_prior, &p_prior, self.gamma);
        Ok(())
    }

    fn core(&self) -> &FilterCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut FilterCore {
        &mut self.core
    }
}
