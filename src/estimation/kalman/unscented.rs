use crate::dimensions::{DMatrix, DVector};
use crate::errors::KinError;
use crate::estimation::{AppliedFilter, Filter, FilterCore};
use crate::linalg::MatrixExt;

/// An unscented Kalman filter with scaled sigma points propagated through the
/// applied filter's dynamics and measurement models via a Cholesky square
/// root of the error covariance.
pub struct UnscentedKalman {
    core: FilterCore,
    applied: Option<Box<dyn AppliedFilter>>,
    /// Sigma point spreading factor, clamped to [1e-4, 1]
    alpha: f64,
    /// Prior distribution parameter (2 is optimal for Gaussian priors)
    beta: f64,
    /// Secondary spreading factor
    kappa: f64,
    /// Sigma points of the state, one column per point
    chi_x: DMatrix<f64>,
    /// Sigma observations, one column per point
    chi_y: DMatrix<f64>,
    /// Mean weights
    wm: DVector<f64>,
    /// Covariance weights
    wc: DVector<f64>,
    /// Observation estimate
    yh: DVector<f64>,
}

impl Default for UnscentedKalman {
    fn default() -> Self {
        Self {
            core: FilterCore::new(),
            applied: None,
            alpha: 1e-1,
            beta: 2.0,
            kappa: 0.0,
            chi_x: DMatrix::zeros(0, 0),
            chi_y: DMatrix::zeros(0, 0),
            wm: DVector::zeros(0),
            wc: DVector::zeros(0),
            yh: DVector::zeros(0),
        }
    }
}

impl UnscentedKalman {
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

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Sets the sigma point spreading factor, clamping to [1e-4, 1] with a
    /// warning.
    pub fn set_alpha(&mut self, alpha: f64) {
        let mut alpha = alpha;
        if alpha < 1e-4 {
            alpha = 1e-4;
            error!(
                "unscented filter sigma point spreading factor too low, resetting to {}",
                alpha
            );
        }
        if alpha > 1.0 {
            alpha = 1.0;
            error!(
                "unscented filter sigma point spreading factor too high, resetting to {}",
                alpha
            );
        }
        self.alpha = alpha;
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn set_beta(&mut self, beta: f64) {
        self.beta = beta;
    }

    pub fn kappa(&self) -> f64 {
        self.kappa
    }

    pub fn set_kappa(&mut self, kappa: f64) {
        self.kappa = kappa;
    }

    /// The observation estimate from the latest time update.
    pub fn observation_estimate(&self) -> &DVector<f64> {
        &self.yh
    }

    pub fn mean_weights(&self) -> &DVector<f64> {
        &self.wm
    }

    pub fn covariance_weights(&self) -> &DVector<f64> {
        &self.wc
    }

    fn scaling(&self) -> f64 {
        let l = self.core.xh.len() as f64;
        self.alpha * self.alpha * (l + self.kappa) - l
    }

    fn calc_weights(&mut self) {
        let l = self.core.xh.len();
        let n = 1 + 2 * l;
        let lambda = self.scaling();
        let lf = l as f64;

        self.wm = DVector::zeros(n);
        self.wc = DVector::zeros(n);
        self.wm[0] = lambda / (lf + lambda);
        self.wc[0] = self.wm[0] + 1.0 - self.alpha * self.alpha + self.beta;
        for i in 1..n {
            self.wc[i] = 0.5 / (lf + lambda);
            self.wm[i] = self.wc[i];
        }
    }

    /// Computes the 2L + 1 sigma point columns from the Cholesky square root
    /// of `(L + lambda) P`.
    fn calc_sigma_points(&mut self) -> Result<(), KinError> {
        let l = self.core.xh.len();
        let lambda = self.scaling();
        let scaled = &self.core.p * (l as f64 + lambda);
        let root = scaled.cholesky_lower()?;

        for i in 0..l {
            self.chi_x[(i, 0)] = self.core.xh[i];
            for j in 0..l {
                let s_ij = root[(i, j)];
                self.chi_x[(i, j + 1)] = self.core.xh[i] + s_ij;
                self.chi_x[(i, j + l + 1)] = self.core.xh[i] - s_ij;
            }
        }
        Ok(())
    }

    fn check_ready(&self) -> Result<(), KinError> {
        if self.applied.is_none() {
            warn!("applied estimation filter is null! A selection must be made before the object can be used");
            return Err(KinError::Uninitialized);
        }
        if !self.core.initialized {
            warn!("filter has not been initialized");
            return Err(KinError::Uninitialized);
        }
        Ok(())
    }
}

impl Filter for UnscentedKalman {
    fn initialize(&mut self, dt: f64) -> Result<(), KinError> {
        self.core.dt = dt;
        self.core.initialized = false;
        let mut applied = match self.applied.take() {
            Some(applied) => applied,
            None => {
                warn!("applied estimation filter is null! A selection must be made before the object can be used");
                return Err(KinError::Uninitialized);
            }
        };
        let outcome = applied.initialize(&mut self.core);
        self.applied = Some(applied);
        outcome?;
        if self.core.xh.is_empty() {
            warn!("a non-empty initial state estimate vector must be supplied for initialization");
            return Err(KinError::Uninitialized);
        }

        let l = self.core.xh.len();
        let n = self.core.r.nrows();
        self.yh = DVector::zeros(n);
        self.chi_x = DMatrix::zeros(l, 1 + 2 * l);
        self.chi_y = DMatrix::zeros(n, 1 + 2 * l);
        self.calc_weights();
        self.core.initialized = true;
        Ok(())
    }

    fn time_update(&mut self, u: Option<&DVector<f64>>) -> Result<(), KinError> {
        self.check_ready()?;
        self.calc_sigma_points()?;

        let l = self.core.xh.len();
        let n = self.yh.len();
        let count = 1 + 2 * l;
        let applied = self.applied.as_deref().unwrap();

        // propagate the sigma points through the dynamics model and recover
        // the predicted mean
        let mut xh = DVector::zeros(l);
        for i in 0..count {
            let point: DVector<f64> = self.chi_x.column(i).into_owned();
            let propagated = applied.dynamics_model(&self.core, self.core.dt, &point, u);
            for j in 0..l {
                self.chi_x[(j, i)] = propagated[j];
            }
            xh += propagated * self.wm[i];
        }

        // recover the predicted covariance
        let mut p = DMatrix::zeros(l, l);
        for k in 0..count {
            let deviation: DVector<f64> = self.chi_x.column(k).into_owned() - &xh;
            p += crate::linalg::outer_product(&deviation, &deviation) * self.wc[k];
        }
        p += &self.core.q;

        // propagate the same sigma points through the measurement model
        let mut yh = DVector::zeros(n);
        for i in 0..count {
            let point: DVector<f64> = self.chi_x.column(i).into_owned();
            let observed = applied.measurement_model(&self.core, &point, None);
            for j in 0..n {
                self.chi_y[(j, i)] = observed[j];
            }
            yh += observed * self.wm[i];
        }

        self.core.xh = xh;
        self.core.p = p;
        self.yh = yh;
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

        let l = self.core.xh.len();
        let n = self.yh.len();
        let count = 1 + 2 * l;

        let mut p_yy = DMatrix::zeros(n, n);
        let mut p_xy = DMatrix::zeros(l, n);
        for k in 0..count {
            let dy: DVector<f64> = self.chi_y.column(k).into_owned() - &self.yh;
            let dx: DVector<f64> = self.chi_x.column(k).into_owned() - &self.core.xh;
            p_yy += crate::linalg::outer_product(&dy, &dy) * self.wc[k];
            p_xy += crate::linalg::outer_product(&dx, &dy) * self.wc[k];
        }
        p_yy += &self.core.r;

        let gain = p_xy.try_mul(&p_yy.try_inverse_or_err()?)?;
        let v = applied.measurement_residual(&self.yh, &z);
        self.core.xh += &gain * v;
        self.core.p -= (&gain * p_yy).post_multiply_transpose(&gain)?;
        Ok(())
    }

    fn core(&self) -> &FilterCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut FilterCore {
        &mut self.core
    }
}
