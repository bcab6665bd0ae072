use crate::containers::StateMap;
use crate::dimensions::{DMatrix, DVector};
use crate::errors::KinError;
use crate::estimation::applied::measurement::keys;
use crate::estimation::{AggregationStrategy, AppliedFilter, FilterCore};

/// The applied radar track filter. The state vector is nine dimensional
/// (position, velocity and acceleration per axis) and the measurement vector
/// is four dimensional (azimuth, zenith, range, range rate).
pub struct RadarTrackFilter {
    /// Per-axis maneuver variances feeding the process covariance
    maneuver_variance: [f64; 3],
    /// Correlation between the range and range rate measurements
    rho: f64,
    processing_delay: f64,
    /// Measurement standard deviations keyed by the radar state names
    sigmas: StateMap,
    /// Buffered measurement burst consumed at initialization
    measurements: Vec<StateMap>,
    strategy: Box<dyn AggregationStrategy>,
}

impl RadarTrackFilter {
    pub fn new(strategy: Box<dyn AggregationStrategy>) -> Self {
        Self {
            maneuver_variance: [0.0; 3],
            rho: 0.0,
            processing_delay: 0.0,
            sigmas: StateMap::new(),
            measurements: Vec::new(),
            strategy,
        }
    }

    pub fn maneuver_variance(&self) -> [f64; 3] {
        self.maneuver_variance
    }

    pub fn set_maneuver_variance(&mut self, variance: [f64; 3]) {
        self.maneuver_variance = variance;
    }

    pub fn range_rate_correlation(&self) -> f64 {
        self.rho
    }

    /// Sets the range to range-rate measurement correlation coefficient;
    /// values outside [0, 1] reset to zero with a warning.
    pub fn set_range_rate_correlation(&mut self, rho: f64) {
        if (0.0..=1.0).contains(&rho) {
            self.rho = rho;
        } else {
            self.rho = 0.0;
            warn!(
                "invalid range-range rate measurement correlation coefficient, resetting to {}",
                self.rho
            );
        }
    }

    pub fn set_processing_delay(&mut self, delay: f64) {
        self.processing_delay = delay;
    }

    /// Sets the per-channel measurement standard deviations. When the zenith
    /// deviation is absent, the elevation deviation is consulted instead (no
    /// conversion is required between the two).
    pub fn set_measurement_sigmas(&mut self, sigmas: StateMap) {
        self.sigmas = sigmas;
    }

    pub fn measurement_sigmas(&self) -> &StateMap {
        &self.sigmas
    }

    fn sigma(&self, name: &str) -> f64 {
        if name == keys::ZENITH && !self.sigmas.contains(keys::ZENITH) {
            return self.sigmas.get_or_zero(keys::ELEVATION);
        }
        self.sigmas.get_or_zero(name)
    }

    /// Buffers a measurement for the initialization burst.
    pub fn push_measurement(&mut self, measurement: StateMap) {
        self.measurements.push(measurement);
    }

    pub fn clear_measurements(&mut self) {
        self.measurements.clear();
    }

    pub fn measurement_count(&self) -> usize {
        self.measurements.len()
    }

    pub(crate) fn strategy_mut(&mut self) -> &mut dyn AggregationStrategy {
        self.strategy.as_mut()
    }

    pub(crate) fn buffered(&self) -> &[StateMap] {
        &self.measurements
    }

    /// Aggregates the buffered measurement burst and converts the spherical
    /// observables into the Cartesian nine-state initial estimate.
    pub fn estimate_initial_state(&mut self) -> Result<DVector<f64>, KinError> {
        let aggregated = self.strategy.aggregate(&self.measurements)?;
        let az = aggregated.get_or_zero(keys::AZIMUTH);
        let ze = aggregated.get_or_zero(keys::ZENITH);
        let r = aggregated.get_or_zero(keys::RANGE);
        let rd = aggregated.get_or_zero(keys::RANGE_RATE);

        let (sin_az, cos_az) = az.sin_cos();
        let (sin_ze, cos_ze) = ze.sin_cos();

        let r_sin_ze = r * sin_ze;
        let x = r_sin_ze * cos_az;
        let y = r_sin_ze * sin_az;
        let z = r * cos_ze;

        // angular rates are not observable from a single aggregated return
        let azd = 0.0;
        let zed = 0.0;
        let rd_sin_ze = rd * sin_ze;
        let r_zed_cos_ze = z * zed;
        let r_azd_sin_ze = r_sin_ze * azd;
        let xd = (rd_sin_ze + r_zed_cos_ze) * cos_az - r_azd_sin_ze * sin_az;
        let yd = (rd_sin_ze + r_zed_cos_ze) * sin_az + r_azd_sin_ze * cos_az;
        let zd = rd * cos_ze - r * zed * sin_ze;

        Ok(DVector::from_column_slice(&[
            x, y, z, xd, yd, zd, 0.0, 0.0, 0.0,
        ]))
    }

    /// Seeds the error covariance from the measurement standard deviations
    /// pushed through the spherical to Cartesian expansion, with the rate and
    /// acceleration deviations derived by dt scaling.
    pub fn compute_error_covariance(&self, _xh: &DVector<f64>, dt: f64) -> DMatrix<f64> {
        let sig_az = self.sigma(keys::AZIMUTH);
        let sig_r = self.sigma(keys::RANGE);
        let sig_rd = self.sigma(keys::RANGE_RATE);
        let sig_ze = self.sigma(keys::ZENITH);

        let sig_azd = sig_az / dt;
        let sig_azdd = sig_azd / dt;
        let sig_zed = sig_ze / dt;
        let sig_zedd = sig_zed / dt;
        let sig_rdd = sig_rd / dt;

        let (sin_az, cos_az) = sig_az.sin_cos();
        let (sin_ze, cos_ze) = sig_ze.sin_cos();

        let r_sin_ze = sig_r * sin_ze;
        let x = r_sin_ze * cos_az;
        let y = r_sin_ze * sin_az;
        let z = sig_r * cos_ze;

        let rd_sin_ze = sig_rd * sin_ze;
        let r_zed_cos_ze = z * sig_zed;
        let r_azd_sin_ze = r_sin_ze * sig_azd;
        let xd = (rd_sin_ze + r_zed_cos_ze) * cos_az - r_azd_sin_ze * sin_az;
        let yd = (rd_sin_ze + r_zed_cos_ze) * sin_az + r_azd_sin_ze * cos_az;
        let zd = sig_rd * cos_ze - sig_r * sig_zed * sin_ze;

        let r_azd = sig_r * sig_azd;
        let r_azd_sq = r_azd * sig_azd;
        let r_zed_sq = sig_r * sig_zed * sig_zed;
        let radial = (sig_rdd - r_azd_sq - r_zed_sq) * sin_ze;
        let two_rd_zed_r_zedd = 2.0 * sig_rd * sig_zed + sig_r * sig_zedd;
        let polar = two_rd_zed_r_zedd * cos_ze;
        let azimuthal = (2.0 * sig_rd * sig_azd + sig_r * sig_azdd) * sin_ze;
        let coupling = 2.0 * r_azd * sig_zed * cos_ze;
        let xdd = (radial + polar) * cos_az - (azimuthal + coupling) * sin_az;
        let ydd = (radial + polar) * sin_az + (azimuthal + coupling) * cos_az;
        let zdd = (sig_rdd - r_zed_sq) * cos_ze - two_rd_zed_r_zedd * sin_ze;

        let mut p = DMatrix::zeros(9, 9);
        for (i, value) in [x, y, z, xd, yd, zd, xdd, ydd, zdd].iter().enumerate() {
            p[(i, i)] = value * value;
        }
        p
    }

    /// The Singer-like process covariance built from the per-axis maneuver
    /// variances.
    pub fn compute_process_covariance(&self, dt: f64) -> DMatrix<f64> {
        let dt2 = dt * dt;
        let dt3 = dt * dt2;
        let dt4 = dt * dt3;
        let dt5 = dt * dt4;

        let mut q = DMatrix::zeros(9, 9);
        for axis in 0..3 {
            let w = self.maneuver_variance[axis];
            q[(axis, axis)] = w * dt5 / 20.0;
            q[(axis, axis + 3)] = w * dt4 / 8.0;
            q[(axis + 3, axis)] = w * dt4 / 8.0;
            q[(axis, axis + 6)] = w * dt3 / 6.0;
            q[(axis + 6, axis)] = w * dt3 / 6.0;
            q[(axis + 3, axis + 3)] = w * dt3 / 3.0;
            q[(axis + 3, axis + 6)] = w * dt2 / 2.0;
            q[(axis + 6, axis + 3)] = w * dt2 / 2.0;
            q[(axis + 6, axis + 6)] = w * dt;
        }
        q
    }

    /// The measurement covariance: diagonal except for the range/range-rate
    /// correlation term.
    pub fn compute_measurement_covariance(&self, _dt: f64) -> DMatrix<f64> {
        let sig_az = self.sigma(keys::AZIMUTH);
        let sig_ze = self.sigma(keys::ZENITH);
        let sig_r = self.sigma(keys::RANGE);
        let sig_rd = self.sigma(keys::RANGE_RATE);

        let mut r = DMatrix::zeros(4, 4);
        r[(0, 0)] = sig_az * sig_az;
        r[(1, 1)] = sig_ze * sig_ze;
        r[(2, 2)] = sig_r * sig_r;
        r[(2, 3)] = self.rho * sig_r * sig_rd;
        r[(3, 2)] = self.rho * sig_r * sig_rd;
        r[(3, 3)] = sig_rd * sig_rd;
        r
    }
}

impl AppliedFilter for RadarTrackFilter {
    fn initialize(&mut self, core: &mut FilterCore) -> Result<(), KinError> {
        let xh = self.estimate_initial_state()?;
        core.h = Some(self.measurement_jacobian(&xh));
        core.p = self.compute_error_covariance(&xh, core.dt);
        core.q = self.compute_process_covariance(core.dt);
        core.r = self.compute_measurement_covariance(core.dt);
        core.xh = xh;
        Ok(())
    }

    /// The block-triangular constant-acceleration transition matrix: each
    /// position row is `[I, dt I, dt^2/2 I]`, each velocity row `[0, I, dt I]`
    /// and each acceleration row `[0, 0, I]`.
    fn dynamics_jacobian(&self, dt: f64, _x: &DVector<f64>) -> DMatrix<f64> {
        let mut f = DMatrix::identity(9, 9);
        for axis in 0..3 {
            f[(axis, axis + 3)] = dt;
            f[(axis, axis + 6)] = 0.5 * dt * dt;
            f[(axis + 3, axis + 6)] = dt;
        }
        f
    }

    fn dynamics_model(
        &self,
        core: &FilterCore,
        dt: f64,
        x: &DVector<f64>,
        u: Option<&DVector<f64>>,
    ) -> DVector<f64> {
        let mut xh = self.dynamics_jacobian(dt, x) * x;
        if let Some(input) = u {
            xh += &core.q * input;
        }
        xh
    }

    /// Exact partial derivatives of `(azimuth, zenith, range, range rate)`
    /// with respect to the nine-state, guarding the divisions by zero.
    fn measurement_jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let mut h = DMatrix::zeros(4, 9);

        let rxy_sq = x[0] * x[0] + x[1] * x[1];
        let r_sq = rxy_sq + x[2] * x[2];
        let r = r_sq.sqrt();

        if rxy_sq > 0.0 {
            h[(0, 0)] = -x[1] / rxy_sq;
            h[(0, 1)] = x[0] / rxy_sq;
        }

        let d = r_sq * (r_sq - x[2] * x[2]).max(0.0).sqrt();
        if d > 0.0 {
            h[(1, 0)] = x[0] * x[2] / d;
            h[(1, 1)] = x[1] * x[2] / d;
            h[(1, 2)] = -d / r_sq / r_sq;
        }

        if r > 0.0 {
            let rd = (x[0] * x[3] + x[1] * x[4] + x[2] * x[5]) / r;
            h[(2, 0)] = x[0] / r;
            h[(2, 1)] = x[1] / r;
            h[(2, 2)] = x[2] / r;

            h[(3, 0)] = (r * x[3] - rd * x[0]) / r_sq;
            h[(3, 1)] = (r * x[4] - rd * x[1]) / r_sq;
            h[(3, 2)] = (r * x[5] - rd * x[2]) / r_sq;
            h[(3, 3)] = h[(2, 0)];
            h[(3, 4)] = h[(2, 1)];
            h[(3, 5)] = h[(2, 2)];
        }

        h
    }

    fn measurement_model(
        &self,
        core: &FilterCore,
        x: &DVector<f64>,
        u: Option<&DVector<f64>>,
    ) -> DVector<f64> {
        let r = (x[0] * x[0] + x[1] * x[1] + x[2] * x[2]).sqrt();
        let mut h = DVector::zeros(4);
        if r > 0.0 {
            h[0] = x[1].atan2(x[0]);
            h[1] = (x[2] / r).max(-1.0).min(1.0).acos();
            h[2] = r;
            h[3] = (x[0] * x[3] + x[1] * x[4] + x[2] * x[5]) / r;
        }
        if let Some(input) = u {
            h += &core.r * input;
        }
        h
    }

    fn processing_delay(&self) -> f64 {
        self.processing_delay
    }
}
