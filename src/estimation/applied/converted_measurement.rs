use crate::dimensions::{DMatrix, DVector};
use crate::errors::KinError;
use crate::estimation::applied::measurement::keys;
use crate::estimation::applied::RadarTrackFilter;
use crate::estimation::{AppliedFilter, FilterCore};

/// A radar track filter variant which converts the spherical observables into
/// a Cartesian position before filtering, leaving a linear three-dimensional
/// measurement map.
pub struct ConvertedRadarMeasurementTrackFilter {
    base: RadarTrackFilter,
    /// Observables captured by the latest pre-processing pass, feeding the
    /// converted measurement covariance
    az: f64,
    ze: f64,
    r: f64,
}

impl ConvertedRadarMeasurementTrackFilter {
    pub fn new(base: RadarTrackFilter) -> Self {
        Self {
            base,
            az: 0.0,
            ze: 0.0,
            r: 0.0,
        }
    }

    pub fn base(&self) -> &RadarTrackFilter {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut RadarTrackFilter {
        &mut self.base
    }

    /// The fully expanded covariance of the converted Cartesian position
    /// measurement, from the spherical observables and their deviations.
    pub fn compute_measurement_covariance(&self, _dt: f64) -> DMatrix<f64> {
        let (sin_az, cos_az) = self.az.sin_cos();
        let (sin_ze, cos_ze) = self.ze.sin_cos();

        let sig_az = self.base.measurement_sigmas().get_or_zero(keys::AZIMUTH);
        let sig_r = self.base.measurement_sigmas().get_or_zero(keys::RANGE);
        let sig_ze = self.base.measurement_sigmas().get_or_zero(keys::ZENITH);

        let r_sq = self.r * self.r;
        let sig_az_sq = sig_az * sig_az;
        let sig_r_sq = sig_r * sig_r;
        let sig_ze_sq = sig_ze * sig_ze;
        let sin_az_sq = sin_az * sin_az;
        let cos_az_sq = cos_az * cos_az;
        let sin_ze_sq = sin_ze * sin_ze;
        let cos_ze_sq = cos_ze * cos_ze;

        let r11 = r_sq * sig_az_sq * sig_ze_sq * sin_az_sq * cos_ze_sq
            + r_sq * sig_az_sq * sin_az_sq * sin_ze_sq
            + r_sq * sig_ze_sq * cos_az_sq * cos_ze_sq
            + sig_r_sq * sig_az_sq * sig_ze_sq * sin_az_sq * cos_ze_sq
            + sig_r_sq * sig_az_sq * sin_az_sq * sin_ze_sq
            + sig_r_sq * sig_ze_sq * cos_az_sq * cos_ze_sq
            + sig_r_sq * sin_az_sq * sin_ze_sq;

        let r12 = r_sq * sin_az * cos_az * sig_ze_sq * cos_ze_sq
            - r_sq * sin_az * cos_az * sig_az_sq * sig_ze_sq * cos_ze_sq
            - r_sq * sin_az * cos_az * sig_az_sq * sin_ze_sq
            + sig_r_sq * sin_az * cos_az * sig_ze_sq * cos_ze_sq
            - sig_r_sq * sin_az * cos_az * sig_az_sq * sig_ze_sq * cos_ze_sq
            - sig_r_sq * sin_az * cos_az * sig_az_sq * sin_ze_sq
            + sig_r_sq * sin_az * cos_az * sin_ze_sq;

        let r13 = cos_ze * sin_ze * cos_az * (sig_r_sq - r_sq * sig_ze_sq - sig_r_sq * sig_ze_sq);

        let r22 = r_sq * sig_az_sq * sig_ze_sq * cos_az_sq * cos_ze_sq
            + r_sq * sig_az_sq * cos_az_sq * sin_ze_sq
            + r_sq * sig_ze_sq * sin_az_sq * cos_ze_sq
            + sig_r_sq * sig_az_sq * sig_ze_sq * cos_az_sq * cos_ze_sq
            + sig_r_sq * sig_az_sq * cos_az_sq * sin_ze_sq
            + sig_r_sq * sig_ze_sq * sin_az_sq * cos_ze_sq
            + sig_r_sq * sin_az_sq * sin_ze_sq;

        let r23 = cos_ze * sin_ze * sin_az * (sig_r_sq - r_sq * sig_ze_sq - sig_r_sq * sig_ze_sq);

        let r33 =
            r_sq * sig_ze_sq * sin_ze_sq + sig_r_sq * (cos_ze_sq + sig_ze_sq * sin_ze_sq);

        let mut r = DMatrix::zeros(3, 3);
        r[(0, 0)] = r11;
        r[(0, 1)] = r12;
        r[(0, 2)] = r13;
        r[(1, 0)] = r12;
        r[(1, 1)] = r22;
        r[(1, 2)] = r23;
        r[(2, 0)] = r13;
        r[(2, 1)] = r23;
        r[(2, 2)] = r33;
        r
    }
}

impl AppliedFilter for ConvertedRadarMeasurementTrackFilter {
    fn initialize(&mut self, core: &mut FilterCore) -> Result<(), KinError> {
        let xh = self.base.estimate_initial_state()?;
        // simplified diagonal seed from the initial state itself
        let mut p = DMatrix::zeros(9, 9);
        for i in 0..9 {
            p[(i, i)] = xh[i] * xh[i];
        }
        core.h = Some(self.measurement_jacobian(&xh));
        core.p = p;
        core.q = self.base.compute_process_covariance(core.dt);
        core.r = self.compute_measurement_covariance(core.dt);
        core.xh = xh;
        Ok(())
    }

    fn dynamics_jacobian(&self, dt: f64, x: &DVector<f64>) -> DMatrix<f64> {
        self.base.dynamics_jacobian(dt, x)
    }

    fn dynamics_model(
        &self,
        core: &FilterCore,
        dt: f64,
        x: &DVector<f64>,
        u: Option<&DVector<f64>>,
    ) -> DVector<f64> {
        self.base.dynamics_model(core, dt, x, u)
    }

    /// The converted measurement observes the Cartesian position directly.
    fn measurement_jacobian(&self, _x: &DVector<f64>) -> DMatrix<f64> {
        let mut h = DMatrix::zeros(3, 9);
        h[(0, 0)] = 1.0;
        h[(1, 1)] = 1.0;
        h[(2, 2)] = 1.0;
        h
    }

    fn measurement_model(
        &self,
        _core: &FilterCore,
        x: &DVector<f64>,
        _u: Option<&DVector<f64>>,
    ) -> DVector<f64> {
        DVector::from_column_slice(&[x[0], x[1], x[2]])
    }

    /// Converts an incoming `(azimuth, zenith, range, ...)` observation into
    /// the Cartesian position it implies, capturing the raw observables for
    /// the measurement covariance.
    fn pre_process_measurement(&mut self, z: &mut DVector<f64>, _dt: f64) {
        if z.len() < 3 {
            return;
        }
        self.az = z[0];
        self.ze = z[1];
        self.r = z[2];

        let (sin_az, cos_az) = self.az.sin_cos();
        let (sin_ze, cos_ze) = self.ze.sin_cos();
        let r_sin_ze = self.r * sin_ze;
        *z = DVector::from_column_slice(&[
            r_sin_ze * cos_az,
            r_sin_ze * sin_az,
            self.r * cos_ze,
        ]);
    }

    fn processing_delay(&self) -> f64 {
        self.base.processing_delay()
    }
}
