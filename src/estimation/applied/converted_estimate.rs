use crate::dimensions::{DMatrix, DVector, Vector3};
use crate::errors::KinError;
use crate::estimation::applied::measurement::keys;
use crate::estimation::applied::RadarTrackFilter;
use crate::estimation::{AppliedFilter, FilterCore};
use crate::kinematics::{spherical_to_cartesian, SphericalTriples};

/// A radar track filter variant which keeps the filter state in spherical
/// coordinates: the nine-state is `(az, ze, r)` with its first and second
/// time derivatives, and the Cartesian expansion only happens in the
/// post-processing of filtered data.
pub struct ConvertedRadarEstimateTrackFilter {
    base: RadarTrackFilter,
}

impl ConvertedRadarEstimateTrackFilter {
    pub fn new(base: RadarTrackFilter) -> Self {
        Self { base }
    }

    pub fn base(&self) -> &RadarTrackFilter {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut RadarTrackFilter {
        &mut self.base
    }

    /// Diagonal error covariance from the measurement deviations and their
    /// dt-scaled first and second derivatives.
    pub fn compute_error_covariance(&self, dt: f64) -> DMatrix<f64> {
        let sig_az = self.base.measurement_sigmas().get_or_zero(keys::AZIMUTH);
        let sig_r = self.base.measurement_sigmas().get_or_zero(keys::RANGE);
        let sig_rr = self.base.measurement_sigmas().get_or_zero(keys::RANGE_RATE);
        let sig_ze = self.base.measurement_sigmas().get_or_zero(keys::ZENITH);

        let sig_azd = sig_az / dt;
        let sig_azdd = sig_azd / dt;
        let sig_zed = sig_ze / dt;
        let sig_zedd = sig_zed / dt;
        let sig_rrd = sig_rr / dt;

        let diagonal = [
            sig_az, sig_ze, sig_r, sig_azd, sig_zed, sig_rr, sig_azdd, sig_zedd, sig_rrd,
        ];
        let mut p = DMatrix::zeros(9, 9);
        for (i, sigma) in diagonal.iter().enumerate() {
            p[(i, i)] = sigma * sigma;
        }
        p
    }
}

impl AppliedFilter for ConvertedRadarEstimateTrackFilter {
    fn initialize(&mut self, core: &mut FilterCore) -> Result<(), KinError> {
        let aggregated = {
            let buffered: Vec<_> = self.base.buffered().to_vec();
            self.base.strategy_mut().aggregate(&buffered)?
        };
        let xh = DVector::from_column_slice(&[
            aggregated.get_or_zero(keys::AZIMUTH),
            aggregated.get_or_zero(keys::ZENITH),
            aggregated.get_or_zero(keys::RANGE),
            0.0,
            0.0,
            aggregated.get_or_zero(keys::RANGE_RATE),
            0.0,
            0.0,
            0.0,
        ]);
        core.h = Some(self.measurement_jacobian(&xh));
        core.p = self.compute_error_covariance(core.dt);
        core.q = self.base.compute_process_covariance(core.dt);
        core.r = self.base.compute_measurement_covariance(core.dt);
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

    /// The observables select directly out of the spherical state.
    fn measurement_jacobian(&self, _x: &DVector<f64>) -> DMatrix<f64> {
        let mut h = DMatrix::zeros(4, 9);
        h[(0, 0)] = 1.0;
        h[(1, 1)] = 1.0;
        h[(2, 2)] = 1.0;
        h[(3, 5)] = 1.0;
        h
    }

    fn measurement_model(
        &self,
        _core: &FilterCore,
        x: &DVector<f64>,
        _u: Option<&DVector<f64>>,
    ) -> DVector<f64> {
        DVector::from_column_slice(&[x[0], x[1], x[2], x[5]])
    }

    /// Expands the filtered spherical state into Cartesian position, velocity
    /// and acceleration.
    fn post_process_filtered(&self, xh: &mut DVector<f64>, _dt: f64) {
        let spherical = SphericalTriples {
            angles: Vector3::new(xh[0], xh[1], xh[2]),
            rates: Vector3::new(xh[3], xh[4], xh[5]),
            accels: Vector3::new(xh[6], xh[7], xh[8]),
        };
        let (p, v, a) = spherical_to_cartesian(&spherical);
        for i in 0..3 {
            xh[i] = p[i];
            xh[i + 3] = v[i];
            xh[i + 6] = a[i];
        }
    }

    fn processing_delay(&self) -> f64 {
        self.base.processing_delay()
    }
}
