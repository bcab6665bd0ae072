use crate::dimensions::{DMatrix, DVector};
use crate::errors::KinError;
use crate::estimation::FilterCore;

/// Provides the radar measurement, its fixed state names and a measurement
/// simulator.
pub mod measurement;

/// Provides the radar track filter.
pub mod radar;

/// Provides the converted-measurement radar track filter, which filters on
/// Cartesian positions converted from the spherical observables.
pub mod converted_measurement;

/// Provides the converted-estimate radar track filter, which keeps the filter
/// state in spherical coordinates.
pub mod converted_estimate;

pub use self::converted_estimate::ConvertedRadarEstimateTrackFilter;
pub use self::converted_measurement::ConvertedRadarMeasurementTrackFilter;
pub use self::measurement::{RadarMeasurement, RadarSensor};
pub use self::radar::RadarTrackFilter;

/// A problem-specific component which supplies the dynamics and measurement
/// models, along with their Jacobians, to a Kalman engine.
///
/// The engine owns the applied filter; the engine's state is handed back into
/// the model evaluations so that the applied filter may consult the
/// covariances without a back-reference.
pub trait AppliedFilter {
    /// Populates the initial state estimate and computes the initial
    /// covariances (and the linear measurement matrix when meaningful) into
    /// the filter core.
    fn initialize(&mut self, core: &mut FilterCore) -> Result<(), KinError>;

    /// Evaluates the dynamics Jacobian at the given state.
    fn dynamics_jacobian(&self, dt: f64, x: &DVector<f64>) -> DMatrix<f64>;

    /// Evaluates the dynamics model, with an optional control input.
    fn dynamics_model(
        &self,
        core: &FilterCore,
        dt: f64,
        x: &DVector<f64>,
        u: Option<&DVector<f64>>,
    ) -> DVector<f64>;

    /// Evaluates the measurement Jacobian at the given state.
    fn measurement_jacobian(&self, x: &DVector<f64>) -> DMatrix<f64>;

    /// Evaluates the measurement model, with an optional input vector.
    fn measurement_model(
        &self,
        core: &FilterCore,
        x: &DVector<f64>,
        u: Option<&DVector<f64>>,
    ) -> DVector<f64>;

    /// Processes the measurement residual; the default is the plain
    /// difference.
    fn measurement_residual(&self, yh: &DVector<f64>, z: &DVector<f64>) -> DVector<f64> {
        z - yh
    }

    /// Performs pre-processing on measured data prior to filtering.
    fn pre_process_measurement(&mut self, _z: &mut DVector<f64>, _dt: f64) {}

    /// Performs post-processing on filtered data.
    fn post_process_filtered(&self, _xh: &mut DVector<f64>, _dt: f64) {}

    /// The configured processing delay (s) between measurement availability
    /// and filter consumption.
    fn processing_delay(&self) -> f64 {
        0.0
    }
}
