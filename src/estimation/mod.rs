use crate::dimensions::{DMatrix, DVector};
use crate::errors::KinError;
use std::fmt;
use std::str::FromStr;

/// Provides the Kalman filter family (linear, extended, unscented).
pub mod kalman;

/// Provides the applied estimation filters for radar tracking.
pub mod applied;

/// Provides the measurement aggregation strategies.
pub mod strategy;

/// Provides estimate and residual rows for CSV export.
pub mod estimate;

pub use self::applied::AppliedFilter;
pub use self::kalman::extended::ExtendedKalman;
pub use self::kalman::linear::LinearKalman;
pub use self::kalman::unscented::UnscentedKalman;
pub use self::strategy::{AggregationStrategy, LatestMeasurement, LeastSquaresMeasurement};

/// The state owned by every filter instance: the sampling interval, the state
/// estimate, the three covariances and the optional linear measurement
/// matrix, addressable through a named registry for configuration I/O.
#[derive(Debug, Clone)]
pub struct FilterCore {
    /// Sampling interval (s)
    pub dt: f64,
    /// State estimate
    pub xh: DVector<f64>,
    /// Error covariance
    pub p: DMatrix<f64>,
    /// Process covariance
    pub q: DMatrix<f64>,
    /// Measurement covariance
    pub r: DMatrix<f64>,
    /// Linear measurement matrix, populated for filters with a linear
    /// measurement map
    pub h: Option<DMatrix<f64>>,
    pub initialized: bool,
}

impl Default for FilterCore {
    fn default() -> Self {
        Self {
            dt: 0.0,
            xh: DVector::zeros(0),
            p: DMatrix::zeros(0, 0),
            q: DMatrix::zeros(0, 0),
            r: DMatrix::zeros(0, 0),
            h: None,
            initialized: false,
        }
    }
}

impl FilterCore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieves a matrix from the named registry. The state estimate is
    /// returned as a column matrix.
    pub fn get_matrix(&self, name: &str) -> Option<DMatrix<f64>> {
        match name {
            "stateEstimate" => Some(DMatrix::from_column_slice(self.xh.len(), 1, self.xh.as_slice())),
            "errorCovariance" => Some(self.p.clone()),
            "processCovariance" => Some(self.q.clone()),
            "measurementCovariance" => Some(self.r.clone()),
            "measurement" => self.h.clone(),
            _ => None,
        }
    }

    /// Stores a matrix into the named registry.
    pub fn set_matrix(&mut self, name: &str, value: DMatrix<f64>) -> Result<(), KinError> {
        match name {
            "stateEstimate" => {
                self.xh = DVector::from_column_slice(value.as_slice());
                Ok(())
            }
            "errorCovariance" => {
                self.p = value;
                Ok(())
            }
            "processCovariance" => {
                self.q = value;
                Ok(())
            }
            "measurementCovariance" => {
                self.r = value;
                Ok(())
            }
            "measurement" => {
                self.h = Some(value);
                Ok(())
            }
            _ => Err(KinError::ObjectNotFound(format!("matrix `{}`", name))),
        }
    }
}

/// The contract common to the whole Kalman family: initialization from the
/// applied filter, a time update projecting the estimate forward, and a
/// measurement update incorporating an observation vector.
pub trait Filter {
    /// Validates the presence of an applied filter and delegates to it for
    /// the initial state estimate and covariances.
    fn initialize(&mut self, dt: f64) -> Result<(), KinError>;

    /// Projects the state estimate and error covariance one step forward,
    /// with an optional control input.
    fn time_update(&mut self, u: Option<&DVector<f64>>) -> Result<(), KinError>;

    /// Incorporates a measurement vector into the state estimate and error
    /// covariance.
    fn measurement_update(&mut self, z: &DVector<f64>) -> Result<(), KinError>;

    fn core(&self) -> &FilterCore;

    fn core_mut(&mut self) -> &mut FilterCore;

    /// Retrieves a matrix from the named registry used for configuration I/O.
    fn get_matrix(&self, name: &str) -> Option<DMatrix<f64>> {
        self.core().get_matrix(name)
    }

    /// Stores a matrix into the named registry.
    fn set_matrix(&mut self, name: &str, value: DMatrix<f64>) -> Result<(), KinError> {
        self.core_mut().set_matrix(name, value)
    }
}

/// The Kalman filter variants this library provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Linear,
    Extended,
    Unscented,
}

impl FromStr for FilterKind {
    type Err = KinError;

    fn from_str(name: &str) -> Result<Self, KinError> {
        match name {
            "LinearKalman" => Ok(Self::Linear),
            "ExtendedKalman" => Ok(Self::Extended),
            "UnscentedKalman" => Ok(Self::Unscented),
            _ => Err(KinError::ObjectNotFound(format!("filter kind `{}`", name))),
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Linear => write!(f, "LinearKalman"),
            Self::Extended => write!(f, "ExtendedKalman"),
            Self::Unscented => write!(f, "UnscentedKalman"),
        }
    }
}

impl FilterKind {
    /// Constructs a filter of this kind around the provided applied filter.
    pub fn build(self, applied: Box<dyn AppliedFilter>) -> Box<dyn Filter> {
        match self {
            Self::Linear => Box::new(LinearKalman::with_applied(applied)),
            Self::Extended => Box::new(ExtendedKalman::with_applied(applied)),
            Self::Unscented => Box::new(UnscentedKalman::with_applied(applied)),
        }
    }
}

/// The applied estimation filters this library provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppliedKind {
    RadarTrack,
    ConvertedRadarMeasurement,
    ConvertedRadarEstimate,
}

impl FromStr for AppliedKind {
    type Err = KinError;

    fn from_str(name: &str) -> Result<Self, KinError> {
        match name {
            "RadarTrackFilter" => Ok(Self::RadarTrack),
            "ConvertedRadarMeasurementTrackFilter" => Ok(Self::ConvertedRadarMeasurement),
            "ConvertedRadarEstimateTrackFilter" => Ok(Self::ConvertedRadarEstimate),
            _ => Err(KinError::ObjectNotFound(format!(
                "applied filter kind `{}`",
                name
            ))),
        }
    }
}

impl fmt::Display for AppliedKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::RadarTrack => write!(f, "RadarTrackFilter"),
            Self::ConvertedRadarMeasurement => write!(f, "ConvertedRadarMeasurementTrackFilter"),
            Self::ConvertedRadarEstimate => write!(f, "ConvertedRadarEstimateTrackFilter"),
        }
    }
}

impl AppliedKind {
    /// Constructs an applied filter of this kind around the provided
    /// aggregation strategy.
    pub fn build(self, strategy: Box<dyn AggregationStrategy>) -> Box<dyn AppliedFilter> {
        use self::applied::{
            ConvertedRadarEstimateTrackFilter, ConvertedRadarMeasurementTrackFilter,
            RadarTrackFilter,
        };
        let base = RadarTrackFilter::new(strategy);
        match self {
            Self::RadarTrack => Box::new(base),
            Self::ConvertedRadarMeasurement => {
                Box::new(ConvertedRadarMeasurementTrackFilter::new(base))
            }
            Self::ConvertedRadarEstimate => Box::new(ConvertedRadarEstimateTrackFilter::new(base)),
        }
    }
}

/// The measurement aggregation strategies this library provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Latest,
    LeastSquares,
}

impl FromStr for StrategyKind {
    type Err = KinError;

    fn from_str(name: &str) -> Result<Self, KinError> {
        match name {
            "LatestMeasurementStrategy" => Ok(Self::Latest),
            "LeastSquaresMeasurementStrategy" => Ok(Self::LeastSquares),
            _ => Err(KinError::ObjectNotFound(format!("strategy kind `{}`", name))),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Latest => write!(f, "LatestMeasurementStrategy"),
            Self::LeastSquares => write!(f, "LeastSquaresMeasurementStrategy"),
        }
    }
}

impl StrategyKind {
    pub fn build(self) -> Box<dyn AggregationStrategy> {
        match self {
            Self::Latest => Box::new(LatestMeasurement::default()),
            Self::LeastSquares => Box::new(LeastSquaresMeasurement::default()),
        }
    }
}
