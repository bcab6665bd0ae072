use crate::errors::KinError;
use crate::estimation::applied::RadarTrackFilter;
use crate::estimation::{ExtendedKalman, LinearKalman, UnscentedKalman};
use serde_derive::{Deserialize, Serialize};

/// The recognized estimation filter configuration surface. Every field is
/// optional; unrecognized values are clamped by the setters they feed, with a
/// warning.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FilterConfig {
    /// Delay (s) between measurement availability and filter consumption
    #[serde(rename = "processingDelay")]
    pub processing_delay: Option<f64>,
    /// Correlation between the range and range rate measurements, in [0, 1]
    #[serde(rename = "rangeRateMeasurementCorrelationCoefficient")]
    pub range_rate_correlation: Option<f64>,
    #[serde(rename = "xManeuverVariance")]
    pub x_maneuver_variance: Option<f64>,
    #[serde(rename = "yManeuverVariance")]
    pub y_maneuver_variance: Option<f64>,
    #[serde(rename = "zManeuverVariance")]
    pub z_maneuver_variance: Option<f64>,
    /// Reverse prediction norm residual ratio threshold; zero disables
    #[serde(rename = "adaptiveNormResidualRatioThreshold")]
    pub adaptive_norm_residual_ratio_threshold: Option<f64>,
    /// Adaptive process noise window size; zero disables
    #[serde(rename = "adaptiveProcessNoiseWindowSize")]
    pub adaptive_process_noise_window_size: Option<f64>,
    /// Unscented sigma point spreading factor, in [1e-4, 1]
    pub alpha: Option<f64>,
    /// Unscented prior distribution parameter
    pub beta: Option<f64>,
    /// Unscented secondary spreading factor
    pub kappa: Option<f64>,
}

impl FilterConfig {
    /// Parses a configuration from its TOML rendition.
    pub fn from_toml_str(content: &str) -> Result<Self, KinError> {
        toml::from_str(content).map_err(|e| {
            error!("{}", e);
            KinError::LoadingError(format!("{}", e))
        })
    }

    /// Applies the applied-filter keys to a radar track filter.
    pub fn apply_to_track_filter(&self, filter: &mut RadarTrackFilter) {
        if let Some(delay) = self.processing_delay {
            filter.set_processing_delay(delay);
        }
        if let Some(rho) = self.range_rate_correlation {
            filter.set_range_rate_correlation(rho);
        }
        let mut variance = filter.maneuver_variance();
        if let Some(wx) = self.x_maneuver_variance {
            variance[0] = wx;
        }
        if let Some(wy) = self.y_maneuver_variance {
            variance[1] = wy;
        }
        if let Some(wz) = self.z_maneuver_variance {
            variance[2] = wz;
        }
        filter.set_maneuver_variance(variance);
    }

    /// Applies the adaptive estimation keys to an extended Kalman filter.
    pub fn apply_to_extended(&self, filter: &mut ExtendedKalman) {
        if let Some(lambda) = self.adaptive_norm_residual_ratio_threshold {
            filter.set_adaptive_norm_residual_threshold(lambda);
        }
        if let Some(gamma) = self.adaptive_process_noise_window_size {
            filter.set_adaptive_window(gamma);
        }
    }

    /// Applies the adaptive estimation keys to a linear Kalman filter.
    pub fn apply_to_linear(&self, filter: &mut LinearKalman) {
        if let Some(lambda) = self.adaptive_norm_residual_ratio_threshold {
            filter.set_adaptive_norm_residual_threshold(lambda);
        }
        if let Some(gamma) = self.adaptive_process_noise_window_size {
            filter.set_adaptive_window(gamma);
        }
    }

    /// Applies the sigma point controls to an unscented Kalman filter.
    pub fn apply_to_unscented(&self, filter: &mut UnscentedKalman) {
        if let Some(alpha) = self.alpha {
            filter.set_alpha(alpha);
        }
        if let Some(beta) = self.beta {
            filter.set_beta(beta);
        }
        if let Some(kappa) = self.kappa {
            filter.set_kappa(kappa);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_registry_keys() {
        let toml_content = r#"
            processingDelay = 0.25
            rangeRateMeasurementCorrelationCoefficient = 0.5
            xManeuverVariance = 1.0
            yManeuverVariance = 2.0
            zManeuverVariance = 3.0
            adaptiveNormResidualRatioThreshold = 0.1
            adaptiveProcessNoiseWindowSize = 25.0
            alpha = 0.3
            beta = 2.0
            kappa = 0.0
        "#;
        let config = FilterConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.processing_delay, Some(0.25));
        assert_eq!(config.range_rate_correlation, Some(0.5));
        assert_eq!(config.z_maneuver_variance, Some(3.0));
        assert_eq!(config.alpha, Some(0.3));
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let config = FilterConfig {
            range_rate_correlation: Some(2.0),
            ..FilterConfig::default()
        };
        let mut filter = RadarTrackFilter::new(crate::estimation::StrategyKind::Latest.build());
        config.apply_to_track_filter(&mut filter);
        assert_eq!(filter.range_rate_correlation(), 0.0);
    }

    #[test]
    fn rejects_malformed_toml() {
        match FilterConfig::from_toml_str("alpha = [not a number") {
            Err(KinError::LoadingError(_)) => (),
            other => panic!("expected a loading error, got {:?}", other),
        }
    }
}
