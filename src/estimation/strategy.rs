use crate::containers::StateMap;
use crate::errors::KinError;
use std::collections::BTreeMap;

/// A strategy for digesting a buffer of state measurements into a single
/// aggregate, optionally with estimated derivatives and standard deviations.
pub trait AggregationStrategy {
    /// Aggregates a collection of measurement samples into one state map
    /// tagged at the most recent sample time.
    fn aggregate(&mut self, measurements: &[StateMap]) -> Result<StateMap, KinError>;

    /// Aggregates and also estimates the per-name derivatives.
    fn aggregate_with_derivatives(
        &mut self,
        measurements: &[StateMap],
    ) -> Result<(StateMap, StateMap), KinError>;

    /// Aggregates and also estimates the per-name derivatives and standard
    /// deviations.
    fn aggregate_full(
        &mut self,
        measurements: &[StateMap],
    ) -> Result<(StateMap, StateMap, StateMap), KinError>;

    /// Estimates only the derivatives of the measurement samples.
    fn estimate_derivatives(&mut self, measurements: &[StateMap]) -> Result<StateMap, KinError> {
        Ok(self.aggregate_with_derivatives(measurements)?.1)
    }

    /// Estimates only the standard deviations of the measurement samples.
    fn estimate_standard_deviations(
        &mut self,
        measurements: &[StateMap],
    ) -> Result<StateMap, KinError> {
        Ok(self.aggregate_full(measurements)?.2)
    }
}

/// Picks the most recent measurement by time and reports its values; the
/// derivatives and deviations are zero.
#[derive(Debug, Default, Clone)]
pub struct LatestMeasurement;

impl LatestMeasurement {
    fn latest(measurements: &[StateMap]) -> Result<&StateMap, KinError> {
        measurements
            .iter()
            .max_by(|a, b| a.time().partial_cmp(&b.time()).unwrap())
            .ok_or(KinError::EmptyMeasurement)
    }
}

impl AggregationStrategy for LatestMeasurement {
    fn aggregate(&mut self, measurements: &[StateMap]) -> Result<StateMap, KinError> {
        Ok(Self::latest(measurements)?.clone())
    }

    fn aggregate_with_derivatives(
        &mut self,
        measurements: &[StateMap],
    ) -> Result<(StateMap, StateMap), KinError> {
        let aggregate = self.aggregate(measurements)?;
        let mut derivative = StateMap::at_time(aggregate.time());
        for (name, _) in aggregate.iter() {
            derivative.set(name, 0.0);
        }
        Ok((aggregate, derivative))
    }

    fn aggregate_full(
        &mut self,
        measurements: &[StateMap],
    ) -> Result<(StateMap, StateMap, StateMap), KinError> {
        let (aggregate, derivative) = self.aggregate_with_derivatives(measurements)?;
        let mut sigma = StateMap::at_time(aggregate.time());
        for (name, _) in aggregate.iter() {
            sigma.set(name, 0.0);
        }
        Ok((aggregate, derivative, sigma))
    }
}

/// Fits a straight line per named component across the measurement buffer;
/// the aggregate is the fit evaluated at the last sample time, the
/// derivatives are the slopes and the deviations are the sample standard
/// deviation of the fit residuals.
#[derive(Debug, Default, Clone)]
pub struct LeastSquaresMeasurement {
    slopes: BTreeMap<String, f64>,
    intercepts: BTreeMap<String, f64>,
}

impl LeastSquaresMeasurement {
    /// The per-name slopes from the latest fit.
    pub fn slopes(&self) -> &BTreeMap<String, f64> {
        &self.slopes
    }

    /// The per-name intercepts from the latest fit.
    pub fn intercepts(&self) -> &BTreeMap<String, f64> {
        &self.intercepts
    }

    fn fit(&mut self, measurements: &[StateMap]) -> Result<(), KinError> {
        if measurements.is_empty() {
            return Err(KinError::EmptyMeasurement);
        }

        let mut t_sum = 0.0;
        let mut tt_sum = 0.0;
        let mut y_sums: BTreeMap<String, f64> = BTreeMap::new();
        let mut ty_sums: BTreeMap<String, f64> = BTreeMap::new();
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();

        for sample in measurements {
            let t = sample.time();
            t_sum += t;
            tt_sum += t * t;
            for (name, &y) in sample.iter() {
                *y_sums.entry(name.clone()).or_insert(0.0) += y;
                *ty_sums.entry(name.clone()).or_insert(0.0) += t * y;
                *counts.entry(name.clone()).or_insert(0) += 1;
            }
        }

        let m = measurements.len() as f64;
        let denominator = m * tt_sum - t_sum * t_sum;

        self.slopes.clear();
        self.intercepts.clear();
        for (name, &n) in &counts {
            let y_sum = y_sums[name];
            let slope = if denominator != 0.0 {
                (n as f64 * ty_sums[name] - t_sum * y_sum) / denominator
            } else {
                // a degenerate abscissa spread leaves only the mean
                debug!("degenerate time spread in least squares fit of `{}`", name);
                0.0
            };
            self.slopes.insert(name.clone(), slope);
            self.intercepts
                .insert(name.clone(), (y_sum - slope * t_sum) / n as f64);
        }
        Ok(())
    }
}

impl AggregationStrategy for LeastSquaresMeasurement {
    fn aggregate(&mut self, measurements: &[StateMap]) -> Result<StateMap, KinError> {
        self.fit(measurements)?;
        let t_last = measurements
            .iter()
            .map(StateMap::time)
            .fold(f64::MIN, f64::max);
        let mut aggregate = StateMap::at_time(t_last);
        for (name, slope) in &self.slopes {
            aggregate.set(name, self.intercepts[name] + slope * t_last);
        }
        Ok(aggregate)
    }

    fn aggregate_with_derivatives(
        &mut self,
        measurements: &[StateMap],
    ) -> Result<(StateMap, StateMap), KinError> {
        let aggregate = self.aggregate(measurements)?;
        let mut derivative = StateMap::at_time(aggregate.time());
        for (name, slope) in &self.slopes {
            derivative.set(name, *slope);
        }
        Ok((aggregate, derivative))
    }

    fn aggregate_full(
        &mut self,
        measurements: &[StateMap],
    ) -> Result<(StateMap, StateMap, StateMap), KinError> {
        let (aggregate, derivative) = self.aggregate_with_derivatives(measurements)?;

        let mut residual_sq_sums: BTreeMap<String, f64> = BTreeMap::new();
        let mut residual_sums: BTreeMap<String, f64> = BTreeMap::new();
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for sample in measurements {
            let t = sample.time();
            for (name, &y) in sample.iter() {
                let residual = y - self.slopes[name] * t - self.intercepts[name];
                *residual_sq_sums.entry(name.clone()).or_insert(0.0) += residual * residual;
                *residual_sums.entry(name.clone()).or_insert(0.0) += residual;
                *counts.entry(name.clone()).or_insert(0) += 1;
            }
        }

        let mut sigma = StateMap::at_time(aggregate.time());
        for (name, &n) in &counts {
            let value = if n > 1 {
                let mean = residual_sums[name] / n as f64;
                let centered = residual_sq_sums[name] - n as f64 * mean * mean;
                (centered.max(0.0) / (n as f64 - 1.0)).sqrt()
            } else {
                0.0
            };
            sigma.set(name, value);
        }
        Ok((aggregate, derivative, sigma))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn linear_samples(slope: f64, intercept: f64, times: &[f64]) -> Vec<StateMap> {
        times
            .iter()
            .map(|&t| {
                let mut sample = StateMap::at_time(t);
                sample.set("range", intercept + slope * t);
                sample
            })
            .collect()
    }

    #[test]
    fn latest_picks_newest() {
        let samples = linear_samples(2.0, 1.0, &[0.0, 1.0, 2.0]);
        let mut strategy = LatestMeasurement::default();
        let aggregate = strategy.aggregate(&samples).unwrap();
        assert_relative_eq!(aggregate.get_or_zero("range"), 5.0);
        assert_relative_eq!(aggregate.time(), 2.0);
    }

    #[test]
    fn least_squares_recovers_exact_line() {
        let samples = linear_samples(3.5, -1.25, &[0.0, 0.5, 1.0, 1.5, 2.0]);
        let mut strategy = LeastSquaresMeasurement::default();
        let (aggregate, derivative, sigma) = strategy.aggregate_full(&samples).unwrap();
        assert_relative_eq!(derivative.get_or_zero("range"), 3.5, epsilon = 1e-10);
        assert_relative_eq!(strategy.intercepts()["range"], -1.25, epsilon = 1e-10);
        assert_relative_eq!(aggregate.get_or_zero("range"), 3.5 * 2.0 - 1.25, epsilon = 1e-10);
        assert!(sigma.get_or_zero("range") <= 1e-10);
    }

    #[test]
    fn empty_buffer_is_reported() {
        let mut strategy = LeastSquaresMeasurement::default();
        assert_eq!(strategy.aggregate(&[]), Err(KinError::EmptyMeasurement));
    }

    #[test]
    fn noisy_fit_reports_spread() {
        let mut samples = linear_samples(1.0, 0.0, &[0.0, 1.0, 2.0, 3.0]);
        // perturb one sample off the line
        let bumped = samples[1].get_or_zero("range") + 0.5;
        samples[1].set("range", bumped);
        let mut strategy = LeastSquaresMeasurement::default();
        let (_, _, sigma) = strategy.aggregate_full(&samples).unwrap();
        assert!(sigma.get_or_zero("range") > 0.1);
    }
}
