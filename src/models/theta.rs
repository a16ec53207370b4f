//! Theta-method forecasters.
//!
//! [`Theta`] is the classic method (SES plus half the regression drift for
//! theta = 2). [`FourTheta`] fits SES on the theta line
//! `θ·y + (1-θ)·trend` and blends it back with the extrapolated trend.
//! Both remove a multiplicative seasonal component when the autocorrelation
//! shows a significant period.

use super::exponential_smoothing::SimpleExponentialSmoothing;
use super::linalg::linear_fit;
use super::seasonality::{deseasonalize, detect_period, multiplicative_indices, reseasonalize};
use super::{Forecaster, check_training_series, finite_forecast};
use crate::config::{SEASONALITY_MAX_LAG, THETA};
use crate::series::TimeSeries;
use anyhow::{Result, anyhow, bail};

/// Detects a period and returns the matching factors, or `None` when the
/// series is not seasonal (or cannot be decomposed multiplicatively).
fn seasonal_factors(values: &[f64], model: &str) -> Option<Vec<f64>> {
    let period = detect_period(values, SEASONALITY_MAX_LAG)?;
    match multiplicative_indices(values, period) {
        Ok(indices) => {
            model_debug!("{} deseasonalising with period {}", model, period);
            Some(indices)
        }
        Err(e) => {
            model_debug!("{} ignoring period {}: {}", model, period, e);
            None
        }
    }
}

#[derive(Debug, Clone)]
struct ThetaFit {
    level: f64,
    alpha: f64,
    coef: f64,
    n: usize,
    seasonal: Option<Vec<f64>>,
}

#[derive(Debug, Clone)]
pub struct Theta {
    theta: f64,
    fitted: Option<(TimeSeries, ThetaFit)>,
}

impl Theta {
    pub fn new(theta: f64) -> Result<Self> {
        if theta == 0.0 {
            bail!("Theta requires a non-zero theta");
        }
        Ok(Self { theta, fitted: None })
    }
}

impl Default for Theta {
    fn default() -> Self {
        Self {
            theta: THETA,
            fitted: None,
        }
    }
}

impl Forecaster for Theta {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        check_training_series(series, 3, "Theta")?;
        let raw = series.values();
        let seasonal = seasonal_factors(raw, "Theta");
        let values = match &seasonal {
            Some(indices) => deseasonalize(raw, indices),
            None => raw.to_vec(),
        };

        let ses = SimpleExponentialSmoothing::fit_optimal(&values)?;
        let (_, slope) = linear_fit(&values);
        let b_theta = (1.0 - self.theta) * slope;

        self.fitted = Some((
            series.clone(),
            ThetaFit {
                level: ses.level(),
                alpha: ses.alpha().max(1e-4),
                coef: b_theta / -self.theta,
                n: values.len(),
                seasonal,
            },
        ));
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<TimeSeries> {
        let (series, fit) = self
            .fitted
            .as_ref()
            .ok_or_else(|| anyhow!("Theta is not fitted"))?;

        let carry = (1.0 - (1.0 - fit.alpha).powi(fit.n as i32)) / fit.alpha;
        let mut values: Vec<f64> = (0..horizon)
            .map(|i| fit.level + fit.coef * (i as f64 + carry))
            .collect();
        if let Some(indices) = &fit.seasonal {
            values = reseasonalize(&values, indices, fit.n);
        }
        Ok(series.continuation(finite_forecast(values, "Theta")?))
    }
}

#[derive(Debug, Clone)]
struct FourThetaFit {
    mean: f64,
    intercept: f64,
    slope: f64,
    level: f64,
    n: usize,
    seasonal: Option<Vec<f64>>,
}

/// 4Theta with linear trend, additive combination and mean normalisation.
#[derive(Debug, Clone)]
pub struct FourTheta {
    theta: f64,
    fitted: Option<(TimeSeries, FourThetaFit)>,
}

impl FourTheta {
    pub fn new(theta: f64) -> Self {
        Self { theta, fitted: None }
    }

    fn weights(&self) -> (f64, f64) {
        let wses = if self.theta == 0.0 { 0.0 } else { 1.0 / self.theta };
        (wses, 1.0 - wses)
    }
}

impl Default for FourTheta {
    fn default() -> Self {
        Self::new(THETA)
    }
}

impl Forecaster for FourTheta {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        check_training_series(series, 3, "FourTheta")?;
        let raw = series.values();
        let mean = raw.iter().sum::<f64>() / raw.len() as f64;
        if mean.abs() < 1e-12 {
            bail!("FourTheta cannot normalise a zero-mean series");
        }
        let normalised: Vec<f64> = raw.iter().map(|v| v / mean).collect();

        let seasonal = seasonal_factors(&normalised, "FourTheta");
        let values = match &seasonal {
            Some(indices) => deseasonalize(&normalised, indices),
            None => normalised,
        };

        let (intercept, slope) = linear_fit(&values);
        let theta_line: Vec<f64> = values
            .iter()
            .enumerate()
            .map(|(t, y)| self.theta * y + (1.0 - self.theta) * (intercept + slope * t as f64))
            .collect();
        let ses = SimpleExponentialSmoothing::fit_optimal(&theta_line)?;

        self.fitted = Some((
            series.clone(),
            FourThetaFit {
                mean,
                intercept,
                slope,
                level: ses.level(),
                n: values.len(),
                seasonal,
            },
        ));
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<TimeSeries> {
        let (series, fit) = self
            .fitted
            .as_ref()
            .ok_or_else(|| anyhow!("FourTheta is not fitted"))?;
        let (wses, wdrift) = self.weights();

        let mut values: Vec<f64> = (0..horizon)
            .map(|h| {
                let trend = fit.intercept + fit.slope * (fit.n + h) as f64;
                wses * fit.level + wdrift * trend
            })
            .collect();
        if let Some(indices) = &fit.seasonal {
            values = reseasonalize(&values, indices, fit.n);
        }
        let values: Vec<f64> = values.into_iter().map(|v| v * fit.mean).collect();
        Ok(series.continuation(finite_forecast(values, "FourTheta")?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::linear;

    #[test]
    fn test_theta_rejects_zero() {
        assert!(Theta::new(0.0).is_err());
    }

    #[test]
    fn test_theta_forecast_rises_with_trend() {
        let mut model = Theta::default();
        model.fit(&linear(100, 50.0, 0.5)).unwrap();
        let forecast = model.predict(10).unwrap();
        let v = forecast.values();
        assert!(v.windows(2).all(|w| w[1] > w[0]));
        // Last training value is 99.5.
        assert!((v[0] - 99.5).abs() < 2.0, "first forecast {}", v[0]);
    }

    #[test]
    fn test_four_theta_on_line_continues_line() {
        // SES on the theta line of a perfect line tracks it closely, and the
        // blend with the extrapolated trend keeps the slope.
        let mut model = FourTheta::default();
        model.fit(&linear(100, 50.0, 0.5)).unwrap();
        let forecast = model.predict(5).unwrap();
        let v = forecast.values();
        assert!(v.windows(2).all(|w| w[1] > w[0]));
        assert!((v[0] - 100.0).abs() < 2.0, "first forecast {}", v[0]);
    }

    #[test]
    fn test_four_theta_rejects_zero_mean() {
        let mut model = FourTheta::default();
        assert!(model.fit(&linear(11, -5.0, 1.0)).is_err());
    }
}
