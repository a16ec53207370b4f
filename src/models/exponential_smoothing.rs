//! Exponential smoothing forecasters.
//!
//! - **Simple (SES)**: flat forecast from a smoothed level. Used inside the
//!   Theta family.
//! - **Holt-Winters**: additive trend and additive seasonality, the default
//!   "Exponential smoothing" model. With fewer than two seasons of history it
//!   degrades to Holt's linear trend.
//!
//! Smoothing parameters are picked by grid search on the in-sample sum of
//! squared one-step-ahead errors.

use super::{Forecaster, check_training_series, finite_forecast};
use crate::config::WEEKLY_PERIOD;
use crate::series::TimeSeries;
use anyhow::{Result, anyhow, bail};

const ALPHA_GRID: [f64; 10] = [0.05, 0.15, 0.25, 0.35, 0.45, 0.55, 0.65, 0.75, 0.85, 0.95];
const BETA_GRID: [f64; 5] = [0.01, 0.05, 0.1, 0.2, 0.3];
const GAMMA_GRID: [f64; 5] = [0.01, 0.05, 0.1, 0.2, 0.3];

// ============================================================================
// Simple Exponential Smoothing
// ============================================================================

/// `S_t = α * Y_t + (1 - α) * S_{t-1}`, level initialised at the first value.
#[derive(Debug, Clone, Copy)]
pub struct SimpleExponentialSmoothing {
    alpha: f64,
    level: f64,
}

impl SimpleExponentialSmoothing {
    fn run(data: &[f64], alpha: f64) -> (f64, f64) {
        let mut level = data[0];
        let mut sse = 0.0;
        for &value in &data[1..] {
            let error = value - level;
            sse += error * error;
            level = alpha * value + (1.0 - alpha) * level;
        }
        (level, sse)
    }

    /// Fits with a fixed smoothing parameter.
    pub fn with_alpha(data: &[f64], alpha: f64) -> Result<Self> {
        if !(0.0 < alpha && alpha <= 1.0) {
            bail!("alpha must be in (0, 1], got {}", alpha);
        }
        if data.len() < 2 {
            bail!("SES needs at least 2 points, got {}", data.len());
        }
        let (level, _) = Self::run(data, alpha);
        Ok(Self { alpha, level })
    }

    /// Fits with alpha chosen on a 0.01 grid.
    pub fn fit_optimal(data: &[f64]) -> Result<Self> {
        if data.len() < 2 {
            bail!("SES needs at least 2 points, got {}", data.len());
        }
        let mut best = (0.5, f64::MAX);
        for alpha_int in 1..100 {
            let alpha = alpha_int as f64 / 100.0;
            let (_, sse) = Self::run(data, alpha);
            if sse < best.1 {
                best = (alpha, sse);
            }
        }
        Self::with_alpha(data, best.0)
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn forecast(&self, horizon: usize) -> Vec<f64> {
        vec![self.level; horizon]
    }
}

// ============================================================================
// Holt-Winters
// ============================================================================

#[derive(Debug, Clone)]
struct HoltWintersState {
    level: f64,
    trend: f64,
    /// Empty when fitted without a seasonal component.
    seasonal: Vec<f64>,
    /// Number of fitted points, used to align the seasonal index.
    n: usize,
}

impl HoltWintersState {
    fn forecast(&self, horizon: usize) -> Vec<f64> {
        (1..=horizon)
            .map(|h| {
                let season = if self.seasonal.is_empty() {
                    0.0
                } else {
                    self.seasonal[(self.n + h - 1) % self.seasonal.len()]
                };
                self.level + h as f64 * self.trend + season
            })
            .collect()
    }
}

fn holt_winters(data: &[f64], period: usize, alpha: f64, beta: f64, gamma: f64) -> (HoltWintersState, f64) {
    let m = period;
    let first: f64 = data[..m].iter().sum::<f64>() / m as f64;
    let second: f64 = data[m..2 * m].iter().sum::<f64>() / m as f64;

    let mut trend = (second - first) / m as f64;
    let centre = (m as f64 - 1.0) / 2.0;
    // Level sits at the end of the first season; initial factors are detrended.
    let mut level = first + centre * trend;
    let mut seasonal: Vec<f64> = data[..m]
        .iter()
        .enumerate()
        .map(|(i, v)| v - (first + (i as f64 - centre) * trend))
        .collect();
    let mut sse = 0.0;

    for (t, &y) in data.iter().enumerate().skip(m) {
        let s = seasonal[t % m];
        let error = y - (level + trend + s);
        sse += error * error;

        let prev_level = level;
        level = alpha * (y - s) + (1.0 - alpha) * (level + trend);
        trend = beta * (level - prev_level) + (1.0 - beta) * trend;
        seasonal[t % m] = gamma * (y - level) + (1.0 - gamma) * s;
    }

    (
        HoltWintersState {
            level,
            trend,
            seasonal,
            n: data.len(),
        },
        sse,
    )
}

fn holt_linear(data: &[f64], alpha: f64, beta: f64) -> (HoltWintersState, f64) {
    let mut level = data[0];
    let mut trend = data[1] - data[0];
    let mut sse = 0.0;

    for &y in &data[1..] {
        let error = y - (level + trend);
        sse += error * error;

        let prev_level = level;
        level = alpha * y + (1.0 - alpha) * (level + trend);
        trend = beta * (level - prev_level) + (1.0 - beta) * trend;
    }

    (
        HoltWintersState {
            level,
            trend,
            seasonal: Vec::new(),
            n: data.len(),
        },
        sse,
    )
}

#[derive(Debug, Clone)]
pub struct ExponentialSmoothing {
    seasonal_period: usize,
    fitted: Option<(TimeSeries, HoltWintersState)>,
}

impl ExponentialSmoothing {
    pub fn new(seasonal_period: usize) -> Self {
        Self {
            seasonal_period,
            fitted: None,
        }
    }
}

impl Default for ExponentialSmoothing {
    fn default() -> Self {
        Self::new(WEEKLY_PERIOD)
    }
}

impl Forecaster for ExponentialSmoothing {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        check_training_series(series, 3, "ExponentialSmoothing")?;
        let data = series.values();
        let seasonal = self.seasonal_period >= 2 && data.len() >= 2 * self.seasonal_period;

        let mut best: Option<(HoltWintersState, f64, (f64, f64, f64))> = None;
        for &alpha in &ALPHA_GRID {
            for &beta in &BETA_GRID {
                if seasonal {
                    for &gamma in &GAMMA_GRID {
                        let (state, sse) = holt_winters(data, self.seasonal_period, alpha, beta, gamma);
                        if sse.is_finite() && best.as_ref().is_none_or(|b| sse < b.1) {
                            best = Some((state, sse, (alpha, beta, gamma)));
                        }
                    }
                } else {
                    let (state, sse) = holt_linear(data, alpha, beta);
                    if sse.is_finite() && best.as_ref().is_none_or(|b| sse < b.1) {
                        best = Some((state, sse, (alpha, beta, 0.0)));
                    }
                }
            }
        }

        let (state, sse, params) =
            best.ok_or_else(|| anyhow!("ExponentialSmoothing found no finite fit"))?;
        model_debug!(
            "ExponentialSmoothing seasonal={} alpha={:.2} beta={:.2} gamma={:.2} sse={:.4}",
            seasonal, params.0, params.1, params.2, sse
        );
        self.fitted = Some((series.clone(), state));
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<TimeSeries> {
        let (series, state) = self
            .fitted
            .as_ref()
            .ok_or_else(|| anyhow!("ExponentialSmoothing is not fitted"))?;
        let values = finite_forecast(state.forecast(horizon), "ExponentialSmoothing")?;
        Ok(series.continuation(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::{linear, start};

    #[test]
    fn test_ses_flat_forecast() {
        let data = vec![10.0, 12.0, 11.0, 13.0, 12.0, 14.0, 13.0, 15.0];
        let model = SimpleExponentialSmoothing::fit_optimal(&data).unwrap();
        assert!(model.alpha() > 0.0 && model.alpha() < 1.0);
        let forecast = model.forecast(3);
        assert_eq!(forecast.len(), 3);
        assert!(forecast.iter().all(|v| (*v - model.level()).abs() < 1e-12));
    }

    #[test]
    fn test_ses_rejects_bad_alpha() {
        assert!(SimpleExponentialSmoothing::with_alpha(&[1.0, 2.0], 0.0).is_err());
        assert!(SimpleExponentialSmoothing::with_alpha(&[1.0], 0.5).is_err());
    }

    #[test]
    fn test_holt_winters_tracks_linear_trend() {
        let mut model = ExponentialSmoothing::default();
        model.fit(&linear(60, 5.0, 2.0)).unwrap();
        let forecast = model.predict(5).unwrap();
        for (h, v) in forecast.values().iter().enumerate() {
            let expected = 5.0 + 2.0 * (60 + h) as f64;
            assert!((v - expected).abs() < 1.0, "h={} got {} expected {}", h, v, expected);
        }
    }

    #[test]
    fn test_holt_winters_repeats_weekly_pattern() {
        let pattern = [0.0, 4.0, 8.0, 4.0, 0.0, -4.0, -8.0];
        let values: Vec<f64> = (0..70).map(|t| 100.0 + pattern[t % 7]).collect();
        let mut model = ExponentialSmoothing::default();
        model.fit(&TimeSeries::new(start(), values)).unwrap();

        let forecast = model.predict(7).unwrap();
        for (h, v) in forecast.values().iter().enumerate() {
            let expected = 100.0 + pattern[(70 + h) % 7];
            assert!((v - expected).abs() < 0.5, "h={} got {} expected {}", h, v, expected);
        }
    }

    #[test]
    fn test_short_series_uses_holt_linear() {
        let mut model = ExponentialSmoothing::default();
        model.fit(&linear(6, 1.0, 1.0)).unwrap();
        assert_eq!(model.predict(2).unwrap().len(), 2);
    }
}
