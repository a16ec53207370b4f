//! Forecasting models run against every asset.
//!
//! Each model is fitted on a daily [`TimeSeries`] and forecasts the days that
//! follow it. Instances are cheap and single-use: the orchestrator builds a
//! fresh one through [`ModelKind::build`] for every fit.
//!
//! Fitting diagnostics go through [`model_debug!`], which stays silent inside
//! [`with_diagnostics`]`(false, ..)` without touching the caller's subscriber.

/// `tracing::debug!` that is skipped when model diagnostics are switched off
/// for the current task.
macro_rules! model_debug {
    ($($arg:tt)*) => {
        if $crate::models::diagnostics_enabled() {
            tracing::debug!($($arg)*);
        }
    };
}

pub mod arima;
pub mod exponential_smoothing;
pub mod fft;
pub mod linalg;
pub mod naive;
pub mod prophet;
pub mod seasonality;
pub mod theta;

use crate::series::TimeSeries;
use anyhow::{Result, bail};
use std::fmt;
use std::future::Future;

tokio::task_local! {
    static SHOW_DIAGNOSTICS: bool;
}

/// Runs `future` with model diagnostics switched on or off. Outside such a
/// scope diagnostics are on.
pub async fn with_diagnostics<F: Future>(show: bool, future: F) -> F::Output {
    SHOW_DIAGNOSTICS.scope(show, future).await
}

pub(crate) fn diagnostics_enabled() -> bool {
    SHOW_DIAGNOSTICS.try_with(|show| *show).unwrap_or(true)
}

pub trait Forecaster {
    /// Fit the model on a gap-free series.
    fn fit(&mut self, series: &TimeSeries) -> Result<()>;

    /// Forecast `horizon` days after the end of the fitted series.
    fn predict(&self, horizon: usize) -> Result<TimeSeries>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelKind {
    ExponentialSmoothing,
    Prophet,
    AutoArima,
    Theta,
    Arima,
    Fft,
    FourTheta,
    NaiveDrift,
    NaiveMean,
    NaiveSeasonal,
}

impl ModelKind {
    /// Column order of every accuracy and prediction table.
    pub const ALL: [ModelKind; 10] = [
        ModelKind::ExponentialSmoothing,
        ModelKind::Prophet,
        ModelKind::AutoArima,
        ModelKind::Theta,
        ModelKind::Arima,
        ModelKind::Fft,
        ModelKind::FourTheta,
        ModelKind::NaiveDrift,
        ModelKind::NaiveMean,
        ModelKind::NaiveSeasonal,
    ];

    /// Position in [`ModelKind::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::ExponentialSmoothing => "Exponential smoothing",
            Self::Prophet => "Prophet",
            Self::AutoArima => "Auto-ARIMA",
            Self::Theta => "Theta(2)",
            Self::Arima => "ARIMA",
            Self::Fft => "FFT",
            Self::FourTheta => "FourTheta",
            Self::NaiveDrift => "NaiveDrift",
            Self::NaiveMean => "NaiveMean",
            Self::NaiveSeasonal => "NaiveSeasonal",
        }
    }

    pub fn build(self) -> Box<dyn Forecaster> {
        match self {
            Self::ExponentialSmoothing => Box::new(exponential_smoothing::ExponentialSmoothing::default()),
            Self::Prophet => Box::new(prophet::Prophet::default()),
            Self::AutoArima => Box::new(arima::AutoArima::default()),
            Self::Theta => Box::new(theta::Theta::default()),
            Self::Arima => Box::new(arima::Arima::default()),
            Self::Fft => Box::new(fft::Fft::default()),
            Self::FourTheta => Box::new(theta::FourTheta::default()),
            Self::NaiveDrift => Box::new(naive::NaiveDrift::default()),
            Self::NaiveMean => Box::new(naive::NaiveMean::default()),
            Self::NaiveSeasonal => Box::new(naive::NaiveSeasonal::default()),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Shared fit-time checks: enough points and only finite values.
pub(crate) fn check_training_series(series: &TimeSeries, min_len: usize, model: &str) -> Result<()> {
    if series.len() < min_len {
        bail!(
            "{} needs at least {} points, got {}",
            model,
            min_len,
            series.len()
        );
    }
    if series.values().iter().any(|v| !v.is_finite()) {
        bail!("{} received NaN or infinite values", model);
    }
    Ok(())
}

/// Rejects non-finite forecasts so a diverging fit surfaces as an error.
pub(crate) fn finite_forecast(values: Vec<f64>, model: &str) -> Result<Vec<f64>> {
    if values.iter().any(|v| !v.is_finite()) {
        bail!("{} produced a non-finite forecast", model);
    }
    Ok(values)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::series::TimeSeries;
    use chrono::NaiveDate;

    pub fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 1, 3).unwrap()
    }

    /// Upward trend with a weekly cycle and a little deterministic wobble.
    pub fn trending_weekly(len: usize) -> TimeSeries {
        let values = (0..len)
            .map(|t| {
                let t = t as f64;
                100.0 + 0.2 * t + 3.0 * (2.0 * std::f64::consts::PI * t / 7.0).sin() + 0.5 * (t * 1.3).cos()
            })
            .collect();
        TimeSeries::new(start(), values)
    }

    pub fn linear(len: usize, intercept: f64, slope: f64) -> TimeSeries {
        TimeSeries::new(start(), (0..len).map(|t| intercept + slope * t as f64).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_support::trending_weekly;

    #[test]
    fn test_every_model_fits_and_forecasts() {
        let series = trending_weekly(400);
        for kind in ModelKind::ALL {
            let mut model = kind.build();
            model
                .fit(&series)
                .unwrap_or_else(|e| panic!("{} failed to fit: {}", kind, e));
            let forecast = model
                .predict(30)
                .unwrap_or_else(|e| panic!("{} failed to predict: {}", kind, e));
            assert_eq!(forecast.len(), 30, "{}", kind);
            assert_eq!(forecast.start(), series.time_at(series.len()), "{}", kind);
            assert!(forecast.values().iter().all(|v| v.is_finite()), "{}", kind);
        }
    }

    #[test]
    fn test_every_model_rejects_predict_before_fit() {
        for kind in ModelKind::ALL {
            assert!(kind.build().predict(3).is_err(), "{}", kind);
        }
    }

    #[tokio::test]
    async fn test_diagnostics_scope() {
        assert!(diagnostics_enabled());
        assert!(!with_diagnostics(false, async { diagnostics_enabled() }).await);
        assert!(with_diagnostics(true, async { diagnostics_enabled() }).await);
        assert!(diagnostics_enabled());
    }

    #[test]
    fn test_labels_are_unique_and_ordered() {
        let labels: Vec<&str> = ModelKind::ALL.iter().map(|k| k.label()).collect();
        assert_eq!(labels[0], "Exponential smoothing");
        assert_eq!(labels[9], "NaiveSeasonal");
        let mut dedup = labels.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), 10);
        for (i, kind) in ModelKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }
}
