//! Additive trend + seasonality regression in the style of Prophet.
//!
//! `y(t) = k·t + m + Σ δ_j (t - s_j)_+ + weekly(t) + yearly(t)`
//!
//! The trend is piecewise linear with changepoints `s_j` spread over the first
//! part of the history; changepoint deltas carry a ridge penalty so the trend
//! only bends where the data insists. Weekly and yearly seasonality are
//! Fourier series on the calendar day. Everything is solved in one
//! regularised least-squares problem on a scaled copy of the series.

use super::linalg::least_squares;
use super::{Forecaster, check_training_series, finite_forecast};
use crate::config::{
    PROPHET_CHANGEPOINT_PENALTY, PROPHET_CHANGEPOINT_RANGE, PROPHET_CHANGEPOINTS,
    PROPHET_WEEKLY_ORDER, PROPHET_YEARLY_ORDER, WEEKLY_PERIOD, YEARLY_PERIOD,
};
use crate::series::TimeSeries;
use anyhow::{Result, anyhow};
use chrono::{Datelike, NaiveDate};
use std::f64::consts::PI;

const BASE_RIDGE: f64 = 1e-8;
const SEASONAL_RIDGE: f64 = 1e-3;
/// Yearly terms need at least two years of history.
const MIN_DAYS_FOR_YEARLY: usize = 730;

#[derive(Debug, Clone)]
struct ProphetFit {
    changepoints: Vec<f64>,
    yearly: bool,
    coefficients: Vec<f64>,
    y_scale: f64,
    /// Denominator mapping day offsets into `[0, 1]` over the history.
    t_scale: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Prophet {
    fitted: Option<(TimeSeries, ProphetFit)>,
}

fn fourier_terms(out: &mut Vec<f64>, day: f64, period: f64, order: usize) {
    for k in 1..=order {
        let angle = 2.0 * PI * k as f64 * day / period;
        out.push(angle.sin());
        out.push(angle.cos());
    }
}

fn feature_row(date: NaiveDate, t: f64, changepoints: &[f64], yearly: bool) -> Vec<f64> {
    let mut row = Vec::with_capacity(2 + changepoints.len() + 2 * (PROPHET_WEEKLY_ORDER + PROPHET_YEARLY_ORDER));
    row.push(1.0);
    row.push(t);
    row.extend(changepoints.iter().map(|s| (t - s).max(0.0)));

    let day = date.num_days_from_ce() as f64;
    fourier_terms(&mut row, day, WEEKLY_PERIOD as f64, PROPHET_WEEKLY_ORDER);
    if yearly {
        fourier_terms(&mut row, day, YEARLY_PERIOD, PROPHET_YEARLY_ORDER);
    }
    row
}

fn ridge_vector(changepoints: usize, cols: usize) -> Vec<f64> {
    (0..cols)
        .map(|j| match j {
            0 | 1 => BASE_RIDGE,
            j if j < 2 + changepoints => PROPHET_CHANGEPOINT_PENALTY,
            _ => SEASONAL_RIDGE,
        })
        .collect()
}

impl Forecaster for Prophet {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        check_training_series(series, 3, "Prophet")?;
        let n = series.len();
        let values = series.values();

        let y_scale = values.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
        let y_scale = if y_scale > 0.0 { y_scale } else { 1.0 };
        let t_scale = (n - 1) as f64;

        let horizon = ((n as f64 * PROPHET_CHANGEPOINT_RANGE).floor() as usize).max(1);
        let count = PROPHET_CHANGEPOINTS.min(horizon.saturating_sub(1));
        let changepoints: Vec<f64> = (1..=count)
            .map(|j| (j * horizon / (count + 1)) as f64 / t_scale)
            .collect();
        let yearly = n >= MIN_DAYS_FOR_YEARLY;

        let design: Vec<Vec<f64>> = (0..n)
            .map(|i| feature_row(series.time_at(i), i as f64 / t_scale, &changepoints, yearly))
            .collect();
        let y: Vec<f64> = values.iter().map(|v| v / y_scale).collect();
        let ridge = ridge_vector(changepoints.len(), design[0].len());
        let coefficients = least_squares(&design, &y, &ridge)?;

        model_debug!(
            "Prophet fitted {} changepoints, yearly={}, base slope={:.6}",
            changepoints.len(),
            yearly,
            coefficients[1]
        );
        self.fitted = Some((
            series.clone(),
            ProphetFit {
                changepoints,
                yearly,
                coefficients,
                y_scale,
                t_scale,
            },
        ));
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<TimeSeries> {
        let (series, fit) = self
            .fitted
            .as_ref()
            .ok_or_else(|| anyhow!("Prophet is not fitted"))?;
        let n = series.len();

        let values: Vec<f64> = (0..horizon)
            .map(|h| {
                let idx = n + h;
                let row = feature_row(series.time_at(idx), idx as f64 / fit.t_scale, &fit.changepoints, fit.yearly);
                row.iter()
                    .zip(fit.coefficients.iter())
                    .map(|(x, b)| x * b)
                    .sum::<f64>()
                    * fit.y_scale
            })
            .collect();
        Ok(series.continuation(finite_forecast(values, "Prophet")?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::start;

    #[test]
    fn test_recovers_trend_and_weekly_cycle() {
        let truth = |t: usize| 100.0 + 0.2 * t as f64 + 3.0 * (2.0 * PI * t as f64 / 7.0).sin();
        let values: Vec<f64> = (0..400).map(truth).collect();
        let mut model = Prophet::default();
        model.fit(&TimeSeries::new(start(), values)).unwrap();

        let forecast = model.predict(14).unwrap();
        for (h, v) in forecast.values().iter().enumerate() {
            let expected = truth(400 + h);
            assert!((v - expected).abs() < 0.5, "h={} got {} expected {}", h, v, expected);
        }
    }

    #[test]
    fn test_short_series_still_fits() {
        let mut model = Prophet::default();
        model
            .fit(&TimeSeries::new(start(), vec![10.0, 11.0, 12.5, 12.0, 13.0]))
            .unwrap();
        assert_eq!(model.predict(3).unwrap().len(), 3);
    }
}
