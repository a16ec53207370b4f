//! Baseline forecasters.

use super::{Forecaster, check_training_series};
use crate::config::NAIVE_SEASONAL_K;
use crate::series::TimeSeries;
use anyhow::{Result, anyhow};

/// Extends the straight line through the first and last training points.
#[derive(Debug, Clone, Default)]
pub struct NaiveDrift {
    fitted: Option<(TimeSeries, f64)>,
}

impl Forecaster for NaiveDrift {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        check_training_series(series, 2, "NaiveDrift")?;
        let v = series.values();
        let slope = (v[v.len() - 1] - v[0]) / (v.len() - 1) as f64;
        self.fitted = Some((series.clone(), slope));
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<TimeSeries> {
        let (series, slope) = self
            .fitted
            .as_ref()
            .ok_or_else(|| anyhow!("NaiveDrift is not fitted"))?;
        let last = series.last_value().unwrap_or_default();
        let values = (1..=horizon).map(|h| last + slope * h as f64).collect();
        Ok(series.continuation(values))
    }
}

/// Mean of the training values.
#[derive(Debug, Clone, Default)]
pub struct NaiveMean {
    fitted: Option<(TimeSeries, f64)>,
}

impl Forecaster for NaiveMean {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        check_training_series(series, 1, "NaiveMean")?;
        let mean = series.values().iter().sum::<f64>() / series.len() as f64;
        self.fitted = Some((series.clone(), mean));
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<TimeSeries> {
        let (series, mean) = self
            .fitted
            .as_ref()
            .ok_or_else(|| anyhow!("NaiveMean is not fitted"))?;
        Ok(series.continuation(vec![*mean; horizon]))
    }
}

/// Repeats the last `k` training values.
#[derive(Debug, Clone)]
pub struct NaiveSeasonal {
    k: usize,
    fitted: Option<TimeSeries>,
}

impl NaiveSeasonal {
    pub fn new(k: usize) -> Self {
        Self {
            k: k.max(1),
            fitted: None,
        }
    }
}

impl Default for NaiveSeasonal {
    fn default() -> Self {
        Self::new(NAIVE_SEASONAL_K)
    }
}

impl Forecaster for NaiveSeasonal {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        check_training_series(series, self.k, "NaiveSeasonal")?;
        self.fitted = Some(series.clone());
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<TimeSeries> {
        let series = self
            .fitted
            .as_ref()
            .ok_or_else(|| anyhow!("NaiveSeasonal is not fitted"))?;
        let season = &series.values()[series.len() - self.k..];
        let values = (0..horizon).map(|h| season[h % self.k]).collect();
        Ok(series.continuation(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::linear;

    #[test]
    fn test_drift_extends_line() {
        let mut model = NaiveDrift::default();
        model.fit(&linear(11, 10.0, 1.0)).unwrap();
        let forecast = model.predict(3).unwrap();
        assert_eq!(forecast.values(), &[21.0, 22.0, 23.0]);
    }

    #[test]
    fn test_mean_is_flat() {
        let mut model = NaiveMean::default();
        model.fit(&linear(5, 0.0, 1.0)).unwrap();
        assert_eq!(model.predict(2).unwrap().values(), &[2.0, 2.0]);
    }

    #[test]
    fn test_seasonal_repeats_last_value() {
        let mut model = NaiveSeasonal::default();
        model.fit(&linear(5, 0.0, 1.0)).unwrap();
        assert_eq!(model.predict(3).unwrap().values(), &[4.0, 4.0, 4.0]);

        let mut weekly = NaiveSeasonal::new(2);
        weekly.fit(&linear(5, 0.0, 1.0)).unwrap();
        assert_eq!(weekly.predict(3).unwrap().values(), &[3.0, 4.0, 3.0]);
    }

    #[test]
    fn test_drift_needs_two_points() {
        let mut model = NaiveDrift::default();
        assert!(model.fit(&linear(1, 1.0, 0.0)).is_err());
    }
}
