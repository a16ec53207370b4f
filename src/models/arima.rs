//! ARIMA (AutoRegressive Integrated Moving Average) models.
//!
//! - **AR**: past values of the differenced series
//! - **I**: `d` rounds of differencing
//! - **MA**: past one-step forecast errors
//!
//! AR coefficients come from the Yule-Walker equations (Levinson-Durbin), MA
//! coefficients from the autocorrelation of the AR residuals. [`AutoArima`]
//! searches small orders and keeps the lowest AIC.

use super::{Forecaster, check_training_series, finite_forecast};
use super::seasonality::acf;
use crate::config::{ARIMA_D, ARIMA_P, ARIMA_Q, AUTO_ARIMA_MAX_D, AUTO_ARIMA_MAX_P, AUTO_ARIMA_MAX_Q};
use crate::series::TimeSeries;
use anyhow::{Result, anyhow, bail};

/// Lag-1 autocorrelation above which [`AutoArima`] differences once more.
const DIFFERENCING_ACF_THRESHOLD: f64 = 0.9;

#[derive(Debug, Clone)]
struct ArimaFit {
    ar_coeffs: Vec<f64>,
    ma_coeffs: Vec<f64>,
    constant: f64,
    differenced: Vec<f64>,
    residuals: Vec<f64>,
    /// Last value at each differencing level, outermost first.
    tails: Vec<f64>,
    sse: f64,
    effective_len: usize,
}

#[derive(Debug, Clone)]
pub struct Arima {
    p: usize,
    d: usize,
    q: usize,
    fitted: Option<(TimeSeries, ArimaFit)>,
}

impl Arima {
    pub fn new(p: usize, d: usize, q: usize) -> Result<Self> {
        if p > 12 {
            bail!("AR order must be <= 12, got {}", p);
        }
        if d > 2 {
            bail!("Differencing order must be <= 2, got {}", d);
        }
        if q > 10 {
            bail!("MA order must be <= 10, got {}", q);
        }
        Ok(Self { p, d, q, fitted: None })
    }

    pub fn params(&self) -> (usize, usize, usize) {
        (self.p, self.d, self.q)
    }

    pub fn ar_coefficients(&self) -> Option<&[f64]> {
        self.fitted.as_ref().map(|(_, fit)| fit.ar_coeffs.as_slice())
    }

    /// Akaike information criterion of the conditional sum of squares fit.
    pub fn aic(&self) -> Option<f64> {
        self.fitted.as_ref().map(|(_, fit)| {
            let m = fit.effective_len as f64;
            let k = (self.p + self.q + 1) as f64;
            m * (fit.sse / m).max(1e-300).ln() + 2.0 * k
        })
    }

    fn difference(data: &[f64]) -> Vec<f64> {
        data.windows(2).map(|w| w[1] - w[0]).collect()
    }

    fn estimate_ar_coefficients(&self, data: &[f64]) -> Vec<f64> {
        if self.p == 0 {
            return Vec::new();
        }

        let autocorr: Vec<f64> = {
            let n = data.len();
            let mean: f64 = data.iter().sum::<f64>() / n as f64;
            let centered: Vec<f64> = data.iter().map(|x| x - mean).collect();
            (0..=self.p)
                .map(|k| (k..n).map(|i| centered[i] * centered[i - k]).sum::<f64>() / n as f64)
                .collect()
        };

        // Levinson-Durbin recursion
        let mut coeffs = vec![0.0; self.p];
        if autocorr[0].abs() <= 1e-10 {
            return coeffs;
        }
        coeffs[0] = autocorr[1] / autocorr[0];
        let mut error = autocorr[0] * (1.0 - coeffs[0] * coeffs[0]);

        for k in 1..self.p {
            if error.abs() <= 1e-10 {
                break;
            }
            let mut acc = autocorr[k + 1];
            for j in 0..k {
                acc -= coeffs[j] * autocorr[k - j];
            }
            let reflection = acc / error;
            let previous = coeffs.clone();
            coeffs[k] = reflection;
            for j in 0..k {
                coeffs[j] = previous[j] - reflection * previous[k - 1 - j];
            }
            error *= 1.0 - reflection * reflection;
        }

        coeffs
    }

    fn estimate_ma_coefficients(&self, residuals: &[f64]) -> Vec<f64> {
        if self.q == 0 || residuals.is_empty() {
            return vec![0.0; self.q];
        }
        let r = acf(residuals, self.q);
        (0..self.q)
            .map(|k| r.get(k + 1).copied().unwrap_or(0.0).clamp(-0.99, 0.99))
            .collect()
    }

    /// One-step errors of the full ARMA recursion, from index `p`.
    fn conditional_residuals(&self, data: &[f64], constant: f64, ar: &[f64], ma: &[f64]) -> Vec<f64> {
        let mut residuals = vec![0.0; data.len()];
        for i in self.p..data.len() {
            let mut prediction = constant;
            for (j, phi) in ar.iter().enumerate() {
                prediction += phi * (data[i - j - 1] - constant);
            }
            for (j, theta) in ma.iter().enumerate() {
                if i > j {
                    prediction += theta * residuals[i - j - 1];
                }
            }
            residuals[i] = data[i] - prediction;
        }
        residuals
    }

    fn fit_values(&self, data: &[f64]) -> Result<ArimaFit> {
        let mut tails = Vec::with_capacity(self.d);
        let mut differenced = data.to_vec();
        for _ in 0..self.d {
            tails.push(differenced[differenced.len() - 1]);
            differenced = Self::difference(&differenced);
        }

        let n = differenced.len();
        let constant = differenced.iter().sum::<f64>() / n as f64;
        let ar_coeffs = self.estimate_ar_coefficients(&differenced);
        let ar_residuals = self.conditional_residuals(&differenced, constant, &ar_coeffs, &[]);
        let ma_coeffs = self.estimate_ma_coefficients(&ar_residuals[self.p..]);
        let residuals = self.conditional_residuals(&differenced, constant, &ar_coeffs, &ma_coeffs);

        let sse: f64 = residuals[self.p..].iter().map(|e| e * e).sum();
        if !sse.is_finite() {
            bail!("ARIMA({},{},{}) diverged while fitting", self.p, self.d, self.q);
        }

        Ok(ArimaFit {
            ar_coeffs,
            ma_coeffs,
            constant,
            differenced,
            residuals,
            tails,
            sse,
            effective_len: n - self.p,
        })
    }

    fn forecast_values(&self, fit: &ArimaFit, steps: usize) -> Vec<f64> {
        let n = fit.differenced.len();
        let mut extended = fit.differenced.clone();
        let mut extended_residuals = fit.residuals.clone();

        for _ in 0..steps {
            let mut forecast = fit.constant;
            for (j, phi) in fit.ar_coeffs.iter().enumerate() {
                forecast += phi * (extended[extended.len() - j - 1] - fit.constant);
            }
            for (j, theta) in fit.ma_coeffs.iter().enumerate() {
                forecast += theta * extended_residuals[extended_residuals.len() - j - 1];
            }
            extended.push(forecast);
            extended_residuals.push(0.0);
        }

        // Integrate back through each differencing level, innermost first.
        let mut result = extended[n..].to_vec();
        for &tail in fit.tails.iter().rev() {
            let mut acc = tail;
            for v in result.iter_mut() {
                acc += *v;
                *v = acc;
            }
        }
        result
    }
}

impl Default for Arima {
    fn default() -> Self {
        Self {
            p: ARIMA_P,
            d: ARIMA_D,
            q: ARIMA_Q,
            fitted: None,
        }
    }
}

impl Forecaster for Arima {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        check_training_series(series, self.p + self.d + self.q + 10, "ARIMA")?;
        let fit = self.fit_values(series.values())?;
        model_debug!(
            "ARIMA({},{},{}) ar={:?} ma={:?} c={:.6}",
            self.p, self.d, self.q, fit.ar_coeffs, fit.ma_coeffs, fit.constant
        );
        self.fitted = Some((series.clone(), fit));
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<TimeSeries> {
        let (series, fit) = self
            .fitted
            .as_ref()
            .ok_or_else(|| anyhow!("ARIMA is not fitted"))?;
        let values = finite_forecast(self.forecast_values(fit, horizon), "ARIMA")?;
        Ok(series.continuation(values))
    }
}

/// Order search over `d <= 2`, `p <= 3`, `q <= 3`.
#[derive(Debug, Clone, Default)]
pub struct AutoArima {
    selected: Option<Arima>,
}

impl AutoArima {
    pub fn selected_order(&self) -> Option<(usize, usize, usize)> {
        self.selected.as_ref().map(Arima::params)
    }

    fn choose_d(data: &[f64]) -> usize {
        let mut d = 0;
        let mut current = data.to_vec();
        while d < AUTO_ARIMA_MAX_D && current.len() > 3 {
            let r = acf(&current, 1);
            if r.get(1).copied().unwrap_or(0.0) <= DIFFERENCING_ACF_THRESHOLD {
                break;
            }
            current = Arima::difference(&current);
            d += 1;
        }
        d
    }
}

impl Forecaster for AutoArima {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        check_training_series(series, 10, "AutoARIMA")?;
        let d = Self::choose_d(series.values());

        let mut best: Option<(Arima, f64)> = None;
        for p in 0..=AUTO_ARIMA_MAX_P {
            for q in 0..=AUTO_ARIMA_MAX_Q {
                let mut candidate = Arima::new(p, d, q)?;
                if candidate.fit(series).is_err() {
                    continue;
                }
                let Some(aic) = candidate.aic().filter(|a| a.is_finite()) else {
                    continue;
                };
                if best.as_ref().is_none_or(|(_, best_aic)| aic < *best_aic) {
                    best = Some((candidate, aic));
                }
            }
        }

        let (model, aic) = best.ok_or_else(|| anyhow!("AutoARIMA found no admissible order"))?;
        model_debug!("AutoARIMA selected {:?} (aic={:.3})", model.params(), aic);
        self.selected = Some(model);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<TimeSeries> {
        self.selected
            .as_ref()
            .ok_or_else(|| anyhow!("AutoARIMA is not fitted"))?
            .predict(horizon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::{linear, start};

    #[test]
    fn test_arima_creation() {
        assert!(Arima::new(1, 1, 1).is_ok());
        assert!(Arima::new(13, 0, 0).is_err());
        assert!(Arima::new(1, 3, 0).is_err());
    }

    #[test]
    fn test_arima_continues_linear_trend() {
        let mut model = Arima::new(1, 1, 0).unwrap();
        model.fit(&linear(50, 1.0, 1.0)).unwrap();
        let forecast = model.predict(3).unwrap();
        for (h, v) in forecast.values().iter().enumerate() {
            assert!((v - (51.0 + h as f64)).abs() < 1e-6, "h={} got {}", h, v);
        }
    }

    #[test]
    fn test_second_order_differencing_integrates_back() {
        let values: Vec<f64> = (0..40).map(|t| (t * t) as f64).collect();
        let mut model = Arima::new(0, 2, 0).unwrap();
        model.fit(&TimeSeries::new(start(), values)).unwrap();
        let forecast = model.predict(2).unwrap();
        assert!((forecast.values()[0] - 1600.0).abs() < 1e-6);
        assert!((forecast.values()[1] - 1681.0).abs() < 1e-6);
    }

    #[test]
    fn test_ar1_coefficient_recovered() {
        let mut x = vec![0.0; 500];
        let mut state: u64 = 42;
        for t in 1..500 {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let noise = ((state >> 33) as f64 / (1u64 << 31) as f64) - 0.5;
            x[t] = 0.7 * x[t - 1] + noise;
        }
        let mut model = Arima::new(1, 0, 0).unwrap();
        model.fit(&TimeSeries::new(start(), x)).unwrap();
        let phi = model.ar_coefficients().unwrap()[0];
        assert!((phi - 0.7).abs() < 0.1, "phi={}", phi);
    }

    #[test]
    fn test_default_arima_needs_enough_history() {
        let mut model = Arima::default();
        assert!(model.fit(&linear(20, 1.0, 1.0)).is_err());
        assert!(model.fit(&linear(40, 1.0, 1.0)).is_ok());
    }

    #[test]
    fn test_auto_arima_differences_trending_series() {
        let mut model = AutoArima::default();
        model.fit(&linear(80, 10.0, 0.5)).unwrap();
        let (_, d, _) = model.selected_order().unwrap();
        assert!(d >= 1);
        let forecast = model.predict(4).unwrap();
        assert!((forecast.values()[3] - (10.0 + 0.5 * 83.0)).abs() < 1e-3);
    }
}
