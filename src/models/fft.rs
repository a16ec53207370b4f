//! Fourier-filter forecaster: keep the strongest frequencies of the training
//! window and continue the resulting periodic signal.

use super::{Forecaster, check_training_series, finite_forecast};
use crate::config::FFT_FREQS_TO_KEEP;
use crate::series::TimeSeries;
use anyhow::{Result, anyhow};
use rustfft::{FftPlanner, num_complex::Complex};

#[derive(Debug, Clone)]
pub struct Fft {
    freqs_to_keep: usize,
    fitted: Option<(TimeSeries, Vec<f64>)>,
}

impl Fft {
    pub fn new(freqs_to_keep: usize) -> Self {
        Self {
            freqs_to_keep,
            fitted: None,
        }
    }

    /// Inverse transform of the spectrum restricted to the mean and the
    /// `freqs_to_keep` largest positive frequencies (with their mirrors).
    fn filtered_signal(&self, values: &[f64]) -> Vec<f64> {
        let n = values.len();
        let mut planner = FftPlanner::<f64>::new();

        let mut spectrum: Vec<Complex<f64>> = values.iter().map(|&v| Complex::new(v, 0.0)).collect();
        planner.plan_fft_forward(n).process(&mut spectrum);

        let mut candidates: Vec<usize> = (1..=n / 2).collect();
        candidates.sort_by(|&a, &b| spectrum[b].norm().total_cmp(&spectrum[a].norm()));
        let mut keep = vec![false; n];
        keep[0] = true;
        for &k in candidates.iter().take(self.freqs_to_keep) {
            keep[k] = true;
            keep[(n - k) % n] = true;
        }
        model_debug!(
            "FFT keeping frequencies {:?} of {}",
            candidates.iter().take(self.freqs_to_keep).collect::<Vec<_>>(),
            n
        );

        for (bin, kept) in spectrum.iter_mut().zip(keep.iter()) {
            if !kept {
                *bin = Complex::new(0.0, 0.0);
            }
        }
        planner.plan_fft_inverse(n).process(&mut spectrum);
        spectrum.iter().map(|c| c.re / n as f64).collect()
    }
}

impl Default for Fft {
    fn default() -> Self {
        Self::new(FFT_FREQS_TO_KEEP)
    }
}

impl Forecaster for Fft {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        check_training_series(series, 2, "FFT")?;
        let signal = self.filtered_signal(series.values());
        self.fitted = Some((series.clone(), signal));
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<TimeSeries> {
        let (series, signal) = self
            .fitted
            .as_ref()
            .ok_or_else(|| anyhow!("FFT is not fitted"))?;
        // The filtered signal has period n, so day n + i maps back to i.
        let values = (0..horizon).map(|i| signal[i % signal.len()]).collect();
        Ok(series.continuation(finite_forecast(values, "FFT")?))
    }
}
