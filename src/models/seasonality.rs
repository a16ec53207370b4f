//! Seasonal period detection and classical multiplicative decomposition.

use anyhow::{Result, bail};

/// One-sided critical value for a 5% significance level.
const Z_ALPHA: f64 = 1.645;

/// Sample autocorrelation for lags `0..=max_lag`.
pub fn acf(data: &[f64], max_lag: usize) -> Vec<f64> {
    let n = data.len();
    if n == 0 {
        return Vec::new();
    }
    let mean = data.iter().sum::<f64>() / n as f64;
    let var: f64 = data.iter().map(|x| (x - mean).powi(2)).sum();
    if var == 0.0 {
        return vec![0.0; max_lag + 1];
    }

    (0..=max_lag.min(n - 1))
        .map(|lag| {
            data.iter()
                .take(n - lag)
                .zip(data.iter().skip(lag))
                .map(|(a, b)| (a - mean) * (b - mean))
                .sum::<f64>()
                / var
        })
        .collect()
}

/// Smallest lag that is a local maximum of the ACF and exceeds the
/// Bartlett confidence band.
pub fn detect_period(data: &[f64], max_lag: usize) -> Option<usize> {
    let max_lag = max_lag.min(data.len() / 2);
    if max_lag < 3 {
        return None;
    }
    let r = acf(data, max_lag);
    let n = data.len() as f64;

    (2..r.len() - 1)
        .filter(|&m| r[m] > r[m - 1] && r[m] > r[m + 1])
        .find(|&m| {
            let band = ((1.0 + 2.0 * r[1..m].iter().map(|v| v * v).sum::<f64>()) / n).sqrt();
            r[m] > Z_ALPHA * band
        })
}

/// Seasonal factors (mean 1) for positions `t % period`, from a centred
/// moving-average trend.
pub fn multiplicative_indices(data: &[f64], period: usize) -> Result<Vec<f64>> {
    if period < 2 || data.len() < 2 * period {
        bail!(
            "need two full seasons of period {} (got {} points)",
            period,
            data.len()
        );
    }
    if data.iter().any(|v| *v <= 0.0) {
        bail!("multiplicative seasonality requires strictly positive values");
    }

    let n = data.len();
    let half = period / 2;
    let mut sums = vec![0.0; period];
    let mut counts = vec![0usize; period];

    for t in half..(n - half) {
        let trend = if period % 2 == 1 {
            data[t - half..=t + half].iter().sum::<f64>() / period as f64
        } else {
            let inner: f64 = data[t - half + 1..t + half].iter().sum();
            (0.5 * data[t - half] + inner + 0.5 * data[t + half]) / period as f64
        };
        sums[t % period] += data[t] / trend;
        counts[t % period] += 1;
    }

    let mut indices: Vec<f64> = sums
        .iter()
        .zip(counts.iter())
        .map(|(s, &c)| if c > 0 { s / c as f64 } else { 1.0 })
        .collect();
    let mean = indices.iter().sum::<f64>() / period as f64;
    for idx in indices.iter_mut() {
        *idx /= mean;
    }
    Ok(indices)
}

pub fn deseasonalize(data: &[f64], indices: &[f64]) -> Vec<f64> {
    data.iter()
        .enumerate()
        .map(|(t, v)| v / indices[t % indices.len()])
        .collect()
}

/// Applies factors to a forecast whose first point sits at position `offset`.
pub fn reseasonalize(forecast: &[f64], indices: &[f64], offset: usize) -> Vec<f64> {
    forecast
        .iter()
        .enumerate()
        .map(|(h, v)| v * indices[(offset + h) % indices.len()])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weekly(len: usize) -> Vec<f64> {
        (0..len)
            .map(|t| 50.0 + 10.0 * (2.0 * std::f64::consts::PI * t as f64 / 7.0).sin())
            .collect()
    }

    #[test]
    fn test_acf_lag_zero_is_one() {
        let r = acf(&weekly(100), 10);
        assert!((r[0] - 1.0).abs() < 1e-12);
        assert_eq!(r.len(), 11);
    }

    #[test]
    fn test_detects_weekly_period() {
        assert_eq!(detect_period(&weekly(200), 30), Some(7));
    }

    #[test]
    fn test_no_period_on_straight_line() {
        let line: Vec<f64> = (0..200).map(|t| t as f64).collect();
        assert_eq!(detect_period(&line, 30), None);
    }

    #[test]
    fn test_indices_round_trip() {
        let data: Vec<f64> = weekly(70);
        let idx = multiplicative_indices(&data, 7).unwrap();
        assert_eq!(idx.len(), 7);
        assert!((idx.iter().sum::<f64>() / 7.0 - 1.0).abs() < 1e-9);

        let flat = deseasonalize(&data, &idx);
        let back = reseasonalize(&flat, &idx, 0);
        for (a, b) in data.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_indices_reject_non_positive() {
        let mut data = weekly(70);
        data[3] = 0.0;
        assert!(multiplicative_indices(&data, 7).is_err());
    }
}
