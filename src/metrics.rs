use crate::series::TimeSeries;
use anyhow::{Result, bail};

/// Mean absolute percentage error, in percent, over the dates both series cover.
pub fn mape(actual: &TimeSeries, forecast: &TimeSeries) -> Result<f64> {
    let start = actual.start().max(forecast.start());
    let end = actual.end().min(forecast.end());
    if actual.is_empty() || forecast.is_empty() || start > end {
        bail!(
            "series do not overlap ({}..={} vs {}..={})",
            actual.start(),
            actual.end(),
            forecast.start(),
            forecast.end()
        );
    }

    let (Some(a0), Some(f0)) = (actual.index_of(start), forecast.index_of(start)) else {
        bail!("overlap start {} not found in both series", start);
    };
    let n = (end - start).num_days() as usize + 1;
    let a = &actual.values()[a0..a0 + n];
    let f = &forecast.values()[f0..f0 + n];

    if a.iter().any(|v| *v == 0.0) {
        bail!("MAPE is undefined when the actual series contains zeros");
    }

    let total: f64 = a
        .iter()
        .zip(f.iter())
        .map(|(a, f)| ((a - f) / a).abs())
        .sum();
    let score = 100.0 * total / n as f64;
    if !score.is_finite() {
        bail!("MAPE is not finite");
    }
    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_mape_value() {
        let actual = TimeSeries::new(date(1), vec![100.0, 200.0]);
        let forecast = TimeSeries::new(date(1), vec![110.0, 180.0]);
        assert!((mape(&actual, &forecast).unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_mape_uses_overlap_only() {
        let actual = TimeSeries::new(date(1), vec![100.0, 100.0, 100.0]);
        let forecast = TimeSeries::new(date(3), vec![50.0, 1.0]);
        assert!((mape(&actual, &forecast).unwrap() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_mape_errors() {
        let actual = TimeSeries::new(date(1), vec![0.0, 1.0]);
        let forecast = TimeSeries::new(date(1), vec![1.0, 1.0]);
        assert!(mape(&actual, &forecast).is_err());

        let disjoint = TimeSeries::new(date(10), vec![1.0]);
        assert!(mape(&forecast, &disjoint).is_err());
    }
}
