//! Daily time series container used by the forecasting models.

use crate::data::AssetFrame;
use anyhow::{Result, anyhow, bail};
use chrono::{Duration, NaiveDate};

/// Evenly spaced daily series. Missing observations are `NaN` until
/// [`TimeSeries::fill_missing`] is applied.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSeries {
    start: NaiveDate,
    values: Vec<f64>,
}

impl TimeSeries {
    pub fn new(start: NaiveDate, values: Vec<f64>) -> Self {
        Self { start, values }
    }

    /// Builds a calendar-daily series; days absent from the frame become `NaN`.
    pub fn from_frame(frame: &AssetFrame) -> Result<Self> {
        if !frame.has_time() {
            bail!("time column is empty or does not match the value column");
        }

        for pair in frame.time.windows(2) {
            if pair[1] <= pair[0] {
                bail!(
                    "time column must be strictly ascending ({} followed by {})",
                    pair[0],
                    pair[1]
                );
            }
        }

        let start = frame.time[0];
        let end = frame.time[frame.time.len() - 1];
        let len = (end - start).num_days() as usize + 1;
        let mut values = vec![f64::NAN; len];
        for (date, value) in frame.time.iter().zip(frame.value.iter()) {
            let idx = (*date - start).num_days() as usize;
            values[idx] = value.unwrap_or(f64::NAN);
        }

        Ok(Self { start, values })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Date of the last point. Equals `start` for an empty series.
    pub fn end(&self) -> NaiveDate {
        self.time_at(self.values.len().saturating_sub(1))
    }

    pub fn time_at(&self, idx: usize) -> NaiveDate {
        self.start + Duration::days(idx as i64)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last_value(&self) -> Option<f64> {
        self.values.last().copied()
    }

    pub fn has_missing(&self) -> bool {
        self.values.iter().any(|v| v.is_nan())
    }

    /// Index of `date` in this series, if it falls inside it.
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        let offset = (date - self.start).num_days();
        if offset < 0 || offset as usize >= self.values.len() {
            None
        } else {
            Some(offset as usize)
        }
    }

    /// Linear interpolation of `NaN` gaps; leading and trailing gaps take the
    /// nearest observed value.
    pub fn fill_missing(&self) -> Result<Self> {
        let observed: Vec<usize> = self
            .values
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nan())
            .map(|(i, _)| i)
            .collect();

        let (&first, &last) = match (observed.first(), observed.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => bail!("series has no observed values to fill from"),
        };

        let mut values = self.values.clone();
        for v in values.iter_mut().take(first) {
            *v = self.values[first];
        }
        for v in values.iter_mut().skip(last + 1) {
            *v = self.values[last];
        }
        for pair in observed.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            let span = (hi - lo) as f64;
            for i in (lo + 1)..hi {
                let ratio = (i - lo) as f64 / span;
                values[i] = self.values[lo] + ratio * (self.values[hi] - self.values[lo]);
            }
        }

        Ok(Self {
            start: self.start,
            values,
        })
    }

    /// Splits into points strictly before `date` and the rest. Both halves
    /// must be non-empty.
    pub fn split_before(&self, date: NaiveDate) -> Result<(Self, Self)> {
        let idx = self.index_of(date).ok_or_else(|| {
            anyhow!(
                "split date {} outside series range {}..={}",
                date,
                self.start,
                self.end()
            )
        })?;
        self.split_at(idx)
    }

    /// Last `n` points as the second half.
    pub fn split_last(&self, n: usize) -> Result<(Self, Self)> {
        if n >= self.values.len() {
            bail!(
                "cannot hold out {} points from a series of length {}",
                n,
                self.values.len()
            );
        }
        self.split_at(self.values.len() - n)
    }

    fn split_at(&self, idx: usize) -> Result<(Self, Self)> {
        if idx == 0 || idx >= self.values.len() {
            bail!(
                "split index {} leaves an empty side (length {})",
                idx,
                self.values.len()
            );
        }
        let (head, tail) = self.values.split_at(idx);
        Ok((
            Self::new(self.start, head.to_vec()),
            Self::new(self.time_at(idx), tail.to_vec()),
        ))
    }

    /// Series starting the day after `self` ends, used for forecasts.
    pub fn continuation(&self, values: Vec<f64>) -> Self {
        Self::new(self.time_at(self.values.len()), values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn frame(time: Vec<NaiveDate>, value: Vec<Option<f64>>) -> AssetFrame {
        AssetFrame {
            symbol: "TEST".to_string(),
            time,
            value,
        }
    }

    #[test]
    fn test_from_frame_inserts_calendar_gaps() {
        // Friday then Monday
        let f = frame(vec![date(2024, 1, 5), date(2024, 1, 8)], vec![Some(1.0), Some(4.0)]);
        let series = TimeSeries::from_frame(&f).unwrap();
        assert_eq!(series.len(), 4);
        assert!(series.has_missing());

        let filled = series.fill_missing().unwrap();
        assert_eq!(filled.values(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(filled.end(), date(2024, 1, 8));
    }

    #[test]
    fn test_from_frame_rejects_unsorted_dates() {
        let f = frame(vec![date(2024, 1, 5), date(2024, 1, 5)], vec![Some(1.0), Some(2.0)]);
        assert!(TimeSeries::from_frame(&f).is_err());

        let empty = frame(Vec::new(), Vec::new());
        assert!(TimeSeries::from_frame(&empty).is_err());
    }

    #[test]
    fn test_fill_missing_edges_and_all_missing() {
        let series = TimeSeries::new(date(2024, 1, 1), vec![f64::NAN, 2.0, f64::NAN, 6.0, f64::NAN]);
        let filled = series.fill_missing().unwrap();
        assert_eq!(filled.values(), &[2.0, 2.0, 4.0, 6.0, 6.0]);

        let empty = TimeSeries::new(date(2024, 1, 1), vec![f64::NAN; 3]);
        assert!(empty.fill_missing().is_err());
    }

    #[test]
    fn test_split_before() {
        let series = TimeSeries::new(date(2024, 1, 1), (0..10).map(|v| v as f64).collect());
        let (train, val) = series.split_before(date(2024, 1, 8)).unwrap();
        assert_eq!(train.len(), 7);
        assert_eq!(val.len(), 3);
        assert_eq!(val.start(), date(2024, 1, 8));

        assert!(series.split_before(date(2024, 1, 1)).is_err());
        assert!(series.split_before(date(2024, 2, 1)).is_err());

        let (train, val) = series.split_before(series.end()).unwrap();
        assert_eq!(train.len(), 9);
        assert_eq!(val.len(), 1);
    }

    #[test]
    fn test_split_last_and_continuation() {
        let series = TimeSeries::new(date(2024, 1, 1), vec![1.0; 5]);
        let (train, val) = series.split_last(2).unwrap();
        assert_eq!(train.len(), 3);
        assert_eq!(val.start(), date(2024, 1, 4));
        assert!(series.split_last(5).is_err());

        let next = train.continuation(vec![0.0; 2]);
        assert_eq!(next.start(), date(2024, 1, 4));
    }
}
