//! Per-asset result tables and the portfolio aggregate.
//!
//! Every table has one column per [`ModelKind`], always in
//! [`ModelKind::ALL`] order, and one row per processed asset.

use crate::models::ModelKind;
use anyhow::{Context, Result, bail};
use std::fmt;

/// One asset's values, one per model in [`ModelKind::ALL`] order.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelRow<T> {
    pub symbol: String,
    cells: Vec<T>,
}

impl<T> ModelRow<T> {
    pub fn new(symbol: &str, cells: Vec<T>) -> Result<Self> {
        if cells.len() != ModelKind::ALL.len() {
            bail!(
                "row for {} has {} cells, expected {}",
                symbol,
                cells.len(),
                ModelKind::ALL.len()
            );
        }
        Ok(Self {
            symbol: symbol.to_string(),
            cells,
        })
    }

    pub fn get(&self, kind: ModelKind) -> &T {
        &self.cells[kind.index()]
    }

    pub fn cells(&self) -> &[T] {
        &self.cells
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelTable<T> {
    rows: Vec<ModelRow<T>>,
}

impl<T> Default for ModelTable<T> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<T> ModelTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: ModelRow<T>) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[ModelRow<T>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, symbol: &str) -> Option<&ModelRow<T>> {
        self.rows.iter().find(|r| r.symbol == symbol)
    }
}

/// MAPE per asset and model.
pub type AccuracyTable = ModelTable<f64>;
/// Formatted percentage change per asset and model, e.g. `"3.214 %"`.
pub type PredictionTable = ModelTable<String>;

/// Weighted sum of per-asset percentage changes, one value per model.
#[derive(Clone, Debug, PartialEq)]
pub struct PortfolioForecast {
    values: Vec<f64>,
}

impl Default for PortfolioForecast {
    fn default() -> Self {
        Self {
            values: vec![0.0; ModelKind::ALL.len()],
        }
    }
}

impl PortfolioForecast {
    pub fn get(&self, kind: ModelKind) -> f64 {
        self.values[kind.index()]
    }

    pub fn add(&mut self, kind: ModelKind, value: f64) {
        self.values[kind.index()] += value;
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModelKind, f64)> + '_ {
        ModelKind::ALL.iter().copied().zip(self.values.iter().copied())
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Percentage change of `predicted` over `start`, rounded and formatted
/// with three decimals: `"3.214 %"`.
pub fn format_pct(predicted: f64, start: f64) -> Result<String> {
    if start == 0.0 {
        bail!("cannot compute a percentage change from a zero start value");
    }
    let pct = round3((predicted - start) / start * 100.0);
    if !pct.is_finite() {
        bail!("percentage change is not finite (pred={}, start={})", predicted, start);
    }
    Ok(format!("{:.3} %", pct))
}

/// Inverse of [`format_pct`]: strips the trailing `%` and parses the number.
pub fn parse_pct(cell: &str) -> Result<f64> {
    let number = cell.trim().trim_end_matches('%').trim();
    number
        .parse::<f64>()
        .with_context(|| format!("'{}' is not a percentage", cell))
}

fn write_grid(f: &mut fmt::Formatter<'_>, rows: Vec<(String, Vec<String>)>) -> fmt::Result {
    let labels: Vec<&str> = ModelKind::ALL.iter().map(|k| k.label()).collect();
    let first = rows.iter().map(|(s, _)| s.len()).max().unwrap_or(0);
    let widths: Vec<usize> = labels
        .iter()
        .enumerate()
        .map(|(i, label)| {
            rows.iter()
                .map(|(_, cells)| cells[i].len())
                .max()
                .unwrap_or(0)
                .max(label.len())
        })
        .collect();

    write!(f, "{:<first$}", "")?;
    for (label, &width) in labels.iter().zip(&widths) {
        write!(f, "  {:>width$}", label)?;
    }
    writeln!(f)?;
    for (symbol, cells) in &rows {
        write!(f, "{:<first$}", symbol)?;
        for (cell, &width) in cells.iter().zip(&widths) {
            write!(f, "  {:>width$}", cell)?;
        }
        writeln!(f)?;
    }
    Ok(())
}

impl fmt::Display for AccuracyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = self
            .rows
            .iter()
            .map(|r| (r.symbol.clone(), r.cells.iter().map(|v| format!("{:.6}", v)).collect()))
            .collect();
        write_grid(f, rows)
    }
}

impl fmt::Display for PredictionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = self
            .rows
            .iter()
            .map(|r| (r.symbol.clone(), r.cells.clone()))
            .collect();
        write_grid(f, rows)
    }
}

impl fmt::Display for PortfolioForecast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = ModelKind::ALL.iter().map(|k| k.label().len()).max().unwrap_or(0);
        for (kind, value) in self.iter() {
            writeln!(f, "{:<width$}  {:>10.3}", kind.label(), value)?;
        }
        Ok(())
    }
}
