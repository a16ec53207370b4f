//! Multi-model forecast of a weighted portfolio.
//!
//! For each asset: fetch daily history, normalise it into a [`TimeSeries`],
//! score the ten models on a 70/30 split (MAPE), then refit on everything but
//! the last day and forecast the percentage change over the horizon. The
//! per-asset changes are combined with the caller's weights into one
//! [`PortfolioForecast`].

use crate::config::{DEFAULT_PRICE_FIELD, HORIZON_FRACTION, TRAIN_FRACTION};
use crate::data::{AssetFrame, PriceSource, resolve_price_column, to_asset_frame};
use crate::metrics::mape;
use crate::models::{ModelKind, with_diagnostics};
use crate::series::TimeSeries;
use crate::tables::{
    AccuracyTable, ModelRow, PortfolioForecast, PredictionTable, format_pct, parse_pct,
};
use anyhow::{Context, Result, anyhow, bail};
use chrono::{NaiveDate, Utc};
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct OracleRequest {
    pub portfolio: Vec<String>,
    pub start_date: NaiveDate,
    /// Defaults to today (UTC).
    pub end_date: Option<NaiveDate>,
    /// One weight per portfolio entry, by position. Defaults to `1/n` each.
    pub weights: Option<Vec<f64>>,
    /// Forecast horizon in days. Derived from the first usable asset when unset.
    pub prediction_days: Option<usize>,
    pub based_on: String,
    pub show_model_diagnostics: bool,
}

impl OracleRequest {
    pub fn new(portfolio: Vec<String>, start_date: NaiveDate) -> Self {
        Self {
            portfolio,
            start_date,
            end_date: None,
            weights: None,
            prediction_days: None,
            based_on: DEFAULT_PRICE_FIELD.to_string(),
            show_model_diagnostics: false,
        }
    }

    pub fn with_end_date(mut self, end_date: NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }

    pub fn with_weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn with_prediction_days(mut self, days: usize) -> Self {
        self.prediction_days = Some(days);
        self
    }

    pub fn with_based_on(mut self, field: &str) -> Self {
        self.based_on = field.to_string();
        self
    }

    pub fn with_model_diagnostics(mut self, show: bool) -> Self {
        self.show_model_diagnostics = show;
        self
    }

    fn resolved_weights(&self) -> Vec<f64> {
        match &self.weights {
            Some(weights) => weights.clone(),
            None => vec![1.0 / self.portfolio.len() as f64; self.portfolio.len()],
        }
    }
}

/// Pipeline step at which an asset was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Columns,
    Time,
    Series,
    Split,
    Evaluate,
    Predict,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Columns => "columns",
            Stage::Time => "time",
            Stage::Series => "series",
            Stage::Split => "split",
            Stage::Evaluate => "evaluate",
            Stage::Predict => "predict",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AssetOutcome {
    Processed,
    Skipped { stage: Stage, reason: String },
}

impl AssetOutcome {
    pub fn is_processed(&self) -> bool {
        matches!(self, AssetOutcome::Processed)
    }

    pub fn skipped_at(&self) -> Option<Stage> {
        match self {
            AssetOutcome::Processed => None,
            AssetOutcome::Skipped { stage, .. } => Some(*stage),
        }
    }
}

#[derive(Clone, Debug)]
pub struct OracleReport {
    pub portfolio: PortfolioForecast,
    pub accuracy: AccuracyTable,
    pub predictions: PredictionTable,
    /// `None` only when no asset got far enough to derive a horizon.
    pub prediction_days: Option<usize>,
    pub outcomes: Vec<(String, AssetOutcome)>,
}

impl OracleReport {
    pub fn outcome(&self, symbol: &str) -> Option<&AssetOutcome> {
        self.outcomes.iter().find(|(s, _)| s == symbol).map(|(_, o)| o)
    }
}

struct Skip {
    stage: Stage,
    reason: String,
}

impl Skip {
    fn new(stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }
}

fn at(stage: Stage) -> impl FnOnce(anyhow::Error) -> Skip {
    move |e| Skip::new(stage, format!("{:#}", e))
}

/// Smallest `x >= 1` with `x / (len + x) >= HORIZON_FRACTION`.
pub fn auto_prediction_days(len: usize) -> usize {
    let mut x = 1usize;
    while (x as f64) / ((len + x) as f64) < HORIZON_FRACTION {
        x += 1;
    }
    x
}

/// Row of the asset frame whose date starts the validation split.
fn split_row(len: usize) -> usize {
    ((len as f64 * TRAIN_FRACTION).floor() as usize).min(len.saturating_sub(1))
}

/// MAPE of every model on `val` after fitting on `train`, in model order.
pub fn evaluate_models(train: &TimeSeries, val: &TimeSeries) -> Result<Vec<f64>> {
    ModelKind::ALL
        .iter()
        .map(|&kind| {
            let mut model = kind.build();
            model.fit(train).with_context(|| format!("{} fit", kind))?;
            let forecast = model
                .predict(val.len())
                .with_context(|| format!("{} forecast", kind))?;
            let score = mape(val, &forecast).with_context(|| format!("{} MAPE", kind))?;
            debug!("{}: MAPE {:.4}", kind, score);
            Ok(score)
        })
        .collect()
}

/// Percentage change of each model's last forecast point over `start_value`.
pub fn predict_models(train: &TimeSeries, days: usize, start_value: f64) -> Result<Vec<String>> {
    ModelKind::ALL
        .iter()
        .map(|&kind| {
            let mut model = kind.build();
            model.fit(train).with_context(|| format!("{} fit", kind))?;
            let forecast = model
                .predict(days)
                .with_context(|| format!("{} forecast", kind))?;
            let last = forecast
                .last_value()
                .ok_or_else(|| anyhow!("{} returned an empty forecast", kind))?;
            format_pct(last, start_value).with_context(|| format!("{} percentage change", kind))
        })
        .collect()
}

/// Weighted sum of the prediction table per model. The weight of a row is
/// `weights[i]` where `i` is the first position of its symbol in
/// `portfolio`. Cells that cannot be parsed or weighted are logged and left
/// out.
pub fn aggregate(predictions: &PredictionTable, portfolio: &[String], weights: &[f64]) -> PortfolioForecast {
    let mut result = PortfolioForecast::default();
    for kind in ModelKind::ALL {
        for row in predictions.rows() {
            let weight = portfolio
                .iter()
                .position(|s| *s == row.symbol)
                .and_then(|i| weights.get(i).copied());
            let Some(weight) = weight else {
                warn!("Error processing {} for model {}: no weight for this asset", row.symbol, kind);
                continue;
            };
            match parse_pct(row.get(kind)) {
                Ok(pct) => result.add(kind, pct * weight),
                Err(e) => warn!("Error processing {} for model {}: {:#}", row.symbol, kind, e),
            }
        }
    }
    result
}

/// Runs the full pipeline for every asset and returns the report. Only an
/// empty portfolio is an error; everything else skips the affected asset.
///
/// Model fitting diagnostics are off for the duration of the call unless
/// the request asks for them. Progress and skip events still reach whatever
/// subscriber the caller has installed.
pub async fn oracle<S: PriceSource>(source: &S, request: &OracleRequest) -> Result<OracleReport> {
    if request.portfolio.is_empty() {
        bail!("portfolio must contain at least one asset");
    }

    Ok(with_diagnostics(request.show_model_diagnostics, run(source, request)).await)
}

async fn run<S: PriceSource>(source: &S, request: &OracleRequest) -> OracleReport {
    info!("Collecting data...");
    let end = request.end_date.unwrap_or_else(|| Utc::now().date_naive());
    let weights = request.resolved_weights();
    if weights.len() != request.portfolio.len() {
        warn!(
            "{} weights given for {} assets; unmatched assets are left out of the aggregate",
            weights.len(),
            request.portfolio.len()
        );
    }

    let mut horizon = request.prediction_days;
    let mut accuracy = AccuracyTable::new();
    let mut predictions = PredictionTable::new();
    let mut outcomes = Vec::with_capacity(request.portfolio.len());

    for asset in &request.portfolio {
        info!("Processing asset: {}", asset);
        let outcome = match process_asset(source, request, end, asset, &mut horizon, &mut accuracy).await {
            Ok(row) => {
                info!("Predictions generated for {}", asset);
                predictions.push(row);
                AssetOutcome::Processed
            }
            Err(skip) => {
                warn!("Skipping {} at {} stage: {}", asset, skip.stage, skip.reason);
                AssetOutcome::Skipped {
                    stage: skip.stage,
                    reason: skip.reason,
                }
            }
        };
        outcomes.push((asset.clone(), outcome));
    }

    let horizon_text = horizon.map_or_else(|| "?".to_string(), |d| d.to_string());
    println!("\nAssets MAPE (accuracy score):");
    println!("{}", accuracy);
    println!("Assets returns prediction for the next {} days:", horizon_text);
    println!("{}", predictions);

    let portfolio = aggregate(&predictions, &request.portfolio, &weights);
    println!("Portfolio returns prediction for the next {} days:", horizon_text);
    println!("{}", portfolio);

    OracleReport {
        portfolio,
        accuracy,
        predictions,
        prediction_days: horizon,
        outcomes,
    }
}

async fn process_asset<S: PriceSource>(
    source: &S,
    request: &OracleRequest,
    end: NaiveDate,
    asset: &str,
    horizon: &mut Option<usize>,
    accuracy: &mut AccuracyTable,
) -> std::result::Result<ModelRow<String>, Skip> {
    let mut frame = source
        .fetch_daily(asset, request.start_date, end)
        .await
        .map_err(at(Stage::Fetch))?;
    frame.flatten_columns();

    let column = resolve_price_column(&frame, asset, &request.based_on).map_err(at(Stage::Columns))?;
    if column.fell_back {
        warn!(
            "'{}' not found for {}. Falling back to '{}'.",
            request.based_on, asset, column.name
        );
    }
    let asset_frame = to_asset_frame(&frame, asset, &column.name).map_err(at(Stage::Columns))?;
    if !asset_frame.has_time() {
        return Err(Skip::new(Stage::Time, format!("date column not found for {}", asset)));
    }

    let days = *horizon.get_or_insert_with(|| {
        let days = auto_prediction_days(asset_frame.len());
        info!("Prediction horizon set to {} days from {} rows of {}", days, asset_frame.len(), asset);
        days
    });

    let series = TimeSeries::from_frame(&asset_frame)
        .and_then(|s| s.fill_missing())
        .map_err(at(Stage::Series))?;

    let split_date = asset_frame.time[split_row(asset_frame.len())];
    let (train, val) = series.split_before(split_date).map_err(at(Stage::Split))?;

    info!("Evaluating the models for {}...", asset);
    let scores = evaluate_models(&train, &val).map_err(at(Stage::Evaluate))?;
    accuracy.push(ModelRow::new(asset, scores).map_err(at(Stage::Evaluate))?);
    info!("Models evaluated for {}", asset);

    let prediction = predict_latest(&asset_frame, &series, days).map_err(at(Stage::Predict))?;
    ModelRow::new(asset, prediction).map_err(at(Stage::Predict))
}

fn predict_latest(asset_frame: &AssetFrame, series: &TimeSeries, days: usize) -> Result<Vec<String>> {
    let start_value = asset_frame
        .last_value()
        .ok_or_else(|| anyhow!("{} has no observed value", asset_frame.symbol))?;
    let last_date = asset_frame
        .time
        .last()
        .copied()
        .ok_or_else(|| anyhow!("{} has no dates", asset_frame.symbol))?;

    let train = match series.split_before(last_date) {
        Ok((train, _)) => train,
        Err(e) => {
            debug!("re-split before {} failed ({}), holding out {} days", last_date, e, days);
            series.split_last(days)?.0
        }
    };

    info!("Making the predictions for {}...", asset_frame.symbol);
    predict_models(&train, days, start_value)
}
