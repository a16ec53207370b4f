use crate::config::{
    CLOSE_FIELD, SYNTHETIC_DAILY_DRIFT, SYNTHETIC_DAILY_VOL, SYNTHETIC_START_PRICE,
};
use anyhow::{Context, Result, anyhow, bail};
use chrono::{Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use tracing::{debug, info};

/// Column header of a [`PriceFrame`]. Multi-field downloads label columns
/// with a `(field, ticker)` pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ColumnName {
    Flat(String),
    Levels(String, String),
}

impl ColumnName {
    pub fn flat(name: &str) -> Self {
        Self::Flat(name.to_string())
    }

    pub fn levels(field: &str, ticker: &str) -> Self {
        Self::Levels(field.to_string(), ticker.to_string())
    }

    /// Single-level name, levels joined with `_` and trimmed.
    pub fn flattened(&self) -> String {
        match self {
            Self::Flat(name) => name.trim().to_string(),
            Self::Levels(field, ticker) => format!("{}_{}", field, ticker).trim().to_string(),
        }
    }
}

impl fmt::Display for ColumnName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flat(name) => write!(f, "{}", name),
            Self::Levels(field, ticker) => write!(f, "({}, {})", field, ticker),
        }
    }
}

/// Daily price table as returned by a market-data source.
#[derive(Clone, Debug, Default)]
pub struct PriceFrame {
    pub index: Vec<NaiveDate>,
    pub columns: Vec<(ColumnName, Vec<Option<f64>>)>,
}

impl PriceFrame {
    pub fn new(index: Vec<NaiveDate>) -> Self {
        Self {
            index,
            columns: Vec::new(),
        }
    }

    pub fn with_column(mut self, name: ColumnName, values: Vec<Option<f64>>) -> Self {
        self.columns.push((name, values));
        self
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn is_multi_level(&self) -> bool {
        self.columns
            .iter()
            .any(|(name, _)| matches!(name, ColumnName::Levels(..)))
    }

    pub fn flatten_columns(&mut self) {
        for (name, _) in self.columns.iter_mut() {
            if let ColumnName::Levels(..) = name {
                *name = ColumnName::Flat(name.flattened());
            }
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|(name, _)| name.flattened()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|(col, _)| col.flattened() == name)
            .map(|(_, values)| values.as_slice())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Rows with `start <= date <= end`.
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> Self {
        let keep: Vec<usize> = self
            .index
            .iter()
            .enumerate()
            .filter(|(_, d)| **d >= start && **d <= end)
            .map(|(i, _)| i)
            .collect();

        Self {
            index: keep.iter().map(|&i| self.index[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|(name, values)| {
                    let kept = keep
                        .iter()
                        .map(|&i| values.get(i).copied().flatten())
                        .collect();
                    (name.clone(), kept)
                })
                .collect(),
        }
    }
}

/// Price column picked for an asset, and whether it came from the close fallback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedColumn {
    pub name: String,
    pub fell_back: bool,
}

fn qualified_column(frame: &PriceFrame, asset: &str, field: &str) -> String {
    let suffix = format!("_{}", asset);
    if frame.column_names().iter().any(|c| c.ends_with(&suffix)) {
        format!("{}_{}", field, asset)
    } else {
        field.to_string()
    }
}

/// Finds the column holding `based_on` prices for `asset` in a flattened
/// frame, falling back to the close column when the field is missing.
pub fn resolve_price_column(frame: &PriceFrame, asset: &str, based_on: &str) -> Result<ResolvedColumn> {
    let requested = qualified_column(frame, asset, based_on);
    if frame.has_column(&requested) {
        return Ok(ResolvedColumn {
            name: requested,
            fell_back: false,
        });
    }

    if based_on == CLOSE_FIELD {
        bail!("Column '{}' not found for {}", based_on, asset);
    }

    let fallback = qualified_column(frame, asset, CLOSE_FIELD);
    if frame.has_column(&fallback) {
        return Ok(ResolvedColumn {
            name: fallback,
            fell_back: true,
        });
    }

    bail!("Neither '{}' nor '{}' found for {}", based_on, CLOSE_FIELD, asset)
}

/// Canonical two-column (`time`, `value`) form of one asset's prices.
#[derive(Clone, Debug)]
pub struct AssetFrame {
    pub symbol: String,
    pub time: Vec<NaiveDate>,
    pub value: Vec<Option<f64>>,
}

impl AssetFrame {
    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn has_time(&self) -> bool {
        !self.time.is_empty() && self.time.len() == self.value.len()
    }

    /// Last observed (non-missing) value.
    pub fn last_value(&self) -> Option<f64> {
        self.value.iter().rev().find_map(|v| *v)
    }
}

pub fn to_asset_frame(frame: &PriceFrame, asset: &str, column: &str) -> Result<AssetFrame> {
    let values = frame
        .column(column)
        .ok_or_else(|| anyhow!("Column '{}' not found for {}", column, asset))?;

    Ok(AssetFrame {
        symbol: asset.to_string(),
        time: frame.index.clone(),
        value: values.to_vec(),
    })
}

// ──────────────────────────────────────────────────────────────────────────────
// Sources
// ──────────────────────────────────────────────────────────────────────────────

/// Anything that can produce daily price history for a ticker.
pub trait PriceSource {
    fn fetch_daily(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Future<Output = Result<PriceFrame>> + Send;
}

#[derive(Deserialize, Debug)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Deserialize, Debug)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    error: Option<YahooError>,
}

#[derive(Deserialize, Debug)]
struct YahooError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
struct YahooResult {
    meta: Option<YahooMeta>,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: YahooIndicators,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct YahooMeta {
    exchange_timezone_name: Option<String>,
}

#[derive(Deserialize, Debug)]
struct YahooIndicators {
    #[serde(default)]
    quote: Vec<YahooQuote>,
    #[serde(default)]
    adjclose: Vec<YahooAdjClose>,
}

#[derive(Deserialize, Debug, Default)]
struct YahooQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Deserialize, Debug)]
struct YahooAdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

fn at(values: &[Option<f64>], i: usize) -> Option<f64> {
    values.get(i).copied().flatten()
}

/// Turns a chart response into a frame with `(field, symbol)` columns.
fn frame_from_chart(symbol: &str, response: YahooChartResponse) -> Result<PriceFrame> {
    if let Some(err) = response.chart.error {
        bail!(
            "Yahoo chart error for {}: {} ({})",
            symbol,
            err.description.unwrap_or_default(),
            err.code.unwrap_or_default()
        );
    }

    let result = response
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| anyhow!("No data found for {}", symbol))?;

    let tz: chrono_tz::Tz = result
        .meta
        .as_ref()
        .and_then(|m| m.exchange_timezone_name.as_deref())
        .and_then(|name| name.parse().ok())
        .unwrap_or(chrono_tz::UTC);

    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let adjclose = result.indicators.adjclose.into_iter().next().map(|a| a.adjclose);

    let mut index = Vec::with_capacity(result.timestamp.len());
    let mut open = Vec::new();
    let mut high = Vec::new();
    let mut low = Vec::new();
    let mut close = Vec::new();
    let mut adj = Vec::new();
    let mut volume = Vec::new();

    for (i, &ts) in result.timestamp.iter().enumerate() {
        let row_close = at(&quote.close, i);
        let row_adj = adjclose.as_ref().and_then(|a| at(a, i));
        if row_close.is_none() && row_adj.is_none() {
            continue;
        }
        let date = Utc
            .timestamp_opt(ts, 0)
            .single()
            .ok_or_else(|| anyhow!("Invalid timestamp {} for {}", ts, symbol))?
            .with_timezone(&tz)
            .date_naive();

        index.push(date);
        open.push(at(&quote.open, i));
        high.push(at(&quote.high, i));
        low.push(at(&quote.low, i));
        close.push(row_close);
        adj.push(row_adj);
        volume.push(at(&quote.volume, i));
    }

    let mut frame = PriceFrame::new(index)
        .with_column(ColumnName::levels("Open", symbol), open)
        .with_column(ColumnName::levels("High", symbol), high)
        .with_column(ColumnName::levels("Low", symbol), low)
        .with_column(ColumnName::levels("Close", symbol), close);
    if adjclose.is_some() {
        frame = frame.with_column(ColumnName::levels("Adj Close", symbol), adj);
    }
    Ok(frame.with_column(ColumnName::levels("Volume", symbol), volume))
}

/// Parses a chart body. Yahoo answers unknown symbols with a JSON error and a
/// non-2xx status, so the status only shows up when the body is not JSON.
fn decode_chart(symbol: &str, status: reqwest::StatusCode, body: &str) -> Result<YahooChartResponse> {
    serde_json::from_str(body).with_context(|| format!("decoding chart for {} (HTTP {})", symbol, status))
}

/// Daily history from the Yahoo Finance chart API.
#[derive(Clone, Debug)]
pub struct YahooSource {
    client: reqwest::Client,
    base_url: String,
}

impl YahooSource {
    pub fn new() -> Result<Self> {
        Self::with_base_url(crate::config::yahoo_base_url())
    }

    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(crate::config::user_agent())
            .timeout(crate::config::http_timeout())
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn chart_url(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        let period1 = start.and_time(chrono::NaiveTime::MIN).and_utc().timestamp();
        let period2 = (end + Duration::days(1))
            .and_time(chrono::NaiveTime::MIN)
            .and_utc()
            .timestamp();
        format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d&events=div%2Csplits&includeAdjustedClose=true",
            self.base_url, symbol, period1, period2
        )
    }
}

impl PriceSource for YahooSource {
    async fn fetch_daily(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<PriceFrame> {
        let url = self.chart_url(symbol, start, end);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("requesting chart for {}", symbol))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("reading chart body for {}", symbol))?;

        let frame = frame_from_chart(symbol, decode_chart(symbol, status, &body)?)?;
        info!("Fetched {} daily rows for {}", frame.len(), symbol);
        Ok(frame)
    }
}

/// Seeded geometric random walk on business days. Columns are single-level
/// and carry no adjusted close.
#[derive(Clone, Debug)]
pub struct SyntheticSource {
    pub seed: u64,
    pub start_price: f64,
    pub drift: f64,
    pub volatility: f64,
}

impl SyntheticSource {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            start_price: SYNTHETIC_START_PRICE,
            drift: SYNTHETIC_DAILY_DRIFT,
            volatility: SYNTHETIC_DAILY_VOL,
        }
    }

    fn symbol_seed(&self, symbol: &str) -> u64 {
        symbol
            .bytes()
            .fold(self.seed ^ 0xcbf2_9ce4_8422_2325, |acc, b| {
                (acc ^ b as u64).wrapping_mul(0x0100_0000_01b3)
            })
    }

    pub fn generate(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<PriceFrame> {
        let returns = Normal::new(self.drift, self.volatility)
            .map_err(|e| anyhow!("invalid synthetic parameters: {}", e))?;
        let mut rng = StdRng::seed_from_u64(self.symbol_seed(symbol));

        let mut index = Vec::new();
        let mut open = Vec::new();
        let mut high = Vec::new();
        let mut low = Vec::new();
        let mut close = Vec::new();
        let mut volume = Vec::new();
        let mut price = self.start_price;

        let mut day = start;
        while day <= end {
            if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
                let prev = price;
                price *= returns.sample(&mut rng).exp();
                index.push(day);
                open.push(Some(prev));
                high.push(Some(prev.max(price) * 1.002));
                low.push(Some(prev.min(price) * 0.998));
                close.push(Some(price));
                volume.push(Some(1_000_000.0));
            }
            day += Duration::days(1);
        }

        Ok(PriceFrame::new(index)
            .with_column(ColumnName::flat("Open"), open)
            .with_column(ColumnName::flat("High"), high)
            .with_column(ColumnName::flat("Low"), low)
            .with_column(ColumnName::flat("Close"), close)
            .with_column(ColumnName::flat("Volume"), volume))
    }
}

impl PriceSource for SyntheticSource {
    async fn fetch_daily(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<PriceFrame> {
        self.generate(symbol, start, end)
    }
}

/// Pre-built frames keyed by ticker.
#[derive(Clone, Debug, Default)]
pub struct InMemorySource {
    frames: HashMap<String, PriceFrame>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: &str, frame: PriceFrame) {
        self.frames.insert(symbol.to_string(), frame);
    }

    pub fn with_frame(mut self, symbol: &str, frame: PriceFrame) -> Self {
        self.insert(symbol, frame);
        self
    }
}

impl PriceSource for InMemorySource {
    async fn fetch_daily(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<PriceFrame> {
        self.frames
            .get(symbol)
            .map(|frame| frame.between(start, end))
            .ok_or_else(|| anyhow!("No data for {}", symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn multi_level_frame() -> PriceFrame {
        PriceFrame::new(vec![date(2024, 1, 2), date(2024, 1, 3)])
            .with_column(ColumnName::levels("Close", "AAPL"), vec![Some(1.0), Some(2.0)])
            .with_column(ColumnName::levels("Volume", "AAPL"), vec![Some(10.0), Some(20.0)])
    }

    #[test]
    fn test_flatten_columns_joins_levels() {
        let mut frame = multi_level_frame();
        assert!(frame.is_multi_level());
        frame.flatten_columns();
        assert!(!frame.is_multi_level());
        assert_eq!(frame.column_names(), vec!["Close_AAPL", "Volume_AAPL"]);
    }

    #[test]
    fn test_resolve_falls_back_to_close() {
        let mut frame = multi_level_frame();
        frame.flatten_columns();

        let resolved = resolve_price_column(&frame, "AAPL", "Adj Close").unwrap();
        assert_eq!(resolved.name, "Close_AAPL");
        assert!(resolved.fell_back);
    }

    #[test]
    fn test_resolve_flat_requested_field() {
        let frame = PriceFrame::new(vec![date(2024, 1, 2)])
            .with_column(ColumnName::flat("Adj Close"), vec![Some(1.0)])
            .with_column(ColumnName::flat("Close"), vec![Some(1.1)]);

        let resolved = resolve_price_column(&frame, "MSFT", "Adj Close").unwrap();
        assert_eq!(resolved.name, "Adj Close");
        assert!(!resolved.fell_back);
    }

    #[test]
    fn test_resolve_fails_without_close() {
        let frame = PriceFrame::new(vec![date(2024, 1, 2)])
            .with_column(ColumnName::flat("Volume"), vec![Some(1.0)]);

        assert!(resolve_price_column(&frame, "MSFT", "Adj Close").is_err());
        assert!(resolve_price_column(&frame, "MSFT", "Open").is_err());
    }

    #[test]
    fn test_frame_from_chart_reads_adjclose_and_timezone() {
        // 2024-01-02 14:30 UTC and 2024-01-03 14:30 UTC, a null bar in between.
        let body = r#"{
            "chart": {
                "result": [{
                    "meta": {"exchangeTimezoneName": "America/New_York"},
                    "timestamp": [1704205800, 1704250000, 1704292200],
                    "indicators": {
                        "quote": [{
                            "open": [1.0, null, 2.0],
                            "high": [1.5, null, 2.5],
                            "low": [0.5, null, 1.5],
                            "close": [1.2, null, 2.2],
                            "volume": [100, null, 200]
                        }],
                        "adjclose": [{"adjclose": [1.1, null, 2.1]}]
                    }
                }],
                "error": null
            }
        }"#;
        let response: YahooChartResponse = serde_json::from_str(body).unwrap();
        let mut frame = frame_from_chart("AAPL", response).unwrap();

        assert_eq!(frame.index, vec![date(2024, 1, 2), date(2024, 1, 3)]);
        assert!(frame.is_multi_level());
        frame.flatten_columns();
        assert_eq!(frame.column("Adj Close_AAPL").unwrap(), &[Some(1.1), Some(2.1)]);
        assert_eq!(frame.column("Close_AAPL").unwrap(), &[Some(1.2), Some(2.2)]);
    }

    #[test]
    fn test_frame_from_chart_reports_api_error() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let response: YahooChartResponse = serde_json::from_str(body).unwrap();
        let err = frame_from_chart("NOPE", response).unwrap_err();
        assert!(err.to_string().contains("delisted"));
    }

    #[test]
    fn test_decode_chart_reports_http_status_on_non_json_body() {
        let err = decode_chart("AAPL", reqwest::StatusCode::TOO_MANY_REQUESTS, "<html>Too Many Requests</html>")
            .unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("AAPL"), "{}", message);
        assert!(message.contains("429"), "{}", message);

        let not_found = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found"}}}"#;
        assert!(decode_chart("NOPE", reqwest::StatusCode::NOT_FOUND, not_found).is_ok());
    }

    #[test]
    fn test_synthetic_source_is_deterministic_business_days() {
        let source = SyntheticSource::new(7);
        let a = source.generate("AAPL", date(2024, 1, 1), date(2024, 1, 31)).unwrap();
        let b = source.generate("AAPL", date(2024, 1, 1), date(2024, 1, 31)).unwrap();
        let c = source.generate("MSFT", date(2024, 1, 1), date(2024, 1, 31)).unwrap();

        assert_eq!(a.len(), 23);
        assert!(a.index.iter().all(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun)));
        assert_eq!(a.column("Close"), b.column("Close"));
        assert_ne!(a.column("Close"), c.column("Close"));
        assert!(!a.has_column("Adj Close"));
    }

    #[tokio::test]
    async fn test_in_memory_source_filters_range() {
        let source = InMemorySource::new().with_frame("AAPL", multi_level_frame());
        let frame = source
            .fetch_daily("AAPL", date(2024, 1, 3), date(2024, 1, 31))
            .await
            .unwrap();
        assert_eq!(frame.index, vec![date(2024, 1, 3)]);

        assert!(source.fetch_daily("MSFT", date(2024, 1, 1), date(2024, 1, 31)).await.is_err());
    }

    #[test]
    fn test_to_asset_frame_last_value_skips_missing() {
        let frame = PriceFrame::new(vec![date(2024, 1, 2), date(2024, 1, 3)])
            .with_column(ColumnName::flat("Close"), vec![Some(5.0), None]);
        let asset = to_asset_frame(&frame, "X", "Close").unwrap();
        assert!(asset.has_time());
        assert_eq!(asset.last_value(), Some(5.0));
    }
}
