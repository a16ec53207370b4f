use std::sync::OnceLock;
use std::time::Duration;
use tracing::warn;

static YAHOO_BASE_URL: OnceLock<String> = OnceLock::new();
static HTTP_TIMEOUT: OnceLock<Duration> = OnceLock::new();
static USER_AGENT: OnceLock<String> = OnceLock::new();

/// Share of each asset frame used for training during model evaluation.
pub const TRAIN_FRACTION: f64 = 0.7;
/// Auto horizon: smallest `x` with `x / (len + x) >= HORIZON_FRACTION`.
pub const HORIZON_FRACTION: f64 = 0.3;

pub const DEFAULT_PRICE_FIELD: &str = "Adj Close";
pub const CLOSE_FIELD: &str = "Close";

pub const DEFAULT_LOG_FILTER: &str = "portfolio_oracle=info";

// ── Model defaults ──────────────────────────────────────────────────────────
pub const WEEKLY_PERIOD: usize = 7;
pub const YEARLY_PERIOD: f64 = 365.25;
pub const ARIMA_P: usize = 12;
pub const ARIMA_D: usize = 1;
pub const ARIMA_Q: usize = 0;
pub const AUTO_ARIMA_MAX_P: usize = 3;
pub const AUTO_ARIMA_MAX_Q: usize = 3;
pub const AUTO_ARIMA_MAX_D: usize = 2;
pub const THETA: f64 = 2.0;
pub const FFT_FREQS_TO_KEEP: usize = 10;
pub const PROPHET_CHANGEPOINTS: usize = 25;
pub const PROPHET_CHANGEPOINT_RANGE: f64 = 0.8;
pub const PROPHET_CHANGEPOINT_PENALTY: f64 = 10.0;
pub const PROPHET_WEEKLY_ORDER: usize = 3;
pub const PROPHET_YEARLY_ORDER: usize = 10;
/// Largest lag inspected when looking for a seasonal period.
pub const SEASONALITY_MAX_LAG: usize = 366;
pub const NAIVE_SEASONAL_K: usize = 1;

// ── Synthetic data ──────────────────────────────────────────────────────────
pub const SYNTHETIC_START_PRICE: f64 = 100.0;
pub const SYNTHETIC_DAILY_DRIFT: f64 = 0.0003;
pub const SYNTHETIC_DAILY_VOL: f64 = 0.015;

pub fn yahoo_base_url() -> &'static str {
    YAHOO_BASE_URL.get_or_init(|| {
        std::env::var("ORACLE_YAHOO_BASE_URL")
            .ok()
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| "https://query1.finance.yahoo.com".to_string())
    })
}

pub fn http_timeout() -> Duration {
    *HTTP_TIMEOUT.get_or_init(|| {
        let secs = match std::env::var("ORACLE_HTTP_TIMEOUT_SECS") {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    warn!(
                        "Invalid ORACLE_HTTP_TIMEOUT_SECS={} ; defaulting to 30 seconds",
                        raw
                    );
                    30
                }
            },
            Err(_) => 30,
        };
        Duration::from_secs(secs)
    })
}

pub fn user_agent() -> &'static str {
    USER_AGENT.get_or_init(|| {
        std::env::var("ORACLE_USER_AGENT")
            .ok()
            .filter(|ua| !ua.trim().is_empty())
            .unwrap_or_else(|| "Mozilla/5.0".to_string())
    })
}
