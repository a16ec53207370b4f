use chrono::NaiveDate;
use clap::Parser;
use portfolio_oracle::config::{DEFAULT_LOG_FILTER, DEFAULT_PRICE_FIELD};
use portfolio_oracle::data::{SyntheticSource, YahooSource};
use portfolio_oracle::oracle::{OracleReport, OracleRequest, oracle};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Portfolio Oracle: multi-model return forecasts for a weighted portfolio",
    after_help = "EXAMPLES:
    # Equal-weight forecast from Yahoo Finance
    cargo run --release -- --portfolio AAPL,MSFT --start-date 2020-01-01

    # Custom weights and a fixed 30-day horizon
    cargo run --release -- --portfolio AAPL,MSFT --start-date 2020-01-01 --weights 0.6,0.4 --prediction-days 30

    # Offline run on synthetic prices
    cargo run --release -- --portfolio AAA,BBB --start-date 2022-01-01 --synthetic --seed 7"
)]
struct Args {
    /// Comma-separated tickers (e.g., AAPL,MSFT)
    #[arg(long)]
    portfolio: String,

    /// First day of history (YYYY-MM-DD)
    #[arg(long)]
    start_date: NaiveDate,

    /// Last day of history (default: today)
    #[arg(long)]
    end_date: Option<NaiveDate>,

    /// Comma-separated weights, one per ticker (default: equal weights)
    #[arg(long, value_delimiter = ',')]
    weights: Option<Vec<f64>>,

    /// Forecast horizon in days, at least 1 (default: derived from the first asset's history)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    prediction_days: Option<u64>,

    /// Price field to forecast; falls back to Close when missing
    #[arg(long, default_value = DEFAULT_PRICE_FIELD)]
    based_on: String,

    /// Use a seeded random walk instead of Yahoo Finance
    #[arg(long)]
    synthetic: bool,

    /// Seed for --synthetic
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Keep per-model fitting diagnostics in the log
    #[arg(long)]
    show_model_diagnostics: bool,
}

impl Args {
    fn request(&self) -> OracleRequest {
        let symbols: Vec<String> = self
            .portfolio
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        let mut request = OracleRequest::new(symbols, self.start_date)
            .with_based_on(&self.based_on)
            .with_model_diagnostics(self.show_model_diagnostics);
        if let Some(end) = self.end_date {
            request = request.with_end_date(end);
        }
        if let Some(weights) = &self.weights {
            request = request.with_weights(weights.clone());
        }
        if let Some(days) = self.prediction_days {
            request = request.with_prediction_days(days as usize);
        }
        request
    }
}

async fn run(args: &Args) -> anyhow::Result<OracleReport> {
    let request = args.request();
    if args.synthetic {
        info!("Using synthetic prices (seed {})", args.seed);
        oracle(&SyntheticSource::new(args.seed), &request).await
    } else {
        oracle(&YahooSource::new()?, &request).await
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    let args = Args::parse();

    match run(&args).await {
        Ok(report) => {
            let processed = report.outcomes.iter().filter(|(_, o)| o.is_processed()).count();
            info!(
                "Forecast completed: {}/{} assets processed.",
                processed,
                report.outcomes.len()
            );
        }
        Err(e) => {
            error!("Forecast failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Args, clap::Error> {
        let mut argv = vec!["portfolio-oracle", "--portfolio", "aapl, msft", "--start-date", "2020-01-01"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv)
    }

    #[test]
    fn test_zero_prediction_days_is_rejected() {
        assert!(parse(&["--prediction-days", "0"]).is_err());
        let args = parse(&["--prediction-days", "5"]).unwrap();
        assert_eq!(args.request().prediction_days, Some(5));
    }

    #[test]
    fn test_request_from_args() {
        let args = parse(&["--weights", "0.6,0.4"]).unwrap();
        let request = args.request();
        assert_eq!(request.portfolio, vec!["AAPL", "MSFT"]);
        assert_eq!(request.weights, Some(vec![0.6, 0.4]));
        assert_eq!(request.prediction_days, None);
        assert_eq!(request.based_on, DEFAULT_PRICE_FIELD);
        assert!(!request.show_model_diagnostics);
    }
}
