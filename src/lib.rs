//! Multi-model price-return forecasts for a list of assets, aggregated into
//! a weighted portfolio forecast. Entry point: [`oracle::oracle`].

pub mod config;
pub mod data;
pub mod metrics;
pub mod models;
pub mod oracle;
pub mod series;
pub mod tables;
