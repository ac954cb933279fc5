use thiserror::Error;

/// Inputs that make a whole backtest run impossible.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BacktestError {
    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("No historical data: {0}")]
    NoHistoricalData(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
