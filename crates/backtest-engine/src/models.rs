use std::path::Path;

use analysis_core::{Bar, FinalDecision, Recommendation};
use chrono::NaiveDate;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Configuration for a backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub ticker: String,
    /// YYYY-MM-DD
    pub start_date: String,
    /// YYYY-MM-DD, exclusive for rebalance dates
    pub end_date: String,
    pub initial_capital: Decimal,
    pub rebalance_interval_days: i64,
    /// Decision points with fewer bars of history are skipped.
    pub minimum_lookback_bars: usize,
    /// Trailing bars handed to the decision pipeline.
    pub analysis_window_bars: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            ticker: String::new(),
            start_date: String::new(),
            end_date: String::new(),
            initial_capital: Decimal::from(10_000),
            rebalance_interval_days: 30,
            minimum_lookback_bars: 30,
            analysis_window_bars: 90,
        }
    }
}

/// A single OHLCV bar for backtesting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalBar {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(default)]
    pub volume: f64,
}

impl HistoricalBar {
    /// Lossy conversion for the analysis side.
    pub fn to_bar(&self) -> Bar {
        Bar {
            date: self.date,
            open: self.open.to_f64().unwrap_or_default(),
            high: self.high.to_f64().unwrap_or_default(),
            low: self.low.to_f64().unwrap_or_default(),
            close: self.close.to_f64().unwrap_or_default(),
            volume: self.volume,
        }
    }

    /// None when a price is not representable (NaN or infinite).
    pub fn from_bar(bar: &Bar) -> Option<Self> {
        Some(Self {
            date: bar.date,
            open: Decimal::from_f64(bar.open)?,
            high: Decimal::from_f64(bar.high)?,
            low: Decimal::from_f64(bar.low)?,
            close: Decimal::from_f64(bar.close)?,
            volume: bar.volume,
        })
    }
}

/// The single open long position carried between decision points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    pub entry_date: NaiveDate,
    pub entry_price: Decimal,
    pub shares: Decimal,
    pub position_value: Decimal,
    /// Risk-sized fraction of capital at entry
    pub position_size_fraction: f64,
    pub stop_loss_price: Option<Decimal>,
    pub take_profit_price: Option<Decimal>,
    pub source_decision: FinalDecision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Signal,
    EndOfPeriod,
}

/// A round-trip trade (entry + exit) from the backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestTrade {
    pub ticker: String,
    pub entry_date: NaiveDate,
    pub entry_price: Decimal,
    pub exit_date: NaiveDate,
    pub exit_price: Decimal,
    pub shares: Decimal,
    pub recommendation: Recommendation,
    pub confidence: f64,
    /// Entry value over initial capital
    pub position_size_fraction: f64,
    pub return_pct: f64,
    pub profit_loss: Decimal,
    pub stop_hit: bool,
    pub target_hit: bool,
    pub exit_reason: ExitReason,
}

/// What happened at one rebalance date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DecisionOutcome {
    Skipped(String),
    Failed(String),
    Opened,
    Closed,
    Held,
    NoAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPoint {
    pub date: NaiveDate,
    pub outcome: DecisionOutcome,
    pub recommendation: Option<Recommendation>,
    pub confidence: Option<f64>,
    /// Capital after the step
    pub capital: Decimal,
}

/// Result of a completed backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub ticker: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub rebalance_interval_days: i64,
    pub initial_capital: Decimal,
    pub final_capital: Decimal,
    pub total_return_pct: f64,
    pub buy_hold_return_pct: f64,
    /// Strategy return - buy-and-hold return.
    pub alpha: f64,
    pub trade_count: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// 0.0 to 1.0
    pub win_rate: f64,
    pub avg_win_pct: f64,
    pub avg_loss_pct: f64,
    /// None when there are no losing trades
    pub profit_factor: Option<f64>,
    pub stop_hits: usize,
    pub target_hits: usize,
    pub trades: Vec<BacktestTrade>,
    #[serde(default)]
    pub decision_log: Vec<DecisionPoint>,
}

impl BacktestResult {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&raw)?)
    }
}
