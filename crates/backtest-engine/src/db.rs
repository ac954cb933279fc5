use std::str::FromStr;

use anyhow::Context;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{BacktestResult, BacktestTrade, DecisionPoint, ExitReason};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A persisted backtest with its row id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredBacktest {
    pub id: i64,
    pub created_at: Option<String>,
    pub result: BacktestResult,
}

/// Persists backtest results and trades to the database.
/// Money is stored as decimal text so it reads back exactly.
pub struct BacktestDb {
    pool: sqlx::AnyPool,
}

impl BacktestDb {
    pub fn new(pool: sqlx::AnyPool) -> Self {
        Self { pool }
    }

    /// Connects through the Any driver, e.g. `sqlite:backtests.db`.
    /// SQLite files are created when missing.
    pub async fn connect(url: &str) -> Result<Self, anyhow::Error> {
        sqlx::any::install_default_drivers();
        let url = if url.starts_with("sqlite:") && !url.contains("memory") && !url.contains('?') {
            format!("{}?mode=rwc", url)
        } else {
            url.to_string()
        };
        let pool = sqlx::any::AnyPoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .with_context(|| format!("connecting to {}", url))?;
        let db = Self::new(pool);
        db.init_tables().await?;
        Ok(db)
    }

    /// Initialize backtest tables if they don't exist.
    pub async fn init_tables(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS backtests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                rebalance_interval_days INTEGER NOT NULL,
                initial_capital TEXT NOT NULL,
                final_capital TEXT NOT NULL,
                total_return_pct REAL NOT NULL,
                buy_hold_return_pct REAL NOT NULL,
                alpha REAL NOT NULL,
                trade_count INTEGER NOT NULL,
                winning_trades INTEGER NOT NULL,
                losing_trades INTEGER NOT NULL,
                win_rate REAL NOT NULL,
                avg_win_pct REAL NOT NULL,
                avg_loss_pct REAL NOT NULL,
                profit_factor REAL,
                stop_hits INTEGER NOT NULL,
                target_hits INTEGER NOT NULL,
                decision_log_json TEXT,
                created_at TEXT DEFAULT (datetime('now'))
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS backtest_trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                backtest_id INTEGER NOT NULL REFERENCES backtests(id),
                ticker TEXT NOT NULL,
                entry_date TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                exit_date TEXT NOT NULL,
                exit_price TEXT NOT NULL,
                shares TEXT NOT NULL,
                recommendation TEXT NOT NULL,
                confidence REAL NOT NULL,
                position_size_fraction REAL NOT NULL,
                return_pct REAL NOT NULL,
                profit_loss TEXT NOT NULL,
                stop_hit INTEGER NOT NULL,
                target_hit INTEGER NOT NULL,
                exit_reason TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Save a backtest result and its trades. Returns the backtest ID.
    pub async fn save_backtest(&self, result: &BacktestResult) -> Result<i64, anyhow::Error> {
        self.init_tables().await?;

        let decision_log_json = serde_json::to_string(&result.decision_log)?;

        let (backtest_id,): (i64,) = sqlx::query_as(
            "INSERT INTO backtests (
                ticker, start_date, end_date, rebalance_interval_days,
                initial_capital, final_capital, total_return_pct, buy_hold_return_pct, alpha,
                trade_count, winning_trades, losing_trades, win_rate,
                avg_win_pct, avg_loss_pct, profit_factor, stop_hits, target_hits,
                decision_log_json
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id",
        )
        .bind(&result.ticker)
        .bind(result.start_date.format(DATE_FORMAT).to_string())
        .bind(result.end_date.format(DATE_FORMAT).to_string())
        .bind(result.rebalance_interval_days)
        .bind(result.initial_capital.to_string())
        .bind(result.final_capital.to_string())
        .bind(result.total_return_pct)
        .bind(result.buy_hold_return_pct)
        .bind(result.alpha)
        .bind(result.trade_count as i64)
        .bind(result.winning_trades as i64)
        .bind(result.losing_trades as i64)
        .bind(result.win_rate)
        .bind(result.avg_win_pct)
        .bind(result.avg_loss_pct)
        .bind(result.profit_factor)
        .bind(result.stop_hits as i64)
        .bind(result.target_hits as i64)
        .bind(&decision_log_json)
        .fetch_one(&self.pool)
        .await?;

        // Save trades
        for trade in &result.trades {
            let recommendation = serde_json::to_value(trade.recommendation)?;
            let exit_reason = serde_json::to_value(trade.exit_reason)?;

            sqlx::query(
                "INSERT INTO backtest_trades (
                    backtest_id, ticker, entry_date, entry_price, exit_date, exit_price, shares,
                    recommendation, confidence, position_size_fraction, return_pct, profit_loss,
                    stop_hit, target_hit, exit_reason
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(backtest_id)
            .bind(&trade.ticker)
            .bind(trade.entry_date.format(DATE_FORMAT).to_string())
            .bind(trade.entry_price.to_string())
            .bind(trade.exit_date.format(DATE_FORMAT).to_string())
            .bind(trade.exit_price.to_string())
            .bind(trade.shares.to_string())
            .bind(recommendation.as_str().unwrap_or_default().to_string())
            .bind(trade.confidence)
            .bind(trade.position_size_fraction)
            .bind(trade.return_pct)
            .bind(trade.profit_loss.to_string())
            .bind(i64::from(trade.stop_hit))
            .bind(i64::from(trade.target_hit))
            .bind(exit_reason.as_str().unwrap_or_default().to_string())
            .execute(&self.pool)
            .await?;
        }

        tracing::info!(
            "Saved backtest {} for {} ({} trades)",
            backtest_id,
            result.ticker,
            result.trades.len()
        );

        Ok(backtest_id)
    }

    /// Get all backtest results (without trades for performance).
    pub async fn get_all_backtests(&self) -> Result<Vec<StoredBacktest>, anyhow::Error> {
        self.init_tables().await?;

        let rows = sqlx::query_as::<_, BacktestRow>(
            "SELECT id, ticker, start_date, end_date, rebalance_interval_days,
                    initial_capital, final_capital, total_return_pct, buy_hold_return_pct, alpha,
                    trade_count, winning_trades, losing_trades, win_rate,
                    avg_win_pct, avg_loss_pct, profit_factor, stop_hits, target_hits,
                    decision_log_json, created_at
             FROM backtests ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_stored()).collect()
    }

    /// Get a single backtest by ID, trades included.
    pub async fn get_backtest(&self, id: i64) -> Result<Option<StoredBacktest>, anyhow::Error> {
        self.init_tables().await?;

        let row = sqlx::query_as::<_, BacktestRow>(
            "SELECT id, ticker, start_date, end_date, rebalance_interval_days,
                    initial_capital, final_capital, total_return_pct, buy_hold_return_pct, alpha,
                    trade_count, winning_trades, losing_trades, win_rate,
                    avg_win_pct, avg_loss_pct, profit_factor, stop_hits, target_hits,
                    decision_log_json, created_at
             FROM backtests WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut stored = row.into_stored()?;
        stored.result.trades = self.get_backtest_trades(id).await?;
        Ok(Some(stored))
    }

    /// Delete a backtest and its trades.
    pub async fn delete_backtest(&self, id: i64) -> Result<(), anyhow::Error> {
        sqlx::query("DELETE FROM backtest_trades WHERE backtest_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM backtests WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Get trades for a specific backtest, in entry order.
    pub async fn get_backtest_trades(
        &self,
        backtest_id: i64,
    ) -> Result<Vec<BacktestTrade>, anyhow::Error> {
        let rows = sqlx::query_as::<_, TradeRow>(
            "SELECT ticker, entry_date, entry_price, exit_date, exit_price, shares,
                    recommendation, confidence, position_size_fraction, return_pct, profit_loss,
                    stop_hit, target_hit, exit_reason
             FROM backtest_trades WHERE backtest_id = ? ORDER BY id",
        )
        .bind(backtest_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_trade()).collect()
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, anyhow::Error> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).with_context(|| format!("bad stored date '{}'", value))
}

fn parse_decimal(value: &str) -> Result<Decimal, anyhow::Error> {
    Decimal::from_str(value).with_context(|| format!("bad stored amount '{}'", value))
}

/// Internal row type for sqlx deserialization.
#[derive(sqlx::FromRow)]
struct BacktestRow {
    id: i64,
    ticker: String,
    start_date: String,
    end_date: String,
    rebalance_interval_days: i64,
    initial_capital: String,
    final_capital: String,
    total_return_pct: f64,
    buy_hold_return_pct: f64,
    alpha: f64,
    trade_count: i64,
    winning_trades: i64,
    losing_trades: i64,
    win_rate: f64,
    avg_win_pct: f64,
    avg_loss_pct: f64,
    profit_factor: Option<f64>,
    stop_hits: i64,
    target_hits: i64,
    decision_log_json: Option<String>,
    created_at: Option<String>,
}

impl BacktestRow {
    fn into_stored(self) -> Result<StoredBacktest, anyhow::Error> {
        let decision_log: Vec<DecisionPoint> = self
            .decision_log_json
            .as_deref()
            .and_then(|j| serde_json::from_str(j).ok())
            .unwrap_or_default();

        Ok(StoredBacktest {
            id: self.id,
            created_at: self.created_at,
            result: BacktestResult {
                ticker: self.ticker,
                start_date: parse_date(&self.start_date)?,
                end_date: parse_date(&self.end_date)?,
                rebalance_interval_days: self.rebalance_interval_days,
                initial_capital: parse_decimal(&self.initial_capital)?,
                final_capital: parse_decimal(&self.final_capital)?,
                total_return_pct: self.total_return_pct,
                buy_hold_return_pct: self.buy_hold_return_pct,
                alpha: self.alpha,
                trade_count: self.trade_count as usize,
                winning_trades: self.winning_trades as usize,
                losing_trades: self.losing_trades as usize,
                win_rate: self.win_rate,
                avg_win_pct: self.avg_win_pct,
                avg_loss_pct: self.avg_loss_pct,
                profit_factor: self.profit_factor,
                stop_hits: self.stop_hits as usize,
                target_hits: self.target_hits as usize,
                trades: Vec::new(),
                decision_log,
            },
        })
    }
}

#[derive(sqlx::FromRow)]
struct TradeRow {
    ticker: String,
    entry_date: String,
    entry_price: String,
    exit_date: String,
    exit_price: String,
    shares: String,
    recommendation: String,
    confidence: f64,
    position_size_fraction: f64,
    return_pct: f64,
    profit_loss: String,
    stop_hit: i64,
    target_hit: i64,
    exit_reason: String,
}

impl TradeRow {
    fn into_trade(self) -> Result<BacktestTrade, anyhow::Error> {
        let exit_reason: ExitReason = serde_json::from_value(serde_json::Value::String(self.exit_reason))?;

        Ok(BacktestTrade {
            ticker: self.ticker,
            entry_date: parse_date(&self.entry_date)?,
            entry_price: parse_decimal(&self.entry_price)?,
            exit_date: parse_date(&self.exit_date)?,
            exit_price: parse_decimal(&self.exit_price)?,
            shares: parse_decimal(&self.shares)?,
            recommendation: self.recommendation.parse()?,
            confidence: self.confidence,
            position_size_fraction: self.position_size_fraction,
            return_pct: self.return_pct,
            profit_loss: parse_decimal(&self.profit_loss)?,
            stop_hit: self.stop_hit != 0,
            target_hit: self.target_hit != 0,
            exit_reason,
        })
    }
}
