use analysis_core::{Bar, DecisionPipeline, TradingDecision};
use chrono::{Duration, NaiveDate};
use rust_decimal::prelude::*;

use crate::error::BacktestError;
use crate::models::*;

/// Fractional share granularity
const SHARE_DP: u32 = 8;
/// Stop and target levels are kept to this many decimal places
const LEVEL_DP: u32 = 6;

/// Replays a decision pipeline over history, one rebalance date at a time,
/// holding at most one long position and an exact capital ledger.
pub struct BacktestEngine {
    config: BacktestConfig,
}

/// Mutable state threaded through the rebalance loop.
struct Ledger {
    capital: Decimal,
    position: Option<Position>,
    trades: Vec<BacktestTrade>,
    decision_log: Vec<DecisionPoint>,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    fn parse_date(value: &str, field: &str) -> Result<NaiveDate, BacktestError> {
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| {
            BacktestError::InvalidDateRange(format!("{} '{}' is not YYYY-MM-DD: {}", field, value, e))
        })
    }

    /// Checks the configuration and returns the parsed (start, end) dates.
    pub fn validate(&self) -> Result<(NaiveDate, NaiveDate), BacktestError> {
        let start = Self::parse_date(&self.config.start_date, "start date")?;
        let end = Self::parse_date(&self.config.end_date, "end date")?;

        if end <= start {
            return Err(BacktestError::InvalidDateRange(format!(
                "end {} is not after start {}",
                end, start
            )));
        }
        if self.config.initial_capital <= Decimal::ZERO {
            return Err(BacktestError::InvalidConfig(format!(
                "initial capital must be positive, got {}",
                self.config.initial_capital
            )));
        }
        if self.config.rebalance_interval_days <= 0 {
            return Err(BacktestError::InvalidConfig(format!(
                "rebalance interval must be positive, got {}",
                self.config.rebalance_interval_days
            )));
        }
        if self.config.analysis_window_bars == 0 {
            return Err(BacktestError::InvalidConfig(
                "analysis window must hold at least one bar".to_string(),
            ));
        }

        Ok((start, end))
    }

    /// Rebalance dates `start, start + interval, ...` strictly before `end`.
    pub fn rebalance_dates(&self) -> Result<Vec<NaiveDate>, BacktestError> {
        let (start, end) = self.validate()?;
        let step = Duration::days(self.config.rebalance_interval_days);

        let mut dates = Vec::new();
        let mut current = start;
        while current < end {
            dates.push(current);
            current += step;
        }
        Ok(dates)
    }

    /// Run the backtest. Bars may arrive in any order and may include history
    /// before the start date; bars after the end date are ignored.
    pub async fn run(
        &self,
        pipeline: &dyn DecisionPipeline,
        bars: &[HistoricalBar],
    ) -> Result<BacktestResult, BacktestError> {
        let (start, end) = self.validate()?;
        let ticker = self.config.ticker.as_str();

        let mut history: Vec<HistoricalBar> = bars.iter().filter(|b| b.date <= end).cloned().collect();
        history.sort_by_key(|b| b.date);

        let in_range: Vec<&HistoricalBar> = history.iter().filter(|b| b.date >= start).collect();
        let (first, last) = match (in_range.first(), in_range.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => {
                return Err(BacktestError::NoHistoricalData(format!(
                    "no bars for {} between {} and {}",
                    ticker, start, end
                )))
            }
        };

        tracing::info!(
            "Backtesting {} from {} to {} every {} days with {} capital ({} bars)",
            ticker,
            start,
            end,
            self.config.rebalance_interval_days,
            self.config.initial_capital,
            history.len()
        );

        let mut ledger = Ledger {
            capital: self.config.initial_capital,
            position: None,
            trades: Vec::new(),
            decision_log: Vec::new(),
        };

        for date in self.rebalance_dates()? {
            // Stops and targets touched since the last decision close first
            if let Some(trade) = self.check_levels(&mut ledger, date, &history) {
                ledger.capital += trade.profit_loss;
                ledger.trades.push(trade);
                ledger.decision_log.push(DecisionPoint {
                    date,
                    outcome: DecisionOutcome::Closed,
                    recommendation: None,
                    confidence: None,
                    capital: ledger.capital,
                });
            }

            let outcome = self.step(pipeline, &history, date, &mut ledger).await;
            let (outcome, recommendation, confidence) = match outcome {
                StepOutcome::Decided(outcome, decision) => (
                    outcome,
                    Some(decision.decision.recommendation),
                    Some(decision.decision.confidence),
                ),
                StepOutcome::Undecided(outcome) => (outcome, None, None),
            };
            ledger.decision_log.push(DecisionPoint {
                date,
                outcome,
                recommendation,
                confidence,
                capital: ledger.capital,
            });
        }

        if let Some(position) = ledger.position.take() {
            tracing::info!("Force-closing {} position at end of period", ticker);
            let trade = self.close_position(position, end, &history, ExitReason::EndOfPeriod);
            ledger.capital += trade.profit_loss;
            ledger.trades.push(trade);
        }

        let buy_hold_return_pct = pct_change(first.close, last.close);
        let result = self.summarize(start, end, ledger, buy_hold_return_pct);

        tracing::info!(
            "Backtest {} complete: {} -> {} ({:+.2}%, buy & hold {:+.2}%, alpha {:+.2}%), {} trades, win rate {:.1}%",
            ticker,
            result.initial_capital,
            result.final_capital,
            result.total_return_pct,
            result.buy_hold_return_pct,
            result.alpha,
            result.trade_count,
            result.win_rate * 100.0
        );

        Ok(result)
    }

    /// One rebalance date. Never fails; failures become decision-log entries.
    async fn step(
        &self,
        pipeline: &dyn DecisionPipeline,
        history: &[HistoricalBar],
        date: NaiveDate,
        ledger: &mut Ledger,
    ) -> StepOutcome {
        let ticker = self.config.ticker.as_str();

        // Only bars known on `date` may reach the pipeline
        let available = history.partition_point(|b| b.date <= date);
        if available < self.config.minimum_lookback_bars.max(1) {
            tracing::info!(
                "{}: skipping {}, {} bars of history (need {})",
                ticker,
                date,
                available,
                self.config.minimum_lookback_bars
            );
            return StepOutcome::Undecided(DecisionOutcome::Skipped(format!(
                "insufficient history: {} bars",
                available
            )));
        }

        let window_start = available.saturating_sub(self.config.analysis_window_bars);
        let window: Vec<Bar> = history[window_start..available].iter().map(|b| b.to_bar()).collect();

        let decision = match pipeline.decide(ticker, &window).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!("{}: analysis failed at {}: {}", ticker, date, e);
                return StepOutcome::Undecided(DecisionOutcome::Failed(e.to_string()));
            }
        };

        let rec = decision.decision.recommendation;
        tracing::info!(
            "{} {}: {} ({:.0}%), capital {}",
            ticker,
            date,
            rec,
            decision.decision.confidence * 100.0,
            ledger.capital
        );

        let outcome = match ledger.position.take() {
            Some(position) if !rec.is_bullish() => {
                let trade = self.close_position(position, date, history, ExitReason::Signal);
                ledger.capital += trade.profit_loss;
                ledger.trades.push(trade);
                DecisionOutcome::Closed
            }
            Some(position) => {
                ledger.position = Some(position);
                DecisionOutcome::Held
            }
            None if rec.is_bullish() => match self.open_position(&decision, date, history, ledger.capital) {
                Some(position) => {
                    ledger.position = Some(position);
                    DecisionOutcome::Opened
                }
                None => DecisionOutcome::NoAction,
            },
            None => DecisionOutcome::NoAction,
        };

        StepOutcome::Decided(outcome, Box::new(decision))
    }

    /// Index of the bar on `date`, else the first one after it.
    fn bar_on_or_after(history: &[HistoricalBar], date: NaiveDate) -> Option<usize> {
        let idx = history.partition_point(|b| b.date < date);
        (idx < history.len()).then_some(idx)
    }

    fn open_position(
        &self,
        decision: &TradingDecision,
        date: NaiveDate,
        history: &[HistoricalBar],
        capital: Decimal,
    ) -> Option<Position> {
        let ticker = self.config.ticker.as_str();
        let risk = &decision.risk;

        if !(risk.position_size > 0.0) {
            tracing::info!("{}: {} signal sized to zero, staying flat", ticker, decision.decision.recommendation);
            return None;
        }

        let Some(idx) = Self::bar_on_or_after(history, date) else {
            tracing::warn!("{}: no bar on or after {} to enter at", ticker, date);
            return None;
        };
        let entry_bar = &history[idx];
        if entry_bar.close <= Decimal::ZERO {
            tracing::warn!("{}: unusable entry price {} on {}", ticker, entry_bar.close, entry_bar.date);
            return None;
        }

        let size = Decimal::from_f64(risk.position_size)?;
        let position_value = capital * size;
        let shares = (position_value / entry_bar.close).round_dp(SHARE_DP);
        let level = |price: Option<f64>| price.and_then(Decimal::from_f64).map(|p| p.round_dp(LEVEL_DP));

        tracing::info!(
            "{}: OPEN LONG {} shares @ {} on {} ({:.1}% = {})",
            ticker,
            shares,
            entry_bar.close,
            entry_bar.date,
            risk.position_size * 100.0,
            position_value
        );

        Some(Position {
            ticker: ticker.to_string(),
            entry_date: entry_bar.date,
            entry_price: entry_bar.close,
            shares,
            position_value,
            position_size_fraction: risk.position_size,
            stop_loss_price: level(risk.stop_loss_price),
            take_profit_price: level(risk.take_profit_price),
            source_decision: decision.decision.clone(),
        })
    }

    /// First stop (else target) touch on bars strictly after entry and before `until`.
    fn level_exit(
        position: &Position,
        history: &[HistoricalBar],
        until: NaiveDate,
    ) -> Option<(NaiveDate, Decimal, ExitReason)> {
        let between: Vec<&HistoricalBar> = history
            .iter()
            .filter(|b| b.date > position.entry_date && b.date < until)
            .collect();

        let stop_bar = position
            .stop_loss_price
            .and_then(|stop| between.iter().find(|b| b.low <= stop).map(|b| (b.date, stop, ExitReason::StopLoss)));

        stop_bar.or_else(|| {
            position.take_profit_price.and_then(|target| {
                between
                    .iter()
                    .find(|b| b.high >= target)
                    .map(|b| (b.date, target, ExitReason::TakeProfit))
            })
        })
    }

    /// Closes the open position if its stop or target was touched before `date`.
    fn check_levels(&self, ledger: &mut Ledger, date: NaiveDate, history: &[HistoricalBar]) -> Option<BacktestTrade> {
        let (exit_date, exit_price, reason) = Self::level_exit(ledger.position.as_ref()?, history, date)?;
        let position = ledger.position.take()?;
        Some(self.settle(position, exit_date, exit_price, reason))
    }

    /// Exit at the bar on `date` (or the next one, or the last available).
    /// Bars strictly between entry and exit are scanned for a stop hit first,
    /// then for a target hit.
    fn close_position(
        &self,
        position: Position,
        date: NaiveDate,
        history: &[HistoricalBar],
        default_reason: ExitReason,
    ) -> BacktestTrade {
        let exit_bar = Self::bar_on_or_after(history, date)
            .map(|idx| &history[idx])
            .or_else(|| history.last());

        let (exit_date, exit_close) = match exit_bar {
            Some(bar) => (bar.date, bar.close),
            None => (position.entry_date, position.entry_price),
        };

        let (exit_date, exit_price, reason) = Self::level_exit(&position, history, exit_date)
            .unwrap_or((exit_date, exit_close, default_reason));

        self.settle(position, exit_date, exit_price, reason)
    }

    fn settle(
        &self,
        position: Position,
        exit_date: NaiveDate,
        exit_price: Decimal,
        reason: ExitReason,
    ) -> BacktestTrade {
        let profit_loss = (exit_price - position.entry_price) * position.shares;
        let return_pct = pct_change(position.entry_price, exit_price);
        // Fraction of starting capital committed at entry
        let position_size_fraction = (position.position_value / self.config.initial_capital)
            .to_f64()
            .unwrap_or(position.position_size_fraction);

        tracing::info!(
            "{}: CLOSE {:?} @ {} on {}, P&L {} ({:+.2}%)",
            position.ticker,
            reason,
            exit_price,
            exit_date,
            profit_loss.round_dp(2),
            return_pct
        );

        BacktestTrade {
            ticker: position.ticker,
            entry_date: position.entry_date,
            entry_price: position.entry_price,
            exit_date,
            exit_price,
            shares: position.shares,
            recommendation: position.source_decision.recommendation,
            confidence: position.source_decision.confidence,
            position_size_fraction,
            return_pct,
            profit_loss,
            stop_hit: reason == ExitReason::StopLoss,
            target_hit: reason == ExitReason::TakeProfit,
            exit_reason: reason,
        }
    }

    fn summarize(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        ledger: Ledger,
        buy_hold_return_pct: f64,
    ) -> BacktestResult {
        let initial = self.config.initial_capital;
        let trades = ledger.trades;

        let winners: Vec<&BacktestTrade> = trades.iter().filter(|t| t.profit_loss > Decimal::ZERO).collect();
        let losers: Vec<&BacktestTrade> = trades.iter().filter(|t| t.profit_loss < Decimal::ZERO).collect();

        let mean_return = |set: &[&BacktestTrade]| {
            if set.is_empty() {
                0.0
            } else {
                set.iter().map(|t| t.return_pct).sum::<f64>() / set.len() as f64
            }
        };

        let gross_profit: Decimal = winners.iter().map(|t| t.profit_loss).sum();
        let gross_loss: Decimal = losers.iter().map(|t| t.profit_loss).sum::<Decimal>().abs();
        let profit_factor = if gross_loss > Decimal::ZERO {
            (gross_profit / gross_loss).to_f64()
        } else {
            None
        };

        let total_return_pct = pct_change(initial, ledger.capital);
        let win_rate = if trades.is_empty() {
            0.0
        } else {
            winners.len() as f64 / trades.len() as f64
        };

        BacktestResult {
            ticker: self.config.ticker.clone(),
            start_date: start,
            end_date: end,
            rebalance_interval_days: self.config.rebalance_interval_days,
            initial_capital: initial,
            final_capital: ledger.capital,
            total_return_pct,
            buy_hold_return_pct,
            alpha: total_return_pct - buy_hold_return_pct,
            trade_count: trades.len(),
            winning_trades: winners.len(),
            losing_trades: losers.len(),
            win_rate,
            avg_win_pct: mean_return(&winners),
            avg_loss_pct: mean_return(&losers),
            profit_factor,
            stop_hits: trades.iter().filter(|t| t.stop_hit).count(),
            target_hits: trades.iter().filter(|t| t.target_hit).count(),
            trades,
            decision_log: ledger.decision_log,
        }
    }
}

enum StepOutcome {
    Decided(DecisionOutcome, Box<TradingDecision>),
    Undecided(DecisionOutcome),
}

/// Percent change from `from` to `to`; 0 when `from` is not positive.
fn pct_change(from: Decimal, to: Decimal) -> f64 {
    if from <= Decimal::ZERO {
        return 0.0;
    }
    ((to - from) / from * Decimal::ONE_HUNDRED).to_f64().unwrap_or(0.0)
}
