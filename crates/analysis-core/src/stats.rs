use statrs::statistics::Statistics;

use crate::{AnalysisError, Bar, MarketStats};

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Simple daily returns; pairs with a non-positive previous close are skipped.
pub fn daily_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

/// Population variance; 0 for fewer than two values.
pub fn population_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.population_variance()
}

/// Annualized sample standard deviation of daily returns, in percent.
pub fn annualized_volatility_pct(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    returns.std_dev() * TRADING_DAYS_PER_YEAR.sqrt() * 100.0
}

/// Annualized Sharpe ratio with a zero risk-free rate.
pub fn annualized_sharpe(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let std_dev = returns.std_dev();
    if std_dev == 0.0 || !std_dev.is_finite() {
        return 0.0;
    }
    returns.mean() / std_dev * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Percent change from the close `lookback` bars back (inclusive of the last bar)
/// to the last close. 0 when the window is shorter than `lookback`.
pub fn trailing_return_pct(closes: &[f64], lookback: usize) -> f64 {
    if lookback == 0 || closes.len() < lookback {
        return 0.0;
    }
    let base = closes[closes.len() - lookback];
    let last = closes[closes.len() - 1];
    if base <= 0.0 {
        return 0.0;
    }
    (last / base - 1.0) * 100.0
}

/// Largest peak-to-trough decline, in percent.
pub fn max_drawdown_pct(closes: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0;

    for &price in closes {
        if price > peak {
            peak = price;
        }
        if peak > 0.0 {
            let drawdown = (peak - price) / peak;
            if drawdown > max_dd {
                max_dd = drawdown;
            }
        }
    }

    max_dd * 100.0
}

impl MarketStats {
    /// Summary statistics over an ascending bar window. The window is treated
    /// as the full lookback, so `return_90d_pct` runs from its first close.
    pub fn from_bars(bars: &[Bar]) -> Result<Self, AnalysisError> {
        let last = bars
            .last()
            .ok_or_else(|| AnalysisError::InsufficientData("no bars in window".to_string()))?;

        if !last.close.is_finite() || last.close <= 0.0 {
            return Err(AnalysisError::InvalidData(format!(
                "non-positive close {} on {}",
                last.close, last.date
            )));
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let returns = daily_returns(&closes);

        let previous_close = if closes.len() >= 2 {
            closes[closes.len() - 2]
        } else {
            last.close
        };
        let price_change_pct = if previous_close > 0.0 {
            (last.close / previous_close - 1.0) * 100.0
        } else {
            0.0
        };

        Ok(Self {
            current_price: last.close,
            previous_close,
            price_change_pct,
            volatility_pct: annualized_volatility_pct(&returns),
            sharpe_ratio: annualized_sharpe(&returns),
            return_30d_pct: trailing_return_pct(&closes, 30),
            return_90d_pct: trailing_return_pct(&closes, closes.len()),
            bar_count: bars.len(),
        })
    }
}
