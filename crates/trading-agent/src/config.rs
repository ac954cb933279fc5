use std::collections::HashMap;
use std::env;
use std::str::FromStr;

use analysis_orchestrator::ConsensusConfig;
use anyhow::{bail, Context, Result};
use backtest_engine::BacktestConfig;
use risk_manager::RiskConfig;
use rust_decimal::Decimal;

/// Runtime configuration composed from the per-crate config structs.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub consensus: ConsensusConfig,
    pub risk: RiskConfig,
    /// Defaults for backtest runs; ticker and dates come from the command line
    pub backtest: BacktestConfig,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut risk = RiskConfig::default();
        let mut backtest = BacktestConfig::default();
        let mut consensus = ConsensusConfig::default();

        // Risk parameters
        parse_into(&lookup, "MAX_POSITION_SIZE", &mut risk.max_position_size)?;
        parse_into(&lookup, "STOP_LOSS_PERCENT", &mut risk.stop_loss_pct)?;
        parse_into(&lookup, "TAKE_PROFIT_PERCENT", &mut risk.take_profit_pct)?;
        parse_into(&lookup, "PORTFOLIO_REFERENCE_VALUE", &mut risk.portfolio_reference_value)?;

        // Backtest parameters
        parse_into(&lookup, "REBALANCE_DAYS", &mut backtest.rebalance_interval_days)?;
        parse_into(&lookup, "MIN_LOOKBACK_BARS", &mut backtest.minimum_lookback_bars)?;
        parse_into(&lookup, "ANALYSIS_WINDOW_BARS", &mut backtest.analysis_window_bars)?;
        parse_into::<Decimal>(&lookup, "INITIAL_CAPITAL", &mut backtest.initial_capital)?;

        // Consensus weights
        if let Some(raw) = lookup("SOURCE_WEIGHTS") {
            consensus.base_weights = parse_weights(&raw)?;
        }
        parse_into(&lookup, "DEFAULT_SOURCE_WEIGHT", &mut consensus.default_weight)?;

        let config = Self { consensus, risk, backtest };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let risk = &self.risk;
        if !(risk.max_position_size > 0.0 && risk.max_position_size <= 1.0) {
            bail!("MAX_POSITION_SIZE must be in (0, 1], got {}", risk.max_position_size);
        }
        if !(risk.stop_loss_pct > 0.0 && risk.stop_loss_pct < 1.0) {
            bail!("STOP_LOSS_PERCENT must be in (0, 1), got {}", risk.stop_loss_pct);
        }
        if !(risk.take_profit_pct > 0.0) {
            bail!("TAKE_PROFIT_PERCENT must be positive, got {}", risk.take_profit_pct);
        }
        if !(risk.portfolio_reference_value > 0.0) {
            bail!(
                "PORTFOLIO_REFERENCE_VALUE must be positive, got {}",
                risk.portfolio_reference_value
            );
        }
        if self.backtest.rebalance_interval_days <= 0 {
            bail!("REBALANCE_DAYS must be positive, got {}", self.backtest.rebalance_interval_days);
        }
        if self.backtest.analysis_window_bars == 0 {
            bail!("ANALYSIS_WINDOW_BARS must be at least 1");
        }
        if self.backtest.initial_capital <= Decimal::ZERO {
            bail!("INITIAL_CAPITAL must be positive, got {}", self.backtest.initial_capital);
        }
        if !(self.consensus.default_weight >= 0.0) {
            bail!("DEFAULT_SOURCE_WEIGHT must be non-negative, got {}", self.consensus.default_weight);
        }
        Ok(())
    }
}

fn parse_into<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", key, raw))?;
    }
    Ok(())
}

/// Parses `technical=0.5,quantitative=0.5`.
fn parse_weights(raw: &str) -> Result<HashMap<String, f64>> {
    let mut weights = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (source, weight) = entry
            .split_once('=')
            .with_context(|| format!("SOURCE_WEIGHTS entry '{}' is not source=weight", entry))?;
        let weight: f64 = weight
            .trim()
            .parse()
            .with_context(|| format!("SOURCE_WEIGHTS weight for '{}' is not a number", source.trim()))?;
        if !(weight >= 0.0) || !weight.is_finite() {
            bail!("SOURCE_WEIGHTS weight for '{}' must be non-negative", source.trim());
        }
        weights.insert(source.trim().to_string(), weight);
    }
    if weights.is_empty() {
        bail!("SOURCE_WEIGHTS is set but empty");
    }
    Ok(weights)
}
