use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Largest fraction of the portfolio a single position may take
    pub max_position_size: f64,
    /// Fallback stop distance as a fraction of price
    pub stop_loss_pct: f64,
    /// Fallback target distance as a fraction of price
    pub take_profit_pct: f64,
    /// Portfolio value used for dollar-loss estimates
    pub portfolio_reference_value: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_size: 0.10,
            stop_loss_pct: 0.05,
            take_profit_pct: 0.15,
            portfolio_reference_value: 10_000.0,
        }
    }
}

/// Shorts get this fraction of the long base size.
pub const SHORT_SIZE_PENALTY: f64 = 0.7;
/// Smallest hinted position fraction that is honoured.
pub const MIN_HINT_POSITION: f64 = 0.01;
/// Hinted levels must sit at least 1% away from the current price.
pub const HINT_LEVEL_BUFFER: f64 = 0.01;
