use analysis_core::{FinalDecision, PositionDirection, RiskAssessment, RiskLevel, SizingHints};

use crate::models::{RiskConfig, HINT_LEVEL_BUFFER, MIN_HINT_POSITION, SHORT_SIZE_PENALTY};

/// Risk band and size multiplier for an annualized volatility in percent.
/// Non-finite volatility lands in the most conservative band.
pub fn classify_volatility(volatility_pct: f64) -> (RiskLevel, f64) {
    match volatility_pct {
        v if v < 15.0 => (RiskLevel::Low, 1.0),
        v if v < 25.0 => (RiskLevel::Medium, 0.75),
        v if v < 40.0 => (RiskLevel::High, 0.5),
        _ => (RiskLevel::VeryHigh, 0.3),
    }
}

fn usable(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

/// Turns a final decision into a bounded, direction-aware position.
#[derive(Debug, Clone, Default)]
pub struct RiskSizer {
    config: RiskConfig,
}

impl RiskSizer {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn size(
        &self,
        current_price: f64,
        volatility_pct: f64,
        decision: &FinalDecision,
        hints: Option<&SizingHints>,
    ) -> RiskAssessment {
        let (risk_level, adjustment) = classify_volatility(volatility_pct);
        let max_size = self.config.max_position_size.max(0.0);
        let hints = hints.cloned().unwrap_or_default();

        let flat = RiskAssessment {
            risk_level,
            direction: PositionDirection::Flat,
            current_price,
            position_size: 0.0,
            stop_loss_price: None,
            take_profit_price: None,
            risk_reward_ratio: None,
            max_loss_amount: 0.0,
        };

        if !current_price.is_finite() || current_price <= 0.0 {
            tracing::warn!("Cannot size position at price {}", current_price);
            return flat;
        }

        let hinted_size = usable(hints.position_pct)
            .filter(|p| (MIN_HINT_POSITION..=max_size).contains(p));

        let rec = decision.recommendation;
        let (direction, position_size, stop, target) = if rec.is_bullish() {
            let size = hinted_size.unwrap_or(max_size * adjustment);
            let stop = usable(hints.stop_price)
                .filter(|s| *s < current_price * (1.0 - HINT_LEVEL_BUFFER))
                .unwrap_or(current_price * (1.0 - self.config.stop_loss_pct));
            let target = usable(hints.take_price)
                .filter(|t| *t > current_price * (1.0 + HINT_LEVEL_BUFFER))
                .unwrap_or(current_price * (1.0 + self.config.take_profit_pct));
            (PositionDirection::Long, size, stop, target)
        } else if rec.is_bearish() {
            let size = hinted_size.unwrap_or(max_size * adjustment * SHORT_SIZE_PENALTY);
            let stop = usable(hints.stop_price)
                .filter(|s| *s > current_price * (1.0 + HINT_LEVEL_BUFFER))
                .unwrap_or(current_price * (1.0 + self.config.stop_loss_pct));
            let target = usable(hints.take_price)
                .filter(|t| *t < current_price * (1.0 - HINT_LEVEL_BUFFER))
                .unwrap_or(current_price * (1.0 - self.config.take_profit_pct));
            (PositionDirection::Short, size, stop, target)
        } else {
            return flat;
        };

        let position_size = position_size.clamp(0.0, max_size);

        let (risk_reward_ratio, max_loss_amount) = if position_size > 0.0 {
            let risk_distance = (current_price - stop).abs();
            let reward_distance = (target - current_price).abs();
            let ratio = if risk_distance > 0.0 {
                Some(reward_distance / risk_distance)
            } else {
                None
            };
            let max_loss =
                self.config.portfolio_reference_value * position_size * (risk_distance / current_price);
            (ratio, max_loss)
        } else {
            (None, 0.0)
        };

        tracing::debug!(
            "Sized {} at {:.2}: {:?} {:.4} (stop {:.2}, target {:.2}, {:?} risk)",
            rec,
            current_price,
            direction,
            position_size,
            stop,
            target,
            risk_level
        );

        RiskAssessment {
            risk_level,
            direction,
            current_price,
            position_size,
            stop_loss_price: Some(stop),
            take_profit_price: Some(target),
            risk_reward_ratio,
            max_loss_amount,
        }
    }
}
