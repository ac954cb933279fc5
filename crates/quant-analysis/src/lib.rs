use analysis_core::{stats, AnalysisError, Bar, MarketStats, Recommendation, Signal, SignalSource};
use async_trait::async_trait;

pub mod trend_desk;

pub use trend_desk::TrendDesk;

pub const QUANT_SOURCE_ID: &str = "quantitative";

const MIN_BARS: usize = 20;
const MOMENTUM_LOOKBACK: usize = 30;

/// Momentum, risk-adjusted return and drawdown scoring.
#[derive(Debug, Clone, Default)]
pub struct QuantAnalysisEngine;

impl QuantAnalysisEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze_sync(&self, bars: &[Bar]) -> Result<Signal, AnalysisError> {
        if bars.len() < MIN_BARS {
            return Err(AnalysisError::InsufficientData(format!(
                "Need at least {} bars for quantitative analysis, got {}",
                MIN_BARS,
                bars.len()
            )));
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        if closes.iter().any(|c| !c.is_finite() || *c <= 0.0) {
            return Err(AnalysisError::InvalidData("non-positive close in window".to_string()));
        }

        let returns = stats::daily_returns(&closes);
        let momentum = stats::trailing_return_pct(&closes, MOMENTUM_LOOKBACK.min(closes.len()));
        let sharpe = stats::annualized_sharpe(&returns);
        let volatility = stats::annualized_volatility_pct(&returns);
        let max_drawdown = stats::max_drawdown_pct(&closes);

        let mut score: i32 = 0;
        let mut rationale = Vec::new();

        match momentum {
            m if m > 10.0 => score += 2,
            m if m > 2.0 => score += 1,
            m if m < -10.0 => score -= 2,
            m if m < -2.0 => score -= 1,
            _ => {}
        }
        rationale.push(format!("Momentum {:+.2}% over {} bars", momentum, MOMENTUM_LOOKBACK.min(closes.len())));

        if sharpe > 1.0 {
            score += 1;
        } else if sharpe < -0.5 {
            score -= 1;
        }
        rationale.push(format!("Sharpe {:.2}", sharpe));

        if max_drawdown > 20.0 {
            score -= 1;
            rationale.push(format!("Deep drawdown {:.1}%", max_drawdown));
        }

        let recommendation = match score {
            s if s >= 3 => Recommendation::StrongBuy,
            s if s >= 1 => Recommendation::Buy,
            s if s <= -3 => Recommendation::StrongSell,
            s if s <= -1 => Recommendation::Sell,
            _ => Recommendation::Hold,
        };

        let mut confidence = (0.5 + 0.1 * score.abs() as f64).min(0.9);
        if volatility > 40.0 {
            confidence *= 0.8;
            rationale.push(format!("High volatility {:.1}%", volatility));
        }

        Ok(Signal::new(QUANT_SOURCE_ID, recommendation, confidence).with_rationale(rationale))
    }
}

#[async_trait]
impl SignalSource for QuantAnalysisEngine {
    fn source_id(&self) -> &str {
        QUANT_SOURCE_ID
    }

    async fn signal(&self, _ticker: &str, bars: &[Bar], _stats: &MarketStats) -> Result<Signal, AnalysisError> {
        self.analyze_sync(bars)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_steady_rally_is_strong_buy() {
        let signal = QuantAnalysisEngine::new()
            .analyze_sync(&bars_from(&staircase(100.0, 1.0, 60)))
            .unwrap();

        assert_eq!(signal.source_id, QUANT_SOURCE_ID);
        assert_eq!(signal.recommendation, Recommendation::StrongBuy);
        assert!((signal.confidence - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_steady_decline_is_sell() {
        let signal = QuantAnalysisEngine::new()
            .analyze_sync(&bars_from(&staircase(300.0, -1.0, 60)))
            .unwrap();

        assert_eq!(signal.recommendation, Recommendation::Sell);
        assert!((signal.confidence - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_high_volatility_dampens_confidence() {
        let closes: Vec<f64> = (0..60).map(|i| if i % 2 == 1 { 103.0 } else { 97.0 }).collect();
        let signal = QuantAnalysisEngine::new().analyze_sync(&bars_from(&closes)).unwrap();

        assert_eq!(signal.recommendation, Recommendation::Buy);
        assert!((signal.confidence - 0.48).abs() < 1e-12);
        assert!(signal.rationale.iter().any(|r| r.starts_with("High volatility")));
    }

    #[test]
    fn test_deep_decline_is_strong_sell_at_confidence_cap() {
        // momentum -14.8%, Sharpe -5.7, drawdown 26%: score -4
        let signal = QuantAnalysisEngine::new()
            .analyze_sync(&bars_from(&staircase(150.0, -1.0, 60)))
            .unwrap();

        assert_eq!(signal.recommendation, Recommendation::StrongSell);
        assert!((signal.confidence - 0.9).abs() < 1e-12);
        assert!(signal.rationale.iter().any(|r| r.starts_with("Deep drawdown")));
    }

    #[test]
    fn test_sharpe_uses_shared_stats() {
        let closes = staircase(100.0, 1.0, 60);
        let expected = stats::annualized_sharpe(&stats::daily_returns(&closes));
        let signal = QuantAnalysisEngine::new().analyze_sync(&bars_from(&closes)).unwrap();

        assert!(signal.rationale.contains(&format!("Sharpe {:.2}", expected)));
    }

    #[test]
    fn test_flat_prices_hold() {
        let signal = QuantAnalysisEngine::new().analyze_sync(&bars_from(&[100.0; 60])).unwrap();
        assert_eq!(signal.recommendation, Recommendation::Hold);
        assert!((signal.confidence - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_short_or_bad_windows() {
        let engine = QuantAnalysisEngine::new();
        assert!(matches!(
            engine.analyze_sync(&bars_from(&[100.0; 10])),
            Err(AnalysisError::InsufficientData(_))
        ));

        let mut closes = vec![100.0; 30];
        closes[5] = 0.0;
        assert!(matches!(
            engine.analyze_sync(&bars_from(&closes)),
            Err(AnalysisError::InvalidData(_))
        ));
    }
}
