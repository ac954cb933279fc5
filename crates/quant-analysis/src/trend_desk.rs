use analysis_core::{
    AnalysisError, ConsensusResult, MarketStats, QualitativeSource, QualitativeView, Recommendation,
    Signal,
};
use async_trait::async_trait;

/// Window return beyond which the desk takes a directional view
const TREND_THRESHOLD_PCT: f64 = 5.0;
/// Window return beyond which a calm market earns a STRONG call
const STRONG_TREND_PCT: f64 = 15.0;
const CALM_VOLATILITY_PCT: f64 = 30.0;
const TURBULENT_VOLATILITY_PCT: f64 = 40.0;

/// Rule-based qualitative desk reading the whole-window trend and volatility
/// regime. Works from market statistics alone and leaves sizing hints unset.
#[derive(Debug, Clone, Default)]
pub struct TrendDesk;

impl TrendDesk {
    pub fn new() -> Self {
        Self
    }

    pub fn view(&self, stats: &MarketStats) -> QualitativeView {
        let trend = stats.return_90d_pct;
        let calm = stats.volatility_pct < CALM_VOLATILITY_PCT;

        let recommendation = match trend {
            t if t > STRONG_TREND_PCT && calm => Recommendation::StrongBuy,
            t if t > TREND_THRESHOLD_PCT => Recommendation::Buy,
            t if t < -STRONG_TREND_PCT && calm => Recommendation::StrongSell,
            t if t < -TREND_THRESHOLD_PCT => Recommendation::Sell,
            _ => Recommendation::Hold,
        };

        let mut confidence = 0.5 + (trend.abs() / 50.0).min(0.3);
        let mut rationale = vec![format!(
            "Window return {:+.2}% with {:.1}% annualized volatility",
            trend, stats.volatility_pct
        )];
        if stats.volatility_pct > TURBULENT_VOLATILITY_PCT {
            confidence -= 0.1;
            rationale.push("Turbulent regime, conviction reduced".to_string());
        }

        let mut view = QualitativeView::new(recommendation, confidence);
        view.rationale = rationale;
        view
    }
}

#[async_trait]
impl QualitativeSource for TrendDesk {
    async fn decide(
        &self,
        ticker: &str,
        _signals: &[Signal],
        consensus: &ConsensusResult,
        stats: &MarketStats,
    ) -> Result<QualitativeView, AnalysisError> {
        if !stats.current_price.is_finite() || stats.current_price <= 0.0 {
            return Err(AnalysisError::InvalidData(format!(
                "no usable price for {}",
                ticker
            )));
        }

        let view = self.view(stats);
        tracing::debug!(
            "Trend desk on {}: {} ({:.2}) against consensus {}",
            ticker,
            view.recommendation,
            view.confidence,
            consensus.recommendation
        );
        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    fn stats_for(closes: &[f64]) -> MarketStats {
        MarketStats::from_bars(&bars_from(closes)).unwrap()
    }

    #[test]
    fn test_calm_rally_is_strong_buy() {
        let view = TrendDesk::new().view(&stats_for(&staircase(100.0, 1.0, 60)));
        assert_eq!(view.recommendation, Recommendation::StrongBuy);
        assert!((view.confidence - 0.8).abs() < 1e-12);
        assert!(view.hints.is_none());
    }

    #[test]
    fn test_moderate_decline_is_sell() {
        let view = TrendDesk::new().view(&stats_for(&staircase(300.0, -1.0, 60)));
        assert_eq!(view.recommendation, Recommendation::Sell);
        assert!((view.confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_turbulent_market_reduces_conviction() {
        let closes: Vec<f64> = (0..60).map(|i| if i % 2 == 1 { 103.0 } else { 97.0 }).collect();
        let stats = stats_for(&closes);
        let view = TrendDesk::new().view(&stats);

        assert!(stats.volatility_pct > TURBULENT_VOLATILITY_PCT);
        assert_eq!(view.recommendation, Recommendation::Buy);
        let expected = 0.5 + (103.0 / 97.0 - 1.0) * 100.0 / 50.0 - 0.1;
        assert!((view.confidence - expected).abs() < 1e-9);
        assert_eq!(view.rationale.len(), 2);
    }

    #[test]
    fn test_flat_market_holds() {
        let view = TrendDesk::new().view(&stats_for(&[50.0; 40]));
        assert_eq!(view.recommendation, Recommendation::Hold);
        assert!((view.confidence - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_rejects_missing_price() {
        let result = TrendDesk::new()
            .decide("ACME", &[], &ConsensusResult::empty(), &MarketStats::default())
            .await;
        assert!(matches!(result, Err(AnalysisError::InvalidData(_))));
    }
}
