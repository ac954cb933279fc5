use analysis_core::{AnalysisError, Bar, MarketStats, Recommendation, Signal, SignalSource};
use async_trait::async_trait;

use crate::indicators::*;

pub const TECHNICAL_SOURCE_ID: &str = "technical";

/// Bars needed for a MACD(12, 26, 9) histogram value
const MIN_BARS: usize = 35;

const HIST_TOLERANCE: f64 = 1e-9;

/// Trend, momentum and oscillator voting over daily closes.
#[derive(Debug, Clone, Default)]
pub struct TechnicalAnalysisEngine;

impl TechnicalAnalysisEngine {
    pub fn new() -> Self {
        Self
    }

    /// (name, weight, bullish) for every indicator that fired
    fn build_signals(&self, closes: &[f64]) -> Vec<(&'static str, i32, bool)> {
        let mut signals: Vec<(&'static str, i32, bool)> = Vec::new();

        if let Some(&last_rsi) = rsi(closes, 14).last() {
            if last_rsi < 30.0 {
                signals.push(("RSI Oversold", 2, true));
            } else if last_rsi > 70.0 {
                signals.push(("RSI Overbought", 2, false));
            }
        }

        let current_price = closes[closes.len() - 1];

        // Histogram values within rounding noise of zero count as flat
        let tolerance = current_price.abs() * HIST_TOLERANCE;
        let hist: Vec<f64> = macd(closes, 12, 26, 9)
            .histogram
            .into_iter()
            .map(|h| if h.abs() <= tolerance { 0.0 } else { h })
            .collect();
        if let Some(&last_hist) = hist.last() {
            let prev_hist = if hist.len() > 1 { hist[hist.len() - 2] } else { last_hist };
            if last_hist > 0.0 && prev_hist <= 0.0 {
                signals.push(("MACD Bullish Cross", 3, true));
            } else if last_hist < 0.0 && prev_hist >= 0.0 {
                signals.push(("MACD Bearish Cross", 3, false));
            } else if last_hist > 0.0 {
                signals.push(("MACD Positive", 1, true));
            } else if last_hist < 0.0 {
                signals.push(("MACD Negative", 1, false));
            }
        }

        let sma_20 = sma(closes, 20);
        let sma_50 = sma(closes, 50);

        match (sma_20.last(), sma_50.last()) {
            (Some(&s20), Some(&s50)) => {
                if current_price > s20 && current_price > s50 {
                    signals.push(("Price Above MAs", 2, true));
                } else if current_price < s20 && current_price < s50 {
                    signals.push(("Price Below MAs", 2, false));
                }

                if sma_50.len() > 1 {
                    let prev_20 = sma_20[sma_20.len() - 2];
                    let prev_50 = sma_50[sma_50.len() - 2];
                    if s20 > s50 && prev_20 <= prev_50 {
                        signals.push(("Golden Cross", 4, true));
                    } else if s20 < s50 && prev_20 >= prev_50 {
                        signals.push(("Death Cross", 4, false));
                    }
                }
            }
            // Short window: trend from the 20-day average only
            (Some(&s20), None) => {
                if current_price > s20 {
                    signals.push(("Price Above SMA20", 1, true));
                } else if current_price < s20 {
                    signals.push(("Price Below SMA20", 1, false));
                }
            }
            _ => {}
        }

        signals
    }

    pub fn analyze_sync(&self, bars: &[Bar]) -> Result<Signal, AnalysisError> {
        if bars.len() < MIN_BARS {
            return Err(AnalysisError::InsufficientData(format!(
                "Need at least {} bars for technical analysis, got {}",
                MIN_BARS,
                bars.len()
            )));
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let signals = self.build_signals(&closes);

        let bullish: i32 = signals.iter().filter(|s| s.2).map(|s| s.1).sum();
        let bearish: i32 = signals.iter().filter(|s| !s.2).map(|s| s.1).sum();
        let net = bullish - bearish;

        let recommendation = match net {
            n if n >= 5 => Recommendation::StrongBuy,
            n if n >= 2 => Recommendation::Buy,
            n if n <= -5 => Recommendation::StrongSell,
            n if n <= -2 => Recommendation::Sell,
            _ => Recommendation::Hold,
        };

        // One-sided evidence is more convincing than a tug of war
        let total = bullish + bearish;
        let confidence = if total > 0 {
            0.4 + 0.5 * (net.abs() as f64 / total as f64) * (total.min(8) as f64 / 8.0)
        } else {
            0.4
        };

        let rationale = signals
            .iter()
            .map(|(name, weight, bull)| {
                format!("{} ({}{})", name, if *bull { "+" } else { "-" }, weight)
            })
            .collect();

        Ok(Signal::new(TECHNICAL_SOURCE_ID, recommendation, confidence).with_rationale(rationale))
    }
}

#[async_trait]
impl SignalSource for TechnicalAnalysisEngine {
    fn source_id(&self) -> &str {
        TECHNICAL_SOURCE_ID
    }

    async fn signal(&self, _ticker: &str, bars: &[Bar], _stats: &MarketStats) -> Result<Signal, AnalysisError> {
        self.analyze_sync(bars)
    }
}
