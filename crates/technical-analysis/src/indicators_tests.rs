#[cfg(test)]
mod tests {
    use super::super::analyzer::*;
    use super::super::indicators::*;
    use analysis_core::{AnalysisError, Bar, MarketStats, Recommendation, SignalSource};
    use chrono::NaiveDate;

    // Helper function to create sample price data
    fn sample_prices() -> Vec<f64> {
        vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08,
            45.89, 46.03, 45.61, 46.28, 46.28, 46.00, 46.03, 46.41, 46.22, 45.64,
        ]
    }

    fn bars_from(closes: &[f64]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                date: start + chrono::Duration::days(i as i64),
                open: close,
                high: close + 0.5,
                low: close - 0.5,
                close,
                volume: 1_000_000.0,
            })
            .collect()
    }

    /// Three steps with the trend, two against it, repeated.
    fn staircase(start: f64, direction: f64, n: usize) -> Vec<f64> {
        let mut closes = vec![start];
        let steps = [2.0, 2.0, 2.0, -1.5, -1.5];
        let mut i = 0;
        while closes.len() < n {
            let last = closes[closes.len() - 1];
            closes.push(last + direction * steps[i % steps.len()]);
            i += 1;
        }
        closes
    }

    #[test]
    fn test_sma_basic() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = sma(&data, 3);

        assert_eq!(result.len(), 3);
        assert!((result[0] - 2.0).abs() < 0.001); // (1+2+3)/3 = 2
        assert!((result[1] - 3.0).abs() < 0.001); // (2+3+4)/3 = 3
        assert!((result[2] - 4.0).abs() < 0.001); // (3+4+5)/3 = 4
    }

    #[test]
    fn test_sma_short_input() {
        assert!(sma(&[1.0, 2.0], 3).is_empty());
        assert!(sma(&[1.0, 2.0], 0).is_empty());
    }

    #[test]
    fn test_ema_seeded_with_sma() {
        let result = ema(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(result.len(), 3);
        assert!((result[0] - 2.0).abs() < 1e-12);
        assert!((result[1] - 3.0).abs() < 1e-12);
        assert!((result[2] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_ema_constant_series() {
        let result = ema(&[7.0; 30], 10);
        assert!(result.iter().all(|v| (v - 7.0).abs() < 1e-12));
    }

    #[test]
    fn test_rsi_reference_values() {
        let result = rsi(&sample_prices(), 14);
        assert_eq!(result.len(), 6);
        assert!((result[0] - 70.46).abs() < 0.01);
        assert!((result[5] - 57.92).abs() < 0.01);
    }

    #[test]
    fn test_rsi_extremes() {
        let up: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let down: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        let flat = vec![100.0; 30];

        assert_eq!(*rsi(&up, 14).last().unwrap(), 100.0);
        assert_eq!(*rsi(&down, 14).last().unwrap(), 0.0);
        assert_eq!(*rsi(&flat, 14).last().unwrap(), 50.0);
    }

    #[test]
    fn test_macd_alignment() {
        let data: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let result = macd(&data, 12, 26, 9);

        assert_eq!(result.macd_line.len(), 35);
        assert_eq!(result.signal_line.len(), 27);
        assert_eq!(result.histogram.len(), 27);
        // linear trend: fast EMA lags 5.5 bars, slow 12.5
        assert!((result.macd_line[0] - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_macd_rejects_bad_periods() {
        let data: Vec<f64> = (0..60).map(|i| i as f64).collect();
        assert!(macd(&data, 26, 12, 9).histogram.is_empty());
        assert!(macd(&data[..20], 12, 26, 9).macd_line.is_empty());
    }

    // ===== Technical engine =====

    #[test]
    fn test_uptrend_with_pullbacks_is_buy() {
        let engine = TechnicalAnalysisEngine::new();
        let signal = engine.analyze_sync(&bars_from(&staircase(100.0, 1.0, 60))).unwrap();

        assert_eq!(signal.source_id, TECHNICAL_SOURCE_ID);
        assert_eq!(signal.recommendation, Recommendation::Buy);
        assert!((signal.confidence - 0.5875).abs() < 1e-9);
        assert!(signal.rationale.iter().any(|r| r.starts_with("Price Above MAs")));
    }

    #[test]
    fn test_downtrend_with_rebounds_is_sell() {
        let engine = TechnicalAnalysisEngine::new();
        let signal = engine.analyze_sync(&bars_from(&staircase(300.0, -1.0, 60))).unwrap();

        assert_eq!(signal.recommendation, Recommendation::Sell);
        assert!(signal.rationale.iter().any(|r| r.starts_with("Price Below MAs")));
    }

    #[test]
    fn test_overbought_offsets_trend() {
        let engine = TechnicalAnalysisEngine::new();
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let signal = engine.analyze_sync(&bars_from(&closes)).unwrap();

        assert_eq!(signal.recommendation, Recommendation::Hold);
        assert!((signal.confidence - 0.4).abs() < 1e-12);
        assert_eq!(signal.rationale.len(), 2);
    }

    #[test]
    fn test_requires_history() {
        let engine = TechnicalAnalysisEngine::new();
        let result = engine.analyze_sync(&bars_from(&[100.0; 20]));
        assert!(matches!(result, Err(AnalysisError::InsufficientData(_))));
    }

    #[tokio::test]
    async fn test_signal_source_impl() {
        let engine = TechnicalAnalysisEngine::new();
        let bars = bars_from(&staircase(100.0, 1.0, 60));
        let stats = MarketStats::from_bars(&bars).unwrap();

        assert_eq!(engine.source_id(), "technical");
        let signal = engine.signal("ACME", &bars, &stats).await.unwrap();
        assert_eq!(signal.recommendation, Recommendation::Buy);
    }
}
