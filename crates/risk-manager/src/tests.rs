#[cfg(test)]
mod risk_sizer_tests {
    use crate::{classify_volatility, RiskConfig, RiskSizer};
    use analysis_core::{
        ConsensusResult, FinalDecision, PositionDirection, Provenance, QualitativeView,
        Recommendation, ReconcileRule, RiskLevel, SizingHints,
    };

    const EPS: f64 = 1e-9;

    fn decision(rec: Recommendation) -> FinalDecision {
        FinalDecision {
            recommendation: rec,
            confidence: 0.7,
            was_overridden: false,
            rule: ReconcileRule::QualitativeTrusted,
            provenance: Provenance {
                quant: ConsensusResult::empty(),
                qualitative: QualitativeView::new(rec, 0.7),
            },
        }
    }

    // ===== Volatility bands =====

    #[test]
    fn test_volatility_bands() {
        assert_eq!(classify_volatility(10.0), (RiskLevel::Low, 1.0));
        assert_eq!(classify_volatility(15.0), (RiskLevel::Medium, 0.75));
        assert_eq!(classify_volatility(24.9), (RiskLevel::Medium, 0.75));
        assert_eq!(classify_volatility(25.0), (RiskLevel::High, 0.5));
        assert_eq!(classify_volatility(40.0), (RiskLevel::VeryHigh, 0.3));
        assert_eq!(classify_volatility(f64::NAN), (RiskLevel::VeryHigh, 0.3));
    }

    // ===== Long sizing with defaults =====

    #[test]
    fn test_buy_medium_volatility_defaults() {
        let sizer = RiskSizer::default();
        let r = sizer.size(100.0, 20.0, &decision(Recommendation::Buy), None);

        assert_eq!(r.risk_level, RiskLevel::Medium);
        assert_eq!(r.direction, PositionDirection::Long);
        assert!((r.position_size - 0.075).abs() < EPS);
        assert!((r.stop_loss_price.unwrap() - 95.0).abs() < EPS);
        assert!((r.take_profit_price.unwrap() - 115.0).abs() < EPS);
        assert!((r.risk_reward_ratio.unwrap() - 3.0).abs() < EPS);
        // 10_000 * 0.075 * 5%
        assert!((r.max_loss_amount - 37.5).abs() < EPS);
    }

    #[test]
    fn test_hold_has_no_position() {
        let sizer = RiskSizer::default();
        let hints = SizingHints {
            position_pct: Some(0.05),
            stop_price: Some(90.0),
            take_price: Some(120.0),
        };
        let r = sizer.size(100.0, 10.0, &decision(Recommendation::Hold), Some(&hints));

        assert_eq!(r.direction, PositionDirection::Flat);
        assert_eq!(r.position_size, 0.0);
        assert!(r.stop_loss_price.is_none());
        assert!(r.take_profit_price.is_none());
        assert!(r.risk_reward_ratio.is_none());
        assert_eq!(r.max_loss_amount, 0.0);
    }

    // ===== Short sizing =====

    #[test]
    fn test_short_levels_reversed_and_penalized() {
        let sizer = RiskSizer::default();
        let r = sizer.size(100.0, 10.0, &decision(Recommendation::StrongSell), None);

        assert_eq!(r.direction, PositionDirection::Short);
        assert!((r.position_size - 0.07).abs() < EPS);
        assert!((r.stop_loss_price.unwrap() - 105.0).abs() < EPS);
        assert!((r.take_profit_price.unwrap() - 85.0).abs() < EPS);
        assert!(r.stop_loss_price.unwrap() > 100.0);
        assert!(r.take_profit_price.unwrap() < 100.0);
    }

    #[test]
    fn test_short_hints_checked_in_reverse() {
        let sizer = RiskSizer::default();
        let good = SizingHints {
            position_pct: Some(0.04),
            stop_price: Some(108.0),
            take_price: Some(80.0),
        };
        let r = sizer.size(100.0, 10.0, &decision(Recommendation::Sell), Some(&good));
        assert!((r.position_size - 0.04).abs() < EPS);
        assert_eq!(r.stop_loss_price, Some(108.0));
        assert_eq!(r.take_profit_price, Some(80.0));

        // long-side levels are unusable for a short
        let wrong_side = SizingHints {
            position_pct: None,
            stop_price: Some(95.0),
            take_price: Some(115.0),
        };
        let r = sizer.size(100.0, 10.0, &decision(Recommendation::Sell), Some(&wrong_side));
        assert!((r.stop_loss_price.unwrap() - 105.0).abs() < EPS);
        assert!((r.take_profit_price.unwrap() - 85.0).abs() < EPS);
    }

    // ===== Hints =====

    #[test]
    fn test_valid_long_hints_used() {
        let sizer = RiskSizer::default();
        let hints = SizingHints {
            position_pct: Some(0.05),
            stop_price: Some(92.0),
            take_price: Some(130.0),
        };
        let r = sizer.size(100.0, 30.0, &decision(Recommendation::Buy), Some(&hints));

        assert!((r.position_size - 0.05).abs() < EPS);
        assert_eq!(r.stop_loss_price, Some(92.0));
        assert_eq!(r.take_profit_price, Some(130.0));
        assert!((r.risk_reward_ratio.unwrap() - 30.0 / 8.0).abs() < EPS);
    }

    #[test]
    fn test_invalid_hints_ignored() {
        let sizer = RiskSizer::default();
        let hints = SizingHints {
            position_pct: Some(0.5),
            stop_price: Some(99.5),
            take_price: Some(100.5),
        };
        let r = sizer.size(100.0, 10.0, &decision(Recommendation::Buy), Some(&hints));

        assert!((r.position_size - 0.10).abs() < EPS);
        assert!((r.stop_loss_price.unwrap() - 95.0).abs() < EPS);
        assert!((r.take_profit_price.unwrap() - 115.0).abs() < EPS);

        let tiny = SizingHints {
            position_pct: Some(0.001),
            ..Default::default()
        };
        let r = sizer.size(100.0, 10.0, &decision(Recommendation::Buy), Some(&tiny));
        assert!((r.position_size - 0.10).abs() < EPS);
    }

    // ===== Bounds =====

    #[test]
    fn test_position_never_exceeds_max() {
        let config = RiskConfig {
            max_position_size: 0.2,
            ..Default::default()
        };
        let sizer = RiskSizer::new(config);

        for vol in [0.0, 5.0, 14.9, 15.0, 20.0, 25.0, 39.9, 40.0, 80.0, 300.0] {
            for rec in Recommendation::ALL {
                let r = sizer.size(50.0, vol, &decision(rec), None);
                assert!(r.position_size >= 0.0);
                assert!(r.position_size <= 0.2 + EPS);

                if let (Some(stop), Some(target)) = (r.stop_loss_price, r.take_profit_price) {
                    match r.direction {
                        PositionDirection::Long => assert!(stop < 50.0 && 50.0 < target),
                        PositionDirection::Short => assert!(target < 50.0 && 50.0 < stop),
                        PositionDirection::Flat => panic!("flat assessment with levels"),
                    }
                }
            }
        }
    }

    #[test]
    fn test_zero_risk_distance_has_no_ratio() {
        let config = RiskConfig {
            stop_loss_pct: 0.0,
            ..Default::default()
        };
        let sizer = RiskSizer::new(config);
        let r = sizer.size(100.0, 10.0, &decision(Recommendation::Buy), None);

        assert!(r.position_size > 0.0);
        assert!(r.risk_reward_ratio.is_none());
        assert_eq!(r.max_loss_amount, 0.0);
    }

    #[test]
    fn test_non_positive_price_is_flat() {
        let sizer = RiskSizer::default();
        for price in [0.0, -5.0, f64::NAN] {
            let r = sizer.size(price, 10.0, &decision(Recommendation::StrongBuy), None);
            assert_eq!(r.direction, PositionDirection::Flat);
            assert_eq!(r.position_size, 0.0);
        }
    }
}
