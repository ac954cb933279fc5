use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::AnalysisError;

/// Daily OHLCV bar data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

/// Five-point directional call shared by every signal source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    StrongSell,
    Sell,
    Hold,
    Buy,
    StrongBuy,
}

impl Recommendation {
    pub const ALL: [Recommendation; 5] = [
        Recommendation::StrongSell,
        Recommendation::Sell,
        Recommendation::Hold,
        Recommendation::Buy,
        Recommendation::StrongBuy,
    ];

    /// Ordinal score (-2 to 2)
    pub fn score(&self) -> i32 {
        match self {
            Recommendation::StrongSell => -2,
            Recommendation::Sell => -1,
            Recommendation::Hold => 0,
            Recommendation::Buy => 1,
            Recommendation::StrongBuy => 2,
        }
    }

    /// Rounds to the nearest ordinal (ties to even) and clamps into [-2, 2].
    /// NaN maps to HOLD.
    pub fn from_score(score: f64) -> Self {
        if score.is_nan() {
            return Recommendation::Hold;
        }
        match score.round_ties_even().clamp(-2.0, 2.0) as i32 {
            2 => Recommendation::StrongBuy,
            1 => Recommendation::Buy,
            0 => Recommendation::Hold,
            -1 => Recommendation::Sell,
            _ => Recommendation::StrongSell,
        }
    }

    pub fn is_bullish(&self) -> bool {
        matches!(self, Recommendation::Buy | Recommendation::StrongBuy)
    }

    pub fn is_bearish(&self) -> bool {
        matches!(self, Recommendation::Sell | Recommendation::StrongSell)
    }

    pub fn is_extreme(&self) -> bool {
        matches!(self, Recommendation::StrongBuy | Recommendation::StrongSell)
    }

    /// Strips the STRONG qualifier, leaving other calls unchanged.
    pub fn moderated(&self) -> Self {
        match self {
            Recommendation::StrongBuy => Recommendation::Buy,
            Recommendation::StrongSell => Recommendation::Sell,
            other => *other,
        }
    }

    /// Human-readable label
    pub fn to_label(&self) -> &'static str {
        match self {
            Recommendation::StrongSell => "STRONG SELL",
            Recommendation::Sell => "SELL",
            Recommendation::Hold => "HOLD",
            Recommendation::Buy => "BUY",
            Recommendation::StrongBuy => "STRONG BUY",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_label())
    }
}

impl FromStr for Recommendation {
    type Err = AnalysisError;

    /// Accepts "STRONG BUY", "strong_buy", "StrongBuy", "strong-buy" and the like.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        match normalized.as_str() {
            "STRONGSELL" => Ok(Recommendation::StrongSell),
            "SELL" => Ok(Recommendation::Sell),
            "HOLD" => Ok(Recommendation::Hold),
            "BUY" => Ok(Recommendation::Buy),
            "STRONGBUY" => Ok(Recommendation::StrongBuy),
            _ => Err(AnalysisError::InvalidData(format!(
                "unknown recommendation '{}'",
                s
            ))),
        }
    }
}

/// Clamps into [0, 1]; NaN becomes 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// One source's directional opinion on an instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub source_id: String,
    pub recommendation: Recommendation,
    pub confidence: f64, // 0.0 to 1.0
    #[serde(default)]
    pub rationale: Vec<String>,
}

impl Signal {
    pub fn new(source_id: impl Into<String>, recommendation: Recommendation, confidence: f64) -> Self {
        Self {
            source_id: source_id.into(),
            recommendation,
            confidence: clamp_unit(confidence),
            rationale: Vec::new(),
        }
    }

    pub fn with_rationale(mut self, rationale: Vec<String>) -> Self {
        self.rationale = rationale;
        self
    }
}

/// Weighted, confidence-scaled fusion of a set of signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub recommendation: Recommendation,
    pub consensus_score: f64,
    pub agreement_level: f64,
    pub consensus_confidence: f64,
    pub per_source_score: BTreeMap<String, i32>,
    pub weights_used: BTreeMap<String, f64>,
    pub signal_count: usize,
}

impl ConsensusResult {
    /// Degenerate result for an empty signal set.
    pub fn empty() -> Self {
        Self {
            recommendation: Recommendation::Hold,
            consensus_score: 0.0,
            agreement_level: 1.0,
            consensus_confidence: 0.0,
            per_source_score: BTreeMap::new(),
            weights_used: BTreeMap::new(),
            signal_count: 0,
        }
    }
}

/// Optional sizing suggestions carried by a qualitative decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SizingHints {
    pub position_pct: Option<f64>,
    pub stop_price: Option<f64>,
    pub take_price: Option<f64>,
}

/// Independently-derived decision that is reconciled against the consensus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitativeView {
    pub recommendation: Recommendation,
    pub confidence: f64,
    #[serde(default)]
    pub rationale: Vec<String>,
    #[serde(default)]
    pub hints: Option<SizingHints>,
}

impl QualitativeView {
    pub fn new(recommendation: Recommendation, confidence: f64) -> Self {
        Self {
            recommendation,
            confidence: clamp_unit(confidence),
            rationale: Vec::new(),
            hints: None,
        }
    }
}

/// Which branch of the reconciliation policy produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileRule {
    ConsensusEnforced,
    Moderated,
    QualitativeTrusted,
}

/// Inputs a final decision was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub quant: ConsensusResult,
    pub qualitative: QualitativeView,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalDecision {
    pub recommendation: Recommendation,
    pub confidence: f64,
    pub was_overridden: bool,
    pub rule: ReconcileRule,
    pub provenance: Provenance,
}

/// Summary statistics over a bar window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketStats {
    pub current_price: f64,
    pub previous_close: f64,
    pub price_change_pct: f64,
    /// Annualized, in percent
    pub volatility_pct: f64,
    pub sharpe_ratio: f64,
    pub return_30d_pct: f64,
    pub return_90d_pct: f64,
    pub bar_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionDirection {
    Long,
    Short,
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub direction: PositionDirection,
    pub current_price: f64,
    pub position_size: f64,
    pub stop_loss_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    pub risk_reward_ratio: Option<f64>,
    pub max_loss_amount: f64,
}

/// Output of one full pipeline run for a ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingDecision {
    pub ticker: String,
    pub as_of: NaiveDate,
    pub market: MarketStats,
    pub signals: Vec<Signal>,
    pub consensus: ConsensusResult,
    pub decision: FinalDecision,
    pub risk: RiskAssessment,
}
