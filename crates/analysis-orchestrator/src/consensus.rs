use std::collections::{BTreeMap, HashMap};

use analysis_core::{clamp_unit, stats, ConsensusResult, Recommendation, Signal};
use serde::{Deserialize, Serialize};

/// Per-source base weights for consensus voting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    pub base_weights: HashMap<String, f64>,
    /// Weight for sources missing from `base_weights`
    pub default_weight: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        let base_weights = [("technical", 0.35), ("fundamental", 0.35), ("sentiment", 0.30)]
            .into_iter()
            .map(|(id, w)| (id.to_string(), w))
            .collect();

        Self {
            base_weights,
            default_weight: 0.33,
        }
    }
}

/// Maximum population variance of ordinal scores over [-2, 2].
const MAX_SCORE_VARIANCE: f64 = 4.0;

/// Fuses signals into one consensus with confidence-adjusted weights.
#[derive(Debug, Clone, Default)]
pub struct SignalAggregator {
    config: ConsensusConfig,
}

impl SignalAggregator {
    pub fn new(config: ConsensusConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Base weight for a source; negative and NaN weights count as 0.
    pub fn base_weight(&self, source_id: &str) -> f64 {
        self.config
            .base_weights
            .get(source_id)
            .copied()
            .unwrap_or(self.config.default_weight)
            .max(0.0)
    }

    /// Duplicate source ids are each counted; the per-source score map keeps
    /// the last one seen.
    pub fn aggregate(&self, signals: &[Signal]) -> ConsensusResult {
        if signals.is_empty() {
            return ConsensusResult::empty();
        }

        let mut weighted_score = 0.0;
        let mut adjusted_total = 0.0;
        let mut weighted_confidence = 0.0;
        let mut base_total = 0.0;
        let mut raw_scores = Vec::with_capacity(signals.len());
        let mut per_source_score = BTreeMap::new();
        let mut weights_used = BTreeMap::new();

        for signal in signals {
            let base = self.base_weight(&signal.source_id);
            let confidence = clamp_unit(signal.confidence);
            let score = signal.recommendation.score();

            // Low confidence means less say in the vote
            let adjusted = base * confidence;
            weighted_score += score as f64 * adjusted;
            adjusted_total += adjusted;

            weighted_confidence += confidence * base;
            base_total += base;

            raw_scores.push(score as f64);
            per_source_score.insert(signal.source_id.clone(), score);
            weights_used.insert(signal.source_id.clone(), base);

            tracing::debug!(
                "Signal {}: {} (confidence {:.2}, base weight {:.2}, adjusted {:.3})",
                signal.source_id,
                signal.recommendation,
                confidence,
                base,
                adjusted
            );
        }

        let consensus_score = if adjusted_total > 0.0 {
            (weighted_score / adjusted_total).clamp(-2.0, 2.0)
        } else {
            0.0
        };

        let variance = stats::population_variance(&raw_scores);
        let agreement_level = (1.0 - variance / MAX_SCORE_VARIANCE).clamp(0.0, 1.0);

        let consensus_confidence = if base_total > 0.0 {
            clamp_unit(weighted_confidence / base_total)
        } else {
            0.0
        };

        ConsensusResult {
            recommendation: Recommendation::from_score(consensus_score),
            consensus_score,
            agreement_level,
            consensus_confidence,
            per_source_score,
            weights_used,
            signal_count: signals.len(),
        }
    }
}
