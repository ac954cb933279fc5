use analysis_core::{
    clamp_unit, ConsensusResult, FinalDecision, Provenance, QualitativeView, Recommendation,
    ReconcileRule,
};

/// Above this agreement a contradicting qualitative call is discarded.
pub const STRONG_AGREEMENT: f64 = 0.7;
/// Above this agreement an extreme qualitative call is moderated.
pub const MODERATE_AGREEMENT: f64 = 0.5;

/// True when `qualitative` points against `consensus`. A HOLD consensus
/// contradicts every directional call.
pub fn contradicts(consensus: Recommendation, qualitative: Recommendation) -> bool {
    if consensus.is_bullish() {
        qualitative.is_bearish()
    } else if consensus.is_bearish() {
        qualitative.is_bullish()
    } else {
        qualitative != Recommendation::Hold
    }
}

/// Merges the quantitative consensus with an independent qualitative view.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionReconciler;

impl DecisionReconciler {
    pub fn new() -> Self {
        Self
    }

    pub fn reconcile(&self, consensus: &ConsensusResult, qualitative: &QualitativeView) -> FinalDecision {
        let agreement = consensus.agreement_level;
        let quant_rec = consensus.recommendation;
        let qual_rec = qualitative.recommendation;
        let qual_conf = clamp_unit(qualitative.confidence);

        let (recommendation, confidence, was_overridden, rule) = if agreement > STRONG_AGREEMENT
            && contradicts(quant_rec, qual_rec)
        {
            tracing::info!(
                "Qualitative {} contradicts strong consensus {} (agreement {:.2}), enforcing consensus",
                qual_rec,
                quant_rec,
                agreement
            );
            (quant_rec, consensus.consensus_confidence, true, ReconcileRule::ConsensusEnforced)
        } else if agreement > MODERATE_AGREEMENT
            && agreement <= STRONG_AGREEMENT
            && qual_rec.is_extreme()
            && !quant_rec.is_extreme()
        {
            let moderated = qual_rec.moderated();
            tracing::info!("Moderating qualitative {} to {}", qual_rec, moderated);
            (
                moderated,
                (qual_conf + consensus.consensus_confidence) / 2.0,
                true,
                ReconcileRule::Moderated,
            )
        } else {
            (
                qual_rec,
                qual_conf * (0.5 + 0.5 * agreement),
                false,
                ReconcileRule::QualitativeTrusted,
            )
        };

        FinalDecision {
            recommendation,
            confidence: clamp_unit(confidence),
            was_overridden,
            rule,
            provenance: Provenance {
                quant: consensus.clone(),
                qualitative: qualitative.clone(),
            },
        }
    }
}
