use analysis_core::{
    AnalysisError, Bar, DecisionPipeline, MarketStats, QualitativeSource, Signal, SignalSource,
    TradingDecision,
};
use async_trait::async_trait;
use futures_util::future::join_all;
use risk_manager::RiskSizer;

pub mod consensus;
pub mod reconciler;

pub use consensus::{ConsensusConfig, SignalAggregator};
pub use reconciler::{contradicts, DecisionReconciler, MODERATE_AGREEMENT, STRONG_AGREEMENT};

/// Runs signal sources, consensus, reconciliation and sizing for one ticker.
pub struct AnalysisOrchestrator {
    sources: Vec<Box<dyn SignalSource>>,
    qualitative: Box<dyn QualitativeSource>,
    aggregator: SignalAggregator,
    reconciler: DecisionReconciler,
    sizer: RiskSizer,
}

impl AnalysisOrchestrator {
    pub fn new(
        aggregator: SignalAggregator,
        sizer: RiskSizer,
        qualitative: Box<dyn QualitativeSource>,
    ) -> Self {
        Self {
            sources: Vec::new(),
            qualitative,
            aggregator,
            reconciler: DecisionReconciler::new(),
            sizer,
        }
    }

    pub fn with_source(mut self, source: Box<dyn SignalSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn source_ids(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.source_id()).collect()
    }

    /// Queries every source concurrently. Failed sources are logged and left out.
    pub async fn collect_signals(&self, ticker: &str, bars: &[Bar], stats: &MarketStats) -> Vec<Signal> {
        let results = join_all(self.sources.iter().map(|source| async move {
            (source.source_id(), source.signal(ticker, bars, stats).await)
        }))
        .await;

        results
            .into_iter()
            .filter_map(|(source_id, result)| match result {
                Ok(signal) => {
                    tracing::debug!(
                        "{} signal for {}: {} ({:.2})",
                        source_id,
                        ticker,
                        signal.recommendation,
                        signal.confidence
                    );
                    Some(signal)
                }
                Err(e) => {
                    tracing::warn!("{} signal for {} failed: {}", source_id, ticker, e);
                    None
                }
            })
            .collect()
    }

    /// `bars` must be ascending; the last bar is the decision date.
    pub async fn analyze(&self, ticker: &str, bars: &[Bar]) -> Result<TradingDecision, AnalysisError> {
        let as_of = bars
            .last()
            .map(|b| b.date)
            .ok_or_else(|| AnalysisError::InsufficientData(format!("no bars for {}", ticker)))?;
        let market = MarketStats::from_bars(bars)?;

        let signals = self.collect_signals(ticker, bars, &market).await;
        let consensus = self.aggregator.aggregate(&signals);

        let qualitative = self
            .qualitative
            .decide(ticker, &signals, &consensus, &market)
            .await?;
        let decision = self.reconciler.reconcile(&consensus, &qualitative);
        let risk = self.sizer.size(
            market.current_price,
            market.volatility_pct,
            &decision,
            qualitative.hints.as_ref(),
        );

        tracing::info!(
            "{} {}: consensus {} (score {:.2}, agreement {:.2}), final {} ({:.2}, {:?}), size {:.3}",
            ticker,
            as_of,
            consensus.recommendation,
            consensus.consensus_score,
            consensus.agreement_level,
            decision.recommendation,
            decision.confidence,
            decision.rule,
            risk.position_size
        );

        Ok(TradingDecision {
            ticker: ticker.to_string(),
            as_of,
            market,
            signals,
            consensus,
            decision,
            risk,
        })
    }

    /// Analyzes each ticker's window concurrently, in input order.
    /// Tickers whose analysis fails are logged and left out.
    pub async fn batch_analyze(&self, universe: &[(String, Vec<Bar>)]) -> Vec<TradingDecision> {
        let results = join_all(
            universe
                .iter()
                .map(|(ticker, bars)| async move { (ticker, self.analyze(ticker, bars).await) }),
        )
        .await;

        results
            .into_iter()
            .filter_map(|(ticker, result)| match result {
                Ok(decision) => Some(decision),
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", ticker, e);
                    None
                }
            })
            .collect()
    }

    /// Best opportunity first, by `rank_score`. Ties keep input order.
    pub async fn compare(&self, universe: &[(String, Vec<Bar>)]) -> Vec<TradingDecision> {
        let mut decisions = self.batch_analyze(universe).await;
        decisions.sort_by(|a, b| rank_score(b).total_cmp(&rank_score(a)));

        for (i, d) in decisions.iter().enumerate() {
            tracing::info!(
                "#{} {}: {} ({:.0}%), size {:.1}%",
                i + 1,
                d.ticker,
                d.decision.recommendation,
                d.decision.confidence * 100.0,
                d.risk.position_size * 100.0
            );
        }
        decisions
    }
}

/// Ordinal score of the final call scaled by its confidence.
pub fn rank_score(decision: &TradingDecision) -> f64 {
    decision.decision.recommendation.score() as f64 * decision.decision.confidence
}

#[async_trait]
impl DecisionPipeline for AnalysisOrchestrator {
    async fn decide(&self, ticker: &str, bars: &[Bar]) -> Result<TradingDecision, AnalysisError> {
        self.analyze(ticker, bars).await
    }
}
