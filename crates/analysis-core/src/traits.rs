use async_trait::async_trait;
use crate::{AnalysisError, Bar, ConsensusResult, MarketStats, QualitativeView, Signal, TradingDecision};

/// An independent analytical source producing one signal per call
#[async_trait]
pub trait SignalSource: Send + Sync {
    fn source_id(&self) -> &str;

    async fn signal(&self, ticker: &str, bars: &[Bar], stats: &MarketStats) -> Result<Signal, AnalysisError>;
}

/// Produces the qualitative decision reconciled against the consensus
#[async_trait]
pub trait QualitativeSource: Send + Sync {
    async fn decide(
        &self,
        ticker: &str,
        signals: &[Signal],
        consensus: &ConsensusResult,
        stats: &MarketStats,
    ) -> Result<QualitativeView, AnalysisError>;
}

/// Full signal -> consensus -> reconcile -> size pipeline over a bar window.
/// `bars` must be sorted ascending and hold no data after the decision date.
#[async_trait]
pub trait DecisionPipeline: Send + Sync {
    async fn decide(&self, ticker: &str, bars: &[Bar]) -> Result<TradingDecision, AnalysisError>;
}
