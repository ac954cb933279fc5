use std::path::{Path, PathBuf};

use analysis_orchestrator::{rank_score, AnalysisOrchestrator, SignalAggregator};
use anyhow::{bail, Context, Result};
use backtest_engine::{BacktestDb, BacktestEngine, HistoricalBar};
use quant_analysis::{QuantAnalysisEngine, TrendDesk};
use risk_manager::RiskSizer;
use rust_decimal::Decimal;
use technical_analysis::TechnicalAnalysisEngine;

mod bars;
mod config;

use bars::{load_bars, ticker_bars_path};
use config::AgentConfig;

const USAGE: &str = "Usage:
  trading-agent analyze --ticker T --bars FILE
  trading-agent compare --tickers A,B,C --bars-dir DIR
  trading-agent backtest --ticker T --bars FILE --start YYYY-MM-DD --end YYYY-MM-DD
                         [--rebalance-days N] [--capital X] [--out FILE.json] [--db sqlite:FILE]

Bar files are .json (array of bars) or .csv (date,open,high,low,close,volume).
compare reads DIR/<TICKER>.csv or DIR/<TICKER>.json for each ticker.";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str());

    let config = AgentConfig::from_env()?;
    tracing::info!("Configuration loaded and validated");
    tracing::info!("  Max position size: {:.1}%", config.risk.max_position_size * 100.0);
    tracing::info!(
        "  Stop loss / take profit: {:.1}% / {:.1}%",
        config.risk.stop_loss_pct * 100.0,
        config.risk.take_profit_pct * 100.0
    );

    match command {
        Some("analyze") => analyze(&config, &args).await,
        Some("compare") => compare(&config, &args).await,
        Some("backtest") => backtest(&config, &args).await,
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    }
}

/// Value following `flag`, if present.
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

fn required<'a>(args: &'a [String], flag: &str) -> Result<&'a str> {
    match flag_value(args, flag) {
        Some(value) => Ok(value),
        None => bail!("missing {}\n\n{}", flag, USAGE),
    }
}

fn build_orchestrator(config: &AgentConfig) -> AnalysisOrchestrator {
    AnalysisOrchestrator::new(
        SignalAggregator::new(config.consensus.clone()),
        RiskSizer::new(config.risk.clone()),
        Box::new(TrendDesk::new()),
    )
    .with_source(Box::new(TechnicalAnalysisEngine::new()))
    .with_source(Box::new(QuantAnalysisEngine::new()))
}

async fn analyze(config: &AgentConfig, args: &[String]) -> Result<()> {
    let ticker = required(args, "--ticker")?.to_uppercase();
    let bars = load_bars(Path::new(required(args, "--bars")?))?;

    let orchestrator = build_orchestrator(config);
    tracing::info!("Analyzing {} with sources {:?}", ticker, orchestrator.source_ids());

    let decision = orchestrator
        .analyze(&ticker, &bars)
        .await
        .with_context(|| format!("analysis failed for {}", ticker))?;

    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

async fn compare(config: &AgentConfig, args: &[String]) -> Result<()> {
    let tickers: Vec<String> = required(args, "--tickers")?
        .split(',')
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .collect();
    if tickers.is_empty() {
        bail!("--tickers needs at least one symbol\n\n{}", USAGE);
    }
    let dir = Path::new(required(args, "--bars-dir")?);

    let mut universe = Vec::with_capacity(tickers.len());
    for ticker in tickers {
        let bars = load_bars(&ticker_bars_path(dir, &ticker)?)?;
        universe.push((ticker, bars));
    }

    let orchestrator = build_orchestrator(config);
    let ranked = orchestrator.compare(&universe).await;
    if ranked.is_empty() {
        bail!("no ticker could be analyzed");
    }

    for (i, d) in ranked.iter().enumerate() {
        println!(
            "{:>2}. {:<6} {:<11} confidence {:.2}  score {:+.2}  size {:.1}%",
            i + 1,
            d.ticker,
            d.decision.recommendation.to_string(),
            d.decision.confidence,
            rank_score(d),
            d.risk.position_size * 100.0
        );
    }
    println!("{}", serde_json::to_string_pretty(&ranked)?);
    Ok(())
}

async fn backtest(config: &AgentConfig, args: &[String]) -> Result<()> {
    let ticker = required(args, "--ticker")?.to_uppercase();
    let bars = load_bars(Path::new(required(args, "--bars")?))?;

    let mut backtest_config = config.backtest.clone();
    backtest_config.ticker = ticker.clone();
    backtest_config.start_date = required(args, "--start")?.to_string();
    backtest_config.end_date = required(args, "--end")?.to_string();
    if let Some(days) = flag_value(args, "--rebalance-days") {
        backtest_config.rebalance_interval_days =
            days.parse().with_context(|| format!("invalid --rebalance-days '{}'", days))?;
    }
    if let Some(capital) = flag_value(args, "--capital") {
        backtest_config.initial_capital = capital
            .parse::<Decimal>()
            .with_context(|| format!("invalid --capital '{}'", capital))?;
    }

    let history: Vec<HistoricalBar> = bars
        .iter()
        .map(|b| {
            HistoricalBar::from_bar(b).with_context(|| format!("unrepresentable price on {}", b.date))
        })
        .collect::<Result<_>>()?;

    let orchestrator = build_orchestrator(config);
    let engine = BacktestEngine::new(backtest_config);
    let result = engine.run(&orchestrator, &history).await?;

    println!(
        "{}: {} -> {} ({:+.2}%) vs buy & hold {:+.2}% | {} trades, win rate {:.1}%, stops {}, targets {}",
        result.ticker,
        result.initial_capital.round_dp(2),
        result.final_capital.round_dp(2),
        result.total_return_pct,
        result.buy_hold_return_pct,
        result.trade_count,
        result.win_rate * 100.0,
        result.stop_hits,
        result.target_hits
    );

    let out = flag_value(args, "--out")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(format!("backtest_{}.json", ticker)));
    result
        .save_json(&out)
        .with_context(|| format!("writing {}", out.display()))?;
    tracing::info!("Results written to {}", out.display());

    if let Some(url) = flag_value(args, "--db") {
        let db = BacktestDb::connect(url).await?;
        let id = db.save_backtest(&result).await?;
        tracing::info!("Backtest stored with id {} in {}", id, url);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{Bar, PositionDirection};
    use backtest_engine::{BacktestConfig, DecisionOutcome};
    use chrono::{Duration, NaiveDate};

    /// Daily rally: three steps up, two down, repeated.
    fn rally(n: usize) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let steps = [2.0, 2.0, 2.0, -1.5, -1.5];
        let mut close = 100.0;
        (0..n)
            .map(|i| {
                if i > 0 {
                    close += steps[(i - 1) % steps.len()];
                }
                Bar {
                    date: start + Duration::days(i as i64),
                    open: close,
                    high: close + 0.5,
                    low: close - 0.5,
                    close,
                    volume: 1_000.0,
                }
            })
            .collect()
    }

    fn default_config() -> AgentConfig {
        AgentConfig::from_lookup(|_| None).unwrap()
    }

    #[tokio::test]
    async fn test_backtest_through_real_pipeline() {
        let config = default_config();
        let bars = rally(160);
        let history: Vec<HistoricalBar> = bars.iter().map(|b| HistoricalBar::from_bar(b).unwrap()).collect();

        let mut backtest_config = config.backtest.clone();
        backtest_config.ticker = "RALLY".to_string();
        backtest_config.start_date = bars[20].date.to_string();
        backtest_config.end_date = bars[159].date.to_string();
        backtest_config.rebalance_interval_days = 10;

        let orchestrator = build_orchestrator(&config);
        let result = BacktestEngine::new(backtest_config.clone())
            .run(&orchestrator, &history)
            .await
            .unwrap();

        // 21 bars is under the lookback floor; 31 clears it and opens
        assert!(matches!(result.decision_log[0].outcome, DecisionOutcome::Skipped(_)));
        assert_eq!(result.decision_log[1].date, bars[30].date);
        assert_eq!(result.decision_log[1].outcome, DecisionOutcome::Opened);
        assert!(!result.trades.is_empty());

        let realized: Decimal = result.trades.iter().map(|t| t.profit_loss).sum();
        assert_eq!(result.final_capital, result.initial_capital + realized);

        for trade in &result.trades {
            if trade.stop_hit {
                assert!(trade.exit_price < trade.entry_price);
            }
            if trade.target_hit {
                assert!(trade.exit_price > trade.entry_price);
            }
        }

        // Every long call the engine acted on carried stop < price < target
        let mut longs = 0;
        for point in result.decision_log.iter().filter(|p| p.outcome == DecisionOutcome::Opened) {
            let upto: Vec<Bar> = bars.iter().filter(|b| b.date <= point.date).cloned().collect();
            let window = &upto[upto.len().saturating_sub(backtest_config.analysis_window_bars)..];
            let decision = orchestrator.analyze("RALLY", window).await.unwrap();

            assert_eq!(decision.risk.direction, PositionDirection::Long);
            let stop = decision.risk.stop_loss_price.unwrap();
            let target = decision.risk.take_profit_price.unwrap();
            assert!(stop < decision.risk.current_price);
            assert!(decision.risk.current_price < target);
            longs += 1;
        }
        assert!(longs >= 1);
    }

    #[tokio::test]
    async fn test_short_window_runs_without_technical_source() {
        let config = default_config();
        let bars = rally(31);
        assert!(bars.len() >= config.backtest.minimum_lookback_bars);

        let decision = build_orchestrator(&config).analyze("RALLY", &bars).await.unwrap();

        let sources: Vec<&str> = decision.signals.iter().map(|s| s.source_id.as_str()).collect();
        assert_eq!(sources, vec!["quantitative"]);
        assert!(decision.decision.recommendation.is_bullish());
    }

    #[test]
    fn flag_parsing() {
        let args: Vec<String> = ["trading-agent", "compare", "--tickers", "aapl,msft"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(flag_value(&args, "--tickers"), Some("aapl,msft"));
        assert!(flag_value(&args, "--bars-dir").is_none());
        assert!(required(&args, "--bars-dir").is_err());
    }
}
