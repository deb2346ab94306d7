mod report;

use std::collections::BTreeSet;

use anyhow::Context;
use chrono::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::{Config, MarketDataSource, RawCandle};
use evaluator::{evaluate_parallel, EvaluationResult, Evaluator};
use market_data::{read_candles_csv, BinanceKlines, CachedSource, TradeHistoryRow, TradeHistoryStore, TradeMeta};
use performance::PerformanceSummary;
use strategy::{build_strategies, CandleSeries, Position, Strategy, StrategyFileConfig};

use report::{RunReport, StrategyReport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("Failed to load configuration")?;
    let strategy_file = StrategyFileConfig::load(&cfg.strategy_config_path)?;
    let settings = strategy_file.backtest.clone();
    info!(
        symbol = %cfg.symbol,
        interval = %cfg.interval,
        strategies = strategy_file.strategies.len(),
        "Backtest starting"
    );

    // ── Candles ───────────────────────────────────────────────────────────────
    let raw = load_candles(&cfg).await?;
    let strategies = build_strategies(&strategy_file)?;
    let spans: BTreeSet<usize> = strategies.iter().flat_map(|s| s.indicator_spans()).collect();
    let series = CandleSeries::from_raw(&raw)
        .context("Candle data rejected")?
        .with_emas(spans)?;
    if let Some(minutes) = settings.max_gap_minutes {
        series.ensure_max_gap(Duration::minutes(minutes))?;
    }
    info!(candles = series.len(), "Candle series ready");

    // ── Evaluation ────────────────────────────────────────────────────────────
    let rank_by = settings.rank_by;
    let risk_free_rate = settings.risk_free_rate;
    let performance = move |s: &dyn Strategy| rank_by.score(&s.metrics(), risk_free_rate);

    let (best, strategies) = if settings.parallel {
        evaluate_parallel(&series, strategies, performance, settings.start_cursor)?
    } else {
        let mut ev = Evaluator::new(&series, strategies, performance, settings.start_cursor)?;
        let mut next_report = 0.1;
        while !ev.is_done() {
            ev.step()?;
            if ev.progress() >= next_report {
                info!(progress_pct = (ev.progress() * 100.0).round(), "Evaluating");
                next_report += 0.1;
            }
        }
        (ev.results(), ev.into_strategies())
    };

    // ── Report ────────────────────────────────────────────────────────────────
    let summaries: Vec<StrategyReport> = strategies
        .iter()
        .map(|s| StrategyReport {
            id: s.id().to_string(),
            summary: PerformanceSummary::from_metrics(&s.metrics(), risk_free_rate),
        })
        .collect();

    let mut ranking: Vec<(String, f64, &PerformanceSummary)> = strategies
        .iter()
        .zip(&summaries)
        .map(|(s, r)| (r.id.clone(), performance(s.as_ref()), &r.summary))
        .collect();
    ranking.sort_by(|a, b| b.1.total_cmp(&a.1));
    println!("{}", report::format_ranking(&ranking));

    match &best {
        Some(best) => {
            if let Some(r) = summaries.iter().find(|r| r.id == best.identifier) {
                println!("{}", report::format_summary(&r.id, &r.summary));
            }
        }
        None => warn!("No strategy produced a result"),
    }

    if let Some(path) = &cfg.report_json {
        let run_report = RunReport {
            symbol: &cfg.symbol,
            interval: cfg.interval,
            candles: series.len(),
            best: best.as_ref(),
            strategies: summaries,
        };
        report::write_json(path, &run_report)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "JSON report written");
    }

    // ── Trade history ─────────────────────────────────────────────────────────
    if let (Some(url), Some(best)) = (&cfg.database_url, &best) {
        persist_best(&cfg, &strategy_file, &strategies, best, url).await?;
    }

    Ok(())
}

async fn load_candles(cfg: &Config) -> anyhow::Result<Vec<RawCandle>> {
    if let Some(path) = &cfg.candles_csv {
        let rows = read_candles_csv(path)
            .with_context(|| format!("Failed to read candles from {}", path.display()))?;
        info!(path = %path.display(), rows = rows.len(), "Candles loaded from file");
        return Ok(rows);
    }

    let start = cfg
        .start
        .context("START_DATE is required when CANDLES_CSV is not set")?;
    let source = CachedSource::new(BinanceKlines::new(&cfg.binance_base_url)?, &cfg.cache_dir);
    let rows = source
        .get_candles(&cfg.symbol, cfg.interval, start, cfg.end)
        .await
        .context("Failed to fetch candles")?;
    Ok(rows)
}

/// Write the best strategy's trades, plus its open position if any.
async fn persist_best(
    cfg: &Config,
    strategy_file: &StrategyFileConfig,
    strategies: &[Box<dyn Strategy>],
    best: &EvaluationResult,
    url: &str,
) -> anyhow::Result<()> {
    let store = TradeHistoryStore::connect(url)
        .await
        .context("Failed to open trade history")?;

    let quantity = strategy_file
        .strategies
        .iter()
        .find(|s| s.name == best.identifier)
        .map(|s| s.quantity)
        .unwrap_or(1.0);
    let meta = TradeMeta {
        run_id: TradeMeta::new_run_id(),
        symbol: cfg.symbol.clone(),
        timeframe: cfg.interval,
        setup: best.identifier.clone(),
        quantity,
    };

    let mut rows: Vec<TradeHistoryRow> = best
        .metrics
        .trades
        .iter()
        .map(|t| TradeHistoryRow::from_trade(&meta, t))
        .collect();
    if let Some(Position::Holding(open)) = strategies
        .iter()
        .find(|s| s.id() == best.identifier)
        .map(|s| s.position())
    {
        rows.push(TradeHistoryRow::from_open(&meta, &open));
    }

    let written = store.insert_all(&rows).await?;
    info!(run_id = %meta.run_id, rows = written, "Trades persisted");
    Ok(())
}
