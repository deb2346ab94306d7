use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;

use common::Interval;
use evaluator::EvaluationResult;
use performance::{PerformanceSummary, PeriodStats};

/// Everything written to `REPORT_JSON`.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub symbol: &'a str,
    pub interval: Interval,
    pub candles: usize,
    pub best: Option<&'a EvaluationResult>,
    pub strategies: Vec<StrategyReport>,
}

#[derive(Debug, Serialize)]
pub struct StrategyReport {
    pub id: String,
    pub summary: PerformanceSummary,
}

pub fn write_json(path: &Path, report: &RunReport<'_>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}

const HEADER: &str = "period      opened  won   gain%  avg gain  lost   loss%  avg loss  max dd%  return%      opening      closing";

fn stats_line(out: &mut String, label: &str, s: &PeriodStats) {
    let _ = writeln!(
        out,
        "{label:<10} {:>7} {:>4} {:>7.2} {:>9.2} {:>5} {:>7.2} {:>9.2} {:>8.2} {:>8.2} {:>12.2} {:>12.2}",
        s.opened_trades,
        s.successful_trades,
        s.gain_pct_sum,
        s.avg_gain_pct,
        s.failed_trades,
        s.loss_pct_sum,
        s.avg_loss_pct,
        s.max_drawdown_pct,
        s.return_pct,
        s.opening_balance,
        s.closing_balance,
    );
}

/// Year/month table followed by the totals.
pub fn format_summary(id: &str, summary: &PerformanceSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== {id} ===");
    let _ = writeln!(out, "{HEADER}");
    for year in &summary.years {
        stats_line(&mut out, &year.year.to_string(), &year.stats);
        for month in &year.months {
            stats_line(&mut out, &format!("  {}", month.month), &month.stats);
        }
    }
    stats_line(&mut out, "total", &summary.total);
    let _ = writeln!(
        out,
        "trades {}  win rate {:.2}%  sharpe {:.4}  profit factor {:.4}  max drawdown {:.2}%  balance {:.2} -> {:.2}",
        summary.trade_count,
        summary.total.win_rate_pct,
        summary.sharpe_ratio,
        summary.profit_factor,
        summary.max_drawdown_pct,
        summary.starting_balance,
        summary.final_balance,
    );
    out
}

/// One line per strategy, best first.
pub fn format_ranking(rows: &[(String, f64, &PerformanceSummary)]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<40} {:>12} {:>8} {:>10} {:>10}", "strategy", "score", "trades", "win rate%", "balance");
    for (id, score, s) in rows {
        let _ = writeln!(
            out,
            "{id:<40} {score:>12.4} {:>8} {:>10.2} {:>10.2}",
            s.trade_count, s.total.win_rate_pct, s.final_balance
        );
    }
    out
}
