use serde::Serialize;

use crate::bucket::{MonthKey, MonthlyBucket};
use crate::ledger::StrategyMetrics;

/// Roll-up of one or more monthly buckets.
///
/// Every ratio with a zero denominator is reported as `0.0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodStats {
    pub opened_trades: u32,
    pub successful_trades: u32,
    pub failed_trades: u32,
    pub gain_pct_sum: f64,
    pub loss_pct_sum: f64,
    pub avg_gain_pct: f64,
    pub avg_loss_pct: f64,
    pub win_rate_pct: f64,
    pub max_drawdown_pct: f64,
    pub opening_balance: f64,
    pub closing_balance: f64,
    pub return_pct: f64,
}

impl PeriodStats {
    /// Sum counters, take the worst drawdown, and span the balances from the
    /// first bucket's opening to the last bucket's closing. Buckets must be
    /// in chronological order. With no buckets the period is flat at
    /// `idle_balance`.
    pub fn from_buckets<'a, I>(buckets: I, idle_balance: f64) -> Self
    where
        I: IntoIterator<Item = &'a MonthlyBucket>,
    {
        let mut opened = 0;
        let mut successful = 0;
        let mut failed = 0;
        let mut gain_sum = 0.0;
        let mut loss_sum = 0.0;
        let mut max_dd: f64 = 0.0;
        let mut opening: Option<f64> = None;
        let mut closing = idle_balance;

        for b in buckets {
            opened += b.opened_trades;
            successful += b.successful_trades;
            failed += b.failed_trades;
            gain_sum += b.gain_pct_sum;
            loss_sum += b.loss_pct_sum;
            max_dd = max_dd.max(b.max_drawdown_pct);
            opening.get_or_insert(b.opening_balance);
            closing = b.closing_balance;
        }
        let opening = opening.unwrap_or(idle_balance);

        Self {
            opened_trades: opened,
            successful_trades: successful,
            failed_trades: failed,
            gain_pct_sum: gain_sum,
            loss_pct_sum: loss_sum,
            avg_gain_pct: ratio(gain_sum, successful as f64),
            avg_loss_pct: ratio(loss_sum, failed as f64),
            win_rate_pct: ratio(successful as f64, opened as f64) * 100.0,
            max_drawdown_pct: max_dd,
            opening_balance: opening,
            closing_balance: closing,
            return_pct: if opening == 0.0 {
                0.0
            } else {
                (closing / opening - 1.0) * 100.0
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthSummary {
    pub month: MonthKey,
    pub stats: PeriodStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearSummary {
    pub year: i32,
    pub stats: PeriodStats,
    pub months: Vec<MonthSummary>,
}

/// Everything the reporting side needs about one evaluated strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub starting_balance: f64,
    pub final_balance: f64,
    pub trade_count: usize,
    pub total: PeriodStats,
    pub years: Vec<YearSummary>,
    pub max_drawdown_pct: f64,
    pub sharpe_ratio: f64,
    pub profit_factor: f64,
    pub risk_free_rate: f64,
}

impl PerformanceSummary {
    pub fn from_metrics(metrics: &StrategyMetrics, risk_free_rate: f64) -> Self {
        let mut year_keys: Vec<i32> = metrics.monthly.keys().map(|k| k.year).collect();
        year_keys.dedup();

        let years = year_keys
            .into_iter()
            .map(|year| {
                let in_year = || {
                    metrics
                        .monthly
                        .range(MonthKey::new(year, 1)..=MonthKey::new(year, 12))
                };
                YearSummary {
                    year,
                    stats: PeriodStats::from_buckets(
                        in_year().map(|(_, b)| b),
                        metrics.starting_balance,
                    ),
                    months: in_year()
                        .map(|(key, b)| MonthSummary {
                            month: *key,
                            stats: PeriodStats::from_buckets([b], b.opening_balance),
                        })
                        .collect(),
                }
            })
            .collect();

        let total = PeriodStats::from_buckets(metrics.monthly.values(), metrics.starting_balance);

        let gross_gain: f64 = metrics.gains.iter().sum();
        let gross_loss: f64 = metrics.losses.iter().map(|l| l.abs()).sum();

        Self {
            starting_balance: metrics.starting_balance,
            final_balance: metrics.balance,
            trade_count: metrics.trades.len(),
            total,
            years,
            max_drawdown_pct: metrics.max_drawdown_pct,
            sharpe_ratio: sharpe_ratio(&metrics.trade_returns(), risk_free_rate),
            profit_factor: ratio(gross_gain, gross_loss),
            risk_free_rate,
        }
    }
}

/// `(mean(returns) - risk_free_rate) / stdev(returns)` with the population
/// standard deviation. Zero when there is no dispersion.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    if std == 0.0 || !std.is_finite() {
        return 0.0;
    }
    (mean - risk_free_rate) / std
}

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}
