pub mod bucket;
pub mod drawdown;
pub mod ledger;
pub mod summary;

pub use bucket::{MonthKey, MonthlyBucket};
pub use drawdown::DrawdownTracker;
pub use ledger::{Ledger, StrategyMetrics};
pub use summary::{sharpe_ratio, MonthSummary, PerformanceSummary, PeriodStats, YearSummary};
