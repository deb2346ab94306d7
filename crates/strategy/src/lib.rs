pub mod config;
pub mod double_ema;
pub mod indicators;
pub mod position;
pub mod registry;
pub mod series;
pub mod signals;

pub use config::{BacktestSettings, RankBy, StrategyConfig, StrategyFileConfig};
pub use double_ema::{DoubleEmaBreakout, DoubleEmaParams};
pub use position::Position;
pub use registry::{build_strategies, build_strategy};
pub use series::CandleSeries;

use common::{Candle, OpenTrade, Result, TradeRecord};
use performance::StrategyMetrics;

/// What a strategy sees at one step of the walk.
#[derive(Debug, Clone, Copy)]
pub struct CandleContext<'a> {
    /// Index of `current` in `series`.
    pub index: usize,
    pub current: &'a Candle,
    /// The last closed candle before `current`.
    pub previous: &'a Candle,
    pub series: &'a CandleSeries,
}

/// State change produced by one call to [`Strategy::process_candle`].
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyEvent {
    Entered(OpenTrade),
    Exited(TradeRecord),
}

/// All strategy implementations must satisfy this trait.
///
/// A strategy owns its balance, position and trade log. The series it reads
/// is shared and never mutated.
pub trait Strategy: Send + Sync {
    /// Identifier used in logs and to pick the best result.
    fn id(&self) -> &str;

    /// EMA spans that must be attached to the series before the walk.
    fn indicator_spans(&self) -> Vec<usize>;

    /// Number of candles needed before the first decision can be made.
    fn warmup(&self) -> usize;

    /// Advance by one candle. `Ok(None)` means there was nothing to do.
    fn process_candle(&mut self, ctx: &CandleContext<'_>) -> Result<Option<StrategyEvent>>;

    fn current_balance(&self) -> f64;

    fn position(&self) -> Position;

    fn metrics(&self) -> StrategyMetrics;
}
