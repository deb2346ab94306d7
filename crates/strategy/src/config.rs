use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use common::{Error, Result};
use performance::{sharpe_ratio, StrategyMetrics};

/// Top-level strategy config file (TOML).
///
/// Example `config/strategies.toml`:
/// ```toml
/// [backtest]
/// starting_balance = 1000.0
/// trading_tax = 0.05
/// start_cursor = 21
///
/// [[strategy]]
/// type = "double_ema_breakout"
/// name = "ema 9/21 stop 14 ratio 3.5"
///
/// [strategy.params]
/// short = 9
/// long = 21
/// stop_candles = 14
/// ratio = 3.5
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyFileConfig {
    pub backtest: BacktestSettings,
    #[serde(rename = "strategy")]
    pub strategies: Vec<StrategyConfig>,
}

/// Settings shared by every strategy in one run.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BacktestSettings {
    #[serde(default = "default_starting_balance")]
    pub starting_balance: f64,
    /// Percent charged per side.
    #[serde(default)]
    pub trading_tax: f64,
    /// First candle index on which trading logic runs. Must cover the
    /// longest EMA span and the stop-loss lookback.
    pub start_cursor: usize,
    #[serde(default)]
    pub risk_free_rate: f64,
    #[serde(default)]
    pub rank_by: RankBy,
    /// Evaluate strategies on worker threads.
    #[serde(default)]
    pub parallel: bool,
    /// Largest gap allowed between consecutive candles.
    #[serde(default)]
    pub max_gap_minutes: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    /// Strategy type identifier. Only "double_ema_breakout" is known.
    #[serde(rename = "type")]
    pub strategy_type: String,
    /// Unique name, used as the strategy identifier.
    pub name: String,
    /// Position size written to the trade history.
    #[serde(default = "default_quantity")]
    pub quantity: f64,
    /// Strategy-specific parameters.
    #[serde(default)]
    pub params: HashMap<String, toml::Value>,
}

/// How the best strategy of a run is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankBy {
    /// Final balance minus starting balance.
    #[default]
    Profit,
    FinalBalance,
    Sharpe,
}

impl RankBy {
    pub fn score(&self, metrics: &StrategyMetrics, risk_free_rate: f64) -> f64 {
        match self {
            RankBy::Profit => metrics.balance - metrics.starting_balance,
            RankBy::FinalBalance => metrics.balance,
            RankBy::Sharpe => sharpe_ratio(&metrics.trade_returns(), risk_free_rate),
        }
    }
}

impl StrategyFileConfig {
    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read strategy config at '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse strategy config at '{}': {e}",
                path.display()
            ))
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        if cfg.strategies.is_empty() {
            return Err(Error::Config("no [[strategy]] entries".into()));
        }
        Ok(cfg)
    }
}

fn default_starting_balance() -> f64 {
    1000.0
}

fn default_quantity() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[backtest]
trading_tax = 0.05
start_cursor = 21
rank_by = "sharpe"

[[strategy]]
type = "double_ema_breakout"
name = "fast"

[strategy.params]
short = 9
long = 21
stop_candles = 14
ratio = 3.5

[[strategy]]
type = "double_ema_breakout"
name = "slow"
quantity = 0.01
"#;

    #[test]
    fn parses_sample_with_defaults() {
        let cfg = StrategyFileConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.backtest.starting_balance, 1000.0);
        assert_eq!(cfg.backtest.start_cursor, 21);
        assert_eq!(cfg.backtest.rank_by, RankBy::Sharpe);
        assert!(!cfg.backtest.parallel);
        assert_eq!(cfg.backtest.max_gap_minutes, None);
        assert_eq!(cfg.strategies.len(), 2);
        assert_eq!(cfg.strategies[0].quantity, 1.0);
        assert_eq!(cfg.strategies[1].quantity, 0.01);
        assert!(cfg.strategies[1].params.is_empty());
    }

    #[test]
    fn start_cursor_is_required() {
        let err = StrategyFileConfig::from_toml_str(
            "[backtest]\n[[strategy]]\ntype = \"double_ema_breakout\"\nname = \"a\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = StrategyFileConfig::load(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strategies.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        assert_eq!(StrategyFileConfig::load(&path).unwrap().strategies.len(), 2);
    }
}
