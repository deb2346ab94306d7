use std::collections::{HashMap, HashSet};

use tracing::info;

use common::{Error, Result};

use crate::config::{BacktestSettings, StrategyConfig, StrategyFileConfig};
use crate::double_ema::{DoubleEmaBreakout, DoubleEmaParams};
use crate::Strategy;

/// Build every strategy listed in the config file. Names must be unique.
pub fn build_strategies(file_cfg: &StrategyFileConfig) -> Result<Vec<Box<dyn Strategy>>> {
    let mut seen = HashSet::new();
    let mut strategies = Vec::with_capacity(file_cfg.strategies.len());

    for cfg in &file_cfg.strategies {
        if !seen.insert(cfg.name.as_str()) {
            return Err(Error::Config(format!("duplicate strategy name '{}'", cfg.name)));
        }
        let strategy = build_strategy(cfg, &file_cfg.backtest)?;
        info!(
            name = %strategy.id(),
            warmup = strategy.warmup(),
            "Registered strategy"
        );
        strategies.push(strategy);
    }
    Ok(strategies)
}

pub fn build_strategy(cfg: &StrategyConfig, settings: &BacktestSettings) -> Result<Box<dyn Strategy>> {
    match cfg.strategy_type.as_str() {
        "double_ema_breakout" => {
            let params = double_ema_params(&cfg.params, settings)?;
            Ok(Box::new(DoubleEmaBreakout::new(
                cfg.name.clone(),
                params,
                settings.starting_balance,
            )?))
        }
        other => Err(Error::Config(format!(
            "Unknown strategy type '{other}' for '{}'",
            cfg.name
        ))),
    }
}

pub fn double_ema_params(
    params: &HashMap<String, toml::Value>,
    settings: &BacktestSettings,
) -> Result<DoubleEmaParams> {
    let defaults = DoubleEmaParams::default();
    Ok(DoubleEmaParams {
        short_span: param_usize(params, "short", defaults.short_span)?,
        long_span: param_usize(params, "long", defaults.long_span)?,
        stop_candles: param_usize(params, "stop_candles", defaults.stop_candles)?,
        ratio: param_f64(params, "ratio", defaults.ratio)?,
        trading_tax: settings.trading_tax,
    })
}

fn param_f64(params: &HashMap<String, toml::Value>, key: &str, default: f64) -> Result<f64> {
    match params.get(key) {
        None => Ok(default),
        Some(toml::Value::Float(v)) => Ok(*v),
        Some(toml::Value::Integer(v)) => Ok(*v as f64),
        Some(other) => Err(Error::Config(format!("param '{key}' must be a number, got {other}"))),
    }
}

fn param_usize(params: &HashMap<String, toml::Value>, key: &str, default: usize) -> Result<usize> {
    match params.get(key) {
        None => Ok(default),
        Some(toml::Value::Integer(v)) => usize::try_from(*v)
            .map_err(|_| Error::Config(format!("param '{key}' must be non-negative, got {v}"))),
        Some(other) => Err(Error::Config(format!("param '{key}' must be an integer, got {other}"))),
    }
}
