use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::{Error, Interval, Result};

/// Runtime configuration loaded from environment variables.
/// Strategy parameters live in the TOML file at `strategy_config_path`.
#[derive(Debug, Clone)]
pub struct Config {
    // Market data
    pub symbol: String,
    pub interval: Interval,
    pub start: Option<DateTime<Utc>>,
    pub end: DateTime<Utc>,
    /// When set, candles are read from this file and no source is queried.
    pub candles_csv: Option<PathBuf>,
    pub cache_dir: PathBuf,
    pub binance_base_url: String,

    // Strategy config file path
    pub strategy_config_path: PathBuf,

    // Outputs
    pub database_url: Option<String>,
    pub report_json: Option<PathBuf>,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let interval = optional_env("INTERVAL")
            .map(|v| v.parse::<Interval>())
            .transpose()?
            .unwrap_or(Interval::M15);

        let candles_csv = optional_env("CANDLES_CSV").map(PathBuf::from);

        let start = optional_env("START_DATE")
            .map(|v| parse_date("START_DATE", &v))
            .transpose()?;
        if start.is_none() && candles_csv.is_none() {
            return Err(Error::Config(
                "START_DATE is required when CANDLES_CSV is not set".into(),
            ));
        }

        let end = match optional_env("END_DATE") {
            Some(v) => parse_date("END_DATE", &v)?,
            // Candle cache keys carry the date only
            None => start_of_day(Utc::now()),
        };
        if let Some(start) = start {
            if start >= end {
                return Err(Error::Config(format!(
                    "START_DATE {start} must be before END_DATE {end}"
                )));
            }
        }

        Ok(Config {
            symbol: optional_env("SYMBOL").unwrap_or_else(|| "BTCUSDT".to_string()),
            interval,
            start,
            end,
            candles_csv,
            cache_dir: optional_env("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/candles")),
            binance_base_url: optional_env("BINANCE_BASE_URL")
                .unwrap_or_else(|| "https://api.binance.com".to_string()),
            strategy_config_path: optional_env("STRATEGY_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config/strategies.toml")),
            database_url: optional_env("DATABASE_URL"),
            report_json: optional_env("REPORT_JSON").map(PathBuf::from),
        })
    }
}

/// Parse a `YYYY-MM-DD` date as midnight UTC.
pub fn parse_date(key: &str, value: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| {
        Error::Config(format!("{key} must be YYYY-MM-DD, got '{value}': {e}"))
    })?;
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| Error::Config(format!("{key} is out of range: '{value}'")))
}

/// Midnight UTC of the day `t` falls on.
pub fn start_of_day(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive().and_time(NaiveTime::MIN).and_utc()
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
