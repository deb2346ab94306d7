use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Calendar month used to bucket results. Serializes as `"YYYY-MM"` so it
/// can key a JSON object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }
}

impl From<DateTime<Utc>> for MonthKey {
    fn from(t: DateTime<Utc>) -> Self {
        Self {
            year: t.year(),
            month: t.month(),
        }
    }
}

impl std::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| format!("expected YYYY-MM, got '{s}'"))?;
        let year = year.parse().map_err(|_| format!("bad year in '{s}'"))?;
        let month: u32 = month.parse().map_err(|_| format!("bad month in '{s}'"))?;
        if !(1..=12).contains(&month) {
            return Err(format!("month out of range in '{s}'"));
        }
        Ok(Self { year, month })
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Per-month counters and balance snapshots.
///
/// `gain_pct_sum` adds the net outcome of each stop-gain exit; `loss_pct_sum`
/// adds the magnitude (loss plus tax) of each stop-loss exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyBucket {
    pub opened_trades: u32,
    pub successful_trades: u32,
    pub failed_trades: u32,
    pub gain_pct_sum: f64,
    pub loss_pct_sum: f64,
    pub opening_balance: f64,
    pub closing_balance: f64,
    pub max_drawdown_pct: f64,
}

impl MonthlyBucket {
    /// A fresh bucket opened at `balance`.
    pub fn opened_at(balance: f64) -> Self {
        Self {
            opened_trades: 0,
            successful_trades: 0,
            failed_trades: 0,
            gain_pct_sum: 0.0,
            loss_pct_sum: 0.0,
            opening_balance: balance,
            closing_balance: balance,
            max_drawdown_pct: 0.0,
        }
    }

    pub fn observe_drawdown(&mut self, drawdown_pct: f64) {
        if drawdown_pct > self.max_drawdown_pct {
            self.max_drawdown_pct = drawdown_pct;
        }
    }
}
