use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One OHLCV bar. Prices are validated on construction through
/// [`RawCandle::parse`] or [`Candle::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: Option<DateTime<Utc>>,
}

impl Candle {
    /// Check that every price is finite and non-negative and that
    /// `low <= open, close <= high`. `row` is only used for the error message.
    pub fn validate(&self, row: usize) -> Result<()> {
        for (name, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ] {
            if !value.is_finite() {
                return Err(Error::data(row, format!("{name} is not a finite number")));
            }
            if value < 0.0 {
                return Err(Error::data(row, format!("{name} is negative ({value})")));
            }
        }

        if self.low > self.high {
            return Err(Error::data(
                row,
                format!("low {} above high {}", self.low, self.high),
            ));
        }
        for (name, value) in [("open", self.open), ("close", self.close)] {
            if value < self.low || value > self.high {
                return Err(Error::data(
                    row,
                    format!("{name} {value} outside [{}, {}]", self.low, self.high),
                ));
            }
        }
        Ok(())
    }
}

/// A candle row as delivered by a data source: millisecond timestamps and
/// prices still in their textual form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCandle {
    pub open_time: i64,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
    pub close_time: Option<i64>,
}

impl RawCandle {
    /// Parse into a validated [`Candle`].
    pub fn parse(&self, row: usize) -> Result<Candle> {
        let candle = Candle {
            open_time: millis_to_utc(self.open_time)
                .ok_or_else(|| Error::data(row, format!("bad open_time {}", self.open_time)))?,
            open: parse_price(&self.open, "open", row)?,
            high: parse_price(&self.high, "high", row)?,
            low: parse_price(&self.low, "low", row)?,
            close: parse_price(&self.close, "close", row)?,
            volume: parse_price(&self.volume, "volume", row)?,
            close_time: match self.close_time {
                Some(ms) => Some(
                    millis_to_utc(ms)
                        .ok_or_else(|| Error::data(row, format!("bad close_time {ms}")))?,
                ),
                None => None,
            },
        };
        candle.validate(row)?;
        Ok(candle)
    }
}

impl From<&Candle> for RawCandle {
    fn from(c: &Candle) -> Self {
        Self {
            open_time: c.open_time.timestamp_millis(),
            open: c.open.to_string(),
            high: c.high.to_string(),
            low: c.low.to_string(),
            close: c.close.to_string(),
            volume: c.volume.to_string(),
            close_time: c.close_time.map(|t| t.timestamp_millis()),
        }
    }
}

fn parse_price(raw: &str, field: &str, row: usize) -> Result<f64> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| Error::data(row, format!("{field} is not a number: '{raw}'")))?;
    if !value.is_finite() {
        return Err(Error::data(row, format!("{field} is not a finite number")));
    }
    Ok(value)
}

pub fn millis_to_utc(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

/// Candle interval, named the way exchanges name them ("15m", "1h", ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "3m")]
    M3,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "2h")]
    H2,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "6h")]
    H6,
    #[serde(rename = "12h")]
    H12,
    #[serde(rename = "1d")]
    D1,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::M1 => "1m",
            Interval::M3 => "3m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1h",
            Interval::H2 => "2h",
            Interval::H4 => "4h",
            Interval::H6 => "6h",
            Interval::H12 => "12h",
            Interval::D1 => "1d",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Interval::M1 => Duration::minutes(1),
            Interval::M3 => Duration::minutes(3),
            Interval::M5 => Duration::minutes(5),
            Interval::M15 => Duration::minutes(15),
            Interval::M30 => Duration::minutes(30),
            Interval::H1 => Duration::hours(1),
            Interval::H2 => Duration::hours(2),
            Interval::H4 => Duration::hours(4),
            Interval::H6 => Duration::hours(6),
            Interval::H12 => Duration::hours(12),
            Interval::D1 => Duration::days(1),
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let interval = match s.trim() {
            "1m" => Interval::M1,
            "3m" => Interval::M3,
            "5m" => Interval::M5,
            "15m" => Interval::M15,
            "30m" => Interval::M30,
            "1h" => Interval::H1,
            "2h" => Interval::H2,
            "4h" => Interval::H4,
            "6h" => Interval::H6,
            "12h" => Interval::H12,
            "1d" => Interval::D1,
            other => return Err(Error::Config(format!("unknown interval '{other}'"))),
        };
        Ok(interval)
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    StopGain,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "StopLoss"),
            ExitReason::StopGain => write!(f, "StopGain"),
        }
    }
}

impl FromStr for ExitReason {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "StopLoss" => Ok(ExitReason::StopLoss),
            "StopGain" => Ok(ExitReason::StopGain),
            other => Err(Error::Other(format!("unknown exit reason '{other}'"))),
        }
    }
}

/// The levels of a position that is currently held.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpenTrade {
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub stop_gain: f64,
}

impl OpenTrade {
    /// Distance to the stop-loss as a percentage of the entry price.
    pub fn potential_loss_pct(&self) -> f64 {
        (self.entry_price - self.stop_loss) / self.entry_price * 100.0
    }

    /// Distance to the stop-gain as a percentage of the entry price.
    pub fn potential_gain_pct(&self) -> f64 {
        (self.stop_gain - self.entry_price) / self.entry_price * 100.0
    }
}

/// A completed round-trip. `outcome_pct` is net of the exit-side trading tax.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,
    pub stop_loss: f64,
    pub stop_gain: f64,
    pub outcome_pct: f64,
    pub exit_reason: ExitReason,
}

impl TradeRecord {
    pub fn is_win(&self) -> bool {
        self.exit_reason == ExitReason::StopGain
    }

    /// The levels the trade was opened with.
    pub fn opened(&self) -> OpenTrade {
        OpenTrade {
            entry_time: self.open_time,
            entry_price: self.entry_price,
            stop_loss: self.stop_loss,
            stop_gain: self.stop_gain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(open: &str, high: &str, low: &str, close: &str, volume: &str) -> RawCandle {
        RawCandle {
            open_time: 1_700_000_000_000,
            open: open.into(),
            high: high.into(),
            low: low.into(),
            close: close.into(),
            volume: volume.into(),
            close_time: Some(1_700_000_899_999),
        }
    }

    #[test]
    fn parses_valid_row() {
        let candle = raw("100.5", "101", "99.5", "100", "12.5").parse(0).unwrap();
        assert_eq!(candle.high, 101.0);
        assert_eq!(candle.open_time.timestamp_millis(), 1_700_000_000_000);
        assert!(candle.close_time.is_some());
    }

    #[test]
    fn rejects_unparseable_close() {
        let err = raw("100", "101", "99", "abc", "1").parse(7).unwrap_err();
        assert!(matches!(err, Error::Data { row: 7, .. }), "got {err:?}");
    }

    #[test]
    fn rejects_non_finite_volume() {
        let err = raw("100", "101", "99", "100", "NaN").parse(0).unwrap_err();
        assert!(matches!(err, Error::Data { .. }));
    }

    #[test]
    fn rejects_close_above_high() {
        let err = raw("100", "101", "99", "102", "1").parse(0).unwrap_err();
        assert!(matches!(err, Error::Data { .. }));
    }

    #[test]
    fn interval_round_trips_through_str() {
        for s in ["1m", "15m", "4h", "1d"] {
            let interval: Interval = s.parse().unwrap();
            assert_eq!(interval.to_string(), s);
        }
        assert!("7m".parse::<Interval>().is_err());
        assert_eq!(Interval::M15.duration(), Duration::minutes(15));
    }

    #[test]
    fn open_trade_potentials() {
        let t = OpenTrade {
            entry_time: Utc::now(),
            entry_price: 100.0,
            stop_loss: 95.0,
            stop_gain: 117.5,
        };
        assert!((t.potential_loss_pct() - 5.0).abs() < 1e-9);
        assert!((t.potential_gain_pct() - 17.5).abs() < 1e-9);
    }
}
