use std::collections::BTreeMap;

use chrono::Duration;

use common::{Candle, Error, RawCandle, Result};

use crate::indicators::ema_series;

/// Time-ordered candles plus the EMA columns computed over their closes.
///
/// Built once and then shared read-only by every strategy.
#[derive(Debug, Clone)]
pub struct CandleSeries {
    candles: Vec<Candle>,
    emas: BTreeMap<usize, Vec<f64>>,
}

impl CandleSeries {
    /// Sort by `open_time` and validate every candle. Duplicate timestamps
    /// or a single malformed candle reject the whole batch.
    pub fn from_candles(mut candles: Vec<Candle>) -> Result<Self> {
        for (row, candle) in candles.iter().enumerate() {
            candle.validate(row)?;
        }
        candles.sort_by_key(|c| c.open_time);
        if let Some(pos) = candles
            .windows(2)
            .position(|w| w[0].open_time == w[1].open_time)
        {
            return Err(Error::data(
                pos + 1,
                format!("duplicate open_time {}", candles[pos].open_time),
            ));
        }
        Ok(Self {
            candles,
            emas: BTreeMap::new(),
        })
    }

    pub fn from_raw(rows: &[RawCandle]) -> Result<Self> {
        let candles = rows
            .iter()
            .enumerate()
            .map(|(row, raw)| raw.parse(row))
            .collect::<Result<Vec<_>>>()?;
        Self::from_candles(candles)
    }

    /// Attach the EMA column for `span`. A span already attached is left as is.
    /// A zero span is a config error.
    pub fn with_ema(mut self, span: usize) -> Result<Self> {
        if !self.emas.contains_key(&span) {
            let closes: Vec<f64> = self.candles.iter().map(|c| c.close).collect();
            self.emas.insert(span, ema_series(&closes, span)?);
        }
        Ok(self)
    }

    pub fn with_emas(self, spans: impl IntoIterator<Item = usize>) -> Result<Self> {
        spans.into_iter().try_fold(self, Self::with_ema)
    }

    pub fn ema(&self, span: usize) -> Result<&[f64]> {
        self.emas
            .get(&span)
            .map(Vec::as_slice)
            .ok_or(Error::MissingIndicator(span))
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.candles.get(index)
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    /// The `count` candles strictly before `end`, or `None` if there are not
    /// that many.
    pub fn window(&self, end: usize, count: usize) -> Option<&[Candle]> {
        let start = end.checked_sub(count)?;
        self.candles.get(start..end)
    }

    /// Reject the series if two consecutive candles are further apart than
    /// `max_gap`. Gaps within tolerance are kept as they are.
    pub fn ensure_max_gap(&self, max_gap: Duration) -> Result<()> {
        for (i, w) in self.candles.windows(2).enumerate() {
            let gap = w[1].open_time - w[0].open_time;
            if gap > max_gap {
                return Err(Error::data(
                    i + 1,
                    format!(
                        "gap of {} minutes after {} exceeds {} minutes",
                        gap.num_minutes(),
                        w[0].open_time,
                        max_gap.num_minutes()
                    ),
                ));
            }
        }
        Ok(())
    }
}
