use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use common::{Interval, MarketDataSource, RawCandle, Result};

/// Serves candles from CSV files in `dir`, falling back to `inner` on a miss
/// and writing what it fetched.
pub struct CachedSource<S> {
    inner: S,
    dir: PathBuf,
}

impl<S> CachedSource<S> {
    pub fn new(inner: S, dir: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            dir: dir.into(),
        }
    }

    /// `{symbol}_{interval}_{start}_{end}.csv` inside the cache directory.
    pub fn cache_path(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PathBuf {
        self.dir.join(format!(
            "{symbol}_{interval}_{}_{}.csv",
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        ))
    }
}

#[async_trait]
impl<S: MarketDataSource> MarketDataSource for CachedSource<S> {
    async fn get_candles(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawCandle>> {
        let path = self.cache_path(symbol, interval, start, end);
        if path.exists() {
            match read_candles_csv(&path) {
                Ok(rows) => {
                    info!(path = %path.display(), rows = rows.len(), "Candles loaded from cache");
                    return Ok(rows);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring unreadable cache file");
                }
            }
        }

        let rows = self.inner.get_candles(symbol, interval, start, end).await?;
        std::fs::create_dir_all(&self.dir)?;
        write_candles_csv(&path, &rows)?;
        info!(path = %path.display(), rows = rows.len(), "Candles cached");
        Ok(rows)
    }
}

/// Read rows written by [`write_candles_csv`] (or any CSV with the same
/// header: `open_time,open,high,low,close,volume,close_time`).
pub fn read_candles_csv(path: impl AsRef<Path>) -> Result<Vec<RawCandle>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

pub fn write_candles_csv(path: impl AsRef<Path>, rows: &[RawCandle]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
