use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Interval, RawCandle, Result};

/// Pull contract for historical candles.
///
/// `BinanceKlines` implements this against the exchange REST API.
/// `CachedSource` wraps any implementation with a CSV file cache.
/// Network failures surface as `Error::Exchange` or `Error::Http`.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Candles with `start <= open_time < end`, oldest first.
    async fn get_candles(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawCandle>>;
}
