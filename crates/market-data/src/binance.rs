use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

use common::{Error, Interval, MarketDataSource, RawCandle, Result};

/// Largest page Binance serves on the klines endpoint.
pub const MAX_LIMIT: usize = 1000;

/// Public (unsigned) kline client for Binance spot.
pub struct BinanceKlines {
    base_url: String,
    http: Client,
    limit: usize,
}

impl BinanceKlines {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            limit: MAX_LIMIT,
        })
    }

    /// Page size, capped at [`MAX_LIMIT`].
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.clamp(1, MAX_LIMIT);
        self
    }

    async fn fetch_page(
        &self,
        symbol: &str,
        interval: Interval,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<RawCandle>> {
        let url = format!(
            "{}/api/v3/klines?symbol={symbol}&interval={interval}&startTime={start_ms}&endTime={end_ms}&limit={}",
            self.base_url, self.limit
        );
        debug!(%url, "Fetching klines");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {body}")));
        }
        parse_kline_rows(&body)
    }
}

#[async_trait]
impl MarketDataSource for BinanceKlines {
    async fn get_candles(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawCandle>> {
        let end_ms = end.timestamp_millis();
        let mut cursor = start.timestamp_millis();
        let mut rows = Vec::new();

        while cursor < end_ms {
            let page = self.fetch_page(symbol, interval, cursor, end_ms).await?;
            let Some(last) = page.last().map(|r| r.open_time) else {
                break;
            };
            let full = page.len() >= self.limit;
            rows.extend(page.into_iter().filter(|r| r.open_time < end_ms));
            if !full || last < cursor {
                break;
            }
            cursor = last + 1;
        }

        info!(%symbol, %interval, rows = rows.len(), "Klines downloaded");
        Ok(rows)
    }
}

/// Parse the klines array-of-arrays body. Prices stay textual; only the
/// open and close times are read as integers.
pub fn parse_kline_rows(body: &str) -> Result<Vec<RawCandle>> {
    let rows: Vec<Vec<Value>> =
        serde_json::from_str(body).map_err(|e| Error::Exchange(format!("bad klines body: {e}")))?;

    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            if row.len() < 7 {
                return Err(Error::data(i, format!("kline has {} fields, expected at least 7", row.len())));
            }
            let int = |idx: usize, name: &str| {
                row[idx]
                    .as_i64()
                    .ok_or_else(|| Error::data(i, format!("{name} is not an integer")))
            };
            let text = |idx: usize, name: &str| match &row[idx] {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                _ => Err(Error::data(i, format!("{name} is not a price"))),
            };
            Ok(RawCandle {
                open_time: int(0, "open_time")?,
                open: text(1, "open")?,
                high: text(2, "high")?,
                low: text(3, "low")?,
                close: text(4, "close")?,
                volume: text(5, "volume")?,
                close_time: Some(int(6, "close_time")?),
            })
        })
        .collect()
}
