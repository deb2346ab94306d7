use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::info;

use common::{Error, ExitReason, Interval, OpenTrade, Result, TradeRecord};

/// Values shared by every row of one run.
#[derive(Debug, Clone)]
pub struct TradeMeta {
    pub run_id: String,
    pub symbol: String,
    pub timeframe: Interval,
    /// Strategy identifier that produced the trade.
    pub setup: String,
    pub quantity: f64,
}

impl TradeMeta {
    /// Fresh random run identifier.
    pub fn new_run_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// One row of the `trade_history` table. The exit columns are `None` while
/// the trade is still open.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeHistoryRow {
    pub id: Option<i64>,
    pub run_id: String,
    /// Entry time.
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub quantity: f64,
    /// Level whose breakout triggered the entry.
    pub reference_high: f64,
    /// Lowest low of the stop-loss lookback.
    pub reference_low: f64,
    pub stop_loss: f64,
    pub stop_gain: f64,
    pub potential_loss_pct: f64,
    pub potential_gain_pct: f64,
    pub timeframe: Interval,
    pub setup: String,
    pub outcome_pct: Option<f64>,
    pub closed_at: Option<DateTime<Utc>>,
    pub exit_reason: Option<ExitReason>,
}

impl TradeHistoryRow {
    pub fn from_open(meta: &TradeMeta, trade: &OpenTrade) -> Self {
        Self {
            id: None,
            run_id: meta.run_id.clone(),
            timestamp: trade.entry_time,
            symbol: meta.symbol.clone(),
            entry_price: trade.entry_price,
            exit_price: None,
            quantity: meta.quantity,
            reference_high: trade.entry_price,
            reference_low: trade.stop_loss,
            stop_loss: trade.stop_loss,
            stop_gain: trade.stop_gain,
            potential_loss_pct: trade.potential_loss_pct(),
            potential_gain_pct: trade.potential_gain_pct(),
            timeframe: meta.timeframe,
            setup: meta.setup.clone(),
            outcome_pct: None,
            closed_at: None,
            exit_reason: None,
        }
    }

    pub fn from_trade(meta: &TradeMeta, trade: &TradeRecord) -> Self {
        Self {
            exit_price: Some(trade.exit_price),
            outcome_pct: Some(trade.outcome_pct),
            closed_at: Some(trade.close_time),
            exit_reason: Some(trade.exit_reason),
            ..Self::from_open(meta, &trade.opened())
        }
    }

    pub fn is_open(&self) -> bool {
        self.exit_reason.is_none()
    }

    /// Levels needed to resume the position.
    pub fn to_open_trade(&self) -> OpenTrade {
        OpenTrade {
            entry_time: self.timestamp,
            entry_price: self.entry_price,
            stop_loss: self.stop_loss,
            stop_gain: self.stop_gain,
        }
    }

    /// The completed trade, or `None` for an open row.
    pub fn to_trade_record(&self) -> Option<TradeRecord> {
        Some(TradeRecord {
            open_time: self.timestamp,
            close_time: self.closed_at?,
            entry_price: self.entry_price,
            exit_price: self.exit_price?,
            stop_loss: self.stop_loss,
            stop_gain: self.stop_gain,
            outcome_pct: self.outcome_pct?,
            exit_reason: self.exit_reason?,
        })
    }

    fn from_row(row: &SqliteRow) -> Result<Self> {
        let exit_reason: Option<String> = row.try_get("exit_reason")?;
        let closed_at: Option<String> = row.try_get("closed_at")?;
        let timeframe: String = row.try_get("timeframe")?;
        Ok(Self {
            id: Some(row.try_get("id")?),
            run_id: row.try_get("run_id")?,
            timestamp: parse_time(&row.try_get::<String, _>("timestamp")?)?,
            symbol: row.try_get("symbol")?,
            entry_price: row.try_get("entry_price")?,
            exit_price: row.try_get("exit_price")?,
            quantity: row.try_get("quantity")?,
            reference_high: row.try_get("reference_high")?,
            reference_low: row.try_get("reference_low")?,
            stop_loss: row.try_get("stop_loss")?,
            stop_gain: row.try_get("stop_gain")?,
            potential_loss_pct: row.try_get("potential_loss_pct")?,
            potential_gain_pct: row.try_get("potential_gain_pct")?,
            timeframe: timeframe.parse()?,
            setup: row.try_get("setup")?,
            outcome_pct: row.try_get("outcome_pct")?,
            closed_at: closed_at.as_deref().map(parse_time).transpose()?,
            exit_reason: exit_reason.as_deref().map(ExitReason::from_str).transpose()?,
        })
    }
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Other(format!("bad timestamp '{s}' in trade_history: {e}")))
}

const INSERT_ROW: &str = r#"
    INSERT INTO trade_history (
        run_id, timestamp, symbol, entry_price, exit_price, quantity,
        reference_high, reference_low, stop_loss, stop_gain,
        potential_loss_pct, potential_gain_pct, timeframe, setup,
        outcome_pct, closed_at, exit_reason
    )
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
"#;

/// SQLite-backed trade history.
#[derive(Clone)]
pub struct TradeHistoryStore {
    pool: SqlitePool,
}

impl TradeHistoryStore {
    /// Open (creating if needed) the database at `url` and apply migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .map_err(|e| Error::Other(format!("Database migration failed: {e}")))?;
        info!("Trade history ready");
        Ok(Self { pool })
    }

    pub async fn insert(&self, row: &TradeHistoryRow) -> Result<i64> {
        let id = bind_row(sqlx::query(INSERT_ROW), row)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        Ok(id)
    }

    /// Insert every row in one transaction.
    pub async fn insert_all(&self, rows: &[TradeHistoryRow]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            bind_row(sqlx::query(INSERT_ROW), row)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(rows.len())
    }

    pub async fn list_run(&self, run_id: &str) -> Result<Vec<TradeHistoryRow>> {
        let rows = sqlx::query("SELECT * FROM trade_history WHERE run_id = ?1 ORDER BY id")
            .bind(run_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(TradeHistoryRow::from_row).collect()
    }

    /// Most recent open trade of `setup` on `symbol`, if any.
    pub async fn last_open(&self, symbol: &str, setup: &str) -> Result<Option<TradeHistoryRow>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM trade_history
            WHERE symbol = ?1 AND setup = ?2 AND exit_reason IS NULL
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(symbol)
        .bind(setup)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(TradeHistoryRow::from_row).transpose()
    }
}

fn bind_row<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    row: &TradeHistoryRow,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(row.run_id.clone())
        .bind(row.timestamp.to_rfc3339())
        .bind(row.symbol.clone())
        .bind(row.entry_price)
        .bind(row.exit_price)
        .bind(row.quantity)
        .bind(row.reference_high)
        .bind(row.reference_low)
        .bind(row.stop_loss)
        .bind(row.stop_gain)
        .bind(row.potential_loss_pct)
        .bind(row.potential_gain_pct)
        .bind(row.timeframe.to_string())
        .bind(row.setup.clone())
        .bind(row.outcome_pct)
        .bind(row.closed_at.map(|t| t.to_rfc3339()))
        .bind(row.exit_reason.map(|r| r.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    async fn memory_store() -> TradeHistoryStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        TradeHistoryStore::from_pool(pool).await.unwrap()
    }

    fn meta(run_id: &str) -> TradeMeta {
        TradeMeta {
            run_id: run_id.into(),
            symbol: "BTCUSDT".into(),
            timeframe: Interval::M15,
            setup: "ema 9/21".into(),
            quantity: 0.5,
        }
    }

    fn record() -> TradeRecord {
        let open_time = Utc.with_ymd_and_hms(2023, 8, 11, 14, 15, 0).unwrap();
        TradeRecord {
            open_time,
            close_time: open_time + Duration::hours(5),
            entry_price: 100.0,
            exit_price: 117.5,
            stop_loss: 95.0,
            stop_gain: 117.5,
            outcome_pct: 17.45,
            exit_reason: ExitReason::StopGain,
        }
    }

    #[test]
    fn closed_row_keeps_the_trade() {
        let row = TradeHistoryRow::from_trade(&meta("r"), &record());
        assert!(!row.is_open());
        assert_eq!(row.to_trade_record(), Some(record()));
        assert!((row.potential_loss_pct - 5.0).abs() < 1e-12);
        assert!((row.potential_gain_pct - 17.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn insert_and_list_round_trip() {
        let store = memory_store().await;
        let row = TradeHistoryRow::from_trade(&meta("run-1"), &record());
        let id = store.insert(&row).await.unwrap();

        let rows = store.list_run("run-1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, Some(id));
        assert_eq!(rows[0].to_trade_record(), Some(record()));
        assert_eq!(rows[0].timeframe, Interval::M15);
        assert!(store.list_run("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn open_row_resumes_position() {
        let store = memory_store().await;
        let closed = TradeHistoryRow::from_trade(&meta("run-2"), &record());
        let open = TradeHistoryRow::from_open(
            &meta("run-2"),
            &OpenTrade {
                entry_time: Utc.with_ymd_and_hms(2023, 8, 12, 9, 0, 0).unwrap(),
                entry_price: 120.0,
                stop_loss: 114.0,
                stop_gain: 141.0,
            },
        );
        assert_eq!(store.insert_all(&[closed, open.clone()]).await.unwrap(), 2);

        let last = store.last_open("BTCUSDT", "ema 9/21").await.unwrap().unwrap();
        assert!(last.is_open());
        assert_eq!(last.to_trade_record(), None);
        assert_eq!(last.to_open_trade(), open.to_open_trade());
        assert!(store.last_open("ETHUSDT", "ema 9/21").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn single_and_batch_inserts_store_the_same_columns() {
        let store = memory_store().await;
        let row = TradeHistoryRow::from_trade(&meta("run-3"), &record());
        store.insert(&row).await.unwrap();
        store.insert_all(std::slice::from_ref(&row)).await.unwrap();

        let mut rows = store.list_run("run-3").await.unwrap();
        assert_eq!(rows.len(), 2);
        for r in &mut rows {
            r.id = None;
        }
        assert_eq!(rows[0], rows[1]);
    }
}
