pub mod binance;
pub mod cache;
pub mod history;

pub use binance::BinanceKlines;
pub use cache::{read_candles_csv, write_candles_csv, CachedSource};
pub use history::{TradeHistoryRow, TradeHistoryStore, TradeMeta};
