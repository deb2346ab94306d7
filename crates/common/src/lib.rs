pub mod config;
pub mod error;
pub mod source;
pub mod types;

pub use config::{start_of_day, Config};
pub use error::{Error, Result};
pub use source::MarketDataSource;
pub use types::*;
