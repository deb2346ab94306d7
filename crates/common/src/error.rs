use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed candle data. The whole batch is rejected, never patched.
    #[error("Data error at row {row}: {reason}")]
    Data { row: usize, reason: String },

    #[error("Insufficient history: {required} candles required, {available} available")]
    InsufficientHistory { required: usize, available: usize },

    #[error("Warm-up offset {start_cursor} is shorter than the {required} candles the strategies need")]
    WarmupTooShort { start_cursor: usize, required: usize },

    #[error("EMA({0}) was not computed for this series")]
    MissingIndicator(usize),

    #[error("Invalid position transition: {0}")]
    InvalidTransition(String),

    #[error("Exchange API error: {0}")]
    Exchange(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn data(row: usize, reason: impl Into<String>) -> Self {
        Error::Data {
            row,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
