//! Error types shared by sources and ingestion

use thiserror::Error;

/// Errors raised while fetching a race payload from a source
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP {status}: {reason}")]
    Http { status: u16, reason: String },

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Race not found: {0}")]
    NotFound(String),

    #[error("Payload is not valid UTF-8")]
    Encoding,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while turning payload text into `RaceData`
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Malformed race data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frames out of order at index {index}: t={current} after t={previous}")]
    OutOfOrder {
        index: usize,
        previous: f64,
        current: f64,
    },
}
