//! Error types shared across Strata crates.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StrataError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Notification delivery failed: {0}")]
    Notify(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Planning error: {0}")]
    Planning(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StrataError>;
