//! Domain error types.

use thiserror::Error;

/// Errors raised by the analysis pipeline and the user store.
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Model request failed: {message}")]
    ModelRequest { message: String },

    #[error("Model API error {status}: {body}")]
    ModelApi { status: u16, body: String },

    #[error("No response")]
    EmptyResponse,

    #[error("Schema validation failed: {message}")]
    Schema { message: String },

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("{message}")]
    Validation { message: String },

    #[error("{message}")]
    Conflict { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::Schema {
            message: err.to_string(),
        }
    }
}

impl From<rusqlite::Error> for ForecastError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                ForecastError::Conflict {
                    message: "User already exists".to_string(),
                }
            }
            other => ForecastError::Database {
                message: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;
