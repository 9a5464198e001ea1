//! Detector error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Persistence error: {0}")]
    Db(#[from] polyarb_db::DbError),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

pub type DetectorResult<T> = Result<T, DetectorError>;
