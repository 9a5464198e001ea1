//! Engine error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Persistence error: {0}")]
    Db(#[from] polyarb_db::DbError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
