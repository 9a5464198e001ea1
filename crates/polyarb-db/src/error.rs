//! Persistence error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Schema verification failed, missing tables: {0:?}")]
    SchemaMissing(Vec<String>),

    #[error("Row decode error: {0}")]
    Decode(#[from] polyarb_core::CoreError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type DbResult<T> = Result<T, DbError>;
