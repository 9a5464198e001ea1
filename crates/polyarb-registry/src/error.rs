//! Registry client error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Malformed catalog entry: {0}")]
    Malformed(String),

    #[error("Retries exhausted: {0}")]
    RetriesExhausted(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;
