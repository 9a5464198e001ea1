//! Error types for polyarb-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid outcome: {0}")]
    InvalidOutcome(String),

    #[error("Invalid order side: {0}")]
    InvalidSide(String),

    #[error("Invalid order status: {0}")]
    InvalidStatus(String),

    #[error("Invalid opportunity type: {0}")]
    InvalidOpportunityKind(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
