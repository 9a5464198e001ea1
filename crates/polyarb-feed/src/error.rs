//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Engine error: {0}")]
    Engine(#[from] polyarb_engine::EngineError),
}

pub type FeedResult<T> = Result<T, FeedError>;
