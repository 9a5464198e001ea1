//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Persistence error: {0}")]
    Db(#[from] polyarb_db::DbError),

    #[error("Registry error: {0}")]
    Registry(#[from] polyarb_registry::RegistryError),

    #[error("Stream error: {0}")]
    Ws(#[from] polyarb_ws::WsError),

    #[error("Detector error: {0}")]
    Detector(#[from] polyarb_detector::DetectorError),

    #[error("Engine error: {0}")]
    Engine(#[from] polyarb_engine::EngineError),
}

pub type AppResult<T> = Result<T, AppError>;
