//! Validator orchestrator: wires the persistence layer, streaming
//! client, hot cache, engines and detector; owns the periodic tasks and
//! graceful shutdown.

pub mod app;
pub mod commands;
pub mod config;
pub mod dashboard;
pub mod error;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
