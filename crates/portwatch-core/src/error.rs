//! Error types for PortWatch

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("permission denied: {0}")]
    Permission(String),

    #[error("external tool failed: {0}")]
    ExternalTool(String),

    #[error("external service failed: {0}")]
    ExternalService(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, Error>;
