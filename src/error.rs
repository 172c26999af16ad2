// ABOUTME: Application-wide error types for skopia.
// ABOUTME: Uses thiserror for ergonomic error handling with preserved rich types.

use std::path::PathBuf;
use thiserror::Error;

use crate::engine::error::EngineError;
use crate::runtime::ContainerError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON encode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot connect to container runtime: {0}")]
    RuntimeConnection(ContainerError),

    #[error("update cycle failed: {0}")]
    Engine(#[from] EngineError),
}

impl Error {
    /// Returns the engine error if this is an `Engine` variant.
    pub fn as_engine_error(&self) -> Option<&EngineError> {
        match self {
            Error::Engine(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
