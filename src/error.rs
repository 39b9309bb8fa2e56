use std::io;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum StarbusError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Relay error: {0}")]
    Relay(String),

    #[error("Lock store error: {0}")]
    LockStore(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, StarbusError>;

impl StarbusError {
    pub fn transport(msg: impl Into<String>) -> Self {
        StarbusError::Transport(msg.into())
    }

    pub fn relay(msg: impl Into<String>) -> Self {
        StarbusError::Relay(msg.into())
    }

    pub fn lock_store(msg: impl Into<String>) -> Self {
        StarbusError::LockStore(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        StarbusError::Config(msg.into())
    }
}

impl From<io::Error> for StarbusError {
    fn from(e: io::Error) -> Self {
        StarbusError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StarbusError {
    fn from(e: serde_json::Error) -> Self {
        StarbusError::Json(e.to_string())
    }
}

impl From<serde_yaml::Error> for StarbusError {
    fn from(e: serde_yaml::Error) -> Self {
        StarbusError::Config(format!("YAML error: {}", e))
    }
}
