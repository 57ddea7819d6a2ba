// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskdockError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Cycle detected in container dependencies: {0}")]
    DependencyCycle(String),

    #[error("Dependency resolution failed: {0}")]
    Dependency(String),

    /// A caller broke a contract of the execution model (e.g. the run stage
    /// stalled with nothing in flight). Not recoverable.
    #[error("Invalid execution state: {0}")]
    InvalidState(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskdockError>;
