// src/config/mod.rs

//! Configuration loading and validation for taskdock.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate basic invariants like acyclic dependencies (`validate.rs`).
//! - Expand wildcard task prerequisites (`prerequisites.rs`).

pub mod loader;
pub mod model;
pub mod prerequisites;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    ConfigFile, ContainerConfig, HealthCheckConfig, RawConfigFile, RunAsCurrentUserConfig,
    SetupCommandConfig, TaskConfig, TaskRunConfig,
};
pub use prerequisites::expand_prerequisites;
