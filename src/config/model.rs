// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// project_name = "shop"
///
/// [container.db]
/// image = "postgres:16"
///
/// [container.app]
/// build_directory = "app"
/// dependencies = ["db"]
///
/// [task.test]
/// run = { container = "app", command = "cargo test" }
/// ```
///
/// Use `ConfigFile::try_from(raw)` (or [`crate::config::load_and_validate`])
/// to obtain a validated [`ConfigFile`].
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    /// Used as a prefix for image tags and container names.
    ///
    /// If `None`, the loader falls back to the name of the directory that
    /// holds the config file.
    #[serde(default)]
    pub project_name: Option<String>,

    /// All containers from `[container.<name>]`.
    #[serde(default)]
    pub container: BTreeMap<String, ContainerConfig>,

    /// All tasks from `[task.<name>]`.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,

    /// Directory relative paths (build directories, volumes) resolve against.
    /// Not part of the TOML; filled in by the loader.
    #[serde(skip)]
    pub base_directory: PathBuf,
}

/// Validated configuration.
///
/// Only constructible through `TryFrom<RawConfigFile>`, so holders can rely on
/// every container reference resolving and the dependency relation being
/// acyclic.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub project_name: String,
    pub container: BTreeMap<String, ContainerConfig>,
    pub task: BTreeMap<String, TaskConfig>,
    pub base_directory: PathBuf,
}

pub const DEFAULT_PROJECT_NAME: &str = "taskdock";

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            project_name: raw
                .project_name
                .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string()),
            container: raw.container,
            task: raw.task,
            base_directory: raw.base_directory,
        }
    }
}

/// `[container.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ContainerConfig {
    /// Existing image to pull, e.g. `"postgres:16"`.
    ///
    /// Exactly one of `image` / `build_directory` must be set.
    #[serde(default)]
    pub image: Option<String>,

    /// Directory containing a Dockerfile to build the image from.
    #[serde(default)]
    pub build_directory: Option<PathBuf>,

    /// Dockerfile name relative to `build_directory`.
    #[serde(default)]
    pub dockerfile: Option<String>,

    #[serde(default)]
    pub build_args: BTreeMap<String, String>,

    /// Command to run instead of the image's default.
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    #[serde(default)]
    pub working_directory: Option<String>,

    /// Volume mounts in Docker's `source:target[:options]` form.
    #[serde(default)]
    pub volumes: Vec<String>,

    /// Containers that must be ready before this one starts.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Commands run with `docker exec` once the container is healthy.
    #[serde(default)]
    pub setup_commands: Vec<SetupCommandConfig>,

    /// Overrides the image's health check.
    #[serde(default)]
    pub health_check: Option<HealthCheckConfig>,

    #[serde(default)]
    pub run_as_current_user: Option<RunAsCurrentUserConfig>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SetupCommandConfig {
    pub command: String,
    #[serde(default)]
    pub working_directory: Option<String>,
}

/// Health check override. Durations are passed to Docker verbatim (`"2s"`).
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct HealthCheckConfig {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub start_period: Option<String>,
    #[serde(default)]
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RunAsCurrentUserConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_home_directory")]
    pub home_directory: String,
}

fn default_home_directory() -> String {
    "/home/container-user".to_string()
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    #[serde(default)]
    pub description: Option<String>,

    pub run: TaskRunConfig,

    /// Extra containers started for this task only, on top of the task
    /// container's own dependencies.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Tasks that must run to completion, one after another, before this
    /// one. Entries may contain `*` wildcards.
    #[serde(default)]
    pub prerequisites: Vec<String>,

    /// Existing Docker network to use instead of creating a new one.
    #[serde(default)]
    pub network: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskRunConfig {
    /// The task container: its exit code becomes the task's exit code.
    pub container: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}
