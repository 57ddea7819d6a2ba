// src/dag/container.rs

//! Resolved container definitions, as referenced by the dependency graph.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::config::{HealthCheckConfig, RunAsCurrentUserConfig, SetupCommandConfig};

/// Stable handle of a container inside one [`DependencyGraph`](super::DependencyGraph).
///
/// Events, steps and rules refer to containers through this index rather than
/// holding the container itself, so the graph stays the single owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(pub(crate) usize);

impl ContainerId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "container#{}", self.0)
    }
}

/// An existing image pulled by reference. Equality is by image name, so two
/// containers naming the same image share one pull.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PullImage {
    pub image_name: String,
}

/// An image built from a local directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuildImage {
    pub build_directory: PathBuf,
    pub dockerfile: Option<String>,
    pub build_args: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ImageSource {
    Pull(PullImage),
    Build(BuildImage),
}

/// A container as it takes part in one task run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub name: String,
    pub image_source: ImageSource,
    pub command: Option<String>,
    pub environment: BTreeMap<String, String>,
    pub working_directory: Option<String>,
    pub volumes: Vec<String>,
    pub setup_commands: Vec<SetupCommandConfig>,
    pub health_check: Option<HealthCheckConfig>,
    pub run_as_current_user: Option<RunAsCurrentUserConfig>,
}

impl Container {
    /// Whether temporary user files and a home directory are mounted in.
    pub fn runs_as_current_user(&self) -> bool {
        self.run_as_current_user
            .as_ref()
            .is_some_and(|cfg| cfg.enabled)
    }
}
