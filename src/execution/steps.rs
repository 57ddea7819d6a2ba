// src/execution/steps.rs

//! Units of Docker work proposed by rules once their preconditions hold.

use std::fmt;
use std::path::PathBuf;

use crate::dag::{BuildImage, ContainerId, PullImage};

/// An image available locally, by ID or tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DockerImage {
    pub id: String,
}

/// A created container. `name` is what users type into `docker logs`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DockerContainer {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DockerNetwork {
    pub id: String,
}

impl fmt::Display for DockerNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskStep {
    InitialiseCaches,
    /// Create a fresh network for the task, or check that `existing_network`
    /// is usable when the task names one.
    PrepareTaskNetwork {
        existing_network: Option<String>,
    },
    BuildImage {
        container: ContainerId,
        source: BuildImage,
    },
    PullImage {
        source: PullImage,
    },
    CreateContainer {
        container: ContainerId,
        image: DockerImage,
        network: DockerNetwork,
    },
    /// Start a dependency container in the background.
    StartContainer {
        container: ContainerId,
        docker_container: DockerContainer,
    },
    /// Run the task container attached until it exits.
    RunContainer {
        container: ContainerId,
        docker_container: DockerContainer,
    },
    WaitForContainerToBecomeHealthy {
        container: ContainerId,
        docker_container: DockerContainer,
    },
    RunContainerSetupCommands {
        container: ContainerId,
        docker_container: DockerContainer,
    },
    StopContainer {
        container: ContainerId,
        docker_container: DockerContainer,
    },
    RemoveContainer {
        container: ContainerId,
        docker_container: DockerContainer,
    },
    DeleteTaskNetwork {
        network: DockerNetwork,
    },
    DeleteTemporaryFile {
        path: PathBuf,
    },
    DeleteTemporaryDirectory {
        path: PathBuf,
    },
}

impl TaskStep {
    /// Steps that belong to the teardown phase.
    pub fn is_cleanup_step(&self) -> bool {
        matches!(
            self,
            TaskStep::StopContainer { .. }
                | TaskStep::RemoveContainer { .. }
                | TaskStep::DeleteTaskNetwork { .. }
                | TaskStep::DeleteTemporaryFile { .. }
                | TaskStep::DeleteTemporaryDirectory { .. }
        )
    }

    /// Container this step acts on, if any.
    pub fn container(&self) -> Option<ContainerId> {
        match self {
            TaskStep::BuildImage { container, .. }
            | TaskStep::CreateContainer { container, .. }
            | TaskStep::StartContainer { container, .. }
            | TaskStep::RunContainer { container, .. }
            | TaskStep::WaitForContainerToBecomeHealthy { container, .. }
            | TaskStep::RunContainerSetupCommands { container, .. }
            | TaskStep::StopContainer { container, .. }
            | TaskStep::RemoveContainer { container, .. } => Some(*container),
            TaskStep::InitialiseCaches
            | TaskStep::PrepareTaskNetwork { .. }
            | TaskStep::PullImage { .. }
            | TaskStep::DeleteTaskNetwork { .. }
            | TaskStep::DeleteTemporaryFile { .. }
            | TaskStep::DeleteTemporaryDirectory { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_teardown_steps_are_cleanup_steps() {
        let dc = DockerContainer {
            id: "abc".into(),
            name: "shop-db-1".into(),
        };

        assert!(
            TaskStep::StopContainer {
                container: ContainerId(0),
                docker_container: dc.clone()
            }
            .is_cleanup_step()
        );
        assert!(
            TaskStep::DeleteTemporaryFile {
                path: "/tmp/passwd".into()
            }
            .is_cleanup_step()
        );
        assert!(
            !TaskStep::RunContainer {
                container: ContainerId(0),
                docker_container: dc
            }
            .is_cleanup_step()
        );
        assert!(!TaskStep::InitialiseCaches.is_cleanup_step());
    }
}
