// src/execution/rules/cleanup.rs

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::dag::ContainerId;
use crate::execution::events::EventLog;
use crate::execution::rules::{RuleEvaluation, TaskStepRule};
use crate::execution::steps::{DockerContainer, DockerNetwork, TaskStep};
use crate::types::OperatingSystem;

/// Order in which manual cleanup commands are presented to the user.
///
/// Independent from the order in which cleanup steps execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ManualCleanupSortOrder {
    RemoveContainers,
    DeleteTaskNetwork,
    DeleteTemporaryFiles,
    DeleteTemporaryDirectories,
}

/// Rules of the cleanup stage. Each one is built by the cleanup planner with
/// its precondition set already decided.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CleanupRule {
    /// Fires once every container in `containers_that_must_be_stopped_first`
    /// has stopped.
    StopContainer {
        container: ContainerId,
        docker_container: DockerContainer,
        containers_that_must_be_stopped_first: BTreeSet<ContainerId>,
    },
    RemoveContainer {
        container: ContainerId,
        docker_container: DockerContainer,
        container_was_started: bool,
    },
    DeleteTaskNetwork {
        network: DockerNetwork,
        containers_that_must_be_removed_first: BTreeSet<ContainerId>,
    },
    DeleteTemporaryFile {
        path: PathBuf,
        container_that_must_be_removed_first: Option<ContainerId>,
    },
    DeleteTemporaryDirectory {
        path: PathBuf,
        container_that_must_be_removed_first: Option<ContainerId>,
    },
}

impl CleanupRule {
    /// Command a user can run to do this rule's work by hand, if any.
    pub fn manual_cleanup_instruction(&self, os: OperatingSystem) -> Option<String> {
        match self {
            // Covered by the forced removal.
            CleanupRule::StopContainer { .. } => None,
            CleanupRule::RemoveContainer {
                docker_container, ..
            } => Some(format!(
                "docker rm --force --volumes {}",
                docker_container.id
            )),
            CleanupRule::DeleteTaskNetwork { network, .. } => {
                Some(format!("docker network rm {}", network.id))
            }
            CleanupRule::DeleteTemporaryFile { path, .. } => {
                let path = path.display();
                Some(match os {
                    OperatingSystem::Windows => format!(
                        "Remove-Item {path} (if using PowerShell) or del {path} (if using Command Prompt)"
                    ),
                    OperatingSystem::Other => format!("rm {path}"),
                })
            }
            CleanupRule::DeleteTemporaryDirectory { path, .. } => {
                let path = path.display();
                Some(match os {
                    OperatingSystem::Windows => format!(
                        "Remove-Item -Recurse {path} (if using PowerShell) or rmdir /s /q {path} (if using Command Prompt)"
                    ),
                    OperatingSystem::Other => format!("rm -rf {path}"),
                })
            }
        }
    }

    pub fn manual_cleanup_sort_order(&self) -> Option<ManualCleanupSortOrder> {
        match self {
            CleanupRule::StopContainer { .. } => None,
            CleanupRule::RemoveContainer { .. } => Some(ManualCleanupSortOrder::RemoveContainers),
            CleanupRule::DeleteTaskNetwork { .. } => Some(ManualCleanupSortOrder::DeleteTaskNetwork),
            CleanupRule::DeleteTemporaryFile { .. } => {
                Some(ManualCleanupSortOrder::DeleteTemporaryFiles)
            }
            CleanupRule::DeleteTemporaryDirectory { .. } => {
                Some(ManualCleanupSortOrder::DeleteTemporaryDirectories)
            }
        }
    }
}

impl TaskStepRule for CleanupRule {
    fn evaluate(&self, events: &EventLog) -> RuleEvaluation {
        match self {
            CleanupRule::StopContainer {
                container,
                docker_container,
                containers_that_must_be_stopped_first,
            } => {
                if !containers_that_must_be_stopped_first
                    .iter()
                    .all(|c| events.container_stopped(*c))
                {
                    return RuleEvaluation::NotReady;
                }

                RuleEvaluation::Ready(TaskStep::StopContainer {
                    container: *container,
                    docker_container: docker_container.clone(),
                })
            }

            CleanupRule::RemoveContainer {
                container,
                docker_container,
                container_was_started,
            } => {
                if *container_was_started && !events.container_stopped(*container) {
                    return RuleEvaluation::NotReady;
                }

                RuleEvaluation::Ready(TaskStep::RemoveContainer {
                    container: *container,
                    docker_container: docker_container.clone(),
                })
            }

            CleanupRule::DeleteTaskNetwork {
                network,
                containers_that_must_be_removed_first,
            } => {
                if !containers_that_must_be_removed_first
                    .iter()
                    .all(|c| events.container_removed(*c))
                {
                    return RuleEvaluation::NotReady;
                }

                RuleEvaluation::Ready(TaskStep::DeleteTaskNetwork {
                    network: network.clone(),
                })
            }

            CleanupRule::DeleteTemporaryFile {
                path,
                container_that_must_be_removed_first,
            } => match container_that_must_be_removed_first {
                Some(c) if !events.container_removed(*c) => RuleEvaluation::NotReady,
                _ => RuleEvaluation::Ready(TaskStep::DeleteTemporaryFile { path: path.clone() }),
            },

            CleanupRule::DeleteTemporaryDirectory {
                path,
                container_that_must_be_removed_first,
            } => match container_that_must_be_removed_first {
                Some(c) if !events.container_removed(*c) => RuleEvaluation::NotReady,
                _ => RuleEvaluation::Ready(TaskStep::DeleteTemporaryDirectory { path: path.clone() }),
            },
        }
    }
}
