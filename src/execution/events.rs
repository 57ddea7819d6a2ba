// src/execution/events.rs

//! Facts recorded while a task runs.
//!
//! Events are immutable values appended to an [`EventLog`]; every decision the
//! stages make is a pure function of the log's contents.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::dag::{ContainerId, PullImage};
use crate::execution::steps::{DockerContainer, DockerImage, DockerNetwork};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskEvent {
    CachesInitialised,
    ImageBuilt {
        container: ContainerId,
        image: DockerImage,
    },
    ImagePulled {
        source: PullImage,
        image: DockerImage,
    },
    /// A network created for this task. Only this kind is deleted afterwards.
    TaskNetworkCreated {
        network: DockerNetwork,
    },
    /// A user-supplied network was found and will be used as-is.
    CustomTaskNetworkChecked {
        network: DockerNetwork,
    },
    ContainerCreated {
        container: ContainerId,
        docker_container: DockerContainer,
    },
    ContainerStarted {
        container: ContainerId,
    },
    ContainerBecameHealthy {
        container: ContainerId,
    },
    RunningSetupCommand {
        container: ContainerId,
        index: usize,
    },
    SetupCommandsCompleted {
        container: ContainerId,
    },
    /// Healthy and set up: dependents may start.
    ContainerBecameReady {
        container: ContainerId,
    },
    RunningContainerExited {
        container: ContainerId,
        exit_code: i32,
    },
    ContainerStopped {
        container: ContainerId,
    },
    ContainerRemoved {
        container: ContainerId,
    },
    TaskNetworkDeleted,
    TemporaryFileCreated {
        container: ContainerId,
        path: PathBuf,
    },
    TemporaryDirectoryCreated {
        container: ContainerId,
        path: PathBuf,
    },
    TemporaryFileDeleted {
        path: PathBuf,
    },
    TemporaryDirectoryDeleted {
        path: PathBuf,
    },
    Failed(TaskFailure),
}

/// Failure events. Posting any of them marks the task as failed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskFailure {
    ExecutionFailed {
        message: String,
    },
    TaskNetworkCreationFailed {
        message: String,
    },
    CustomTaskNetworkCheckFailed {
        network: String,
        message: String,
    },
    ImageBuildFailed {
        container: ContainerId,
        message: String,
    },
    ImagePullFailed {
        source: PullImage,
        message: String,
    },
    ContainerCreationFailed {
        container: ContainerId,
        message: String,
    },
    ContainerDidNotBecomeHealthy {
        container: ContainerId,
        message: String,
    },
    ContainerRunFailed {
        container: ContainerId,
        message: String,
    },
    ContainerStopFailed {
        container: ContainerId,
        message: String,
    },
    ContainerRemovalFailed {
        container: ContainerId,
        message: String,
    },
    TaskNetworkDeletionFailed {
        message: String,
    },
    TemporaryFileDeletionFailed {
        path: PathBuf,
        message: String,
    },
    TemporaryDirectoryDeletionFailed {
        path: PathBuf,
        message: String,
    },
    UserInterruptedExecution,
    SetupCommandExecutionError {
        container: ContainerId,
        index: usize,
        message: String,
    },
    SetupCommandFailed {
        container: ContainerId,
        index: usize,
        exit_code: i32,
        output: String,
    },
    CacheInitialisationFailed {
        message: String,
    },
}

impl TaskEvent {
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskEvent::Failed(_))
    }
}

impl From<TaskFailure> for TaskEvent {
    fn from(failure: TaskFailure) -> Self {
        TaskEvent::Failed(failure)
    }
}

/// Append-only, insertion-ordered set of events.
///
/// Posting an event that is already present is a no-op.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    ordered: Vec<TaskEvent>,
    seen: HashSet<TaskEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the event was already recorded.
    pub fn insert(&mut self, event: TaskEvent) -> bool {
        if self.seen.contains(&event) {
            return false;
        }
        self.seen.insert(event.clone());
        self.ordered.push(event);
        true
    }

    pub fn contains(&self, event: &TaskEvent) -> bool {
        self.seen.contains(event)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskEvent> {
        self.ordered.iter()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskFailure> {
        self.ordered.iter().filter_map(|e| match e {
            TaskEvent::Failed(f) => Some(f),
            _ => None,
        })
    }

    /// The network containers should join, whether created or user-supplied.
    pub fn task_network(&self) -> Option<&DockerNetwork> {
        self.ordered.iter().find_map(|e| match e {
            TaskEvent::TaskNetworkCreated { network }
            | TaskEvent::CustomTaskNetworkChecked { network } => Some(network),
            _ => None,
        })
    }

    pub fn created_container(&self, id: ContainerId) -> Option<&DockerContainer> {
        self.ordered.iter().find_map(|e| match e {
            TaskEvent::ContainerCreated {
                container,
                docker_container,
            } if *container == id => Some(docker_container),
            _ => None,
        })
    }

    pub fn any_container_created(&self) -> bool {
        self.ordered
            .iter()
            .any(|e| matches!(e, TaskEvent::ContainerCreated { .. }))
    }

    pub fn container_started(&self, id: ContainerId) -> bool {
        self.contains(&TaskEvent::ContainerStarted { container: id })
    }

    pub fn container_healthy(&self, id: ContainerId) -> bool {
        self.contains(&TaskEvent::ContainerBecameHealthy { container: id })
    }

    pub fn container_ready(&self, id: ContainerId) -> bool {
        self.contains(&TaskEvent::ContainerBecameReady { container: id })
    }

    pub fn container_stopped(&self, id: ContainerId) -> bool {
        self.contains(&TaskEvent::ContainerStopped { container: id })
    }

    pub fn container_removed(&self, id: ContainerId) -> bool {
        self.contains(&TaskEvent::ContainerRemoved { container: id })
    }

    pub fn exit_code_of(&self, id: ContainerId) -> Option<i32> {
        self.ordered.iter().find_map(|e| match e {
            TaskEvent::RunningContainerExited {
                container,
                exit_code,
            } if *container == id => Some(*exit_code),
            _ => None,
        })
    }

    pub fn image_built_for(&self, id: ContainerId) -> Option<&DockerImage> {
        self.ordered.iter().find_map(|e| match e {
            TaskEvent::ImageBuilt { container, image } if *container == id => Some(image),
            _ => None,
        })
    }

    pub fn image_pulled_for(&self, source: &PullImage) -> Option<&DockerImage> {
        self.ordered.iter().find_map(|e| match e {
            TaskEvent::ImagePulled { source: s, image } if s == source => Some(image),
            _ => None,
        })
    }
}

impl FromIterator<TaskEvent> for EventLog {
    fn from_iter<I: IntoIterator<Item = TaskEvent>>(iter: I) -> Self {
        let mut log = EventLog::new();
        for event in iter {
            log.insert(event);
        }
        log
    }
}

impl Extend<TaskEvent> for EventLog {
    fn extend<I: IntoIterator<Item = TaskEvent>>(&mut self, iter: I) {
        for event in iter {
            self.insert(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_events_are_recorded_once_in_insertion_order() {
        let mut log = EventLog::new();
        assert!(log.insert(TaskEvent::TaskNetworkDeleted));
        assert!(log.insert(TaskEvent::CachesInitialised));
        assert!(!log.insert(TaskEvent::TaskNetworkDeleted));

        let events: Vec<_> = log.iter().cloned().collect();
        assert_eq!(
            events,
            vec![TaskEvent::TaskNetworkDeleted, TaskEvent::CachesInitialised]
        );
    }

    #[test]
    fn custom_network_counts_as_task_network() {
        let network = DockerNetwork {
            id: "shared".into(),
        };
        let log: EventLog = [TaskEvent::CustomTaskNetworkChecked {
            network: network.clone(),
        }]
        .into_iter()
        .collect();

        assert_eq!(log.task_network(), Some(&network));
    }

    #[test]
    fn failures_are_filtered() {
        let log: EventLog = [
            TaskEvent::CachesInitialised,
            TaskFailure::UserInterruptedExecution.into(),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            log.failures().collect::<Vec<_>>(),
            vec![&TaskFailure::UserInterruptedExecution]
        );
    }
}
