// src/execution/rules/run.rs

use std::collections::BTreeSet;

use crate::dag::{BuildImage, ContainerId, ImageSource, PullImage};
use crate::execution::events::EventLog;
use crate::execution::rules::{RuleEvaluation, TaskStepRule};
use crate::execution::steps::TaskStep;

/// Rules of the run stage.
///
/// Ordering is only used to keep a stage's rule set deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RunRule {
    InitialiseCaches,
    PrepareTaskNetwork {
        existing_network: Option<String>,
    },
    BuildImage {
        container: ContainerId,
        source: BuildImage,
    },
    /// Shared by every container that uses `source`.
    PullImage {
        source: PullImage,
    },
    CreateContainer {
        container: ContainerId,
        image_source: ImageSource,
    },
    /// Starts a dependency, or runs the task container when
    /// `is_task_container` is set.
    RunContainer {
        container: ContainerId,
        dependencies: BTreeSet<ContainerId>,
        is_task_container: bool,
    },
    WaitForContainerToBecomeHealthy {
        container: ContainerId,
    },
    RunContainerSetupCommands {
        container: ContainerId,
    },
}

impl TaskStepRule for RunRule {
    fn evaluate(&self, events: &EventLog) -> RuleEvaluation {
        match self {
            RunRule::InitialiseCaches => RuleEvaluation::Ready(TaskStep::InitialiseCaches),

            RunRule::PrepareTaskNetwork { existing_network } => {
                RuleEvaluation::Ready(TaskStep::PrepareTaskNetwork {
                    existing_network: existing_network.clone(),
                })
            }

            RunRule::BuildImage { container, source } => {
                RuleEvaluation::Ready(TaskStep::BuildImage {
                    container: *container,
                    source: source.clone(),
                })
            }

            RunRule::PullImage { source } => RuleEvaluation::Ready(TaskStep::PullImage {
                source: source.clone(),
            }),

            RunRule::CreateContainer {
                container,
                image_source,
            } => {
                let Some(network) = events.task_network() else {
                    return RuleEvaluation::NotReady;
                };

                let image = match image_source {
                    ImageSource::Pull(source) => events.image_pulled_for(source),
                    ImageSource::Build(_) => events.image_built_for(*container),
                };

                match image {
                    Some(image) => RuleEvaluation::Ready(TaskStep::CreateContainer {
                        container: *container,
                        image: image.clone(),
                        network: network.clone(),
                    }),
                    None => RuleEvaluation::NotReady,
                }
            }

            RunRule::RunContainer {
                container,
                dependencies,
                is_task_container,
            } => {
                let Some(docker_container) = events.created_container(*container) else {
                    return RuleEvaluation::NotReady;
                };

                if !dependencies.iter().all(|dep| events.container_ready(*dep)) {
                    return RuleEvaluation::NotReady;
                }

                let container = *container;
                let docker_container = docker_container.clone();

                RuleEvaluation::Ready(if *is_task_container {
                    TaskStep::RunContainer {
                        container,
                        docker_container,
                    }
                } else {
                    TaskStep::StartContainer {
                        container,
                        docker_container,
                    }
                })
            }

            RunRule::WaitForContainerToBecomeHealthy { container } => {
                match events.created_container(*container) {
                    Some(docker_container) if events.container_started(*container) => {
                        RuleEvaluation::Ready(TaskStep::WaitForContainerToBecomeHealthy {
                            container: *container,
                            docker_container: docker_container.clone(),
                        })
                    }
                    _ => RuleEvaluation::NotReady,
                }
            }

            RunRule::RunContainerSetupCommands { container } => {
                match events.created_container(*container) {
                    Some(docker_container) if events.container_healthy(*container) => {
                        RuleEvaluation::Ready(TaskStep::RunContainerSetupCommands {
                            container: *container,
                            docker_container: docker_container.clone(),
                        })
                    }
                    _ => RuleEvaluation::NotReady,
                }
            }
        }
    }
}
