// src/engine/messages.rs

//! User-facing failure and manual cleanup messages.

use std::sync::Arc;

use crate::dag::{ContainerId, DependencyGraph};
use crate::execution::{EventLog, TaskEvent, TaskFailure};
use crate::errors::{Result, TaskdockError};
use crate::types::CleanupBehaviour;

pub const NO_CLEANUP_AFTER_FAILURE_FLAG: &str = "--no-cleanup-after-failure";
pub const NO_CLEANUP_AFTER_SUCCESS_FLAG: &str = "--no-cleanup-after-success";
pub const NO_CLEANUP_FLAG: &str = "--no-cleanup";

#[derive(Debug, Clone)]
pub struct FailureErrorMessageFormatter {
    graph: Arc<DependencyGraph>,
    behaviour_after_failure: CleanupBehaviour,
}

impl FailureErrorMessageFormatter {
    pub fn new(graph: Arc<DependencyGraph>, behaviour_after_failure: CleanupBehaviour) -> Self {
        Self {
            graph,
            behaviour_after_failure,
        }
    }

    pub fn format_error_message(&self, failure: &TaskFailure) -> String {
        let name = |c: &ContainerId| self.graph.name_of(*c).to_string();

        match failure {
            TaskFailure::ExecutionFailed { message } => {
                error("An unexpected exception occurred during execution", message)
            }
            TaskFailure::TaskNetworkCreationFailed { message } => {
                error("Could not create network for task", message)
            }
            TaskFailure::CustomTaskNetworkCheckFailed { network, message } => {
                error(&format!("Could not check details of network {network}"), message)
            }
            TaskFailure::ImageBuildFailed { container, message } => error(
                &format!("Could not build image for container {}", name(container)),
                message,
            ),
            TaskFailure::ImagePullFailed { source, message } => {
                error(&format!("Could not pull image {}", source.image_name), message)
            }
            TaskFailure::ContainerCreationFailed { container, message } => error(
                &format!("Could not create container {}", name(container)),
                message,
            ),
            TaskFailure::ContainerDidNotBecomeHealthy { container, message } => {
                error(
                    &format!("Container {} did not become healthy", name(container)),
                    message,
                ) + &self.hint_to_rerun_with_cleanup_disabled()
            }
            TaskFailure::ContainerRunFailed { container, message } => error(
                &format!("Could not run container {}", name(container)),
                message,
            ),
            TaskFailure::ContainerStopFailed { container, message } => error(
                &format!("Could not stop container {}", name(container)),
                message,
            ),
            TaskFailure::ContainerRemovalFailed { container, message } => error(
                &format!("Could not remove container {}", name(container)),
                message,
            ),
            TaskFailure::TaskNetworkDeletionFailed { message } => {
                error("Could not delete the task network", message)
            }
            TaskFailure::TemporaryFileDeletionFailed { path, message } => error(
                &format!("Could not delete temporary file {}", path.display()),
                message,
            ),
            TaskFailure::TemporaryDirectoryDeletionFailed { path, message } => error(
                &format!("Could not delete temporary directory {}", path.display()),
                message,
            ),
            TaskFailure::UserInterruptedExecution => format_message(
                "Task cancelled",
                "Interrupt received during execution",
                "Waiting for outstanding operations to stop or finish before cleaning up...",
            ),
            TaskFailure::SetupCommandExecutionError {
                container,
                index,
                message,
            } => {
                error(
                    &format!(
                        "Could not run setup command {} in container {}",
                        self.setup_command(*container, *index),
                        name(container)
                    ),
                    message,
                ) + &self.hint_to_rerun_with_cleanup_disabled()
            }
            TaskFailure::SetupCommandFailed {
                container,
                index,
                exit_code,
                output,
            } => {
                let body = if output.is_empty() {
                    format!("The command exited with code {exit_code} and did not produce any output.")
                } else {
                    format!("The command exited with code {exit_code} and output:\n{output}")
                };

                error(
                    &format!(
                        "Setup command {} in container {} failed",
                        self.setup_command(*container, *index),
                        name(container)
                    ),
                    &body,
                ) + &self.hint_to_rerun_with_cleanup_disabled()
            }
            TaskFailure::CacheInitialisationFailed { message } => {
                error("Could not initialise caches for this task", message)
            }
        }
    }

    pub fn format_manual_cleanup_message_after_task_failure_with_cleanup_disabled(
        &self,
        events: &EventLog,
        cleanup_commands: &[String],
    ) -> Result<String> {
        self.format_manual_cleanup_message_when_cleanup_disabled(
            events,
            cleanup_commands,
            NO_CLEANUP_AFTER_FAILURE_FLAG,
            "Once you have finished investigating the issue",
        )
    }

    pub fn format_manual_cleanup_message_after_task_success_with_cleanup_disabled(
        &self,
        events: &EventLog,
        cleanup_commands: &[String],
    ) -> Result<String> {
        self.format_manual_cleanup_message_when_cleanup_disabled(
            events,
            cleanup_commands,
            NO_CLEANUP_AFTER_SUCCESS_FLAG,
            "Once you have finished using the containers",
        )
    }

    /// Empty when there is nothing left to suggest.
    pub fn format_manual_cleanup_message_after_cleanup_failure(
        &self,
        cleanup_commands: &[String],
    ) -> String {
        if cleanup_commands.is_empty() {
            return String::new();
        }

        let instruction = if cleanup_commands.len() == 1 {
            "You may need to run the following command to clean up any remaining resources:"
        } else {
            "You may need to run some or all of the following commands to clean up any remaining resources:"
        };

        format!(
            "Clean up has failed, and taskdock cannot guarantee that all temporary resources created have been completely cleaned up.\n{instruction}\n{}",
            cleanup_commands.join("\n")
        )
    }

    fn format_manual_cleanup_message_when_cleanup_disabled(
        &self,
        events: &EventLog,
        cleanup_commands: &[String],
        flag: &str,
        cleanup_phrase: &str,
    ) -> Result<String> {
        let mut created: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                TaskEvent::ContainerCreated {
                    container,
                    docker_container,
                } => Some((self.graph.name_of(*container), *container, docker_container)),
                _ => None,
            })
            .collect();

        if created.is_empty() {
            return Err(TaskdockError::InvalidState(
                "no containers were created, so there is nothing to leave behind".to_string(),
            ));
        }

        if cleanup_commands.is_empty() {
            return Err(TaskdockError::InvalidState(
                "no cleanup commands were provided".to_string(),
            ));
        }

        created.sort_by(|a, b| a.0.cmp(b.0));

        let mut message = format!(
            "As the task was run with {flag} or {NO_CLEANUP_FLAG}, the created containers will not be cleaned up.\n"
        );

        for (name, container, docker_container) in created {
            let docker_name = &docker_container.name;
            let never_started = !events.container_started(container);
            let exited = events.exit_code_of(container).is_some();
            let stopped = events.container_stopped(container);

            let exec_command = if never_started || exited || stopped {
                format!("docker start {docker_name}; docker exec -it {docker_name} <command>")
            } else {
                format!("docker exec -it {docker_name} <command>")
            };

            message.push_str(&format!(
                "For container {name}, view its output by running 'docker logs {docker_name}', or run a command in the container with '{exec_command}'.\n"
            ));
        }

        message.push('\n');
        message.push_str(&format!(
            "{cleanup_phrase}, clean up all temporary resources created by taskdock by running:\n"
        ));
        message.push_str(&cleanup_commands.join("\n"));

        Ok(message)
    }

    fn setup_command(&self, container: ContainerId, index: usize) -> &str {
        self.graph
            .container(container)
            .setup_commands
            .get(index)
            .map(|c| c.command.as_str())
            .unwrap_or("<unknown>")
    }

    fn hint_to_rerun_with_cleanup_disabled(&self) -> String {
        match self.behaviour_after_failure {
            CleanupBehaviour::Cleanup => format!(
                "\n\nYou can re-run the task with {NO_CLEANUP_AFTER_FAILURE_FLAG} to leave the created containers running to diagnose the issue."
            ),
            CleanupBehaviour::DontCleanup => String::new(),
        }
    }
}

fn error(headline: &str, body: &str) -> String {
    format_message("Error", headline, body)
}

fn format_message(kind: &str, headline: &str, body: &str) -> String {
    format!("{kind}: {headline}.\n{body}")
}
