// src/execution/stages/run.rs

use std::collections::BTreeSet;

use tracing::debug;

use crate::dag::{ContainerId, DependencyGraph, ImageSource};
use crate::execution::events::EventLog;
use crate::execution::rules::RunRule;
use crate::execution::stages::{NextStepResult, Stage};

/// The run stage: everything needed to bring the task container to exit.
#[derive(Debug, Clone)]
pub struct RunStage {
    stage: Stage<RunRule>,
    task_container: ContainerId,
}

impl RunStage {
    pub fn new(rules: impl IntoIterator<Item = RunRule>, task_container: ContainerId) -> Self {
        Self {
            stage: Stage::new(rules),
            task_container,
        }
    }

    pub fn task_container(&self) -> ContainerId {
        self.task_container
    }

    pub fn rules(&self) -> &[RunRule] {
        self.stage.rules()
    }

    /// Like [`Stage::pop_next_step`], except that the stage is complete as
    /// soon as the task container has exited, whatever is left.
    pub fn pop_next_step(&mut self, events: &EventLog, steps_still_running: bool) -> NextStepResult {
        if events.exit_code_of(self.task_container).is_some() {
            return NextStepResult::StageComplete;
        }

        self.stage.pop_next_step(events, steps_still_running)
    }
}

pub struct RunStagePlanner<'a> {
    graph: &'a DependencyGraph,
}

impl<'a> RunStagePlanner<'a> {
    pub fn new(graph: &'a DependencyGraph) -> Self {
        Self { graph }
    }

    pub fn create_stage(&self) -> RunStage {
        let mut rules = BTreeSet::new();

        rules.insert(RunRule::InitialiseCaches);
        rules.insert(RunRule::PrepareTaskNetwork {
            existing_network: self.graph.custom_network().map(str::to_string),
        });

        for node in self.graph.nodes() {
            let container = node.id;

            // Pull rules compare equal per image, so the set deduplicates them.
            rules.insert(match &node.container.image_source {
                ImageSource::Pull(source) => RunRule::PullImage {
                    source: source.clone(),
                },
                ImageSource::Build(source) => RunRule::BuildImage {
                    container,
                    source: source.clone(),
                },
            });

            rules.insert(RunRule::CreateContainer {
                container,
                image_source: node.container.image_source.clone(),
            });
            rules.insert(RunRule::RunContainer {
                container,
                dependencies: node.dependencies.clone(),
                is_task_container: container == self.graph.task_container(),
            });
            rules.insert(RunRule::WaitForContainerToBecomeHealthy { container });
            rules.insert(RunRule::RunContainerSetupCommands { container });
        }

        debug!(
            task = %self.graph.task_name(),
            rules = rules.len(),
            "created run stage"
        );

        RunStage::new(rules, self.graph.task_container())
    }
}
