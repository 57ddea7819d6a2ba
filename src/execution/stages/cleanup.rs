// src/execution/stages/cleanup.rs

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::dag::{ContainerId, DependencyGraph};
use crate::execution::events::{EventLog, TaskEvent};
use crate::execution::rules::CleanupRule;
use crate::execution::stages::{NextStepResult, Stage};
use crate::execution::steps::DockerContainer;
use crate::types::{CleanupBehaviour, OperatingSystem};

/// The cleanup stage, plus the commands a user would need to run to do the
/// same work by hand.
#[derive(Debug, Clone)]
pub struct CleanupStage {
    stage: Stage<CleanupRule>,
    manual_cleanup_instructions: Vec<String>,
    operating_system: OperatingSystem,
}

impl CleanupStage {
    pub fn new(rules: impl IntoIterator<Item = CleanupRule>, operating_system: OperatingSystem) -> Self {
        let stage = Stage::new(rules);
        let manual_cleanup_instructions = manual_cleanup_instructions(stage.rules(), operating_system);

        Self {
            stage,
            manual_cleanup_instructions,
            operating_system,
        }
    }

    pub fn empty(operating_system: OperatingSystem) -> Self {
        Self::new([], operating_system)
    }

    pub fn rules(&self) -> &[CleanupRule] {
        self.stage.rules()
    }

    /// Commands that would clean up everything this stage was planned for,
    /// in [`ManualCleanupSortOrder`](crate::execution::rules::ManualCleanupSortOrder).
    pub fn manual_cleanup_instructions(&self) -> &[String] {
        &self.manual_cleanup_instructions
    }

    pub fn operating_system(&self) -> OperatingSystem {
        self.operating_system
    }

    pub fn pop_next_step(&mut self, events: &EventLog, steps_still_running: bool) -> NextStepResult {
        self.stage.pop_next_step(events, steps_still_running)
    }
}

fn manual_cleanup_instructions(rules: &[CleanupRule], os: OperatingSystem) -> Vec<String> {
    let mut commands: Vec<_> = rules
        .iter()
        .filter_map(|rule| {
            let order = rule.manual_cleanup_sort_order()?;
            let command = rule.manual_cleanup_instruction(os)?;
            Some((order, command))
        })
        .collect();

    commands.sort_by_key(|(order, _)| *order);
    commands.into_iter().map(|(_, command)| command).collect()
}

/// Plans teardown from the events that actually happened, not from the graph.
pub struct CleanupStagePlanner<'a> {
    graph: &'a DependencyGraph,
    operating_system: OperatingSystem,
}

impl<'a> CleanupStagePlanner<'a> {
    pub fn new(graph: &'a DependencyGraph, operating_system: OperatingSystem) -> Self {
        Self {
            graph,
            operating_system,
        }
    }

    /// With [`CleanupBehaviour::DontCleanup`] only the stop rules are kept,
    /// but manual instructions still cover everything that was created.
    pub fn create_stage(&self, events: &EventLog, behaviour: CleanupBehaviour) -> CleanupStage {
        if events.task_network().is_none() {
            debug!("no task network was ready, nothing to clean up");
            return CleanupStage::empty(self.operating_system);
        }

        let created: BTreeMap<ContainerId, DockerContainer> = events
            .iter()
            .filter_map(|e| match e {
                TaskEvent::ContainerCreated {
                    container,
                    docker_container,
                } => Some((*container, docker_container.clone())),
                _ => None,
            })
            .collect();

        let started: BTreeSet<ContainerId> = events
            .iter()
            .filter_map(|e| match e {
                TaskEvent::ContainerStarted { container } => Some(*container),
                _ => None,
            })
            .collect();

        let stop_rules = self.stop_container_rules(&created, &started);

        let mut all_rules: Vec<CleanupRule> = stop_rules.clone();
        all_rules.extend(network_cleanup_rules(events, &created));
        all_rules.extend(remove_container_rules(&created, &started));
        all_rules.extend(temporary_resource_rules(events, &created));

        let full = CleanupStage::new(all_rules, self.operating_system);

        let stage = match behaviour {
            CleanupBehaviour::Cleanup => full,
            CleanupBehaviour::DontCleanup => CleanupStage {
                stage: Stage::new(stop_rules),
                manual_cleanup_instructions: full.manual_cleanup_instructions,
                operating_system: self.operating_system,
            },
        };

        debug!(
            rules = stage.rules().len(),
            manual_cleanup_commands = stage.manual_cleanup_instructions().len(),
            ?behaviour,
            "created cleanup stage"
        );

        stage
    }

    fn stop_container_rules(
        &self,
        created: &BTreeMap<ContainerId, DockerContainer>,
        started: &BTreeSet<ContainerId>,
    ) -> Vec<CleanupRule> {
        started
            .iter()
            .filter_map(|container| {
                let docker_container = created.get(container)?.clone();
                let containers_that_must_be_stopped_first = self
                    .graph
                    .dependents_of(*container)
                    .iter()
                    .filter(|dependent| started.contains(dependent))
                    .copied()
                    .collect();

                Some(CleanupRule::StopContainer {
                    container: *container,
                    docker_container,
                    containers_that_must_be_stopped_first,
                })
            })
            .collect()
    }
}

fn network_cleanup_rules(
    events: &EventLog,
    created: &BTreeMap<ContainerId, DockerContainer>,
) -> Vec<CleanupRule> {
    // User-supplied networks are never deleted.
    events
        .iter()
        .filter_map(|e| match e {
            TaskEvent::TaskNetworkCreated { network } => Some(CleanupRule::DeleteTaskNetwork {
                network: network.clone(),
                containers_that_must_be_removed_first: created.keys().copied().collect(),
            }),
            _ => None,
        })
        .collect()
}

fn remove_container_rules(
    created: &BTreeMap<ContainerId, DockerContainer>,
    started: &BTreeSet<ContainerId>,
) -> Vec<CleanupRule> {
    created
        .iter()
        .map(|(container, docker_container)| CleanupRule::RemoveContainer {
            container: *container,
            docker_container: docker_container.clone(),
            container_was_started: started.contains(container),
        })
        .collect()
}

fn temporary_resource_rules(
    events: &EventLog,
    created: &BTreeMap<ContainerId, DockerContainer>,
) -> Vec<CleanupRule> {
    let owner = |container: &ContainerId| created.contains_key(container).then_some(*container);

    events
        .iter()
        .filter_map(|e| match e {
            TaskEvent::TemporaryFileCreated { container, path } => {
                Some(CleanupRule::DeleteTemporaryFile {
                    path: path.clone(),
                    container_that_must_be_removed_first: owner(container),
                })
            }
            TaskEvent::TemporaryDirectoryCreated { container, path } => {
                Some(CleanupRule::DeleteTemporaryDirectory {
                    path: path.clone(),
                    container_that_must_be_removed_first: owner(container),
                })
            }
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigFile, ContainerConfig, RawConfigFile, TaskConfig, TaskRunConfig};
    use crate::execution::steps::{DockerNetwork, TaskStep};

    /// app -> (db, cache), cache -> db
    fn graph() -> DependencyGraph {
        let mut raw = RawConfigFile::default();
        for (name, deps) in [("app", vec!["db", "cache"]), ("db", vec![]), ("cache", vec!["db"])] {
            raw.container.insert(
                name.to_string(),
                ContainerConfig {
                    image: Some(format!("{name}-image")),
                    dependencies: deps.into_iter().map(String::from).collect(),
                    ..Default::default()
                },
            );
        }
        raw.task.insert(
            "t".into(),
            TaskConfig {
                description: None,
                run: TaskRunConfig {
                    container: "app".into(),
                    command: None,
                    environment: Default::default(),
                },
                dependencies: vec![],
                prerequisites: vec![],
                network: None,
            },
        );
        let cfg = ConfigFile::try_from(raw).unwrap();
        DependencyGraph::new(&cfg, "t").unwrap()
    }

    fn docker_container(id: ContainerId) -> DockerContainer {
        DockerContainer {
            id: format!("id-{}", id.index()),
            name: format!("name-{}", id.index()),
        }
    }

    fn network() -> DockerNetwork {
        DockerNetwork {
            id: "net-1".into(),
        }
    }

    fn created_and_started(graph: &DependencyGraph, names: &[&str]) -> EventLog {
        let mut events = EventLog::new();
        events.insert(TaskEvent::TaskNetworkCreated { network: network() });
        for name in names {
            let id = graph.find(name).unwrap();
            events.insert(TaskEvent::ContainerCreated {
                container: id,
                docker_container: docker_container(id),
            });
            events.insert(TaskEvent::ContainerStarted { container: id });
        }
        events
    }

    fn as_set(stage: &CleanupStage) -> BTreeSet<CleanupRule> {
        stage.rules().iter().cloned().collect()
    }

    #[test]
    fn nothing_to_clean_up_without_a_network() {
        let graph = graph();
        let stage = CleanupStagePlanner::new(&graph, OperatingSystem::Other)
            .create_stage(&EventLog::new(), CleanupBehaviour::Cleanup);

        assert!(stage.rules().is_empty());
        assert!(stage.manual_cleanup_instructions().is_empty());
    }

    #[test]
    fn all_started_containers_get_stop_remove_and_network_rules() {
        let graph = graph();
        let app = graph.find("app").unwrap();
        let db = graph.find("db").unwrap();
        let cache = graph.find("cache").unwrap();

        let events = created_and_started(&graph, &["app", "db", "cache"]);
        let stage = CleanupStagePlanner::new(&graph, OperatingSystem::Other)
            .create_stage(&events, CleanupBehaviour::Cleanup);

        let stop = |c: ContainerId, first: &[ContainerId]| CleanupRule::StopContainer {
            container: c,
            docker_container: docker_container(c),
            containers_that_must_be_stopped_first: first.iter().copied().collect(),
        };
        let remove = |c: ContainerId| CleanupRule::RemoveContainer {
            container: c,
            docker_container: docker_container(c),
            container_was_started: true,
        };

        let expected = BTreeSet::from([
            stop(app, &[]),
            stop(cache, &[app]),
            stop(db, &[app, cache]),
            remove(app),
            remove(cache),
            remove(db),
            CleanupRule::DeleteTaskNetwork {
                network: network(),
                containers_that_must_be_removed_first: BTreeSet::from([app, db, cache]),
            },
        ]);

        assert_eq!(as_set(&stage), expected);
    }

    #[test]
    fn stop_only_waits_for_dependents_that_started() {
        let graph = graph();
        let db = graph.find("db").unwrap();
        let cache = graph.find("cache").unwrap();

        let events = created_and_started(&graph, &["db", "cache"]);
        let stage = CleanupStagePlanner::new(&graph, OperatingSystem::Other)
            .create_stage(&events, CleanupBehaviour::Cleanup);

        assert!(stage.rules().contains(&CleanupRule::StopContainer {
            container: db,
            docker_container: docker_container(db),
            containers_that_must_be_stopped_first: BTreeSet::from([cache]),
        }));
        assert!(stage.rules().contains(&CleanupRule::StopContainer {
            container: cache,
            docker_container: docker_container(cache),
            containers_that_must_be_stopped_first: BTreeSet::new(),
        }));
    }

    #[test]
    fn created_but_not_started_container_is_only_removed() {
        let graph = graph();
        let db = graph.find("db").unwrap();

        let mut events = EventLog::new();
        events.insert(TaskEvent::TaskNetworkCreated { network: network() });
        events.insert(TaskEvent::ContainerCreated {
            container: db,
            docker_container: docker_container(db),
        });

        let stage = CleanupStagePlanner::new(&graph, OperatingSystem::Other)
            .create_stage(&events, CleanupBehaviour::Cleanup);

        assert_eq!(
            as_set(&stage),
            BTreeSet::from([
                CleanupRule::RemoveContainer {
                    container: db,
                    docker_container: docker_container(db),
                    container_was_started: false,
                },
                CleanupRule::DeleteTaskNetwork {
                    network: network(),
                    containers_that_must_be_removed_first: BTreeSet::from([db]),
                },
            ])
        );
    }

    #[test]
    fn custom_network_is_not_deleted() {
        let graph = graph();
        let db = graph.find("db").unwrap();

        let mut events = EventLog::new();
        events.insert(TaskEvent::CustomTaskNetworkChecked { network: network() });
        events.insert(TaskEvent::ContainerCreated {
            container: db,
            docker_container: docker_container(db),
        });

        let stage = CleanupStagePlanner::new(&graph, OperatingSystem::Other)
            .create_stage(&events, CleanupBehaviour::Cleanup);

        assert_eq!(stage.rules().len(), 1);
        assert!(matches!(stage.rules()[0], CleanupRule::RemoveContainer { .. }));
    }

    #[test]
    fn temporary_files_wait_for_their_container_when_it_was_created() {
        let graph = graph();
        let app = graph.find("app").unwrap();
        let db = graph.find("db").unwrap();

        let mut events = created_and_started(&graph, &["app"]);
        events.insert(TaskEvent::TemporaryFileCreated {
            container: app,
            path: "/tmp/passwd".into(),
        });
        events.insert(TaskEvent::TemporaryDirectoryCreated {
            container: db,
            path: "/tmp/home".into(),
        });

        let stage = CleanupStagePlanner::new(&graph, OperatingSystem::Other)
            .create_stage(&events, CleanupBehaviour::Cleanup);

        assert!(stage.rules().contains(&CleanupRule::DeleteTemporaryFile {
            path: "/tmp/passwd".into(),
            container_that_must_be_removed_first: Some(app),
        }));
        assert!(stage.rules().contains(&CleanupRule::DeleteTemporaryDirectory {
            path: "/tmp/home".into(),
            container_that_must_be_removed_first: None,
        }));
    }

    #[test]
    fn manual_instructions_are_sorted_and_skip_stop_rules() {
        let db = ContainerId(1);
        let stage = CleanupStage::new(
            [
                CleanupRule::DeleteTaskNetwork {
                    network: network(),
                    containers_that_must_be_removed_first: BTreeSet::from([db]),
                },
                CleanupRule::StopContainer {
                    container: db,
                    docker_container: docker_container(db),
                    containers_that_must_be_stopped_first: BTreeSet::new(),
                },
                CleanupRule::RemoveContainer {
                    container: db,
                    docker_container: docker_container(db),
                    container_was_started: true,
                },
            ],
            OperatingSystem::Other,
        );

        assert_eq!(
            stage.manual_cleanup_instructions(),
            &[
                "docker rm --force --volumes id-1".to_string(),
                "docker network rm net-1".to_string(),
            ]
        );
    }

    #[test]
    fn dont_cleanup_keeps_only_stop_rules_but_all_instructions() {
        let graph = graph();
        let events = created_and_started(&graph, &["app", "db", "cache"]);

        let stage = CleanupStagePlanner::new(&graph, OperatingSystem::Other)
            .create_stage(&events, CleanupBehaviour::DontCleanup);

        assert_eq!(stage.rules().len(), 3);
        assert!(
            stage
                .rules()
                .iter()
                .all(|r| matches!(r, CleanupRule::StopContainer { .. }))
        );
        assert_eq!(stage.manual_cleanup_instructions().len(), 4);
        assert_eq!(
            stage.manual_cleanup_instructions().last().map(String::as_str),
            Some("docker network rm net-1")
        );
    }

    #[test]
    fn cleanup_runs_in_dependency_respecting_order() {
        let graph = graph();
        let app = graph.find("app").unwrap();
        let db = graph.find("db").unwrap();

        let mut events = created_and_started(&graph, &["app", "db"]);
        let mut stage = CleanupStagePlanner::new(&graph, OperatingSystem::Other)
            .create_stage(&events, CleanupBehaviour::Cleanup);

        let mut executed = Vec::new();
        loop {
            match stage.pop_next_step(&events, false) {
                NextStepResult::StepReady(step) => {
                    let event = match &step {
                        TaskStep::StopContainer { container, .. } => {
                            TaskEvent::ContainerStopped { container: *container }
                        }
                        TaskStep::RemoveContainer { container, .. } => {
                            TaskEvent::ContainerRemoved { container: *container }
                        }
                        TaskStep::DeleteTaskNetwork { .. } => TaskEvent::TaskNetworkDeleted,
                        other => panic!("unexpected step {other:?}"),
                    };
                    executed.push(step);
                    events.insert(event);
                }
                NextStepResult::NoStepsReady => panic!("cleanup stalled after {executed:?}"),
                NextStepResult::StageComplete => break,
            }
        }

        let position = |pred: &dyn Fn(&TaskStep) -> bool| executed.iter().position(pred).unwrap();
        let stop_app = position(&|s| matches!(s, TaskStep::StopContainer { container, .. } if *container == app));
        let stop_db = position(&|s| matches!(s, TaskStep::StopContainer { container, .. } if *container == db));
        let remove_db = position(&|s| matches!(s, TaskStep::RemoveContainer { container, .. } if *container == db));
        let remove_app = position(&|s| matches!(s, TaskStep::RemoveContainer { container, .. } if *container == app));
        let network = position(&|s| matches!(s, TaskStep::DeleteTaskNetwork { .. }));

        assert!(stop_app < stop_db);
        assert!(stop_db < remove_db);
        assert!(stop_app < remove_app);
        assert!(remove_app < network && remove_db < network);
    }
}
