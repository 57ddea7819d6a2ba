// src/execution/mod.rs

//! The execution model: events → rules → steps, grouped into stages.
//!
//! Nothing in here performs I/O. The [`engine`](crate::engine) drives these
//! types and hands the resulting steps to an [`exec`](crate::exec) backend.

pub mod events;
pub mod rules;
pub mod stages;
pub mod steps;

pub use events::{EventLog, TaskEvent, TaskFailure};
pub use rules::{CleanupRule, ManualCleanupSortOrder, RuleEvaluation, RunRule, TaskStepRule};
pub use stages::{
    CleanupStage, CleanupStagePlanner, NextStepResult, RunStage, RunStagePlanner, Stage,
};
pub use steps::{DockerContainer, DockerImage, DockerNetwork, TaskStep};
