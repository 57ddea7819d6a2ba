// src/exec/mod.rs

//! Step execution layer.
//!
//! This module turns `TaskStep`s into `docker` invocations and reports the
//! outcome back to the runtime as `RuntimeEvent`s.
//!
//! - [`docker`] wraps the `docker` CLI.
//! - [`step_runner`] executes a single step and posts its events.
//! - [`executor_loop`] owns in-flight steps and handles cancellation.
//! - [`backend`] provides the `StepRunner` trait and the production
//!   `DockerStepRunner`, which tests replace with a fake.

pub mod backend;
pub mod docker;
pub mod executor_loop;
pub mod step_runner;

pub use backend::{DockerStepRunner, StepRunner};
pub use docker::DockerCli;
pub use executor_loop::{ExecutorCommand, spawn_executor};
pub use step_runner::{EventSink, StepContext};
