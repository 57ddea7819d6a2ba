// src/dag/mod.rs

//! Container dependency graph.
//!
//! - [`container`] holds the resolved container definitions and the
//!   [`ContainerId`] handle used everywhere else.
//! - [`graph`] builds the immutable per-task [`DependencyGraph`].
//! - [`task_order`] resolves which tasks run, and in what order, for a
//!   requested task and its prerequisites.

pub mod container;
pub mod graph;
pub mod task_order;

pub use container::{BuildImage, Container, ContainerId, ImageSource, PullImage};
pub use graph::{ContainerNode, DependencyGraph};
pub use task_order::execution_order;
