// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::types::CleanupBehaviour;

/// Command-line arguments for `taskdock`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskdock",
    version,
    about = "Run a task and its dependencies in Docker containers.",
    long_about = None
)]
pub struct CliArgs {
    /// Task to run.
    #[arg(value_name = "TASK", required_unless_present = "list_tasks")]
    pub task: Option<String>,

    /// Path to the config file (TOML).
    ///
    /// Default: `taskdock.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "taskdock.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKDOCK_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the run plan, but don't touch Docker.
    #[arg(long)]
    pub dry_run: bool,

    /// List the tasks defined in the config file and exit.
    #[arg(long)]
    pub list_tasks: bool,

    /// Leave containers behind if the task fails.
    #[arg(long)]
    pub no_cleanup_after_failure: bool,

    /// Leave containers behind if the task succeeds.
    #[arg(long)]
    pub no_cleanup_after_success: bool,

    /// Leave containers behind whatever the outcome.
    #[arg(long)]
    pub no_cleanup: bool,

    /// Run only the given task, ignoring its prerequisite tasks.
    #[arg(long)]
    pub skip_prerequisites: bool,

    /// Maximum number of steps executing at once (unbounded if omitted).
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    pub max_parallelism: Option<u16>,
}

impl CliArgs {
    pub fn behaviour_after_failure(&self) -> CleanupBehaviour {
        behaviour(self.no_cleanup || self.no_cleanup_after_failure)
    }

    pub fn behaviour_after_success(&self) -> CleanupBehaviour {
        behaviour(self.no_cleanup || self.no_cleanup_after_success)
    }
}

fn behaviour(disabled: bool) -> CleanupBehaviour {
    if disabled {
        CleanupBehaviour::DontCleanup
    } else {
        CleanupBehaviour::Cleanup
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
