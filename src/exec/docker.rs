// src/exec/docker.rs

//! Thin async wrapper around the `docker` command-line client.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::config::HealthCheckConfig;

/// Captured result of one `docker` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl DockerOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Combined output, as a user would have seen it in a terminal.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.trim_end().to_string();
        let err = self.stderr.trim_end();
        if !err.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(err);
        }
        out
    }
}

/// Health of a container as reported by `docker inspect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// The container has no health check.
    NoHealthCheck,
    Starting,
    Healthy,
    Unhealthy,
    Exited,
}

/// One entry of `.State.Health.Log`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthCheckResult {
    pub exit_code: i64,
    pub output: String,
}

/// Everything `docker create` needs for one container.
#[derive(Debug, Clone, Default)]
pub struct CreateContainerRequest {
    pub name: String,
    pub hostname: String,
    pub image: String,
    pub network: String,
    pub command: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub working_directory: Option<String>,
    pub volumes: Vec<String>,
    pub user: Option<String>,
    pub health_check: Option<HealthCheckConfig>,
    pub interactive: bool,
}

#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run `docker <args>` and capture its output.
    pub async fn output<I, S>(&self, args: I) -> Result<DockerOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(command = ?cmd.as_std(), "running docker command");

        let output = cmd
            .output()
            .await
            .with_context(|| format!("running '{}'", self.binary))?;

        Ok(DockerOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Like [`output`](Self::output), but a non-zero exit is an error carrying
    /// the command's output. Returns trimmed stdout.
    async fn checked<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let output = self.output(args).await?;
        if !output.success() {
            bail!("{}", output.combined());
        }
        Ok(output.stdout.trim().to_string())
    }

    pub async fn build_image(
        &self,
        directory: &Path,
        dockerfile: Option<&str>,
        build_args: &BTreeMap<String, String>,
        tag: &str,
    ) -> Result<String> {
        let mut args: Vec<String> = vec!["build".into(), "--tag".into(), tag.into()];
        if let Some(dockerfile) = dockerfile {
            args.push("--file".into());
            args.push(directory.join(dockerfile).display().to_string());
        }
        for (key, value) in build_args {
            args.push("--build-arg".into());
            args.push(format!("{key}={value}"));
        }
        args.push(directory.display().to_string());

        self.checked(&args).await?;
        Ok(tag.to_string())
    }

    /// Local ID of `image`, if it has already been pulled.
    pub async fn image_id(&self, image: &str) -> Result<Option<String>> {
        let output = self
            .output(["image", "inspect", "--format", "{{.Id}}", image])
            .await?;
        Ok(output.success().then(|| output.stdout.trim().to_string()))
    }

    pub async fn pull_image(&self, image: &str) -> Result<String> {
        self.checked(["pull", image]).await?;
        match self.image_id(image).await? {
            Some(id) => Ok(id),
            None => Ok(image.to_string()),
        }
    }

    pub async fn create_network(&self, name: &str) -> Result<String> {
        self.checked(["network", "create", "--driver", "bridge", name])
            .await
    }

    pub async fn network_id(&self, name: &str) -> Result<String> {
        self.checked(["network", "inspect", "--format", "{{.Id}}", name])
            .await
    }

    pub async fn delete_network(&self, id: &str) -> Result<()> {
        self.checked(["network", "rm", id]).await.map(|_| ())
    }

    /// Returns the new container's ID.
    pub async fn create_container(&self, request: &CreateContainerRequest) -> Result<String> {
        self.checked(create_container_args(request)).await
    }

    pub async fn start_container(&self, id: &str) -> Result<()> {
        self.checked(["start", id]).await.map(|_| ())
    }

    /// Start a container with its output connected to ours and wait for it to
    /// exit. Returns the container's exit code.
    pub async fn run_attached(&self, id: &str, interactive: bool) -> Result<i32> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("start").arg("--attach");
        if interactive {
            cmd.arg("--interactive");
        }
        cmd.arg(id)
            .stdin(if interactive { Stdio::inherit() } else { Stdio::null() })
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let status = cmd
            .status()
            .await
            .with_context(|| format!("attaching to container {id}"))?;
        debug!(container = %id, status = ?status, "docker start --attach returned");

        let code = self.checked(["wait", id]).await?;
        code.parse::<i32>()
            .with_context(|| format!("parsing exit code '{code}' of container {id}"))
    }

    pub async fn health_status(&self, id: &str) -> Result<HealthStatus> {
        let raw = self
            .checked([
                "inspect",
                "--format",
                "{{.State.Status}}|{{if .State.Health}}{{.State.Health.Status}}{{end}}",
                id,
            ])
            .await?;
        Ok(parse_health_status(&raw))
    }

    /// Most recent health check run by Docker, if any.
    pub async fn last_health_check(&self, id: &str) -> Result<Option<HealthCheckResult>> {
        let raw = self
            .checked(["inspect", "--format", "{{json .State.Health.Log}}", id])
            .await?;
        parse_health_log(&raw)
    }

    pub async fn exec(&self, id: &str, working_directory: Option<&str>, command: &[String]) -> Result<DockerOutput> {
        let mut args: Vec<String> = vec!["exec".into()];
        if let Some(dir) = working_directory {
            args.push("--workdir".into());
            args.push(dir.into());
        }
        args.push(id.into());
        args.extend(command.iter().cloned());

        self.output(&args).await
    }

    pub async fn stop_container(&self, id: &str) -> Result<()> {
        self.checked(["stop", id]).await.map(|_| ())
    }

    pub async fn remove_container(&self, id: &str) -> Result<()> {
        self.checked(["rm", "--force", "--volumes", id]).await.map(|_| ())
    }
}

fn create_container_args(request: &CreateContainerRequest) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "create".into(),
        "--name".into(),
        request.name.clone(),
        "--hostname".into(),
        request.hostname.clone(),
        "--network".into(),
        request.network.clone(),
        "--network-alias".into(),
        request.hostname.clone(),
    ];

    if request.interactive {
        args.push("--interactive".into());
    }

    for (key, value) in &request.environment {
        args.push("--env".into());
        args.push(format!("{key}={value}"));
    }

    if let Some(dir) = &request.working_directory {
        args.push("--workdir".into());
        args.push(dir.clone());
    }

    for volume in &request.volumes {
        args.push("--volume".into());
        args.push(volume.clone());
    }

    if let Some(user) = &request.user {
        args.push("--user".into());
        args.push(user.clone());
    }

    if let Some(health) = &request.health_check {
        let flags = [
            ("--health-cmd", health.command.clone()),
            ("--health-interval", health.interval.clone()),
            ("--health-retries", health.retries.map(|r| r.to_string())),
            ("--health-start-period", health.start_period.clone()),
            ("--health-timeout", health.timeout.clone()),
        ];
        for (flag, value) in flags {
            if let Some(value) = value {
                args.push(flag.into());
                args.push(value);
            }
        }
    }

    args.push(request.image.clone());
    args.extend(request.command.iter().cloned());
    args
}

fn parse_health_status(raw: &str) -> HealthStatus {
    let (state, health) = raw.trim().split_once('|').unwrap_or((raw.trim(), ""));

    match health {
        "" => HealthStatus::NoHealthCheck,
        "healthy" => HealthStatus::Healthy,
        "unhealthy" => HealthStatus::Unhealthy,
        _ if matches!(state, "exited" | "dead") => HealthStatus::Exited,
        _ => HealthStatus::Starting,
    }
}

fn parse_health_log(raw: &str) -> Result<Option<HealthCheckResult>> {
    let log: Option<Vec<HealthCheckResult>> =
        serde_json::from_str(raw.trim()).with_context(|| format!("parsing health log: {raw}"))?;
    Ok(log.and_then(|mut entries| entries.pop()))
}

/// Split a command line into arguments with POSIX shell quoting rules.
pub fn split_command(command: &str) -> Result<Vec<String>> {
    shell_words::split(command).with_context(|| format!("parsing command: {command}"))
}
