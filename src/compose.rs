use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::docker;
use crate::error::{FixtureError, Result};
use crate::wait::HostPort;
use crate::{Exporter, Fixture};

/// The slice of the compose schema we look at. The full format belongs to the
/// orchestrator; construction only verifies the target service is defined.
#[derive(Deserialize)]
struct ComposeDefinition {
    services: HashMap<String, serde_yaml::Value>,
}

/// Compose-backed exporter fixture. Owns a generated compose project name so
/// concurrent test runs of the same file do not collide.
///
/// One instance drives one stack; setup, start and tear_down must not run
/// concurrently on it.
#[derive(Debug)]
pub struct DockerCompose {
    compose_file: PathBuf,
    project: String,
    exporter_service: String,
    startup_timeout: Duration,
}

impl DockerCompose {
    pub fn new(
        compose_file: impl Into<PathBuf>,
        service: impl Into<String>,
        startup_timeout: Duration,
    ) -> Result<Self> {
        let compose_file = compose_file.into();
        let service = service.into();

        if startup_timeout.is_zero() {
            return Err(FixtureError::Config("startup timeout must be positive".to_owned()));
        }
        let raw = std::fs::read_to_string(&compose_file).map_err(|e| {
            FixtureError::Config(format!("can't read compose file {}: {e}", compose_file.display()))
        })?;
        let definition: ComposeDefinition = serde_yaml::from_str(&raw).map_err(|e| {
            FixtureError::Config(format!("invalid compose file {}: {e}", compose_file.display()))
        })?;
        if !definition.services.contains_key(&service) {
            return Err(FixtureError::Config(format!(
                "service {service} not defined in {}",
                compose_file.display()
            )));
        }

        Ok(DockerCompose {
            compose_file,
            project: format!("testkit-{}", Uuid::new_v4().simple()),
            exporter_service: service,
            startup_timeout,
        })
    }

    /// The generated compose project name the stack runs under.
    pub fn project(&self) -> &str {
        &self.project
    }

    async fn run_compose(
        &self,
        op: &'static str,
        args: &[&str],
        cancel: &CancellationToken,
    ) -> Result<Output> {
        let mut cmd = Command::new("docker");
        cmd.arg("compose")
            .arg("-f")
            .arg(&self.compose_file)
            .arg("-p")
            .arg(&self.project)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // dropping the wait below must not leave the CLI running
            .kill_on_drop(true);

        debug!(project = %self.project, op, "running docker compose");
        let child = cmd.spawn().map_err(|e| FixtureError::Infra {
            op,
            detail: format!("can't spawn docker compose: {e}"),
        })?;

        tokio::select! {
            out = child.wait_with_output() => {
                out.map_err(|e| FixtureError::Infra { op, detail: e.to_string() })
            }
            _ = cancel.cancelled() => Err(FixtureError::Cancelled { op }),
        }
    }
}

#[async_trait]
impl Fixture for DockerCompose {
    /// Brings up only the exporter service, blocking until the orchestrator
    /// reports it running (healthy, when the service defines a healthcheck).
    async fn setup(&self, cancel: &CancellationToken) -> Result<()> {
        let wait_timeout = self.startup_timeout.as_secs().max(1).to_string();
        let output = self
            .run_compose(
                "compose up",
                &[
                    "up",
                    "--detach",
                    "--wait",
                    "--wait-timeout",
                    wait_timeout.as_str(),
                    self.exporter_service.as_str(),
                ],
                cancel,
            )
            .await?;

        if !output.status.success() {
            return Err(FixtureError::Infra { op: "compose up", detail: stderr_of(&output) });
        }
        info!(project = %self.project, service = %self.exporter_service, "compose stack is up");
        Ok(())
    }

    /// Stops and removes everything belonging to the stack, volumes and
    /// orphans included. Succeeds again once the stack is already gone.
    async fn tear_down(&self, cancel: &CancellationToken) -> Result<()> {
        let output = self
            .run_compose("compose down", &["down", "--volumes", "--remove-orphans"], cancel)
            .await?;

        if !output.status.success() {
            return Err(FixtureError::Infra { op: "compose down", detail: stderr_of(&output) });
        }
        info!(project = %self.project, "compose stack removed");
        Ok(())
    }
}

#[async_trait]
impl Exporter for DockerCompose {
    /// Waits until the exporter's published port accepts connections, then
    /// resolves the externally reachable endpoint for it.
    async fn start(&self, cancel: &CancellationToken, port: &str) -> Result<String> {
        let (port_number, proto) = split_port_spec(port)?;
        if proto != "tcp" {
            return Err(FixtureError::Config(format!(
                "can't poll readiness of non-tcp port spec {port}"
            )));
        }

        let daemon = docker::Client::connect()?;
        let container = daemon.service_container(&self.project, &self.exporter_service).await?;
        let mapped = daemon.mapped_port(&container, &format!("{port_number}/{proto}")).await?;

        HostPort::new(daemon.host(), mapped, self.startup_timeout)
            .wait_until_ready(cancel)
            .await?;

        Ok(format!("http://{}:{}", daemon.host(), mapped))
    }
}

/// Splits a "9100/tcp" port spec; a bare port number counts as tcp.
fn split_port_spec(spec: &str) -> Result<(u16, &str)> {
    let (number, proto) = match spec.split_once('/') {
        Some((n, p)) => (n, p),
        None => (spec, "tcp"),
    };
    let number = number
        .parse()
        .map_err(|_| FixtureError::Config(format!("invalid port spec {spec}")))?;
    Ok((number, proto))
}

fn stderr_of(output: &Output) -> String {
    let text = String::from_utf8_lossy(&output.stderr);
    let text = text.trim();
    if text.is_empty() {
        format!("exit status {}", output.status)
    } else {
        format!("exit status {}: {text}", output.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"))
    }

    #[test]
    fn accepts_a_service_defined_in_the_compose_file() {
        let stack =
            DockerCompose::new(fixture("docker-compose.yml"), "exporter", Duration::from_secs(30))
                .unwrap();
        assert!(stack.project().starts_with("testkit-"));
    }

    #[test]
    fn generated_project_names_do_not_collide() {
        let a = DockerCompose::new(fixture("docker-compose.yml"), "exporter", Duration::from_secs(30))
            .unwrap();
        let b = DockerCompose::new(fixture("docker-compose.yml"), "exporter", Duration::from_secs(30))
            .unwrap();
        assert_ne!(a.project(), b.project());
    }

    #[test]
    fn rejects_a_missing_compose_file() {
        let err = DockerCompose::new("no/such/compose.yml", "exporter", Duration::from_secs(30))
            .unwrap_err();
        assert!(matches!(err, FixtureError::Config(_)), "got: {err:?}");
    }

    #[test]
    fn rejects_a_compose_file_with_the_wrong_shape() {
        let err = DockerCompose::new(fixture("invalid.yml"), "exporter", Duration::from_secs(30))
            .unwrap_err();
        assert!(matches!(err, FixtureError::Config(_)), "got: {err:?}");
    }

    #[test]
    fn rejects_an_undefined_service() {
        let err = DockerCompose::new(fixture("docker-compose.yml"), "collector", Duration::from_secs(30))
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("collector"), "got: {message}");
    }

    #[test]
    fn rejects_a_zero_startup_timeout() {
        let err = DockerCompose::new(fixture("docker-compose.yml"), "exporter", Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, FixtureError::Config(_)), "got: {err:?}");
    }

    #[test]
    fn port_specs_parse_with_and_without_a_protocol() {
        assert_eq!(split_port_spec("9100/tcp").unwrap(), (9100, "tcp"));
        assert_eq!(split_port_spec("9100").unwrap(), (9100, "tcp"));
        assert_eq!(split_port_spec("53/udp").unwrap(), (53, "udp"));
        assert!(split_port_spec("metrics/tcp").is_err());
    }
}
