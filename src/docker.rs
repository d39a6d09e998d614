use bollard::container::ListContainersOptions;
use bollard::Docker;
use url::Url;

use std::collections::HashMap;
use std::env;
use std::path::Path;

use crate::error::{FixtureError, Result};

const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";
const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";

/// Daemon connection plus the host name under which published container ports
/// are reachable from this process. Honors `DOCKER_HOST` the same way the
/// docker CLI does.
pub struct Client {
    inner: Docker,
    host: String,
}

impl Client {
    pub fn connect() -> Result<Self> {
        let host = match env::var("DOCKER_HOST") {
            Ok(h) => Some(
                Url::parse(&h)
                    .map_err(|e| FixtureError::Config(format!("can't parse DOCKER_HOST {h}: {e}")))?,
            ),
            Err(_) => None,
        };

        let (connection, host) = match host {
            Some(x) if !matches!(x.scheme(), "unix" | "npipe") => (
                Docker::connect_with_http_defaults(),
                x.host_str().unwrap_or("localhost").to_owned(),
            ),
            Some(x) => (
                Docker::connect_with_socket(x.path(), 60, bollard::API_DEFAULT_VERSION),
                Self::socket_host()?,
            ),
            None => (Docker::connect_with_socket_defaults(), Self::socket_host()?),
        };

        let inner = connection.map_err(|e| FixtureError::Infra {
            op: "connect to docker daemon",
            detail: e.to_string(),
        })?;
        Ok(Client { inner, host })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Finds the id of the running container backing a compose service.
    pub async fn service_container(&self, project: &str, service: &str) -> Result<String> {
        let mut filters = HashMap::new();
        filters.insert(
            "label".to_owned(),
            vec![
                format!("{COMPOSE_PROJECT_LABEL}={project}"),
                format!("{COMPOSE_SERVICE_LABEL}={service}"),
            ],
        );

        let containers = self
            .inner
            .list_containers(Some(ListContainersOptions { all: false, filters, ..Default::default() }))
            .await
            .map_err(|e| FixtureError::Infra { op: "list service containers", detail: e.to_string() })?;

        containers.into_iter().find_map(|c| c.id).ok_or_else(|| {
            FixtureError::Resolution(format!(
                "no running container for service {service} in project {project}"
            ))
        })
    }

    /// Host port published for a container port spec such as "9100/tcp".
    pub async fn mapped_port(&self, container_id: &str, port: &str) -> Result<u16> {
        let details = self
            .inner
            .inspect_container(container_id, None)
            .await
            .map_err(|e| FixtureError::Infra { op: "inspect service container", detail: e.to_string() })?;

        let bindings = details
            .network_settings
            .and_then(|n| n.ports)
            .and_then(|mut p| p.remove(port))
            .flatten()
            .unwrap_or_default();

        bindings
            .iter()
            .find_map(|b| b.host_port.as_deref())
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| {
                FixtureError::Resolution(format!(
                    "port {port} of container {container_id} is not published"
                ))
            })
    }

    fn socket_host() -> Result<String> {
        if Path::new("/.dockerenv").is_file() {
            Self::docker_in_docker_host()
        } else {
            Ok("localhost".to_owned())
        }
    }

    fn docker_in_docker_host() -> Result<String> {
        use std::process::Command;
        use std::str::from_utf8;

        let cmd = Command::new("sh")
            .arg("-c")
            .arg("ip route|awk '/default/ { print $3 }'")
            .output()
            .map_err(|e| FixtureError::Resolution(format!("can't find docker-in-docker host: {e}")))?;

        let ip = from_utf8(&cmd.stdout)
            .map_err(|e| FixtureError::Resolution(format!("can't find docker-in-docker host: {e}")))?;
        Ok(ip.trim().to_owned())
    }
}
