//!
//! Fixtures for integration tests that need a live Prometheus-compatible
//! exporter behind a Docker Compose stack. A test brings the stack up with
//! [`Fixture::setup`], obtains a reachable scrape endpoint with
//! [`Exporter::start`], scrapes it through an [`HttpClient`], runs one or more
//! [`MetricFamiliesChecker`]s against the parsed metric families, and releases
//! everything with [`Fixture::tear_down`].
//!
//! Access to a local or remote docker daemon is required (honoring
//! `DOCKER_HOST`), along with a docker CLI that knows `docker compose`.
//!

mod check;
mod compose;
mod docker;
mod error;
mod http;
mod scrape;
mod wait;

pub use check::{HasMetric, MetricFamiliesChecker, SampleAbove};
pub use compose::DockerCompose;
pub use error::{FixtureError, Result};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use scrape::{parse_metric_families, sample_value, scrape, MetricFamily};
pub use wait::HostPort;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A test resource with an explicit bring-up and tear-down lifecycle.
///
/// Callers run `setup` once before use and `tear_down` on completion, pass or
/// fail. Operations on one instance must not run concurrently.
#[async_trait]
pub trait Fixture {
    async fn setup(&self, cancel: &CancellationToken) -> Result<()>;
    async fn tear_down(&self, cancel: &CancellationToken) -> Result<()>;
}

/// A service under test that can report a reachable scrape endpoint.
///
/// `port` is the container-side listening port as a port spec such as
/// `"9100/tcp"` (the `/tcp` suffix may be omitted). The returned endpoint is
/// an `http://<host>:<mapped-port>` URL usable from the test process.
#[async_trait]
pub trait Exporter {
    async fn start(&self, cancel: &CancellationToken, port: &str) -> Result<String>;
}
