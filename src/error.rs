use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FixtureError>;

/// Failure surface of the fixture and scrape operations. Check failures are
/// not errors; checkers report them through their `(bool, String)` result.
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("invalid fixture configuration: {0}")]
    Config(String),
    #[error("{op}: {detail}")]
    Infra { op: &'static str, detail: String },
    #[error("port {port} did not become reachable within {timeout:?}")]
    ReadinessTimeout { port: u16, timeout: Duration },
    #[error("cannot resolve endpoint: {0}")]
    Resolution(String),
    #[error("{op} cancelled")]
    Cancelled { op: &'static str },
    #[error("http request failed: {0}")]
    Http(String),
}
