use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{FixtureError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const CONNECT_DEADLINE: Duration = Duration::from_secs(1);

/// Bounded readiness wait: polls a host port until a TCP connect succeeds,
/// the startup timeout elapses, or the token is cancelled.
pub struct HostPort {
    host: String,
    port: u16,
    startup_timeout: Duration,
}

impl HostPort {
    pub fn new(host: impl Into<String>, port: u16, startup_timeout: Duration) -> Self {
        HostPort { host: host.into(), port, startup_timeout }
    }

    /// Fails no earlier than the startup timeout; overshoot is bounded by one
    /// poll interval plus the per-attempt connect deadline.
    pub async fn wait_until_ready(&self, cancel: &CancellationToken) -> Result<()> {
        let deadline = Instant::now() + self.startup_timeout;
        debug!(host = %self.host, port = self.port, "waiting for host port");

        loop {
            if cancel.is_cancelled() {
                return Err(FixtureError::Cancelled { op: "wait for host port" });
            }

            let attempt = TcpStream::connect((self.host.as_str(), self.port));
            match timeout(CONNECT_DEADLINE, attempt).await {
                Ok(Ok(_)) => {
                    debug!(host = %self.host, port = self.port, "host port is reachable");
                    return Ok(());
                }
                Ok(Err(e)) => trace!(error = %e, "port not ready"),
                Err(_) => trace!("connect attempt timed out"),
            }

            if Instant::now() >= deadline {
                return Err(FixtureError::ReadinessTimeout {
                    port: self.port,
                    timeout: self.startup_timeout,
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(FixtureError::Cancelled { op: "wait for host port" })
                }
                _ = sleep(POLL_INTERVAL) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::net::TcpListener;

    // Binds and drops a listener so the port is very likely closed.
    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn succeeds_against_a_listening_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let strategy = HostPort::new("127.0.0.1", port, Duration::from_secs(5));
        strategy.wait_until_ready(&CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn times_out_no_earlier_than_configured() {
        let port = closed_port().await;
        let startup_timeout = Duration::from_millis(400);

        let strategy = HostPort::new("127.0.0.1", port, startup_timeout);
        let started = Instant::now();
        let err = strategy.wait_until_ready(&CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, FixtureError::ReadinessTimeout { .. }), "got: {err:?}");
        assert!(started.elapsed() >= startup_timeout);
        assert!(started.elapsed() < startup_timeout + Duration::from_secs(2));
    }

    #[tokio::test]
    async fn cancellation_aborts_the_wait_promptly() {
        let port = closed_port().await;
        let cancel = CancellationToken::new();

        let aborter = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            aborter.cancel();
        });

        let strategy = HostPort::new("127.0.0.1", port, Duration::from_secs(30));
        let started = Instant::now();
        let err = strategy.wait_until_ready(&cancel).await.unwrap_err();

        assert!(matches!(err, FixtureError::Cancelled { .. }), "got: {err:?}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
