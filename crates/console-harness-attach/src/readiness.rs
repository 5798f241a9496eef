//! Endpoint readiness polling.
//!
//! A daemon opens its RPC endpoints some time after it starts. Attaching
//! before then fails, so callers poll the endpoint with a cheap connection
//! attempt until it answers or an overall budget runs out.

use std::{io, time::Duration};

use console_harness_core::{Endpoint, Transport};
use tokio::time::Instant;

use crate::attach::AttachError;

/// Upper bound for the delay between attempts.
const MAX_BACKOFF: Duration = Duration::from_millis(500);

/// Wait until `endpoint` accepts a connection.
///
/// Attempts start `poll` apart and back off exponentially up to 500ms.
///
/// # Errors
/// Returns `EndpointNotReady` when `timeout` elapses first, or
/// `InvalidAddress` for a URL without host and port.
pub async fn wait_ready(
    endpoint: &Endpoint,
    timeout: Duration,
    poll: Duration,
) -> Result<(), AttachError> {
    if endpoint.transport() != Transport::Ipc && endpoint.host_port().is_none() {
        return Err(AttachError::InvalidAddress(endpoint.address().to_string()));
    }

    let deadline = Instant::now() + timeout;
    let mut delay = poll.max(Duration::from_millis(1));
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match probe(endpoint).await {
            Ok(()) => {
                tracing::debug!(%endpoint, attempts, "Endpoint ready");
                return Ok(());
            }
            Err(err) => tracing::trace!(%endpoint, attempts, %err, "Endpoint not ready"),
        }

        let now = Instant::now();
        if now >= deadline {
            tracing::warn!(%endpoint, attempts, ?timeout, "Endpoint never became ready");
            return Err(AttachError::EndpointNotReady {
                address: endpoint.address().to_string(),
                timeout,
            });
        }
        tokio::time::sleep(delay.min(deadline - now)).await;
        delay = (delay * 2).min(MAX_BACKOFF);
    }
}

async fn probe(endpoint: &Endpoint) -> io::Result<()> {
    match endpoint.transport() {
        Transport::Ipc => probe_ipc(endpoint.address()).await,
        Transport::Http | Transport::Ws => {
            let (host, port) = endpoint
                .host_port()
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no host:port"))?;
            tokio::net::TcpStream::connect((host, port)).await.map(drop)
        }
    }
}

#[cfg(unix)]
async fn probe_ipc(path: &str) -> io::Result<()> {
    tokio::net::UnixStream::connect(path).await.map(drop)
}

#[cfg(windows)]
async fn probe_ipc(path: &str) -> io::Result<()> {
    tokio::net::windows::named_pipe::ClientOptions::new()
        .open(path)
        .map(drop)
}
