//! Attach-mode console sessions.

use std::time::Duration;

use console_harness_console::{CommandBuildError, DaemonCommand};
use console_harness_core::Endpoint;
use console_harness_process::{Session, SessionError};
use thiserror::Error;

/// Attach error.
#[derive(Debug, Error)]
pub enum AttachError {
    #[error("Endpoint {address} not ready after {timeout:?}")]
    EndpointNotReady { address: String, timeout: Duration },
    #[error("Invalid endpoint address: {0}")]
    InvalidAddress(String),
    #[error("Failed to build attach command: {0}")]
    Command(#[from] CommandBuildError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Spawns console processes that attach to an already-running daemon.
///
/// The attaching console gets its own data directory; the daemon it talks
/// to is addressed only through the endpoint.
#[derive(Debug, Clone)]
pub struct AttachDriver {
    command: DaemonCommand,
}

impl AttachDriver {
    /// Create a driver from a base command (flags may already be applied).
    #[must_use]
    pub const fn new(command: DaemonCommand) -> Self {
        Self { command }
    }

    /// Launch `attach <address>` against `endpoint`.
    ///
    /// IPC endpoints are passed as the bare path, HTTP and WS as their URL.
    /// No readiness check is made; call [`crate::wait_ready`] first.
    ///
    /// # Errors
    /// Returns error if the command cannot be built or spawned.
    pub async fn attach_to(&self, endpoint: &Endpoint) -> Result<Session, AttachError> {
        let request = self.command.clone().attach(endpoint.address()).build()?;
        tracing::info!(%endpoint, "Attaching console");
        Ok(Session::spawn(request).await?)
    }
}
