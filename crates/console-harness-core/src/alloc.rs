//! Randomized port and pipe-name allocation.
//!
//! Concurrently running scenarios never coordinate their choice of TCP port
//! or IPC path. Drawing from the OS entropy source keeps the chance of two
//! of them picking the same value negligible.

use std::path::Path;

use rand::{RngCore, rngs::OsRng};
use thiserror::Error;

/// Lowest port handed out by [`allocate_port`].
pub const PORT_LOW: u64 = 1024;
/// Exclusive upper bound for [`allocate_port`].
pub const PORT_HIGH: u64 = 65536;

/// Allocation error.
#[derive(Debug, Error)]
pub enum AllocError {
    #[error("Empty allocation range [{low}, {high})")]
    EmptyRange { low: u64, high: u64 },
    #[error("OS entropy source failed: {0}")]
    Entropy(#[from] rand::Error),
}

/// Draw a uniformly distributed integer in `[low, high)` from the OS entropy
/// source.
///
/// # Errors
/// Returns error if the range is empty or the entropy source fails. Entropy
/// failures are not retried.
pub fn allocate(low: u64, high: u64) -> Result<u64, AllocError> {
    if low >= high {
        return Err(AllocError::EmptyRange { low, high });
    }
    let span = high - low;
    // Largest multiple of `span` representable in a u64; draws above it are
    // rejected so the modulo below stays unbiased.
    let zone = u64::MAX - (u64::MAX % span);

    loop {
        let mut buf = [0u8; 8];
        OsRng.try_fill_bytes(&mut buf)?;
        let draw = u64::from_le_bytes(buf);
        if draw < zone {
            return Ok(low + draw % span);
        }
    }
}

/// Pick a TCP port in `[1024, 65536)`.
///
/// # Errors
/// Returns error if the entropy source fails.
pub fn allocate_port() -> Result<u16, AllocError> {
    let port = allocate(PORT_LOW, PORT_HIGH)?;
    #[allow(clippy::cast_possible_truncation)]
    Ok(port as u16)
}

/// Build an IPC endpoint path for a daemon.
///
/// Unix sockets live inside `dir`; Windows named pipes get a random suffix
/// since the pipe namespace is global.
///
/// # Errors
/// Returns error if the entropy source fails.
pub fn ipc_endpoint_path(dir: &Path) -> Result<String, AllocError> {
    if cfg!(windows) {
        Ok(format!(r"\\.\pipe\net{}", allocate(100_000, 999_999)?))
    } else {
        Ok(dir.join("net.ipc").to_string_lossy().into_owned())
    }
}
