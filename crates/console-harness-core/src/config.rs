//! Harness settings read from the environment.

use std::time::Duration;

const DEFAULT_EXPECT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_EXIT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_READY_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_READY_POLL_MS: u64 = 20;

/// Harness configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Daemon command line (`NET_HARNESS_BINARY`). `None` selects the stub.
    pub binary: Option<String>,
    /// Expected product version in the banner (`NET_HARNESS_VERSION`).
    pub version: Option<String>,
    /// Expected toolchain in the banner (`NET_HARNESS_TOOLCHAIN`).
    pub toolchain: Option<String>,
    /// Bounded wait for each template match.
    pub expect_timeout: Duration,
    /// Bounded wait for process termination.
    pub exit_timeout: Duration,
    /// Overall budget for an endpoint to start accepting connections.
    pub ready_timeout: Duration,
    /// First delay between readiness attempts.
    pub ready_poll: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            binary: None,
            version: None,
            toolchain: None,
            expect_timeout: Duration::from_millis(DEFAULT_EXPECT_TIMEOUT_MS),
            exit_timeout: Duration::from_millis(DEFAULT_EXIT_TIMEOUT_MS),
            ready_timeout: Duration::from_millis(DEFAULT_READY_TIMEOUT_MS),
            ready_poll: Duration::from_millis(DEFAULT_READY_POLL_MS),
        }
    }
}

impl HarnessConfig {
    /// Read the configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            binary: text("NET_HARNESS_BINARY"),
            version: text("NET_HARNESS_VERSION"),
            toolchain: text("NET_HARNESS_TOOLCHAIN"),
            expect_timeout: millis(&lookup, "NET_HARNESS_EXPECT_TIMEOUT_MS", DEFAULT_EXPECT_TIMEOUT_MS),
            exit_timeout: millis(&lookup, "NET_HARNESS_EXIT_TIMEOUT_MS", DEFAULT_EXIT_TIMEOUT_MS),
            ready_timeout: millis(&lookup, "NET_HARNESS_READY_TIMEOUT_MS", DEFAULT_READY_TIMEOUT_MS),
            ready_poll: millis(&lookup, "NET_HARNESS_READY_POLL_MS", DEFAULT_READY_POLL_MS),
        }
    }
}

fn millis(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Duration {
    let Some(raw) = lookup(key) else {
        return Duration::from_millis(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(ms) => Duration::from_millis(ms),
        Err(err) => {
            tracing::warn!(key, value = %raw, %err, "Ignoring invalid timeout, using default");
            Duration::from_millis(default)
        }
    }
}
