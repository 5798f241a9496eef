//! Driving a net console session.
//!
//! Provides:
//! - `DaemonCommand` - typed builder for the daemon's flag surface
//! - `expect` / `expect_exit` - streaming, value-checked output matching

pub mod command;
pub mod matcher;

pub use command::{CommandBuildError, DaemonCommand};
pub use matcher::{MatchError, expect, expect_exit};
