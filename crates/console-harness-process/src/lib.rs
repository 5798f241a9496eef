//! Supervised subprocess sessions.
//!
//! Provides:
//! - `Session` - one spawned process with stdin, merged output and teardown
//! - `OutputStream` - the buffered, cursor-based view of that output
//! - Executable resolution through `PATH`

pub mod output;
pub mod resolve;
pub mod session;

pub use output::{Fill, OutputStream};
pub use resolve::resolve_executable_path;
pub use session::{Session, SessionError, SessionState, SpawnRequest, WorkDir};
