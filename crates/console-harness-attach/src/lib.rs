//! Attaching consoles to a running daemon.
//!
//! Provides:
//! - `AttachDriver` - spawn `attach <endpoint>` console sessions
//! - `wait_ready` - poll an endpoint until it accepts connections
//! - JSON-RPC wire types shared with the stub daemon

pub mod attach;
pub mod protocol;
pub mod readiness;

pub use attach::{AttachDriver, AttachError};
pub use protocol::{RpcError, RpcRequest, RpcResponse};
pub use readiness::wait_ready;
