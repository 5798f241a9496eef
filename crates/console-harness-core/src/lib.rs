//! Core types for the net console harness.
//!
//! This crate provides the building blocks shared by every harness layer:
//! - `allocate` / `allocate_port` - OS-entropy port and pipe-name selection
//! - `Endpoint` and `ModuleConfig` - attach targets and their advertised APIs
//! - `Template` and `Bindings` - partially dynamic expected output
//! - `SessionContext` - the fixed attributes of a spawned session
//! - `HarnessConfig` - environment-driven settings

pub mod alloc;
pub mod config;
pub mod context;
pub mod endpoint;
pub mod template;

pub use alloc::{AllocError, allocate, allocate_port, ipc_endpoint_path};
pub use config::HarnessConfig;
pub use context::SessionContext;
pub use endpoint::{ApiModule, Endpoint, ModuleConfig, Transport};
pub use template::{Bindings, FieldSource, Piece, SessionField, Template, TemplateError};
