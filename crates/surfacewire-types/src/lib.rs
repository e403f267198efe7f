//! Shared types and traits for surfacewire.
//!
//! This crate defines the contract between a privileged host process and the
//! render surfaces that call into it: surface identities, the values that cross
//! the transport, permission tables, the transport traits, and the error type.
//! It contains no dispatch logic.

pub mod config;
pub mod error;
pub mod payload;
pub mod permission;
pub mod surface;
pub mod transport;

pub use error::{IpcError, IpcResult};
pub use payload::{Payload, Value};
pub use permission::{Permission, PermissionTable};
pub use surface::SurfaceId;
pub use transport::{HostTransport, Invocation, InvokeHandler, Reply, SurfaceTransport};
