//! Transports for surfacewire.
//!
//! Carries channel invocations between a host process and its render
//! surfaces, either in-process or over TCP using length-prefixed JSON frames.
//!
//! ## Architecture
//!
//! - **Router**: the host's dispatch table, keyed by channel name
//! - **LocalSurface**: an in-process surface endpoint on a Router
//! - **HostNode**: TCP listener that assigns each connection a surface identity
//!   and feeds its invocations to a Router
//! - **SurfaceConnection**: TCP client end, multiplexing concurrent calls over
//!   one connection
//! - **WireMessage**: JSON-framed protocol messages

pub mod error;
pub mod host;
pub mod message;
pub mod router;
pub mod surface;

pub use error::WireError;
pub use host::{HostConfig, HostNode, SurfaceEvent, SurfaceInfo, SurfaceListener};
pub use message::{WireMessage, WireMessageKind, WireRequest, WireResponse};
pub use router::{LocalSurface, Router};
pub use surface::{ConnectConfig, SurfaceConnection};
