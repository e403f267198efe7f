//! Transport traits: the seam between the RPC layer and the raw channel.
//!
//! The host side binds one [`InvokeHandler`] per channel name on a
//! [`HostTransport`]. The surface side sends [`Invocation`]s through a
//! [`SurfaceTransport`] and awaits exactly one reply per call.

use crate::error::IpcError;
use crate::payload::Payload;
use crate::surface::SurfaceId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The outcome of one remote call. `Ok(None)` means "no value".
pub type Reply = Result<Option<Payload>, IpcError>;

/// One call addressed to a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// Channel name (the transport's routing key).
    pub channel: String,
    /// Function name within the channel.
    pub function: String,
    /// Call arguments, in order.
    #[serde(default)]
    pub args: Vec<Payload>,
}

impl Invocation {
    pub fn new(channel: impl Into<String>, function: impl Into<String>, args: Vec<Payload>) -> Self {
        Self {
            channel: channel.into(),
            function: function.into(),
            args,
        }
    }
}

/// Host-side receiver for invocations on one channel.
#[async_trait]
pub trait InvokeHandler: Send + Sync + 'static {
    /// Handle one invocation from `sender`.
    async fn handle(&self, sender: SurfaceId, function: &str, args: Vec<Payload>) -> Reply;
}

/// Host-side half of the transport: a table of handlers keyed by channel name.
pub trait HostTransport: Send + Sync {
    /// Bind `handler` under `channel`. Fails if the name is already bound.
    fn handle(&self, channel: &str, handler: Arc<dyn InvokeHandler>) -> Result<(), IpcError>;

    /// Unbind `channel`. Returns whether a handler was removed.
    fn remove_handler(&self, channel: &str) -> bool;
}

/// Surface-side half of the transport.
#[async_trait]
pub trait SurfaceTransport: Send + Sync + 'static {
    /// The identity the host sees for calls sent through this endpoint.
    fn surface_id(&self) -> SurfaceId;

    /// Send one invocation and await its single reply.
    async fn invoke(&self, invocation: Invocation) -> Reply;
}
