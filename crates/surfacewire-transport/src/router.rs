//! In-process routing of invocations to channel handlers.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use surfacewire_types::{
    HostTransport, Invocation, InvokeHandler, IpcError, Reply, SurfaceId, SurfaceTransport,
};
use tracing::{debug, warn};

/// The host's handler table, keyed by channel name.
///
/// Cloning a `Router` shares the table.
#[derive(Clone, Default)]
pub struct Router {
    handlers: Arc<DashMap<String, Arc<dyn InvokeHandler>>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one invocation from `sender` to the handler bound on its channel.
    pub async fn route(&self, sender: SurfaceId, invocation: Invocation) -> Reply {
        // Release the map guard before awaiting the handler.
        let handler = self
            .handlers
            .get(&invocation.channel)
            .map(|entry| Arc::clone(entry.value()));

        match handler {
            Some(handler) => {
                handler
                    .handle(sender, &invocation.function, invocation.args)
                    .await
            }
            None => {
                warn!(channel = %invocation.channel, %sender, "No handler bound for channel");
                Err(IpcError::UnknownChannel(invocation.channel))
            }
        }
    }

    /// A new in-process surface with a fresh identity.
    pub fn connect_surface(&self) -> LocalSurface {
        LocalSurface {
            id: SurfaceId::new(),
            router: self.clone(),
        }
    }

    /// Bound channel names, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl HostTransport for Router {
    fn handle(&self, channel: &str, handler: Arc<dyn InvokeHandler>) -> Result<(), IpcError> {
        match self.handlers.entry(channel.to_string()) {
            Entry::Occupied(_) => Err(IpcError::DuplicateChannel(channel.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(handler);
                debug!(channel, "Handler bound");
                Ok(())
            }
        }
    }

    fn remove_handler(&self, channel: &str) -> bool {
        let removed = self.handlers.remove(channel).is_some();
        if removed {
            debug!(channel, "Handler removed");
        }
        removed
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("channels", &self.channels())
            .finish()
    }
}

/// An in-process surface endpoint. Every call it sends carries its identity.
#[derive(Debug, Clone)]
pub struct LocalSurface {
    id: SurfaceId,
    router: Router,
}

impl LocalSurface {
    pub fn id(&self) -> SurfaceId {
        self.id
    }
}

#[async_trait]
impl SurfaceTransport for LocalSurface {
    fn surface_id(&self) -> SurfaceId {
        self.id
    }

    async fn invoke(&self, invocation: Invocation) -> Reply {
        self.router.route(self.id, invocation).await
    }
}
