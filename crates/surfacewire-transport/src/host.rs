//! HostNode: TCP listener that serves channel invocations to remote surfaces.
//!
//! Each accepted connection must open with a `hello`. The host assigns the
//! connection a fresh [`SurfaceId`], answers with `welcome`, and from then on
//! routes every `invoke` on the connection through the [`Router`] with that
//! identity as the sender. Invocations run concurrently and are answered in
//! completion order.

use crate::error::WireError;
use crate::message::*;
use crate::router::Router;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use surfacewire_types::config::{WireConfig, DEFAULT_MAX_MESSAGE_SIZE};
use surfacewire_types::{Invocation, SurfaceId};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Configuration for a HostNode.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Address to bind the listener on.
    pub listen_addr: SocketAddr,
    /// Largest frame body accepted from a surface.
    pub max_message_size: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl From<&WireConfig> for HostConfig {
    fn from(config: &WireConfig) -> Self {
        Self {
            listen_addr: config.listen_addr,
            max_message_size: config.max_message_size,
        }
    }
}

/// A connected surface.
#[derive(Debug, Clone)]
pub struct SurfaceInfo {
    pub id: SurfaceId,
    /// Name the surface announced in its `hello`.
    pub name: String,
    pub address: SocketAddr,
    pub connected_at: DateTime<Utc>,
}

/// Surface lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    Connected { id: SurfaceId, name: String },
    Disconnected { id: SurfaceId },
}

/// Synchronous observer of surface events.
pub type SurfaceListener = Arc<dyn Fn(&SurfaceEvent) + Send + Sync>;

/// The host's network endpoint.
pub struct HostNode {
    config: HostConfig,
    router: Router,
    /// Actual bound address (useful when binding to port 0).
    local_addr: SocketAddr,
    surfaces: DashMap<SurfaceId, SurfaceInfo>,
    events: broadcast::Sender<SurfaceEvent>,
    listeners: RwLock<Vec<SurfaceListener>>,
}

impl HostNode {
    /// Bind the listener and start accepting surfaces.
    pub async fn start(
        config: HostConfig,
        router: Router,
    ) -> Result<(Arc<Self>, tokio::task::JoinHandle<()>), WireError> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        let local_addr = listener.local_addr()?;

        info!(%local_addr, "Host listening for surfaces");

        let (events, _) = broadcast::channel(256);
        let node = Arc::new(Self {
            config,
            router,
            local_addr,
            surfaces: DashMap::new(),
            events,
            listeners: RwLock::new(Vec::new()),
        });

        let node_clone = Arc::clone(&node);
        let accept_handle = tokio::spawn(async move {
            Self::accept_loop(listener, node_clone).await;
        });

        Ok((node, accept_handle))
    }

    /// Get the actual bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Currently connected surfaces.
    pub fn surfaces(&self) -> Vec<SurfaceInfo> {
        self.surfaces.iter().map(|e| e.value().clone()).collect()
    }

    /// Subscribe to surface connect/disconnect events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.events.subscribe()
    }

    /// Run `listener` inline for every surface event.
    ///
    /// `Connected` is delivered before the surface receives its `welcome`, so
    /// a listener that subscribes the surface to a channel wins the race with
    /// the surface's first call.
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&SurfaceEvent) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(listener));
    }

    async fn accept_loop(listener: TcpListener, node: Arc<HostNode>) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(%addr, "Accepted surface connection");
                    let node = Arc::clone(&node);
                    tokio::spawn(async move {
                        if let Err(e) = node.handle_inbound(stream, addr).await {
                            debug!(%addr, error = %e, "Surface connection ended");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Accept error");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Handshake, then serve the connection until it closes.
    async fn handle_inbound(&self, stream: TcpStream, addr: SocketAddr) -> Result<(), WireError> {
        let (mut reader, mut writer) = stream.into_split();
        let max = self.config.max_message_size;

        let msg = read_message(&mut reader, max).await?;
        let (id, name) = match msg.kind {
            WireMessageKind::Request(WireRequest::Hello {
                surface_name,
                protocol_version,
            }) => {
                if protocol_version != PROTOCOL_VERSION {
                    let err_resp = WireMessage {
                        id: msg.id,
                        kind: WireMessageKind::Response(WireResponse::error(
                            ERR_VERSION,
                            format!(
                                "Protocol version mismatch: expected {PROTOCOL_VERSION}, got {protocol_version}"
                            ),
                        )),
                    };
                    write_message(&mut writer, &err_resp).await?;
                    return Err(WireError::VersionMismatch {
                        local: PROTOCOL_VERSION,
                        remote: protocol_version,
                    });
                }

                (SurfaceId::new(), surface_name)
            }
            _ => {
                warn!(%addr, "Rejected message before hello");
                let err_resp = WireMessage {
                    id: msg.id,
                    kind: WireMessageKind::Response(WireResponse::error(
                        ERR_HANDSHAKE_REQUIRED,
                        "Handshake required: send hello first",
                    )),
                };
                write_message(&mut writer, &err_resp).await?;
                return Err(WireError::HandshakeFailed(
                    "Request sent before hello".into(),
                ));
            }
        };

        self.surfaces.insert(
            id,
            SurfaceInfo {
                id,
                name: name.clone(),
                address: addr,
                connected_at: Utc::now(),
            },
        );
        self.emit(SurfaceEvent::Connected { id, name: name.clone() });

        let welcome = WireMessage {
            id: msg.id,
            kind: WireMessageKind::Response(WireResponse::Welcome {
                surface_id: id,
                protocol_version: PROTOCOL_VERSION,
            }),
        };
        let result = match write_message(&mut writer, &welcome).await {
            Ok(()) => {
                info!(surface = %id, name = %name, %addr, "Surface connected");
                connection_loop(reader, writer, id, &self.router, max).await
            }
            Err(e) => Err(e),
        };

        self.surfaces.remove(&id);
        self.emit(SurfaceEvent::Disconnected { id });
        info!(surface = %id, "Surface disconnected");
        result
    }

    fn emit(&self, event: SurfaceEvent) {
        // Snapshot so a listener may register further listeners.
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for listener in &listeners {
            listener(&event);
        }
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for HostNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostNode")
            .field("local_addr", &self.local_addr)
            .field("surfaces", &self.surfaces.len())
            .finish()
    }
}

/// Serve invocations from one surface. Each one runs on its own task; replies
/// are funneled through a single writer task.
async fn connection_loop(
    mut reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    surface: SurfaceId,
    router: &Router,
    max_size: u32,
) -> Result<(), WireError> {
    let (tx, rx) = mpsc::unbounded_channel::<WireMessage>();
    tokio::spawn(writer_loop(writer, rx));

    loop {
        let msg = match read_message(&mut reader, max_size).await {
            Ok(m) => m,
            Err(WireError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e),
        };

        match msg.kind {
            WireMessageKind::Request(WireRequest::Invoke {
                channel,
                function,
                args,
            }) => {
                let router = router.clone();
                let tx = tx.clone();
                let id = msg.id;
                tokio::spawn(async move {
                    let reply = router
                        .route(surface, Invocation::new(channel, function, args))
                        .await;
                    let response = WireMessage {
                        id,
                        kind: WireMessageKind::Response(WireResponse::from_reply(reply)),
                    };
                    // The writer is gone once the connection drops.
                    let _ = tx.send(response);
                });
            }
            WireMessageKind::Request(WireRequest::Hello { .. }) => {
                let _ = tx.send(WireMessage {
                    id: msg.id,
                    kind: WireMessageKind::Response(WireResponse::error(
                        ERR_BAD_REQUEST,
                        "Already handshaked",
                    )),
                });
            }
            WireMessageKind::Response(_) => {
                warn!(%surface, id = %msg.id, "Unexpected response message from surface");
            }
        }
    }
}

pub(crate) async fn writer_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<WireMessage>,
) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = write_message(&mut writer, &msg).await {
            debug!(error = %e, "Write failed, stopping writer");
            break;
        }
    }
}
