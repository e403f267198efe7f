//! SurfaceConnection: the surface end of a TCP link to a [`HostNode`].
//!
//! One connection carries any number of concurrent calls. Each call is tagged
//! with a fresh request id and parked in a pending table until the response
//! with that id arrives, so replies may complete in any order. When the link
//! drops, every parked call fails with [`IpcError::ConnectionClosed`].
//!
//! [`HostNode`]: crate::host::HostNode

use crate::error::WireError;
use crate::host::writer_loop;
use crate::message::*;
use async_trait::async_trait;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use surfacewire_types::config::{WireConfig, DEFAULT_MAX_MESSAGE_SIZE};
use surfacewire_types::{Invocation, IpcError, Reply, SurfaceId, SurfaceTransport};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    pub host_addr: SocketAddr,
    /// Name announced in the `hello`.
    pub surface_name: String,
    /// Largest frame body accepted from the host.
    pub max_message_size: u32,
}

impl ConnectConfig {
    pub fn new(host_addr: SocketAddr) -> Self {
        Self {
            host_addr,
            surface_name: "surface".to_string(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl From<&WireConfig> for ConnectConfig {
    fn from(config: &WireConfig) -> Self {
        Self {
            host_addr: config.listen_addr,
            surface_name: config.surface_name.clone(),
            max_message_size: config.max_message_size,
        }
    }
}

type Pending = Arc<DashMap<String, oneshot::Sender<Reply>>>;

/// A live connection to a host.
pub struct SurfaceConnection {
    id: SurfaceId,
    name: String,
    outgoing: mpsc::UnboundedSender<WireMessage>,
    pending: Pending,
    closed: Arc<AtomicBool>,
}

impl SurfaceConnection {
    /// Connect and perform the `hello` / `welcome` handshake.
    pub async fn connect(config: ConnectConfig) -> Result<Arc<Self>, WireError> {
        info!(addr = %config.host_addr, name = %config.surface_name, "Connecting to host");
        let stream = TcpStream::connect(config.host_addr).await?;
        let (mut reader, mut writer) = stream.into_split();

        let hello = WireMessage {
            id: uuid::Uuid::new_v4().to_string(),
            kind: WireMessageKind::Request(WireRequest::Hello {
                surface_name: config.surface_name.clone(),
                protocol_version: PROTOCOL_VERSION,
            }),
        };
        write_message(&mut writer, &hello).await?;

        let response = read_message(&mut reader, config.max_message_size).await?;
        let id = match response.kind {
            WireMessageKind::Response(WireResponse::Welcome {
                surface_id,
                protocol_version,
            }) => {
                if protocol_version != PROTOCOL_VERSION {
                    return Err(WireError::VersionMismatch {
                        local: PROTOCOL_VERSION,
                        remote: protocol_version,
                    });
                }
                surface_id
            }
            WireMessageKind::Response(WireResponse::Error { code, message }) => {
                return Err(WireError::HandshakeFailed(format!(
                    "Remote error {code}: {message}"
                )));
            }
            _ => {
                return Err(WireError::HandshakeFailed(
                    "Unexpected response to hello".to_string(),
                ));
            }
        };

        info!(surface = %id, "Handshake complete");

        let (outgoing, rx) = mpsc::unbounded_channel();
        tokio::spawn(writer_loop(writer, rx));

        let pending: Pending = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));
        tokio::spawn(reader_loop(
            reader,
            config.max_message_size,
            Arc::clone(&pending),
            Arc::clone(&closed),
        ));

        Ok(Arc::new(Self {
            id,
            name: config.surface_name,
            outgoing,
            pending,
            closed,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Calls still waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }
}

impl std::fmt::Debug for SurfaceConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceConnection")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl SurfaceTransport for SurfaceConnection {
    fn surface_id(&self) -> SurfaceId {
        self.id
    }

    async fn invoke(&self, invocation: Invocation) -> Reply {
        if self.is_closed() {
            return Err(IpcError::ConnectionClosed);
        }

        let request_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id.clone(), tx);

        // The reader may have drained the table between the check and the insert.
        if self.is_closed() {
            self.pending.remove(&request_id);
            return Err(IpcError::ConnectionClosed);
        }

        let msg = WireMessage {
            id: request_id.clone(),
            kind: WireMessageKind::Request(WireRequest::invoke(invocation)),
        };
        if self.outgoing.send(msg).is_err() {
            self.pending.remove(&request_id);
            return Err(IpcError::ConnectionClosed);
        }

        rx.await.unwrap_or(Err(IpcError::ConnectionClosed))
    }
}

async fn reader_loop(
    mut reader: OwnedReadHalf,
    max_size: u32,
    pending: Pending,
    closed: Arc<AtomicBool>,
) {
    loop {
        let msg = match read_message(&mut reader, max_size).await {
            Ok(m) => m,
            Err(WireError::ConnectionClosed) => {
                debug!("Host closed the connection");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Connection to host failed");
                break;
            }
        };

        match msg.kind {
            WireMessageKind::Response(response) => match pending.remove(&msg.id) {
                Some((_, tx)) => {
                    let _ = tx.send(response.into_reply());
                }
                None => warn!(id = %msg.id, "Response for unknown request"),
            },
            WireMessageKind::Request(_) => {
                warn!(id = %msg.id, "Unexpected request from host");
            }
        }
    }

    closed.store(true, Ordering::Release);
    // Dropping the senders fails every parked call.
    pending.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostConfig, HostNode};
    use crate::router::Router;
    use std::time::Duration;
    use surfacewire_types::{HostTransport, InvokeHandler, Payload};
    use tokio::net::TcpListener;

    /// `sleep(ms, tag)` waits `ms` milliseconds, then answers `tag`.
    struct Sleeper;

    #[async_trait]
    impl InvokeHandler for Sleeper {
        async fn handle(&self, sender: SurfaceId, function: &str, args: Vec<Payload>) -> Reply {
            match function {
                "sleep" => {
                    let ms = args[0].as_i64().unwrap_or(0) as u64;
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(args.get(1).cloned())
                }
                "whoami" => Ok(Some(Payload::from(sender.to_string()))),
                "fail" => Err(IpcError::Callable("boom".to_string())),
                _ => Ok(None),
            }
        }
    }

    async fn start_host() -> Arc<HostNode> {
        let router = Router::new();
        router.handle("timer", Arc::new(Sleeper)).unwrap();
        let (node, _task) = HostNode::start(HostConfig::default(), router)
            .await
            .unwrap();
        node
    }

    #[tokio::test]
    async fn test_connect_and_invoke() {
        let node = start_host().await;
        let conn = SurfaceConnection::connect(ConnectConfig::new(node.local_addr()))
            .await
            .unwrap();

        let reply = conn
            .invoke(Invocation::new("timer", "whoami", vec![]))
            .await
            .unwrap();
        assert_eq!(reply, Some(Payload::from(conn.surface_id().to_string())));

        let reply = conn
            .invoke(Invocation::new("timer", "other", vec![]))
            .await
            .unwrap();
        assert_eq!(reply, None);
        assert_eq!(conn.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_remote_errors() {
        let node = start_host().await;
        let conn = SurfaceConnection::connect(ConnectConfig::new(node.local_addr()))
            .await
            .unwrap();

        let err = conn
            .invoke(Invocation::new("ghost", "x", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, IpcError::UnknownChannel(c) if c == "ghost"));

        let err = conn
            .invoke(Invocation::new("timer", "fail", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, IpcError::Callable(m) if m == "boom"));
    }

    #[tokio::test]
    async fn test_concurrent_calls_complete_out_of_order() {
        let node = start_host().await;
        let conn = SurfaceConnection::connect(ConnectConfig::new(node.local_addr()))
            .await
            .unwrap();

        let slow = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move {
                let reply = conn
                    .invoke(Invocation::new(
                        "timer",
                        "sleep",
                        vec![Payload::from(300i64), Payload::from("slow")],
                    ))
                    .await;
                (reply, tokio::time::Instant::now())
            })
        };
        let fast = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move {
                let reply = conn
                    .invoke(Invocation::new(
                        "timer",
                        "sleep",
                        vec![Payload::from(10i64), Payload::from("fast")],
                    ))
                    .await;
                (reply, tokio::time::Instant::now())
            })
        };

        let (slow_reply, slow_done) = slow.await.unwrap();
        let (fast_reply, fast_done) = fast.await.unwrap();
        assert_eq!(slow_reply.unwrap(), Some(Payload::from("slow")));
        assert_eq!(fast_reply.unwrap(), Some(Payload::from("fast")));
        assert!(fast_done < slow_done);
    }

    #[tokio::test]
    async fn test_dropped_link_fails_pending_calls() {
        // A fake host that welcomes, swallows one request, then hangs up.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (mut reader, mut writer) = stream.into_split();
            let hello = read_message(&mut reader, 1024 * 1024).await.unwrap();
            let welcome = WireMessage {
                id: hello.id,
                kind: WireMessageKind::Response(WireResponse::Welcome {
                    surface_id: SurfaceId::new(),
                    protocol_version: PROTOCOL_VERSION,
                }),
            };
            write_message(&mut writer, &welcome).await.unwrap();
            let _ = read_message(&mut reader, 1024 * 1024).await.unwrap();
        });

        let conn = SurfaceConnection::connect(ConnectConfig::new(addr))
            .await
            .unwrap();
        let err = conn
            .invoke(Invocation::new("timer", "sleep", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, IpcError::ConnectionClosed));

        // Give the reader a moment to observe the close.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(conn.is_closed());
        let err = conn
            .invoke(Invocation::new("timer", "sleep", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, IpcError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_handshake_error_surfaces() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (mut reader, mut writer) = stream.into_split();
            let hello = read_message(&mut reader, 1024 * 1024).await.unwrap();
            let err = WireMessage {
                id: hello.id,
                kind: WireMessageKind::Response(WireResponse::error(ERR_VERSION, "too old")),
            };
            write_message(&mut writer, &err).await.unwrap();
        });

        let err = SurfaceConnection::connect(ConnectConfig::new(addr))
            .await
            .unwrap_err();
        assert!(matches!(err, WireError::HandshakeFailed(m) if m.contains("too old")));
    }
}
