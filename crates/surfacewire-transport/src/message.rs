//! Wire protocol message types and framing.
//!
//! Every message between a host and a surface is a JSON body prefixed with a
//! 4-byte big-endian length header. A connection opens with a `hello` /
//! `welcome` exchange, after which the surface sends `invoke` requests and the
//! host answers each one, in completion order, with a response carrying the
//! request's id.

use crate::error::WireError;
use serde::{Deserialize, Serialize};
use surfacewire_types::{Invocation, IpcError, Payload, Reply, SurfaceId};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Current protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Error code: protocol version mismatch.
pub const ERR_VERSION: i32 = 1;
/// Error code: malformed or unexpected request.
pub const ERR_BAD_REQUEST: i32 = 400;
/// Error code: request sent before the handshake.
pub const ERR_HANDSHAKE_REQUIRED: i32 = 401;
/// Error code: no handler bound for the channel.
pub const ERR_UNKNOWN_CHANNEL: i32 = 404;
/// Error code: the host-side callable failed.
pub const ERR_CALLABLE: i32 = 500;

/// A wire protocol message (envelope).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    /// Message ID. A response reuses its request's ID.
    pub id: String,
    /// Message variant.
    #[serde(flatten)]
    pub kind: WireMessageKind,
}

/// The different kinds of wire messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireMessageKind {
    /// Request from a surface to the host.
    #[serde(rename = "request")]
    Request(WireRequest),
    /// Host response to a request.
    #[serde(rename = "response")]
    Response(WireResponse),
}

/// Request messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum WireRequest {
    /// Handshake: announce the surface.
    #[serde(rename = "hello")]
    Hello {
        /// Human-readable surface name.
        surface_name: String,
        /// Protocol version.
        protocol_version: u32,
    },
    /// Call a function on a channel.
    #[serde(rename = "invoke")]
    Invoke {
        channel: String,
        function: String,
        #[serde(default)]
        args: Vec<Payload>,
    },
}

/// Response messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum WireResponse {
    /// Handshake acknowledgement, carrying the identity the host assigned.
    #[serde(rename = "welcome")]
    Welcome {
        surface_id: SurfaceId,
        protocol_version: u32,
    },
    /// Call result. Absent or null means no value.
    #[serde(rename = "result")]
    Result {
        #[serde(default)]
        value: Option<Payload>,
    },
    /// Error response.
    #[serde(rename = "error")]
    Error {
        /// Error code.
        code: i32,
        /// Error message.
        message: String,
    },
}

impl WireRequest {
    pub fn invoke(invocation: Invocation) -> Self {
        WireRequest::Invoke {
            channel: invocation.channel,
            function: invocation.function,
            args: invocation.args,
        }
    }
}

impl WireResponse {
    pub fn error(code: i32, message: impl Into<String>) -> Self {
        WireResponse::Error {
            code,
            message: message.into(),
        }
    }

    /// Encode the outcome of a routed call.
    pub fn from_reply(reply: Reply) -> Self {
        match reply {
            Ok(value) => WireResponse::Result { value },
            Err(IpcError::UnknownChannel(channel)) => {
                WireResponse::error(ERR_UNKNOWN_CHANNEL, channel)
            }
            Err(IpcError::Callable(message)) => WireResponse::error(ERR_CALLABLE, message),
            Err(other) => WireResponse::error(ERR_BAD_REQUEST, other.to_string()),
        }
    }

    /// Decode a call response back into the outcome the surface sees.
    pub fn into_reply(self) -> Reply {
        match self {
            WireResponse::Result { value } => Ok(value),
            WireResponse::Error { code, message } => Err(match code {
                ERR_UNKNOWN_CHANNEL => IpcError::UnknownChannel(message),
                ERR_CALLABLE => IpcError::Callable(message),
                _ => IpcError::Transport(format!("Remote error {code}: {message}")),
            }),
            WireResponse::Welcome { .. } => Err(IpcError::Transport(
                "Unexpected welcome in response to a call".to_string(),
            )),
        }
    }
}

/// Encode a wire message to bytes (4-byte big-endian length + JSON).
pub fn encode_message(msg: &WireMessage) -> Result<Vec<u8>, serde_json::Error> {
    let json = serde_json::to_vec(msg)?;
    let len = json.len() as u32;
    let mut bytes = Vec::with_capacity(4 + json.len());
    bytes.extend_from_slice(&len.to_be_bytes());
    bytes.extend_from_slice(&json);
    Ok(bytes)
}

/// Decode the length prefix from a 4-byte header.
pub fn decode_length(header: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*header)
}

/// Parse a JSON body into a WireMessage.
pub fn decode_message(body: &[u8]) -> Result<WireMessage, serde_json::Error> {
    serde_json::from_slice(body)
}

/// Write a framed message.
pub async fn write_message<W>(writer: &mut W, msg: &WireMessage) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_message(msg)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a framed message, rejecting bodies larger than `max_size`.
pub async fn read_message<R>(reader: &mut R, max_size: u32) -> Result<WireMessage, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(WireError::ConnectionClosed);
        }
        Err(e) => return Err(WireError::Io(e)),
    }

    let len = decode_length(&header);
    if len > max_size {
        return Err(WireError::MessageTooLarge {
            size: len,
            max: max_size,
        });
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;

    let msg = decode_message(&body)?;
    Ok(msg)
}
