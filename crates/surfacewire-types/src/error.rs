//! Shared error type for surfacewire.

use thiserror::Error;

/// Errors visible to host or surface code.
///
/// Authorization and lookup misses are deliberately absent: those resolve to
/// "no value" rather than an error.
#[derive(Error, Debug)]
pub enum IpcError {
    /// A channel was created with an empty name.
    #[error("Invalid channel name: {0:?}")]
    InvalidChannelName(String),

    /// The transport already has a handler bound under this channel name.
    #[error("Channel already bound: {0}")]
    DuplicateChannel(String),

    /// The transport has no handler bound under this channel name.
    #[error("No handler bound for channel: {0}")]
    UnknownChannel(String),

    /// The function is not exposed by this proxy.
    #[error("Function '{function}' is not exposed on channel '{channel}'")]
    NotExposed {
        /// The proxy's channel name.
        channel: String,
        /// The requested function name.
        function: String,
    },

    /// The host-side callable failed.
    #[error("Remote call failed: {0}")]
    Callable(String),

    /// The transport could not deliver the call or its reply.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The connection to the other side is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A value could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for IpcError {
    fn from(e: serde_json::Error) -> Self {
        IpcError::Serialization(e.to_string())
    }
}

/// Convenience alias.
pub type IpcResult<T> = Result<T, IpcError>;
