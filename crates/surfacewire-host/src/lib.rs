//! Host side of surfacewire.
//!
//! A [`Channel`] binds one channel name on a host transport, tracks which
//! render surfaces may call it, and dispatches each call to a function from
//! its [`Library`].

pub mod channel;
pub mod library;

pub use channel::{Channel, ChannelStats};
pub use library::{callable, json_callable, CallResult, Callable, Library, LibraryBuilder, Resolver};
