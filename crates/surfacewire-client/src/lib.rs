//! Surface side of surfacewire.
//!
//! [`Proxy::create`] turns a channel name and a permission table into a table
//! of [`RemoteMethod`]s, one per allowed function. Denied functions are simply
//! absent.

pub mod proxy;

pub use proxy::{Proxy, RemoteMethod};
