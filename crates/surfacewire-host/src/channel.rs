//! Channel registry: one named RPC surface on the host.
//!
//! A [`Channel`] owns the set of render surfaces allowed to call it and the
//! [`Library`] its calls are resolved against. It binds itself on a
//! [`HostTransport`] under its name and answers every invocation routed there.
//!
//! Calls from surfaces outside the subscriber set, and calls to functions the
//! library cannot resolve, both complete with no value. The caller cannot tell
//! them apart from a function that returned nothing. [`Channel::stats`] is the
//! host-side view of those drops.

use crate::library::Library;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use surfacewire_types::{HostTransport, IpcError, InvokeHandler, Payload, Reply, SurfaceId};
use tracing::{debug, info, warn};

/// Counters for a channel's dispatch outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Calls that reached a callable.
    pub dispatched: u64,
    /// Calls dropped because the sender was not subscribed.
    pub dropped_unsubscribed: u64,
    /// Calls dropped because no callable was found.
    pub dropped_unresolved: u64,
    /// Calls whose callable returned an error.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicU64,
    dropped_unsubscribed: AtomicU64,
    dropped_unresolved: AtomicU64,
    failed: AtomicU64,
}

/// A host-side channel: subscriber set plus function source.
#[derive(Debug)]
pub struct Channel {
    name: String,
    library: Library,
    /// Ordered, duplicate-free.
    subscribers: RwLock<Vec<SurfaceId>>,
    counters: Counters,
}

impl Channel {
    /// Create a channel and bind it on `transport` under `name`.
    ///
    /// `initial_surface`, if given, is subscribed before the channel is bound,
    /// so its first call can never be dropped. Names that are empty or only
    /// whitespace are rejected. Name collisions are reported by the transport.
    pub fn create(
        transport: &dyn HostTransport,
        name: impl Into<String>,
        library: Library,
        initial_surface: Option<SurfaceId>,
    ) -> Result<Arc<Self>, IpcError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(IpcError::InvalidChannelName(name));
        }

        let channel = Arc::new(Self {
            name,
            library,
            subscribers: RwLock::new(Vec::new()),
            counters: Counters::default(),
        });

        if let Some(surface) = initial_surface {
            channel.subscribe(surface);
        }

        transport.handle(&channel.name, channel.clone())?;
        info!(
            channel = %channel.name,
            dynamic = channel.library.is_dynamic(),
            "Channel bound"
        );

        Ok(channel)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    /// Allow `surface` to call this channel. Subscribing twice is a no-op.
    pub fn subscribe(&self, surface: SurfaceId) {
        let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        if !subscribers.contains(&surface) {
            subscribers.push(surface);
            debug!(channel = %self.name, surface = %surface, "Surface subscribed");
        }
    }

    /// Revoke `surface`. Returns whether it was subscribed.
    pub fn unsubscribe(&self, surface: SurfaceId) -> bool {
        let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        let before = subscribers.len();
        subscribers.retain(|s| *s != surface);
        let removed = subscribers.len() != before;
        if removed {
            debug!(channel = %self.name, surface = %surface, "Surface unsubscribed");
        }
        removed
    }

    pub fn is_subscribed(&self, surface: SurfaceId) -> bool {
        let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
        subscribers.contains(&surface)
    }

    /// Snapshot of the subscriber set, in subscription order.
    pub fn subscribers(&self) -> Vec<SurfaceId> {
        let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
        subscribers.clone()
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            dropped_unsubscribed: self.counters.dropped_unsubscribed.load(Ordering::Relaxed),
            dropped_unresolved: self.counters.dropped_unresolved.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Run one call from `sender`.
    ///
    /// Returns `Ok(None)` for unsubscribed senders and unresolved functions.
    /// A callable's own failure is returned as [`IpcError::Callable`].
    pub async fn dispatch(&self, sender: SurfaceId, function: &str, args: Vec<Payload>) -> Reply {
        if !self.is_subscribed(sender) {
            self.counters
                .dropped_unsubscribed
                .fetch_add(1, Ordering::Relaxed);
            debug!(
                channel = %self.name,
                surface = %sender,
                function,
                "Dropped call from unsubscribed surface"
            );
            return Ok(None);
        }

        let Some(callable) = self.library.resolve(function) else {
            self.counters
                .dropped_unresolved
                .fetch_add(1, Ordering::Relaxed);
            debug!(
                channel = %self.name,
                surface = %sender,
                function,
                "Dropped call to unresolved function"
            );
            return Ok(None);
        };

        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        callable(args).await.map_err(|message| {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                channel = %self.name,
                function,
                error = %message,
                "Callable failed"
            );
            IpcError::Callable(message)
        })
    }
}

#[async_trait]
impl InvokeHandler for Channel {
    async fn handle(&self, sender: SurfaceId, function: &str, args: Vec<Payload>) -> Reply {
        self.dispatch(sender, function, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::callable;
    use dashmap::DashMap;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    /// Minimal HostTransport: a handler table that rejects duplicates.
    #[derive(Default)]
    struct TestTransport {
        handlers: DashMap<String, Arc<dyn InvokeHandler>>,
    }

    impl HostTransport for TestTransport {
        fn handle(&self, channel: &str, handler: Arc<dyn InvokeHandler>) -> Result<(), IpcError> {
            if self.handlers.contains_key(channel) {
                return Err(IpcError::DuplicateChannel(channel.to_string()));
            }
            self.handlers.insert(channel.to_string(), handler);
            Ok(())
        }

        fn remove_handler(&self, channel: &str) -> bool {
            self.handlers.remove(channel).is_some()
        }
    }

    /// A library whose `add` records every argument list it sees.
    fn spy_library(calls: Arc<std::sync::Mutex<Vec<Vec<Payload>>>>) -> Library {
        Library::builder()
            .function("add", move |args: Vec<Payload>| {
                calls.lock().unwrap().push(args.clone());
                async move {
                    let sum: f64 = args.iter().filter_map(Payload::as_f64).sum();
                    Ok(Some(Payload::from(sum)))
                }
            })
            .build()
    }

    #[test]
    fn test_create_binds_on_transport() {
        let transport = TestTransport::default();
        let channel = Channel::create(&transport, "math", Library::builder().build(), None).unwrap();
        assert_eq!(channel.name(), "math");
        assert!(transport.handlers.contains_key("math"));
    }

    #[test]
    fn test_create_rejects_empty_name() {
        let transport = TestTransport::default();
        let err = Channel::create(&transport, "", Library::builder().build(), None).unwrap_err();
        assert!(matches!(err, IpcError::InvalidChannelName(_)));
        let err = Channel::create(&transport, "  ", Library::builder().build(), None).unwrap_err();
        assert!(matches!(err, IpcError::InvalidChannelName(_)));
        assert!(transport.handlers.is_empty());

        Channel::create(&transport, " math ", Library::builder().build(), None).unwrap();
        assert!(transport.handlers.contains_key(" math "));
    }

    #[test]
    fn test_create_surfaces_transport_collision() {
        let transport = TestTransport::default();
        Channel::create(&transport, "math", Library::builder().build(), None).unwrap();
        let err = Channel::create(&transport, "math", Library::builder().build(), None).unwrap_err();
        assert!(matches!(err, IpcError::DuplicateChannel(name) if name == "math"));
    }

    #[test]
    fn test_initial_surface_is_subscribed() {
        let transport = TestTransport::default();
        let surface = SurfaceId::new();
        let channel =
            Channel::create(&transport, "math", Library::builder().build(), Some(surface)).unwrap();
        assert_eq!(channel.subscribers(), vec![surface]);
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let transport = TestTransport::default();
        let channel = Channel::create(&transport, "math", Library::builder().build(), None).unwrap();
        let surface = SurfaceId::new();

        channel.subscribe(surface);
        channel.subscribe(surface);
        assert_eq!(channel.subscribers().len(), 1);

        // A single removal must leave no stale copy behind.
        assert!(channel.unsubscribe(surface));
        assert!(!channel.is_subscribed(surface));
        assert!(!channel.unsubscribe(surface));
    }

    #[test]
    fn test_unsubscribe_reports_presence() {
        let transport = TestTransport::default();
        let channel = Channel::create(&transport, "math", Library::builder().build(), None).unwrap();
        let a = SurfaceId::new();
        let b = SurfaceId::new();

        assert!(!channel.unsubscribe(a));
        channel.subscribe(a);
        channel.subscribe(b);
        assert!(channel.unsubscribe(a));
        assert_eq!(channel.subscribers(), vec![b]);
    }

    #[test]
    fn test_membership_follows_set_semantics() {
        let transport = TestTransport::default();
        let channel = Channel::create(&transport, "math", Library::builder().build(), None).unwrap();
        let s = SurfaceId::new();

        // (op, expected unsubscribe result), true = subscribe
        let ops = [true, true, false, false, true, false, true, true, true, false];
        let mut model = false;
        for subscribe in ops {
            if subscribe {
                channel.subscribe(s);
                model = true;
            } else {
                assert_eq!(channel.unsubscribe(s), model);
                model = false;
            }
            assert_eq!(channel.is_subscribed(s), model);
        }
    }

    #[tokio::test]
    async fn test_dispatch_from_unsubscribed_surface_is_dropped() {
        let transport = TestTransport::default();
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
        let channel =
            Channel::create(&transport, "math", spy_library(calls.clone()), None).unwrap();

        let out = channel
            .dispatch(SurfaceId::new(), "add", vec![Payload::from(2.0), Payload::from(3.0)])
            .await
            .unwrap();

        assert_eq!(out, None);
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(channel.stats().dropped_unsubscribed, 1);
        assert_eq!(channel.stats().dispatched, 0);
    }

    #[tokio::test]
    async fn test_dispatch_invokes_exact_callable_with_exact_args() {
        let transport = TestTransport::default();
        let surface = SurfaceId::new();
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
        let channel =
            Channel::create(&transport, "math", spy_library(calls.clone()), Some(surface)).unwrap();

        let args = vec![Payload::from(2.0), Payload::from(3.0)];
        let out = channel.dispatch(surface, "add", args.clone()).await.unwrap();

        assert_eq!(out, Some(Payload::Json(json!(5.0))));
        assert_eq!(*calls.lock().unwrap(), vec![args]);
        assert_eq!(channel.stats().dispatched, 1);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_function_is_dropped() {
        let transport = TestTransport::default();
        let surface = SurfaceId::new();
        let channel =
            Channel::create(&transport, "math", Library::builder().build(), Some(surface)).unwrap();

        let out = channel.dispatch(surface, "nope", vec![]).await.unwrap();
        assert_eq!(out, None);
        assert_eq!(channel.stats().dropped_unresolved, 1);
    }

    #[tokio::test]
    async fn test_dispatch_uses_resolver_with_requested_name() {
        let transport = TestTransport::default();
        let surface = SurfaceId::new();
        let requested = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
        let seen = requested.clone();
        let library = Library::from_resolver(move |name| {
            seen.lock().unwrap().push(name.to_string());
            (name == "upper").then(|| {
                callable(|args: Vec<Payload>| async move {
                    let s = args.first().and_then(Payload::as_str).unwrap_or_default();
                    Ok(Some(Payload::from(s.to_uppercase())))
                })
            })
        });
        let channel = Channel::create(&transport, "text", library, Some(surface)).unwrap();

        let out = channel
            .dispatch(surface, "upper", vec![Payload::from("abc")])
            .await
            .unwrap();
        assert_eq!(out, Some(Payload::from("ABC")));

        let out = channel.dispatch(surface, "lower", vec![]).await.unwrap();
        assert_eq!(out, None);

        assert_eq!(*requested.lock().unwrap(), vec!["upper", "lower"]);
    }

    #[tokio::test]
    async fn test_callable_failure_propagates() {
        let transport = TestTransport::default();
        let surface = SurfaceId::new();
        let library = Library::builder()
            .function("boom", |_args: Vec<Payload>| async move {
                Err::<Option<Payload>, String>("exploded".to_string())
            })
            .build();
        let channel = Channel::create(&transport, "faulty", library, Some(surface)).unwrap();

        let err = channel.dispatch(surface, "boom", vec![]).await.unwrap_err();
        assert!(matches!(err, IpcError::Callable(ref m) if m == "exploded"));
        assert_eq!(channel.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_handler_routes_to_dispatch() {
        let transport = TestTransport::default();
        let surface = SurfaceId::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let library = Library::builder()
            .function("ping", move |_args: Vec<Payload>| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(Some(Payload::from("pong"))) }
            })
            .build();
        Channel::create(&transport, "health", library, Some(surface)).unwrap();

        let handler = transport.handlers.get("health").unwrap().value().clone();
        let out = handler.handle(surface, "ping", vec![]).await.unwrap();
        assert_eq!(out, Some(Payload::from("pong")));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
