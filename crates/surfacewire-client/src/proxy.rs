//! Proxy factory: permission-filtered method tables over a surface transport.

use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use surfacewire_types::{
    Invocation, IpcError, IpcResult, Payload, Permission, SurfaceTransport, Value,
};
use tracing::debug;

/// One remote function a surface is allowed to call.
#[derive(Clone)]
pub struct RemoteMethod {
    channel: String,
    function: String,
    transport: Arc<dyn SurfaceTransport>,
}

impl RemoteMethod {
    pub fn name(&self) -> &str {
        &self.function
    }

    /// Perform one round trip.
    ///
    /// A binary reply is normalized into [`Value::Buffer`]; anything else is
    /// returned as-is. `Ok(None)` means the host produced no value, which
    /// includes the cases where it dropped the call.
    pub async fn call(&self, args: Vec<Payload>) -> IpcResult<Option<Value>> {
        debug!(
            channel = %self.channel,
            function = %self.function,
            args = args.len(),
            "Invoking remote function"
        );
        let reply = self
            .transport
            .invoke(Invocation::new(&self.channel, &self.function, args))
            .await?;
        Ok(reply.map(Value::from))
    }

    /// Like [`call`](Self::call), deserializing a JSON reply into `R`.
    pub async fn call_json<R: DeserializeOwned>(&self, args: Vec<Payload>) -> IpcResult<Option<R>> {
        match self.call(args).await? {
            Some(value) => Ok(Some(value.parse()?)),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for RemoteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteMethod")
            .field("channel", &self.channel)
            .field("function", &self.function)
            .finish()
    }
}

/// A surface-local view of a host channel.
///
/// Built once; the set of exposed functions never changes afterwards.
#[derive(Clone)]
pub struct Proxy {
    name: String,
    methods: BTreeMap<String, RemoteMethod>,
}

impl Proxy {
    /// Build a proxy for channel `name`.
    ///
    /// One method is installed per entry whose permission is `Allow`. Every
    /// other entry installs nothing.
    pub fn create<I, K, P>(
        transport: Arc<dyn SurfaceTransport>,
        name: impl Into<String>,
        permissions: I,
    ) -> Self
    where
        I: IntoIterator<Item = (K, P)>,
        K: Into<String>,
        P: Into<Permission>,
    {
        let name = name.into();
        let methods = permissions
            .into_iter()
            .filter_map(|(function, permission)| {
                let permission: Permission = permission.into();
                if !permission.is_allowed() {
                    return None;
                }
                let function = function.into();
                let method = RemoteMethod {
                    channel: name.clone(),
                    function: function.clone(),
                    transport: Arc::clone(&transport),
                };
                Some((function, method))
            })
            .collect::<BTreeMap<_, _>>();

        debug!(
            channel = %name,
            exposed = methods.len(),
            "Proxy created"
        );

        Self { name, methods }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The method for `function`, if it is exposed.
    pub fn method(&self, function: &str) -> Option<&RemoteMethod> {
        self.methods.get(function)
    }

    pub fn has(&self, function: &str) -> bool {
        self.methods.contains_key(function)
    }

    /// Exposed function names, sorted.
    pub fn functions(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Call `function` by name.
    ///
    /// Fails with [`IpcError::NotExposed`] without touching the transport if
    /// the function is not part of this proxy.
    pub async fn call(&self, function: &str, args: Vec<Payload>) -> IpcResult<Option<Value>> {
        match self.methods.get(function) {
            Some(method) => method.call(args).await,
            None => Err(IpcError::NotExposed {
                channel: self.name.clone(),
                function: function.to_string(),
            }),
        }
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("name", &self.name)
            .field("functions", &self.functions().collect::<Vec<_>>())
            .finish()
    }
}
