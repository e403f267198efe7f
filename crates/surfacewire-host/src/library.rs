//! Function sources for host channels.
//!
//! A [`Library`] is either a fixed name → [`Callable`] map or a [`Resolver`]
//! that looks the callable up on every call. Callables are async and receive
//! the raw argument list exactly as the surface sent it.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use surfacewire_types::Payload;

/// What a callable produces: a value, no value, or a failure message.
pub type CallResult = Result<Option<Payload>, String>;

/// An async host function.
pub type Callable = Arc<dyn Fn(Vec<Payload>) -> BoxFuture<'static, CallResult> + Send + Sync>;

/// Maps a function name to a callable, or to nothing.
pub type Resolver = Arc<dyn Fn(&str) -> Option<Callable> + Send + Sync>;

/// Wrap an async closure as a [`Callable`].
pub fn callable<F, Fut>(f: F) -> Callable
where
    F: Fn(Vec<Payload>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CallResult> + Send + 'static,
{
    Arc::new(move |args: Vec<Payload>| f(args).boxed())
}

/// Wrap a typed async closure as a [`Callable`].
///
/// The JSON argument list is deserialized into `A` (usually a tuple), and the
/// result is serialized back. An empty argument list also decodes into `()`.
///
/// Decoding is strict about arity: surplus arguments fail the call instead of
/// being ignored. Any result that serializes to `null` (`()`, `None`, or
/// `Value::Null`) is reported as no value; use [`callable`] to send an
/// explicit JSON `null`.
pub fn json_callable<A, R, F, Fut>(f: F) -> Callable
where
    A: DeserializeOwned + 'static,
    R: Serialize + Send + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, String>> + Send + 'static,
{
    callable(move |args: Vec<Payload>| {
        let call = decode_args::<A>(args).map(&f);
        async move {
            let out = call?.await?;
            match serde_json::to_value(&out).map_err(|e| e.to_string())? {
                serde_json::Value::Null => Ok(None),
                value => Ok(Some(Payload::Json(value))),
            }
        }
    })
}

fn decode_args<A: DeserializeOwned>(args: Vec<Payload>) -> Result<A, String> {
    let values = args
        .into_iter()
        .map(|arg| match arg {
            Payload::Json(v) => Ok(v),
            Payload::Binary(_) => Err("binary argument passed to a JSON function".to_string()),
        })
        .collect::<Result<Vec<_>, _>>()?;
    let empty = values.is_empty();
    serde_json::from_value(serde_json::Value::Array(values)).or_else(|e| {
        // serde reads `()` as unit, which only accepts `null`.
        if empty {
            if let Ok(args) = serde_json::from_value(serde_json::Value::Null) {
                return Ok(args);
            }
        }
        Err(format!("invalid arguments: {e}"))
    })
}

/// The function source of a channel.
#[derive(Clone)]
pub enum Library {
    /// A fixed map from function name to callable.
    Static(Arc<HashMap<String, Callable>>),
    /// A resolver consulted on every call.
    Dynamic(Resolver),
}

impl Library {
    /// Start building a static library.
    pub fn builder() -> LibraryBuilder {
        LibraryBuilder::default()
    }

    /// A dynamic library backed by `resolver`.
    pub fn from_resolver<F>(resolver: F) -> Self
    where
        F: Fn(&str) -> Option<Callable> + Send + Sync + 'static,
    {
        Library::Dynamic(Arc::new(resolver))
    }

    /// Look up the callable for `function`.
    pub fn resolve(&self, function: &str) -> Option<Callable> {
        match self {
            Library::Static(functions) => functions.get(function).cloned(),
            Library::Dynamic(resolver) => resolver(function),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Library::Dynamic(_))
    }

    /// Sorted function names of a static library. `None` for resolvers.
    pub fn functions(&self) -> Option<Vec<String>> {
        match self {
            Library::Static(functions) => {
                let mut names: Vec<String> = functions.keys().cloned().collect();
                names.sort();
                Some(names)
            }
            Library::Dynamic(_) => None,
        }
    }
}

impl From<HashMap<String, Callable>> for Library {
    fn from(functions: HashMap<String, Callable>) -> Self {
        Library::Static(Arc::new(functions))
    }
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Library::Static(_) => f
                .debug_tuple("Static")
                .field(&self.functions().unwrap_or_default())
                .finish(),
            Library::Dynamic(_) => f.write_str("Dynamic(<resolver>)"),
        }
    }
}

/// Builder for [`Library::Static`].
#[derive(Default)]
pub struct LibraryBuilder {
    functions: HashMap<String, Callable>,
}

impl LibraryBuilder {
    /// Add an async function over raw payloads.
    pub fn function<F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Payload>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallResult> + Send + 'static,
    {
        self.callable(name, callable(f))
    }

    /// Add a typed async function; see [`json_callable`].
    pub fn json_function<A, R, F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        A: DeserializeOwned + 'static,
        R: Serialize + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, String>> + Send + 'static,
    {
        self.callable(name, json_callable(f))
    }

    /// Add an existing callable. A later entry with the same name wins.
    pub fn callable(mut self, name: impl Into<String>, callable: Callable) -> Self {
        self.functions.insert(name.into(), callable);
        self
    }

    pub fn build(self) -> Library {
        Library::from(self.functions)
    }
}
