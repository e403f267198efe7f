//! Values that cross the transport, and their client-side canonical form.
//!
//! A [`Payload`] is what the transport carries: either a JSON value or a raw
//! byte array. When a reply reaches a proxy it is normalized into a [`Value`],
//! whose binary variant is the canonical [`Bytes`] buffer.

use crate::error::{IpcError, IpcResult};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A transport-level value: a call argument or a call result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    /// Any JSON-representable value.
    Json(serde_json::Value),
    /// A raw byte array. Base64-encoded on JSON wires.
    Binary(#[serde(with = "base64_bytes")] Vec<u8>),
}

impl Payload {
    /// Serialize any value into a JSON payload.
    pub fn from_serialize<T: Serialize>(value: &T) -> IpcResult<Self> {
        Ok(Payload::Json(serde_json::to_value(value)?))
    }

    /// Borrow the JSON value, if this is a JSON payload.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Json(v) => Some(v),
            Payload::Binary(_) => None,
        }
    }

    /// Borrow the raw bytes, if this is a binary payload.
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Payload::Binary(b) => Some(b),
            Payload::Json(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_json().and_then(|v| v.as_f64())
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_json().and_then(|v| v.as_i64())
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_json().and_then(|v| v.as_str())
    }

    /// Deserialize a JSON payload into `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> IpcResult<T> {
        match self {
            Payload::Json(v) => Ok(T::deserialize(v)?),
            Payload::Binary(_) => Err(IpcError::Serialization(
                "expected a JSON payload, got binary".to_string(),
            )),
        }
    }
}

impl From<serde_json::Value> for Payload {
    fn from(v: serde_json::Value) -> Self {
        Payload::Json(v)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(v: Vec<u8>) -> Self {
        Payload::Binary(v)
    }
}

impl From<&[u8]> for Payload {
    fn from(v: &[u8]) -> Self {
        Payload::Binary(v.to_vec())
    }
}

impl From<Bytes> for Payload {
    fn from(v: Bytes) -> Self {
        Payload::Binary(v.to_vec())
    }
}

impl From<&str> for Payload {
    fn from(v: &str) -> Self {
        Payload::Json(serde_json::Value::from(v))
    }
}

impl From<String> for Payload {
    fn from(v: String) -> Self {
        Payload::Json(serde_json::Value::from(v))
    }
}

impl From<bool> for Payload {
    fn from(v: bool) -> Self {
        Payload::Json(serde_json::Value::from(v))
    }
}

impl From<i64> for Payload {
    fn from(v: i64) -> Self {
        Payload::Json(serde_json::Value::from(v))
    }
}

impl From<f64> for Payload {
    fn from(v: f64) -> Self {
        Payload::Json(serde_json::Value::from(v))
    }
}

impl From<Value> for Payload {
    fn from(v: Value) -> Self {
        match v {
            Value::Json(j) => Payload::Json(j),
            Value::Buffer(b) => Payload::Binary(b.to_vec()),
        }
    }
}

/// A call result as handed to surface code.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Any JSON-representable value, passed through unchanged.
    Json(serde_json::Value),
    /// A binary reply, normalized into the canonical buffer type.
    Buffer(Bytes),
}

impl Value {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(v) => Some(v),
            Value::Buffer(_) => None,
        }
    }

    pub fn as_buffer(&self) -> Option<&Bytes> {
        match self {
            Value::Buffer(b) => Some(b),
            Value::Json(_) => None,
        }
    }

    /// Deserialize a JSON value into `T`.
    pub fn parse<T: DeserializeOwned>(self) -> IpcResult<T> {
        match self {
            Value::Json(v) => Ok(serde_json::from_value(v)?),
            Value::Buffer(_) => Err(IpcError::Serialization(
                "expected a JSON value, got a buffer".to_string(),
            )),
        }
    }
}

impl From<Payload> for Value {
    fn from(p: Payload) -> Self {
        match p {
            Payload::Json(v) => Value::Json(v),
            Payload::Binary(b) => Value::Buffer(Bytes::from(b)),
        }
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}
