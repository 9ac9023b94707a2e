//! JSON-RPC envelopes exchanged with a Core.
//!
//! Outbound traffic is always a [`Request`], written as a
//! `{"jsonrpc":"2.0","method":..,"id":..,"params":..}` object. Inbound frames
//! are read as a [`ResponseEnvelope`] and immediately classified into an
//! [`Inbound`] value so that the rest of the client never inspects method
//! names by hand.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

mod inbound;

pub use inbound::{
    CHANGE_GROUP_POLL_METHOD,
    Change,
    ChangeGroupPoll,
    ENGINE_STATUS_METHOD,
    EngineState,
    EngineStatus,
    Inbound,
    Notification,
    Reply,
};

/// Protocol version tag stamped on every outbound message.
pub const JSONRPC_VERSION: &str = "2.0";

/// A command addressed to the Core.
///
/// The identifier is normally left unset and allocated by the client when the
/// request is sent. Parameters default to the literal `0`, which the Core
/// accepts for parameterless methods.
///
/// # Examples
///
/// ```
/// use qrc::message::Request;
/// use serde_json::json;
///
/// let request = Request::new("Control.Set").with_params(json!({"Name": "gain", "Value": -6}));
/// assert_eq!(request.method(), "Control.Set");
/// assert_eq!(request.id(), None);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    method: String,
    id: Option<u64>,
    params: Option<Value>,
}

impl Request {
    /// Create a request for `method` with no parameters.
    #[must_use]
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            id: None,
            params: None,
        }
    }

    /// Attach a parameter payload.
    #[must_use]
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Use a caller-chosen identifier instead of an allocated one.
    #[must_use]
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    /// Method name.
    #[must_use]
    pub fn method(&self) -> &str { &self.method }

    /// Caller-supplied identifier, if any.
    #[must_use]
    pub fn id(&self) -> Option<u64> { self.id }

    /// Parameter payload, if any.
    #[must_use]
    pub fn params(&self) -> Option<&Value> { self.params.as_ref() }

    /// Borrow the request as a wire envelope carrying `id`.
    #[must_use]
    pub fn envelope(&self, id: u64) -> RequestEnvelope<'_> {
        RequestEnvelope {
            jsonrpc: JSONRPC_VERSION,
            method: &self.method,
            id,
            params: self.params.as_ref(),
        }
    }
}

/// Wire form of a [`Request`].
#[derive(Debug, Serialize)]
pub struct RequestEnvelope<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    id: u64,
    #[serde(serialize_with = "params_or_zero")]
    params: Option<&'a Value>,
}

fn params_or_zero<S: Serializer>(params: &Option<&Value>, serializer: S) -> Result<S::Ok, S::Error> {
    match params {
        Some(value) => value.serialize(serializer),
        None => serializer.serialize_u8(0),
    }
}

/// Structured error returned by the Core for a single request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Numeric error code.
    pub code: i64,
    /// Device-supplied description.
    #[serde(default)]
    pub message: String,
    /// Optional extra detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Loosely typed inbound frame, as found on the wire.
///
/// Only [`Inbound::from_envelope`] looks at these fields; everything else in
/// the crate works with the classified form.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ResponseEnvelope {
    /// Protocol version tag.
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Identifier of the request being answered; absent or `null` for pure
    /// notifications.
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<u64>,
    /// Result payload.
    #[serde(default)]
    pub result: Option<Value>,
    /// Structured error.
    #[serde(default)]
    pub error: Option<RpcError>,
    /// Notification method name.
    #[serde(default)]
    pub method: Option<String>,
    /// Notification payload.
    #[serde(default)]
    pub params: Option<Value>,
}

/// Accept integer ids, numeric strings, and `null`; anything else counts as
/// absent.
fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(number)) => number.as_u64(),
        Some(Value::String(text)) => text.parse().ok(),
        _ => None,
    })
}
