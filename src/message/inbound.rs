//! Classification of inbound frames.
//!
//! Each decoded frame becomes exactly one [`Inbound`] variant:
//!
//! 1. an `error` member with an id answers that request ([`Inbound::Reply`]);
//!    without an id it is a [`Inbound::Fault`];
//! 2. `method: "EngineStatus"` without an id is an [`Inbound::EngineStatus`];
//! 3. `method: "ChangeGroup.Poll"` is an [`Inbound::ChangeGroupPoll`];
//! 4. any other `method` is a generic [`Inbound::Notification`];
//! 5. an id alone answers that request with its `result`;
//! 6. anything else is [`Inbound::Unaddressed`] and ignored.
//!
//! Whatever its variant, a frame carrying an id also answers that request;
//! [`Inbound::reply`] extracts the answer.

use serde::Deserialize;
use serde_json::Value;

use super::{ResponseEnvelope, RpcError};
use crate::codec::{FrameDecodeError, parse_frame};

/// Method name of engine status notifications.
pub const ENGINE_STATUS_METHOD: &str = "EngineStatus";

/// Method name of change group poll results.
pub const CHANGE_GROUP_POLL_METHOD: &str = "ChangeGroup.Poll";

/// A classified inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// Answer to an outstanding request.
    Reply(Reply),
    /// Engine state change.
    EngineStatus(EngineStatus),
    /// Batch of control changes from a change group.
    ChangeGroupPoll(ChangeGroupPoll),
    /// Any other notification.
    Notification(Notification),
    /// Error not tied to a request.
    Fault(RpcError),
    /// Frame with neither an id nor a method.
    Unaddressed,
}

impl Inbound {
    /// Parse and classify one frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`FrameDecodeError`] if the payload is not JSON or not a
    /// response object.
    pub fn decode(frame: &[u8]) -> Result<Self, FrameDecodeError> {
        let value = parse_frame(frame)?;
        Self::from_value(value).map_err(|source| FrameDecodeError::new(frame, source))
    }

    /// Classify an already parsed JSON value.
    ///
    /// # Errors
    ///
    /// Returns the deserializer error when `value` is not a response object.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value::<ResponseEnvelope>(value).map(Self::from_envelope)
    }

    /// Classify a wire envelope.
    #[must_use]
    pub fn from_envelope(envelope: ResponseEnvelope) -> Self {
        let ResponseEnvelope {
            id,
            result,
            error,
            method,
            params,
            ..
        } = envelope;

        if let Some(error) = error {
            return match id {
                Some(id) => Self::Reply(Reply {
                    id,
                    outcome: Err(error),
                }),
                None => Self::Fault(error),
            };
        }

        match method.as_deref() {
            Some(ENGINE_STATUS_METHOD) if id.is_none() => {
                let payload = params.clone().unwrap_or(Value::Null);
                match serde_json::from_value::<EngineStatus>(payload) {
                    Ok(status) => Self::EngineStatus(status),
                    Err(_) => Self::Notification(Notification {
                        method: ENGINE_STATUS_METHOD.to_owned(),
                        params: params.unwrap_or(Value::Null),
                        id: None,
                        result,
                    }),
                }
            }
            Some(CHANGE_GROUP_POLL_METHOD) => {
                let payload = result.or(params).unwrap_or(Value::Null);
                match ChangeGroupPoll::from_payload(id, payload) {
                    Ok(poll) => Self::ChangeGroupPoll(poll),
                    Err(payload) => Self::Notification(Notification {
                        method: CHANGE_GROUP_POLL_METHOD.to_owned(),
                        result: id.map(|_| payload.clone()),
                        params: payload,
                        id,
                    }),
                }
            }
            Some(other) => Self::Notification(Notification {
                method: other.to_owned(),
                params: params.unwrap_or(Value::Null),
                id,
                result,
            }),
            None => match id {
                Some(id) => Self::Reply(Reply {
                    id,
                    outcome: Ok(result.unwrap_or(Value::Null)),
                }),
                None => Self::Unaddressed,
            },
        }
    }

    /// The reply this frame carries for an outstanding request, if any.
    #[must_use]
    pub fn reply(&self) -> Option<Reply> {
        match self {
            Self::Reply(reply) => Some(reply.clone()),
            Self::ChangeGroupPoll(poll) => poll.reply(),
            Self::Notification(notification) => notification.reply(),
            _ => None,
        }
    }
}

/// Outcome of a request, keyed by its identifier.
#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    /// Identifier of the answered request.
    pub id: u64,
    /// Result payload or device error.
    pub outcome: Result<Value, RpcError>,
}

/// A notification the client has no dedicated handling for.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    /// Method name.
    pub method: String,
    /// Payload, `null` when absent.
    pub params: Value,
    /// Request this frame also answers.
    pub id: Option<u64>,
    /// Result member, when present.
    pub result: Option<Value>,
}

impl Notification {
    fn reply(&self) -> Option<Reply> {
        self.id.map(|id| Reply {
            id,
            outcome: Ok(self.result.clone().unwrap_or(Value::Null)),
        })
    }
}

/// Engine state reported by `EngineStatus`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum EngineState {
    /// No design is running.
    Idle,
    /// The Core is running a design and is authoritative.
    Active,
    /// The Core is a standby peer and must not be controlled.
    Standby,
    /// A state this client does not know about.
    #[serde(other)]
    Unknown,
}

/// Payload of an `EngineStatus` notification.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EngineStatus {
    /// Current engine state.
    pub state: EngineState,
    /// Name of the running design.
    #[serde(default)]
    pub design_name: Option<String>,
    /// Unique code of the running design.
    #[serde(default)]
    pub design_code: Option<String>,
    /// Whether the Core is part of a redundant pair.
    #[serde(default)]
    pub is_redundant: Option<bool>,
    /// Whether the Core is an emulator.
    #[serde(default)]
    pub is_emulator: Option<bool>,
    /// Hardware platform name.
    #[serde(default)]
    pub platform: Option<String>,
}

/// A single control change reported by a change group.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Change {
    /// Owning component for component-scoped controls.
    #[serde(default)]
    pub component: Option<String>,
    /// Control name.
    pub name: String,
    /// New value.
    #[serde(default)]
    pub value: Value,
    /// New value rendered as text.
    #[serde(default)]
    pub string: String,
}

/// A `ChangeGroup.Poll` result.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeGroupPoll {
    /// Request answered by this poll, when it was solicited.
    pub id: Option<u64>,
    /// Change group identifier.
    pub group: Option<String>,
    /// Changes in device order.
    pub changes: Vec<Change>,
    result: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PollBody {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    changes: Vec<Change>,
}

impl ChangeGroupPoll {
    /// Hands `payload` back when it does not have the expected shape.
    fn from_payload(id: Option<u64>, payload: Value) -> Result<Self, Value> {
        match PollBody::deserialize(&payload) {
            Ok(body) => Ok(Self {
                id,
                group: body.id.map(|group| match group {
                    Value::String(text) => text,
                    other => other.to_string(),
                }),
                changes: body.changes,
                result: payload,
            }),
            Err(_) => Err(payload),
        }
    }

    /// Read a poll out of the plain result of request `id`.
    ///
    /// The Core answers a `ChangeGroup.Poll` request without repeating the
    /// method, so the result is only recognisable through the request.
    pub(crate) fn from_result(id: u64, result: Value) -> Option<Self> {
        Self::from_payload(Some(id), result).ok()
    }

    /// The raw payload, as a request result.
    #[must_use]
    pub fn result(&self) -> &Value { &self.result }

    fn reply(&self) -> Option<Reply> {
        self.id.map(|id| Reply {
            id,
            outcome: Ok(self.result.clone()),
        })
    }
}
