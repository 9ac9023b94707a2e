//! Device error codes and the request-level protocol error.
//!
//! The Core answers a failed request with a numeric code and a free-form
//! message. [`ErrorCode`] maps the documented codes to fixed hints so callers
//! get a stable description regardless of firmware wording.

use std::fmt;

use serde_json::Value;

use crate::message::RpcError;

/// Error codes documented for the QRC protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// `-32700`
    ParseError,
    /// `-32600`
    InvalidRequest,
    /// `-32601`
    MethodNotFound,
    /// `-32602`
    InvalidParams,
    /// `-32603`
    ServerError,
    /// `-32604`: the addressed Core is a standby peer.
    CoreOnStandby,
    /// `2`
    InvalidPageRequestId,
    /// `3`
    BadPageRequest,
    /// `4`
    MissingFile,
    /// `5`
    ChangeGroupsExhausted,
    /// `6`
    UnknownChangeGroup,
    /// `7`
    UnknownComponentName,
    /// `8`
    UnknownControl,
    /// `9`
    IllegalMixerChannelIndex,
    /// `10`
    LogonRequired,
    /// Any code not listed above.
    Unknown(i64),
}

impl ErrorCode {
    /// Map a numeric code to its variant.
    #[must_use]
    pub fn from_code(code: i64) -> Self {
        match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32603 => Self::ServerError,
            -32604 => Self::CoreOnStandby,
            2 => Self::InvalidPageRequestId,
            3 => Self::BadPageRequest,
            4 => Self::MissingFile,
            5 => Self::ChangeGroupsExhausted,
            6 => Self::UnknownChangeGroup,
            7 => Self::UnknownComponentName,
            8 => Self::UnknownControl,
            9 => Self::IllegalMixerChannelIndex,
            10 => Self::LogonRequired,
            other => Self::Unknown(other),
        }
    }

    /// Fixed human-readable hint for the code.
    #[must_use]
    pub fn hint(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::ServerError => "Server error",
            Self::CoreOnStandby => "Core is on Standby",
            Self::InvalidPageRequestId => "Invalid Page Request ID",
            Self::BadPageRequest => "Bad Page Request",
            Self::MissingFile => "Missing file",
            Self::ChangeGroupsExhausted => "Change Groups exhausted",
            Self::UnknownChangeGroup => "Unknown change group",
            Self::UnknownComponentName => "Unknown component name",
            Self::UnknownControl => "Unknown control",
            Self::IllegalMixerChannelIndex => "Illegal mixer channel index",
            Self::LogonRequired => "Logon required",
            Self::Unknown(_) => "Unknown Error",
        }
    }
}

/// The Core rejected a specific request.
///
/// Only the caller of that request sees this error; the connection stays
/// open. A [`ErrorCode::CoreOnStandby`] error signals that the Core is not
/// authoritative and the connection is about to be closed.
///
/// # Examples
///
/// ```
/// use qrc::{ErrorCode, ProtocolError};
///
/// let err = ProtocolError::new(7, "Unknown component", None);
/// assert_eq!(err.kind(), ErrorCode::UnknownComponentName);
/// assert_eq!(err.hint(), "Unknown component name");
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct ProtocolError {
    code: i64,
    message: String,
    data: Option<Value>,
}

impl ProtocolError {
    /// Build an error from its wire fields.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }

    /// Numeric code reported by the device.
    #[must_use]
    pub fn code(&self) -> i64 { self.code }

    /// Classified code.
    #[must_use]
    pub fn kind(&self) -> ErrorCode { ErrorCode::from_code(self.code) }

    /// Fixed hint for the code.
    #[must_use]
    pub fn hint(&self) -> &'static str { self.kind().hint() }

    /// Device-supplied message.
    #[must_use]
    pub fn message(&self) -> &str { &self.message }

    /// Optional extra detail.
    #[must_use]
    pub fn data(&self) -> Option<&Value> { self.data.as_ref() }

    /// Whether the Core reported itself as a standby peer.
    #[must_use]
    pub fn is_standby(&self) -> bool { self.kind() == ErrorCode::CoreOnStandby }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {}): {}", self.hint(), self.code, self.message)
    }
}

impl std::error::Error for ProtocolError {}

impl From<RpcError> for ProtocolError {
    fn from(error: RpcError) -> Self { Self::new(error.code, error.message, error.data) }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(-32700, "Parse error")]
    #[case(-32600, "Invalid request")]
    #[case(-32601, "Method not found")]
    #[case(-32602, "Invalid params")]
    #[case(-32603, "Server error")]
    #[case(-32604, "Core is on Standby")]
    #[case(2, "Invalid Page Request ID")]
    #[case(3, "Bad Page Request")]
    #[case(4, "Missing file")]
    #[case(5, "Change Groups exhausted")]
    #[case(6, "Unknown change group")]
    #[case(7, "Unknown component name")]
    #[case(8, "Unknown control")]
    #[case(9, "Illegal mixer channel index")]
    #[case(10, "Logon required")]
    #[case(1, "Unknown Error")]
    #[case(-1, "Unknown Error")]
    fn hints_follow_code_table(#[case] code: i64, #[case] hint: &str) {
        assert_eq!(ProtocolError::new(code, "", None).hint(), hint);
    }

    #[test]
    fn display_includes_hint_code_and_message() {
        let err = ProtocolError::new(8, "no such control: gain9", None);
        assert_eq!(err.to_string(), "Unknown control (code 8): no such control: gain9");
    }

    #[test]
    fn standby_is_recognised() {
        assert!(ProtocolError::new(-32604, "standby", None).is_standby());
        assert!(!ProtocolError::new(-32603, "busy", None).is_standby());
    }

    #[test]
    fn converts_from_wire_error() {
        let err = ProtocolError::from(RpcError {
            code: 10,
            message: "Logon required".to_owned(),
            data: Some(serde_json::json!({"hint": "call Logon"})),
        });
        assert_eq!(err.kind(), ErrorCode::LogonRequired);
        assert!(err.data().is_some());
    }
}
