//! Error types for QRC client operations.

use std::{io, sync::Arc, time::Duration};

use crate::error::ProtocolError;

/// Failures of the transport to a Core.
///
/// Every variant names the device it concerns. I/O sources are shared behind
/// an [`Arc`] so a single failure can be handed to every request that was
/// waiting on the connection.
#[derive(Clone, Debug, thiserror::Error)]
pub enum TransportError {
    /// The Core actively refused the connection.
    #[error("connection to {device} refused")]
    Refused {
        /// Address of the Core.
        device: String,
    },
    /// The connection could not be established.
    #[error("failed to connect to {device}: {source}")]
    ConnectFailed {
        /// Address of the Core.
        device: String,
        /// Underlying socket error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The connection was not established within the connect timeout.
    #[error("connecting to {device} timed out after {elapsed:?}")]
    ConnectTimeout {
        /// Address of the Core.
        device: String,
        /// Configured connect timeout.
        elapsed: Duration,
    },
    /// The connection was closed locally.
    #[error("connection to {device} closed")]
    Closed {
        /// Address of the Core.
        device: String,
    },
    /// The Core closed the connection.
    #[error("connection to {device} ended by peer")]
    Ended {
        /// Address of the Core.
        device: String,
    },
    /// No data arrived within the configured idle timeout.
    #[error("connection to {device} idle for {elapsed:?}")]
    IdleTimeout {
        /// Address of the Core.
        device: String,
        /// Configured idle timeout.
        elapsed: Duration,
    },
    /// The Core reported that it is a standby peer.
    #[error("{device} is on standby")]
    Standby {
        /// Address of the Core.
        device: String,
    },
    /// Reading from or writing to the socket failed.
    #[error("i/o error on connection to {device}: {source}")]
    Io {
        /// Address of the Core.
        device: String,
        /// Underlying socket error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The connection attempt was cancelled before completing.
    #[error("connection attempt to {device} aborted")]
    Aborted {
        /// Address of the Core.
        device: String,
    },
}

impl TransportError {
    /// Classify a connect-time socket error.
    pub(crate) fn from_connect(device: &str, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::ConnectionRefused {
            Self::Refused {
                device: device.to_owned(),
            }
        } else {
            Self::ConnectFailed {
                device: device.to_owned(),
                source: Arc::new(err),
            }
        }
    }

    /// Classify a socket error on an established connection.
    pub(crate) fn from_io(device: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => Self::Refused {
                device: device.to_owned(),
            },
            io::ErrorKind::UnexpectedEof => Self::Ended {
                device: device.to_owned(),
            },
            _ => Self::Io {
                device: device.to_owned(),
                source: Arc::new(err),
            },
        }
    }

    /// Address of the Core this error concerns.
    #[must_use]
    pub fn device(&self) -> &str {
        match self {
            Self::Refused { device }
            | Self::ConnectFailed { device, .. }
            | Self::ConnectTimeout { device, .. }
            | Self::Closed { device }
            | Self::Ended { device }
            | Self::IdleTimeout { device, .. }
            | Self::Standby { device }
            | Self::Io { device, .. }
            | Self::Aborted { device } => device,
        }
    }

    /// Whether the connection ended without a fault on either side.
    #[must_use]
    pub fn is_orderly(&self) -> bool {
        matches!(
            self,
            Self::Closed { .. } | Self::Ended { .. } | Self::Standby { .. }
        )
    }

    pub(crate) fn metric_kind(&self) -> &'static str {
        match self {
            Self::Refused { .. } => "refused",
            Self::ConnectFailed { .. } => "connect_failed",
            Self::ConnectTimeout { .. } => "connect_timeout",
            Self::Closed { .. } => "closed",
            Self::Ended { .. } => "ended",
            Self::IdleTimeout { .. } => "idle_timeout",
            Self::Standby { .. } => "standby",
            Self::Io { .. } => "io",
            Self::Aborted { .. } => "aborted",
        }
    }
}

/// Errors emitted by [`crate::QrcClient`].
#[derive(Clone, Debug, thiserror::Error)]
pub enum ClientError {
    /// The connection could not be established or was lost.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The Core answered the request with an error object.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// No reply arrived before the request deadline.
    #[error("request {id} ({method}) to {device} timed out after {elapsed:?}")]
    RequestTimeout {
        /// Identifier of the request.
        id: u64,
        /// Method of the request.
        method: String,
        /// Address of the Core.
        device: String,
        /// Configured request timeout.
        elapsed: Duration,
    },
    /// The Core rejected the logon sent after connecting.
    #[error("logon to {device} failed: {source}")]
    Handshake {
        /// Address of the Core.
        device: String,
        /// Why the logon failed.
        #[source]
        source: Box<ClientError>,
    },
    /// The request could not be serialized.
    #[error("failed to serialize request: {0}")]
    Serialize(#[source] Arc<serde_json::Error>),
    /// A request with this identifier is already awaiting its reply.
    #[error("request id {0} is already pending")]
    DuplicateRequestId(u64),
    /// The client was shut down while the request was outstanding.
    #[error("client shut down")]
    Shutdown,
}

impl ClientError {
    /// Whether this error describes the connection rather than one request.
    ///
    /// Connection-level errors fail every outstanding request; others only
    /// concern the request that produced them.
    #[must_use]
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Handshake { .. } | Self::Shutdown
        )
    }

    /// The Core's error object, if this is a protocol error.
    #[must_use]
    pub fn protocol(&self) -> Option<&ProtocolError> {
        match self {
            Self::Protocol(err) => Some(err),
            Self::Handshake { source, .. } => source.protocol(),
            _ => None,
        }
    }

    pub(crate) fn metric_kind(&self) -> &'static str {
        match self {
            Self::Transport(err) => err.metric_kind(),
            Self::Protocol(_) => "protocol",
            Self::RequestTimeout { .. } => "request_timeout",
            Self::Handshake { .. } => "handshake",
            Self::Serialize(_) => "serialize",
            Self::DuplicateRequestId(_) => "duplicate_id",
            Self::Shutdown => "shutdown",
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn device() -> String { "core.local:1710".to_owned() }

    #[rstest]
    #[case(io::ErrorKind::ConnectionRefused, "refused")]
    #[case(io::ErrorKind::UnexpectedEof, "ended")]
    #[case(io::ErrorKind::ConnectionReset, "io")]
    fn io_errors_are_classified(#[case] kind: io::ErrorKind, #[case] expected: &str) {
        let err = TransportError::from_io("core.local:1710", io::Error::from(kind));
        assert_eq!(err.metric_kind(), expected);
        assert_eq!(err.device(), "core.local:1710");
    }

    #[test]
    fn refused_connect_is_not_a_generic_failure() {
        let err = TransportError::from_connect(
            "core.local:1710",
            io::Error::from(io::ErrorKind::ConnectionRefused),
        );
        assert!(matches!(err, TransportError::Refused { .. }));
        assert_eq!(err.to_string(), "connection to core.local:1710 refused");
    }

    #[rstest]
    #[case(ClientError::Transport(TransportError::Ended { device: device() }), true)]
    #[case(ClientError::Shutdown, true)]
    #[case(ClientError::Protocol(ProtocolError::new(8, "bad", None)), false)]
    #[case(ClientError::DuplicateRequestId(3), false)]
    #[case(
        ClientError::RequestTimeout {
            id: 1,
            method: "NoOp".into(),
            device: device(),
            elapsed: Duration::from_secs(10),
        },
        false
    )]
    fn connection_level_errors(#[case] err: ClientError, #[case] expected: bool) {
        assert_eq!(err.is_connection_level(), expected);
    }

    #[test]
    fn handshake_exposes_protocol_error() {
        let err = ClientError::Handshake {
            device: device(),
            source: Box::new(ClientError::Protocol(ProtocolError::new(10, "denied", None))),
        };
        assert_eq!(err.protocol().map(ProtocolError::code), Some(10));
        assert!(err.to_string().starts_with("logon to core.local:1710 failed"));
    }
}
