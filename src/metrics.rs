//! Metric helpers for `qrc`.
//!
//! This module defines metric names and thin wrappers around the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! the helpers compile to nothing.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking open connections.
pub const CONNECTIONS_ACTIVE: &str = "qrc_connections_active";
/// Name of the counter tracking frames read and written.
pub const FRAMES_TOTAL: &str = "qrc_frames_total";
/// Name of the counter tracking errors, labelled by `kind`.
pub const ERRORS_TOTAL: &str = "qrc_errors_total";
/// Name of the counter tracking requests that received no reply in time.
pub const REQUEST_TIMEOUTS_TOTAL: &str = "qrc_request_timeouts_total";

/// Direction of a frame relative to the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Frames received from the Core.
    Inbound,
    /// Frames sent to the Core.
    Outbound,
}

impl Direction {
    /// Label value used for this direction.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the open connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the open connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a frame travelling in `direction`.
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_TOTAL, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record an error of the given kind.
pub fn inc_errors(kind: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL, "kind" => kind).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}

/// Record a request that timed out.
pub fn inc_request_timeouts() {
    #[cfg(feature = "metrics")]
    counter!(REQUEST_TIMEOUTS_TOTAL).increment(1);
}
