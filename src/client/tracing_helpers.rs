//! Span and event helpers for client operations.

use std::time::Instant;

use tracing::{Level, Span};

use super::tracing_config::TracingConfig;

/// Create a span at a level chosen at runtime.
///
/// Each arm calls the matching `tracing::<level>_span!` macro so span
/// metadata stays static while the level is dynamic.
macro_rules! dynamic_span {
    ($level:expr, $name:expr $(, $($field:tt)*)?) => {
        match $level {
            Level::ERROR => tracing::error_span!($name $(, $($field)*)?),
            Level::WARN  => tracing::warn_span!($name $(, $($field)*)?),
            Level::INFO  => tracing::info_span!($name $(, $($field)*)?),
            Level::DEBUG => tracing::debug_span!($name $(, $($field)*)?),
            Level::TRACE => tracing::trace_span!($name $(, $($field)*)?),
        }
    };
}

/// Span covering one connection attempt, including logon.
#[expect(
    clippy::cognitive_complexity,
    reason = "five match arms from dynamic_span! expansion"
)]
pub(crate) fn connect_span(config: &TracingConfig, device: &str, generation: u64) -> Span {
    dynamic_span!(
        config.connect_level,
        "client.connect",
        device = device,
        generation = generation
    )
}

/// Span covering a request from allocation to reply.
///
/// `generation` is recorded once a connection has been obtained.
#[expect(
    clippy::cognitive_complexity,
    reason = "five match arms from dynamic_span! expansion"
)]
pub(crate) fn send_span(config: &TracingConfig, method: &str, id: u64) -> Span {
    dynamic_span!(
        config.send_level,
        "client.send",
        method = method,
        id = id,
        generation = tracing::field::Empty
    )
}

/// Span covering shutdown.
#[expect(
    clippy::cognitive_complexity,
    reason = "five match arms from dynamic_span! expansion"
)]
pub(crate) fn close_span(config: &TracingConfig, device: &str) -> Span {
    dynamic_span!(config.close_level, "client.close", device = device)
}

/// Emit an `elapsed_us` event when timing was enabled for the operation.
pub(crate) fn emit_timing_event(start: Option<Instant>) {
    if let Some(start) = start {
        let elapsed_us = start.elapsed().as_micros();
        tracing::debug!(elapsed_us = elapsed_us, "operation.timing");
    }
}
