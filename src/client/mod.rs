//! Client runtime for QRC connections.
//!
//! A [`QrcClient`] owns at most one connection to a Core at a time. It
//! connects on demand, optionally logs on, correlates replies with requests
//! by identifier, and fans unsolicited traffic out to subscribers. Losing the
//! connection fails every request written on it; the next request connects
//! again.

mod address;
mod auth;
mod builder;
mod config;
mod connection;
mod correlator;
mod error;
mod events;
mod link;
mod runtime;
mod status;
mod tracing_config;
mod tracing_helpers;

pub use address::{AddressError, CoreAddress, DEFAULT_PORT};
pub use auth::LOGON_METHOD;
pub use builder::QrcClientBuilder;
pub use config::{
    Credentials,
    DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_KEEPALIVE_INTERVAL,
    DEFAULT_REQUEST_TIMEOUT,
    MIN_KEEPALIVE_INTERVAL,
    SocketOptions,
};
pub use connection::{Connection, ConnectionState};
pub use error::{ClientError, TransportError};
pub use events::EVENT_CHANNEL_CAPACITY;
pub use runtime::QrcClient;
pub use status::{ConnectionStatus, StatusEvent, StatusObserver};
pub use tracing_config::TracingConfig;

#[cfg(test)]
mod tests;
