#![doc(html_root_url = "https://docs.rs/qrc/latest")]
//! Asynchronous client for the QRC remote-control protocol.
//!
//! QRC carries JSON-RPC 2.0 messages over TCP, each terminated by a NUL
//! byte. This crate provides the framing codec, typed message envelopes, the
//! device error catalogue, and a connection-managing [`QrcClient`].

pub mod client;
pub mod codec;
pub mod error;
pub mod message;
pub mod metrics;

pub use client::{
    ClientError,
    Connection,
    ConnectionState,
    ConnectionStatus,
    CoreAddress,
    Credentials,
    QrcClient,
    QrcClientBuilder,
    TransportError,
};
pub use codec::{FrameBuffer, NulDelimitedCodec};
pub use error::{ErrorCode, ProtocolError};
pub use message::{Inbound, Request};
pub use metrics::{CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL, FRAMES_TOTAL, REQUEST_TIMEOUTS_TOTAL};
