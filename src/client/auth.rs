//! Logon performed on a fresh connection before it is used.

use serde_json::json;

use super::{ClientError, Connection, Credentials, QrcClient};
use crate::message::Request;

/// Method authenticating a connection.
pub const LOGON_METHOD: &str = "Logon";

pub(crate) fn logon_request(credentials: &Credentials) -> Request {
    Request::new(LOGON_METHOD).with_params(json!({
        "User": credentials.user(),
        "Password": credentials.password(),
    }))
}

/// Send `Logon` on `connection`, which is not yet visible to other callers.
///
/// Any failure, including a transport failure while waiting for the reply,
/// is reported as [`ClientError::Handshake`].
pub(crate) async fn logon(
    client: &QrcClient,
    connection: &Connection,
    credentials: &Credentials,
) -> Result<(), ClientError> {
    tracing::debug!(user = credentials.user(), "sending logon");
    match client.send_on(logon_request(credentials), connection).await {
        Ok(_) => {
            tracing::debug!(user = credentials.user(), "logon accepted");
            Ok(())
        }
        Err(err) => Err(ClientError::Handshake {
            device: connection.device().to_owned(),
            source: Box::new(err),
        }),
    }
}
