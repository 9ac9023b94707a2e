//! Connection settings for QRC clients.

use std::{fmt, io, time::Duration};

use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpSocket;

use super::{CoreAddress, TracingConfig};
use crate::codec::MAX_FRAME_LENGTH;

/// Default bound on establishing the TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default bound on waiting for a reply.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Default period of the per-connection keep-alive timer.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);
/// Shortest accepted keep-alive period.
pub const MIN_KEEPALIVE_INTERVAL: Duration = Duration::from_millis(10);

/// Socket options applied before connecting to a Core.
///
/// Options left unset keep the operating system default.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use qrc::client::SocketOptions;
///
/// let options = SocketOptions::default()
///     .nodelay(true)
///     .keepalive(Some(Duration::from_secs(30)));
/// assert_ne!(options, SocketOptions::default());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SocketOptions {
    nodelay: Option<bool>,
    keepalive: Option<Option<Duration>>,
    linger: Option<Option<Duration>>,
    send_buffer_size: Option<u32>,
    recv_buffer_size: Option<u32>,
}

impl SocketOptions {
    /// Configure `TCP_NODELAY`.
    ///
    /// QRC traffic is small request/reply frames, so the client enables this
    /// unless told otherwise.
    #[must_use]
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = Some(enabled);
        self
    }

    /// Configure `SO_KEEPALIVE`, probing after `duration` of silence.
    ///
    /// `None` disables TCP keep-alive probes.
    #[must_use]
    pub fn keepalive(mut self, duration: Option<Duration>) -> Self {
        self.keepalive = Some(duration);
        self
    }

    /// Configure `SO_LINGER`.
    #[must_use]
    pub fn linger(mut self, duration: Option<Duration>) -> Self {
        self.linger = Some(duration);
        self
    }

    /// Configure the socket send buffer size.
    #[must_use]
    pub fn send_buffer_size(mut self, size: u32) -> Self {
        self.send_buffer_size = Some(size);
        self
    }

    /// Configure the socket receive buffer size.
    #[must_use]
    pub fn recv_buffer_size(mut self, size: u32) -> Self {
        self.recv_buffer_size = Some(size);
        self
    }

    pub(crate) fn apply(&self, socket: &TcpSocket) -> io::Result<()> {
        if let Some(enabled) = self.nodelay {
            socket.set_nodelay(enabled)?;
        }
        match self.keepalive {
            Some(Some(time)) => {
                socket.set_keepalive(true)?;
                SockRef::from(socket).set_tcp_keepalive(&TcpKeepalive::new().with_time(time))?;
            }
            Some(None) => socket.set_keepalive(false)?,
            None => {}
        }
        if let Some(linger) = self.linger {
            socket.set_linger(linger)?;
        }
        if let Some(size) = self.send_buffer_size {
            socket.set_send_buffer_size(size)?;
        }
        if let Some(size) = self.recv_buffer_size {
            socket.set_recv_buffer_size(size)?;
        }
        Ok(())
    }
}

/// User name and password sent in a `Logon` after connecting.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    user: String,
    password: String,
}

impl Credentials {
    /// Credentials for `user`.
    #[must_use]
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// The user name.
    #[must_use]
    pub fn user(&self) -> &str { &self.user }

    pub(crate) fn password(&self) -> &str { &self.password }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Settings shared by every connection a client opens.
#[derive(Clone, Debug)]
pub(crate) struct ClientConfig {
    pub(crate) address: CoreAddress,
    pub(crate) connect_timeout: Duration,
    pub(crate) request_timeout: Duration,
    pub(crate) keepalive_interval: Duration,
    pub(crate) idle_timeout: Option<Duration>,
    pub(crate) credentials: Option<Credentials>,
    pub(crate) max_frame_length: usize,
    pub(crate) socket_options: SocketOptions,
    pub(crate) tracing: TracingConfig,
}

impl ClientConfig {
    pub(crate) fn new(address: CoreAddress) -> Self {
        Self {
            address,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            idle_timeout: None,
            credentials: None,
            max_frame_length: MAX_FRAME_LENGTH,
            socket_options: SocketOptions::default().nodelay(true),
            tracing: TracingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials::new("admin", "hunter2");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = ClientConfig::new(CoreAddress::new("core", 1710));
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.keepalive_interval, Duration::from_secs(60));
        assert!(config.idle_timeout.is_none());
        assert!(config.credentials.is_none());
        assert_eq!(config.socket_options, SocketOptions::default().nodelay(true));
    }

    #[tokio::test]
    async fn options_apply_to_a_fresh_socket() {
        let socket = TcpSocket::new_v4().expect("socket");
        SocketOptions::default()
            .nodelay(true)
            .keepalive(Some(Duration::from_secs(15)))
            .apply(&socket)
            .expect("apply options");
        assert!(socket.nodelay().expect("nodelay"));
        assert!(socket.keepalive().expect("keepalive"));
    }
}
