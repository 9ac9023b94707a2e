//! Builder for configuring a QRC client.

use std::time::Duration;

use super::{
    CoreAddress,
    Credentials,
    QrcClient,
    SocketOptions,
    TracingConfig,
    config::{ClientConfig, MIN_KEEPALIVE_INTERVAL},
};

/// Builder for [`QrcClient`].
///
/// Building does not connect; the client connects on first use.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use qrc::client::{CoreAddress, Credentials, QrcClientBuilder};
///
/// let client = QrcClientBuilder::new(CoreAddress::new("10.0.0.5", 1710))
///     .request_timeout(Duration::from_secs(5))
///     .credentials(Credentials::new("admin", "1234"))
///     .build();
/// assert_eq!(client.address().port(), 1710);
/// ```
#[derive(Clone, Debug)]
pub struct QrcClientBuilder {
    config: ClientConfig,
}

impl QrcClientBuilder {
    /// Start from the defaults for the Core at `address`.
    #[must_use]
    pub fn new(address: CoreAddress) -> Self {
        Self {
            config: ClientConfig::new(address),
        }
    }

    /// Bound on establishing the TCP connection. Defaults to 30 seconds.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Bound on waiting for each reply. Defaults to 10 seconds.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Period of the per-connection keep-alive timer. Defaults to 60 seconds.
    ///
    /// Periods shorter than [`MIN_KEEPALIVE_INTERVAL`] are raised to it.
    #[must_use]
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.config.keepalive_interval = interval.max(MIN_KEEPALIVE_INTERVAL);
        self
    }

    /// Close the connection when nothing arrives for `timeout`.
    ///
    /// Disabled by default; `None` disables it again.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Log on with `credentials` after every connect.
    ///
    /// A connection is not used for requests until the logon succeeds.
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.config.credentials = Some(credentials);
        self
    }

    /// Largest accepted inbound or outbound frame, in bytes.
    ///
    /// Clamped to between 64 bytes and 16 MiB.
    #[must_use]
    pub fn max_frame_length(mut self, max_frame_length: usize) -> Self {
        self.config.max_frame_length = max_frame_length;
        self
    }

    /// Replace the socket options. `TCP_NODELAY` is on by default.
    #[must_use]
    pub fn socket_options(mut self, options: SocketOptions) -> Self {
        self.config.socket_options = options;
        self
    }

    /// Configure `TCP_NODELAY`.
    #[must_use]
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.config.socket_options = self.config.socket_options.nodelay(enabled);
        self
    }

    /// Configure TCP keep-alive probes.
    #[must_use]
    pub fn tcp_keepalive(mut self, duration: Option<Duration>) -> Self {
        self.config.socket_options = self.config.socket_options.keepalive(duration);
        self
    }

    /// Configure tracing spans and timing.
    #[must_use]
    pub fn tracing_config(mut self, tracing: TracingConfig) -> Self {
        self.config.tracing = tracing;
        self
    }

    /// Create the client.
    #[must_use]
    pub fn build(self) -> QrcClient { QrcClient::from_config(self.config) }
}
