//! Tracing configuration for QRC client operations.
//!
//! [`TracingConfig`] controls the level of the spans wrapped around client
//! operations and whether their elapsed time is recorded.

use tracing::Level;

/// Controls tracing span levels and per-operation timing.
///
/// By default, lifecycle operations (`connect`, `close`) emit spans at
/// `INFO` level and `send` emits spans at `DEBUG` level. Timing is disabled
/// for all operations by default.
///
/// When timing is enabled for an operation, a `DEBUG` event carrying
/// `elapsed_us` is emitted when the operation completes.
///
/// # Examples
///
/// ```
/// use tracing::Level;
/// use qrc::client::TracingConfig;
///
/// let config = TracingConfig::default()
///     .with_send_level(Level::TRACE)
///     .with_send_timing(true);
/// let _ = config;
/// ```
#[derive(Clone, Debug)]
pub struct TracingConfig {
    pub(crate) connect_level: Level,
    pub(crate) send_level: Level,
    pub(crate) close_level: Level,
    pub(crate) connect_timing: bool,
    pub(crate) send_timing: bool,
    pub(crate) close_timing: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            connect_level: Level::INFO,
            send_level: Level::DEBUG,
            close_level: Level::INFO,
            connect_timing: false,
            send_timing: false,
            close_timing: false,
        }
    }
}

impl TracingConfig {
    /// Set the level of the span covering connection establishment and logon.
    #[must_use]
    pub fn with_connect_level(mut self, level: Level) -> Self {
        self.connect_level = level;
        self
    }

    /// Record how long each connection attempt takes.
    #[must_use]
    pub fn with_connect_timing(mut self, enabled: bool) -> Self {
        self.connect_timing = enabled;
        self
    }

    /// Set the level of the span covering a request and its reply.
    #[must_use]
    pub fn with_send_level(mut self, level: Level) -> Self {
        self.send_level = level;
        self
    }

    /// Record the round-trip time of each request.
    #[must_use]
    pub fn with_send_timing(mut self, enabled: bool) -> Self {
        self.send_timing = enabled;
        self
    }

    /// Set the level of the span covering shutdown.
    #[must_use]
    pub fn with_close_level(mut self, level: Level) -> Self {
        self.close_level = level;
        self
    }

    /// Record how long shutdown takes.
    #[must_use]
    pub fn with_close_timing(mut self, enabled: bool) -> Self {
        self.close_timing = enabled;
        self
    }

    /// Set the level for all operations at once.
    ///
    /// # Examples
    ///
    /// ```
    /// use tracing::Level;
    /// use qrc::client::TracingConfig;
    ///
    /// let config = TracingConfig::default().with_all_levels(Level::TRACE);
    /// let _ = config;
    /// ```
    #[must_use]
    pub fn with_all_levels(mut self, level: Level) -> Self {
        self.connect_level = level;
        self.send_level = level;
        self.close_level = level;
        self
    }

    /// Enable or disable timing for all operations at once.
    #[must_use]
    pub fn with_all_timing(mut self, enabled: bool) -> Self {
        self.connect_timing = enabled;
        self.send_timing = enabled;
        self.close_timing = enabled;
        self
    }

    pub(crate) fn connect_start(&self) -> Option<std::time::Instant> {
        self.connect_timing.then(std::time::Instant::now)
    }

    pub(crate) fn send_start(&self) -> Option<std::time::Instant> {
        self.send_timing.then(std::time::Instant::now)
    }

    pub(crate) fn close_start(&self) -> Option<std::time::Instant> {
        self.close_timing.then(std::time::Instant::now)
    }
}
