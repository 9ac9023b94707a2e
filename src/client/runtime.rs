//! QRC client runtime.

use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{
    ClientError,
    Connection,
    ConnectionState,
    ConnectionStatus,
    CoreAddress,
    QrcClientBuilder,
    StatusEvent,
    TransportError,
    auth,
    config::ClientConfig,
    connection::{ConnectionManager, Demand, Taken},
    correlator::RequestCorrelator,
    events::EventHub,
    link::{self, Link, LinkHandler},
    status::StatusBroadcaster,
    tracing_helpers::{close_span, connect_span, emit_timing_event, send_span},
};
use crate::{
    codec::encode_payload,
    message::{
        CHANGE_GROUP_POLL_METHOD,
        Change,
        ChangeGroupPoll,
        EngineState,
        EngineStatus,
        Inbound,
        Notification,
        Reply,
        Request,
    },
    metrics,
};

/// Client for one QRC Core.
///
/// The client connects lazily: the first request opens the connection, and a
/// request issued after the connection is lost opens a new one. Concurrent
/// requests share a single connection attempt. Clones share the connection,
/// the pending-request table and all subscriptions.
///
/// # Examples
///
/// ```no_run
/// use qrc::{QrcClient, message::Request};
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), qrc::ClientError> {
/// let address = "core.local".parse().expect("valid address");
/// let client = QrcClient::builder(address).build();
/// let result = client
///     .send(Request::new("Component.Get").with_params(json!({
///         "Name": "Mixer",
///         "Controls": [{"Name": "gain"}],
///     })))
///     .await?;
/// println!("{result}");
/// client.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct QrcClient {
    pub(super) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    config: ClientConfig,
    device: Arc<str>,
    correlator: RequestCorrelator,
    manager: ConnectionManager,
    status: StatusBroadcaster,
    events: EventHub,
}

/// Why a link is being torn down.
pub(super) enum Teardown {
    Failed(TransportError),
    Shutdown,
}

impl QrcClient {
    /// Start configuring a client for the Core at `address`.
    #[must_use]
    pub fn builder(address: CoreAddress) -> QrcClientBuilder { QrcClientBuilder::new(address) }

    pub(crate) fn from_config(config: ClientConfig) -> Self {
        let device: Arc<str> = Arc::from(config.address.to_string());
        Self {
            inner: Arc::new(Inner {
                correlator: RequestCorrelator::new(Arc::clone(&device), config.request_timeout),
                manager: ConnectionManager::new(Arc::clone(&device)),
                status: StatusBroadcaster::default(),
                events: EventHub::default(),
                device,
                config,
            }),
        }
    }

    /// Address of the Core.
    #[must_use]
    pub fn address(&self) -> &CoreAddress { &self.inner.config.address }

    /// Send `request` and wait for its reply.
    ///
    /// Connects first if there is no usable connection. The request is given
    /// the next free identifier unless it carries one.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Transport`] or [`ClientError::Handshake`] if no
    ///   connection could be obtained, or the connection was lost before the
    ///   reply arrived.
    /// - [`ClientError::Protocol`] if the Core answered with an error.
    /// - [`ClientError::RequestTimeout`] if no reply arrived in time.
    /// - [`ClientError::DuplicateRequestId`] if a request with the same
    ///   identifier is still pending.
    pub async fn send(&self, request: Request) -> Result<Value, ClientError> {
        let id = self.request_id(&request);
        let span = send_span(&self.inner.config.tracing, request.method(), id);
        async {
            let start = self.inner.config.tracing.send_start();
            let connection = self.get_connection().await.inspect_err(|err| {
                metrics::inc_errors(err.metric_kind());
            })?;
            let result = self.exchange(&request, id, &connection).await;
            emit_timing_event(start);
            result
        }
        .instrument(span)
        .await
    }

    /// Send `request` on `connection` without connecting or reconnecting.
    ///
    /// Used to talk to a connection before it becomes visible to
    /// [`send`](Self::send), as the logon does.
    ///
    /// # Errors
    ///
    /// As for [`send`](Self::send), with
    /// [`TransportError::Closed`] if `connection` has already closed.
    pub async fn send_on(
        &self,
        request: Request,
        connection: &Connection,
    ) -> Result<Value, ClientError> {
        let id = self.request_id(&request);
        let span = send_span(&self.inner.config.tracing, request.method(), id);
        async {
            let start = self.inner.config.tracing.send_start();
            let result = self.exchange(&request, id, connection).await;
            emit_timing_event(start);
            result
        }
        .instrument(span)
        .await
    }

    fn request_id(&self, request: &Request) -> u64 {
        request
            .id()
            .unwrap_or_else(|| self.inner.correlator.next_id())
    }

    async fn exchange(
        &self,
        request: &Request,
        id: u64,
        connection: &Connection,
    ) -> Result<Value, ClientError> {
        tracing::Span::current().record("generation", connection.generation());
        let link = connection.link();
        if !link.is_open() {
            return Err(link.closed_error().into());
        }
        let frame = encode_payload(&request.envelope(id))
            .map_err(|err| ClientError::Serialize(Arc::new(err)))?;
        // Registered before writing so that a fast reply finds its entry.
        let pending =
            self.inner
                .correlator
                .register(id, request.method(), link.generation())?;
        if let Err(err) = link.write(frame).await {
            self.inner.correlator.cancel(pending.id());
            tracing::warn!(id, error = %err, "write failed");
            metrics::inc_errors("write");
            self.inner.teardown(link, Teardown::Failed(err.clone()));
            return Err(err.into());
        }
        let result = pending.await;
        if let Err(err) = &result {
            metrics::inc_errors(err.metric_kind());
            if err.protocol().is_some_and(crate::ProtocolError::is_standby) {
                tracing::warn!(id, "core reported standby; expect the connection to close");
            }
        }
        result
    }

    /// Return the current connection, connecting if necessary.
    ///
    /// Concurrent callers share one attempt and receive the same outcome.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the connection attempt, shared by every
    /// caller that waited on it.
    pub async fn get_connection(&self) -> Result<Connection, ClientError> {
        let inner = Arc::clone(&self.inner);
        let demand = self
            .inner
            .manager
            .demand(move |generation, cancel| establish(inner, generation, cancel).boxed());
        match demand {
            Demand::Ready(connection) => Ok(connection),
            Demand::Wait(attempt) => attempt.await,
        }
    }

    /// The current connection, without connecting.
    #[must_use]
    pub fn current_connection(&self) -> Option<Connection> { self.inner.manager.current() }

    /// Observe connection status transitions under `key`.
    ///
    /// Returns `false` without replacing anything if `key` is already in use.
    /// Observers run synchronously on the client's tasks, in registration
    /// order, and must not block.
    pub fn register_status<F>(&self, key: impl Into<String>, observer: F) -> bool
    where
        F: Fn(StatusEvent<'_>) + Send + Sync + 'static,
    {
        self.inner.status.register(key.into(), Arc::new(observer))
    }

    /// Remove the status observer under `key`, returning whether one existed.
    pub fn unregister_status(&self, key: &str) -> bool { self.inner.status.unregister(key) }

    /// State of the connection slot.
    #[must_use]
    pub fn state(&self) -> ConnectionState { self.inner.manager.state() }

    /// Watch the state of the connection slot.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> { self.inner.manager.watch() }

    /// Most recent `EngineStatus` of the current connection.
    ///
    /// Reset to `None` whenever the connection is lost.
    #[must_use]
    pub fn engine_status(&self) -> watch::Receiver<Option<EngineStatus>> { self.inner.events.engine() }

    /// Wait until the Core reports that its engine is active.
    ///
    /// Does not connect by itself; pair with [`get_connection`](Self::get_connection).
    pub async fn wait_until_active(&self) -> EngineStatus {
        let mut rx = self.inner.events.engine();
        loop {
            let active = rx
                .borrow_and_update()
                .clone()
                .filter(|status| status.state == EngineState::Active);
            if let Some(status) = active {
                return status;
            }
            // The sender lives as long as the client.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Receive every control change reported by change-group polls.
    #[must_use]
    pub fn subscribe_changes(&self) -> broadcast::Receiver<Change> { self.inner.events.subscribe_changes() }

    /// Receive unsolicited notifications without dedicated handling.
    #[must_use]
    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.inner.events.subscribe_notifications()
    }

    /// Number of requests awaiting a reply.
    #[must_use]
    pub fn pending_requests(&self) -> usize { self.inner.correlator.len() }

    /// Close the connection and fail every outstanding request.
    ///
    /// A connection attempt in progress is cancelled and reported to status
    /// observers as inactive. The client remains usable: a later request
    /// connects again.
    pub async fn shutdown(&self) {
        let span = close_span(&self.inner.config.tracing, &self.inner.device);
        async {
            let start = self.inner.config.tracing.close_start();
            match self.inner.manager.take() {
                Taken::Ready(connection) => {
                    self.inner.teardown(connection.link(), Teardown::Shutdown);
                }
                // The attempt reports its own cancellation.
                Taken::Attempt(attempt) => {
                    let _ = attempt.await;
                }
                Taken::Idle => {}
            }
            let rejected = self.inner.correlator.reject_all(&ClientError::Shutdown);
            tracing::info!(rejected, "client shut down");
            emit_timing_event(start);
        }
        .instrument(span)
        .await;
    }
}

async fn establish(
    inner: Arc<Inner>,
    generation: u64,
    cancel: CancellationToken,
) -> Result<Connection, ClientError> {
    let span = connect_span(&inner.config.tracing, &inner.device, generation);
    async {
        let start = inner.config.tracing.connect_start();
        inner.status.update(None, ConnectionStatus::Connecting, None);
        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(inner.cancelled(generation, None)),
            opened = Link::open(&inner.config, generation, Arc::clone(&inner.device)) => opened,
        };
        let (link, reader) = match opened {
            Ok(opened) => opened,
            Err(err) => return Err(inner.abandon(generation, None, err.into())),
        };
        metrics::inc_connections();
        link::spawn_tasks(
            Arc::clone(&inner),
            &link,
            reader,
            inner.config.idle_timeout,
            inner.config.keepalive_interval,
        );
        let connection = Connection::new(link);

        if let Some(credentials) = &inner.config.credentials {
            inner.manager.authenticating(generation);
            let client = QrcClient {
                inner: Arc::clone(&inner),
            };
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(inner.cancelled(generation, Some(&connection)));
                }
                outcome = auth::logon(&client, &connection, credentials) => outcome,
            };
            if let Err(err) = outcome {
                return Err(inner.abandon(generation, Some(&connection), err));
            }
        }

        if !connection.is_open() {
            let err = ClientError::from(connection.link().closed_error());
            return Err(inner.abandon(generation, Some(&connection), err));
        }
        if !inner.manager.promote(&connection) {
            return Err(inner.cancelled(generation, Some(&connection)));
        }
        tracing::info!("connected");
        emit_timing_event(start);
        inner
            .status
            .update(Some(&connection), ConnectionStatus::Connected, None);
        Ok(connection)
    }
    .instrument(span)
    .await
}

impl Inner {
    /// Fail attempt `generation`, reporting `err` to status observers.
    fn abandon(
        &self,
        generation: u64,
        connection: Option<&Connection>,
        err: ClientError,
    ) -> ClientError {
        tracing::warn!(error = %err, "connection attempt failed");
        metrics::inc_errors(err.metric_kind());
        if let Some(connection) = connection {
            self.close_quietly(connection.link(), &err);
        }
        self.manager.release(generation);
        if self.manager.is_latest(generation) {
            self.events.set_engine(None);
        }
        self.status
            .update(connection, ConnectionStatus::Error, Some(&err));
        err
    }

    /// End attempt `generation` after the slot was emptied by a shutdown.
    fn cancelled(&self, generation: u64, connection: Option<&Connection>) -> ClientError {
        let err = ClientError::Shutdown;
        tracing::debug!("connection attempt cancelled by shutdown");
        if let Some(connection) = connection {
            self.close_quietly(connection.link(), &err);
        }
        self.manager.release(generation);
        if self.manager.is_latest(generation) {
            self.events.set_engine(None);
        }
        self.status
            .update(connection, ConnectionStatus::Inactive, Some(&err));
        err
    }

    /// Close a link that was never made current.
    fn close_quietly(&self, link: &Arc<Link>, err: &ClientError) {
        if link.close() {
            metrics::dec_connections();
            self.correlator.reject_generation(link.generation(), err);
        }
    }

    /// Close `link`, fail its requests and report the closure.
    ///
    /// Only the slot belonging to `link` is cleared, so a connection that has
    /// already replaced it is unaffected. Repeated calls are no-ops.
    pub(super) fn teardown(&self, link: &Arc<Link>, cause: Teardown) {
        if !link.close() {
            return;
        }
        metrics::dec_connections();
        let was_current = self.manager.release_ready(link.generation())
            || matches!(cause, Teardown::Shutdown);
        let (status, error) = match cause {
            Teardown::Shutdown => (ConnectionStatus::Inactive, ClientError::Shutdown),
            Teardown::Failed(err) if err.is_orderly() => {
                (ConnectionStatus::Inactive, ClientError::Transport(err))
            }
            Teardown::Failed(err) => (ConnectionStatus::Error, ClientError::Transport(err)),
        };
        if was_current || self.manager.is_latest(link.generation()) {
            self.events.set_engine(None);
        }
        let rejected = self.correlator.reject_generation(link.generation(), &error);
        tracing::info!(
            generation = link.generation(),
            rejected,
            reason = %error,
            "connection closed"
        );
        if was_current {
            let connection = Connection::new(Arc::clone(link));
            self.status.update(Some(&connection), status, Some(&error));
        }
    }

    /// Publish the changes in the result of a `ChangeGroup.Poll` request.
    ///
    /// Runs before the reply is resolved, so the changes are queued by the
    /// time the caller sees the result.
    fn on_poll_result(&self, id: u64, result: &Value) {
        if !self.correlator.awaits(id, CHANGE_GROUP_POLL_METHOD) {
            return;
        }
        if let Some(poll) = ChangeGroupPoll::from_result(id, result.clone()) {
            let published = self.events.publish_changes(poll);
            tracing::trace!(id, published, "change group poll result");
        }
    }

    fn on_engine_status(&self, link: &Arc<Link>, status: EngineStatus) {
        let state = status.state;
        tracing::debug!(
            ?state,
            design = status.design_name.as_deref().unwrap_or_default(),
            "engine status"
        );
        self.events.set_engine(Some(status));
        if state == EngineState::Standby {
            tracing::warn!(generation = link.generation(), "core is on standby, disconnecting");
            self.teardown(
                link,
                Teardown::Failed(TransportError::Standby {
                    device: self.device.to_string(),
                }),
            );
        }
    }
}

impl LinkHandler for Inner {
    fn on_inbound(&self, link: &Arc<Link>, inbound: Inbound) {
        if let Inbound::Reply(Reply {
            id,
            outcome: Ok(result),
        }) = &inbound
        {
            self.on_poll_result(*id, result);
        }
        if let Some(reply) = inbound.reply() {
            self.correlator.resolve(reply);
        }
        match inbound {
            Inbound::EngineStatus(status) => self.on_engine_status(link, status),
            Inbound::ChangeGroupPoll(poll) => {
                let published = self.events.publish_changes(poll);
                tracing::trace!(published, "change group poll");
            }
            Inbound::Notification(notification) => {
                tracing::debug!(method = %notification.method, "notification");
                self.events.publish_notification(notification);
            }
            Inbound::Fault(error) => {
                tracing::warn!(code = error.code, message = %error.message, "unaddressed error");
            }
            Inbound::Reply(_) | Inbound::Unaddressed => {}
        }
    }

    fn on_terminated(&self, link: &Arc<Link>, reason: TransportError) {
        tracing::warn!(generation = link.generation(), error = %reason, "connection lost");
        self.teardown(link, Teardown::Failed(reason));
    }
}
