//! Ownership of the client's single connection slot.
//!
//! At most one connection attempt is in flight at a time. Callers that need a
//! connection while an attempt is running share that attempt's outcome
//! instead of starting their own. The attempt runs in its own task so that it
//! completes even if every caller waiting on it is dropped.

use std::{
    fmt,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::{ClientError, TransportError, link::Link};

/// Handle to one established connection.
///
/// Handles are cheap to clone. A handle outlives its connection: once the
/// connection closes, requests forced onto it fail immediately.
#[derive(Clone)]
pub struct Connection {
    link: Arc<Link>,
}

impl Connection {
    pub(crate) fn new(link: Arc<Link>) -> Self { Self { link } }

    pub(crate) fn link(&self) -> &Arc<Link> { &self.link }

    /// Sequence number distinguishing this connection from earlier and later
    /// connections of the same client.
    #[must_use]
    pub fn generation(&self) -> u64 { self.link.generation() }

    /// Address of the Core this connection reaches.
    #[must_use]
    pub fn device(&self) -> &str { self.link.device() }

    /// Whether the connection is still usable.
    #[must_use]
    pub fn is_open(&self) -> bool { self.link.is_open() }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("device", &self.device())
            .field("generation", &self.generation())
            .field("open", &self.is_open())
            .finish()
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool { Arc::ptr_eq(&self.link, &other.link) }
}

/// Coarse state of the client's connection slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection and no attempt in progress.
    Disconnected,
    /// A TCP connection is being established.
    Connecting,
    /// Connected and waiting for the logon reply.
    Authenticating,
    /// Connected and usable.
    Ready,
}

pub(crate) type Attempt = Shared<BoxFuture<'static, Result<Connection, ClientError>>>;

enum Slot {
    Idle,
    Connecting {
        generation: u64,
        attempt: Attempt,
        cancel: CancellationToken,
    },
    Ready(Connection),
}

/// What a caller asking for a connection should do next.
pub(crate) enum Demand {
    Ready(Connection),
    Wait(Attempt),
}

/// Former contents of an emptied slot.
pub(crate) enum Taken {
    Idle,
    /// A cancelled attempt, still winding down.
    Attempt(Attempt),
    Ready(Connection),
}

pub(crate) struct ConnectionManager {
    device: Arc<str>,
    slot: Mutex<Slot>,
    generations: AtomicU64,
    state: watch::Sender<ConnectionState>,
}

impl ConnectionManager {
    pub(crate) fn new(device: Arc<str>) -> Self {
        Self {
            device,
            slot: Mutex::new(Slot::Idle),
            generations: AtomicU64::new(1),
            state: watch::channel(ConnectionState::Disconnected).0,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> { self.slot.lock().unwrap_or_else(PoisonError::into_inner) }

    pub(crate) fn state(&self) -> ConnectionState { *self.state.borrow() }

    pub(crate) fn watch(&self) -> watch::Receiver<ConnectionState> { self.state.subscribe() }

    /// The ready connection, if there is one.
    pub(crate) fn current(&self) -> Option<Connection> {
        match &*self.lock() {
            Slot::Ready(connection) if connection.is_open() => Some(connection.clone()),
            _ => None,
        }
    }

    /// Return the ready connection, join the running attempt, or start one.
    ///
    /// `start` receives the new attempt's generation and a token that is
    /// cancelled if the slot is emptied while the attempt runs. It is only
    /// called when neither a ready connection nor a running attempt exists.
    /// Must be called from within a Tokio runtime.
    pub(crate) fn demand<F>(&self, start: F) -> Demand
    where
        F: FnOnce(u64, CancellationToken) -> BoxFuture<'static, Result<Connection, ClientError>>,
    {
        let mut slot = self.lock();
        match &*slot {
            Slot::Ready(connection) if connection.is_open() => {
                return Demand::Ready(connection.clone());
            }
            Slot::Connecting { attempt, .. } => return Demand::Wait(attempt.clone()),
            Slot::Ready(_) | Slot::Idle => {}
        }
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(start(generation, cancel.clone()));
        let device = Arc::clone(&self.device);
        let attempt = async move {
            task.await.unwrap_or_else(|err| {
                tracing::error!(error = %err, "connection attempt task failed");
                Err(TransportError::Aborted {
                    device: device.to_string(),
                }
                .into())
            })
        }
        .boxed()
        .shared();
        *slot = Slot::Connecting {
            generation,
            attempt: attempt.clone(),
            cancel,
        };
        self.state.send_replace(ConnectionState::Connecting);
        Demand::Wait(attempt)
    }

    /// Record that attempt `generation` is waiting for its logon reply.
    pub(crate) fn authenticating(&self, generation: u64) {
        let slot = self.lock();
        if matches!(&*slot, Slot::Connecting { generation: current, .. } if *current == generation)
        {
            self.state.send_replace(ConnectionState::Authenticating);
        }
    }

    /// Install `connection` as ready if its attempt is still the current one.
    pub(crate) fn promote(&self, connection: &Connection) -> bool {
        let mut slot = self.lock();
        match &*slot {
            Slot::Connecting { generation, .. } if *generation == connection.generation() => {
                *slot = Slot::Ready(connection.clone());
                self.state.send_replace(ConnectionState::Ready);
                true
            }
            _ => false,
        }
    }

    /// Clear the slot if it still belongs to `generation`.
    ///
    /// Returns `true` when the slot held that generation. Later attempts and
    /// connections are left untouched.
    pub(crate) fn release(&self, generation: u64) -> bool {
        let mut slot = self.lock();
        let owned = match &*slot {
            Slot::Connecting {
                generation: current,
                ..
            } => *current == generation,
            Slot::Ready(connection) => connection.generation() == generation,
            Slot::Idle => false,
        };
        if owned {
            *slot = Slot::Idle;
            self.state.send_replace(ConnectionState::Disconnected);
        }
        owned
    }

    /// Clear the slot if it holds the ready connection of `generation`.
    pub(crate) fn release_ready(&self, generation: u64) -> bool {
        let mut slot = self.lock();
        let owned =
            matches!(&*slot, Slot::Ready(connection) if connection.generation() == generation);
        if owned {
            *slot = Slot::Idle;
            self.state.send_replace(ConnectionState::Disconnected);
        }
        owned
    }

    /// Whether `generation` is the most recently started attempt.
    pub(crate) fn is_latest(&self, generation: u64) -> bool {
        self.generations.load(Ordering::Relaxed) == generation + 1
    }

    /// Empty the slot, returning what it held.
    ///
    /// A running attempt is cancelled; it closes its own connection.
    pub(crate) fn take(&self) -> Taken {
        let mut slot = self.lock();
        let previous = std::mem::replace(&mut *slot, Slot::Idle);
        self.state.send_replace(ConnectionState::Disconnected);
        match previous {
            Slot::Ready(connection) => Taken::Ready(connection),
            Slot::Connecting {
                attempt, cancel, ..
            } => {
                cancel.cancel();
                Taken::Attempt(attempt)
            }
            Slot::Idle => Taken::Idle,
        }
    }
}
