//! Connection status observers.

use std::sync::{Arc, Mutex, PoisonError};

use super::{ClientError, Connection};

/// Lifecycle transitions reported to status observers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// A connection attempt has started.
    Connecting,
    /// The connection is established and logged on.
    Connected,
    /// A connection attempt or live connection failed.
    Error,
    /// A live connection closed.
    Inactive,
}

/// One transition delivered to a status observer.
#[derive(Clone, Copy, Debug)]
pub struct StatusEvent<'a> {
    /// The connection concerned, when one exists yet.
    pub connection: Option<&'a Connection>,
    /// The new status.
    pub status: ConnectionStatus,
    /// What caused the transition, for failures and closures.
    pub error: Option<&'a ClientError>,
}

/// Callback invoked on every status transition.
pub type StatusObserver = Arc<dyn Fn(StatusEvent<'_>) + Send + Sync>;

/// Keyed registry of status observers.
///
/// Observers run synchronously in registration order on the task that caused
/// the transition. The registry lock is not held while they run, so an
/// observer may register or unregister observers itself.
#[derive(Default)]
pub(crate) struct StatusBroadcaster {
    observers: Mutex<Vec<(String, StatusObserver)>>,
}

impl StatusBroadcaster {
    /// Add `observer` under `key`.
    ///
    /// Returns `false`, leaving the existing observer in place, when `key` is
    /// already registered.
    pub(crate) fn register(&self, key: String, observer: StatusObserver) -> bool {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        if observers.iter().any(|(existing, _)| *existing == key) {
            return false;
        }
        observers.push((key, observer));
        true
    }

    /// Remove the observer under `key`, returning whether one was present.
    pub(crate) fn unregister(&self, key: &str) -> bool {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(existing, _)| existing != key);
        observers.len() != before
    }

    pub(crate) fn update(
        &self,
        connection: Option<&Connection>,
        status: ConnectionStatus,
        error: Option<&ClientError>,
    ) {
        let snapshot: Vec<StatusObserver> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        tracing::trace!(?status, observers = snapshot.len(), "status update");
        let event = StatusEvent {
            connection,
            status,
            error,
        };
        for observer in snapshot {
            observer(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> StatusObserver {
        let log = Arc::clone(log);
        Arc::new(move |event: StatusEvent<'_>| {
            log.lock()
                .expect("log lock")
                .push(format!("{name}:{:?}", event.status));
        })
    }

    #[test]
    fn observers_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let broadcaster = StatusBroadcaster::default();
        assert!(broadcaster.register("a".into(), recorder(&log, "a")));
        assert!(broadcaster.register("b".into(), recorder(&log, "b")));
        broadcaster.update(None, ConnectionStatus::Connecting, None);
        assert_eq!(
            *log.lock().expect("log lock"),
            vec!["a:Connecting".to_owned(), "b:Connecting".to_owned()]
        );
    }

    #[test]
    fn registration_is_idempotent_per_key() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let broadcaster = StatusBroadcaster::default();
        assert!(broadcaster.register("ui".into(), recorder(&log, "first")));
        assert!(!broadcaster.register("ui".into(), recorder(&log, "second")));
        broadcaster.update(None, ConnectionStatus::Inactive, None);
        assert_eq!(*log.lock().expect("log lock"), vec!["first:Inactive".to_owned()]);

        assert!(broadcaster.unregister("ui"));
        assert!(!broadcaster.unregister("ui"));
        broadcaster.update(None, ConnectionStatus::Connecting, None);
        assert_eq!(log.lock().expect("log lock").len(), 1);
    }

    #[test]
    fn observer_may_unregister_itself() {
        let broadcaster = Arc::new(StatusBroadcaster::default());
        let handle = Arc::clone(&broadcaster);
        broadcaster.register(
            "once".into(),
            Arc::new(move |_event: StatusEvent<'_>| {
                handle.unregister("once");
            }),
        );
        broadcaster.update(None, ConnectionStatus::Connected, None);
        assert!(!broadcaster.unregister("once"));
    }
}
