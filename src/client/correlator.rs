//! Matching of replies to outstanding requests.
//!
//! Every request awaiting a reply owns one entry in a concurrent map keyed by
//! its identifier. An entry is completed exactly once: by its reply, by its
//! deadline, or by the loss of the connection it was written to. Whichever
//! comes first removes the entry, so the others find nothing to do.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};
use serde_json::Value;
use tokio::{sync::oneshot, task::AbortHandle, time::Instant};

use super::ClientError;
use crate::{error::ProtocolError, message::Reply, metrics};

type Outcome = Result<Value, ClientError>;

struct Pending {
    method: String,
    generation: u64,
    serial: u64,
    issued: Instant,
    reply: oneshot::Sender<Outcome>,
    timer: AbortHandle,
}

impl Pending {
    fn complete(self, outcome: Outcome) {
        self.timer.abort();
        // The caller may have stopped waiting.
        let _ = self.reply.send(outcome);
    }
}

/// Table of requests awaiting replies.
pub(crate) struct RequestCorrelator {
    device: Arc<str>,
    timeout: Duration,
    next_id: AtomicU64,
    next_serial: AtomicU64,
    pending: Arc<DashMap<u64, Pending>>,
}

/// Future resolving to the outcome of one request.
pub(crate) struct PendingReply {
    id: u64,
    rx: oneshot::Receiver<Outcome>,
}

impl PendingReply {
    pub(crate) fn id(&self) -> u64 { self.id }
}

impl Future for PendingReply {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ClientError::Shutdown)))
    }
}

impl RequestCorrelator {
    pub(crate) fn new(device: Arc<str>, timeout: Duration) -> Self {
        Self {
            device,
            timeout,
            next_id: AtomicU64::new(1),
            next_serial: AtomicU64::new(0),
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Allocate the next request identifier.
    pub(crate) fn next_id(&self) -> u64 { self.next_id.fetch_add(1, Ordering::Relaxed) }

    /// Number of requests awaiting a reply.
    pub(crate) fn len(&self) -> usize { self.pending.len() }

    /// Record a request written on connection `generation` and arm its deadline.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn register(
        &self,
        id: u64,
        method: &str,
        generation: u64,
    ) -> Result<PendingReply, ClientError> {
        let entry = match self.pending.entry(id) {
            Entry::Occupied(_) => return Err(ClientError::DuplicateRequestId(id)),
            Entry::Vacant(entry) => entry,
        };
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let timer = tokio::spawn(expire(
            Arc::clone(&self.pending),
            id,
            serial,
            self.timeout,
            Arc::clone(&self.device),
        ))
        .abort_handle();
        entry.insert(Pending {
            method: method.to_owned(),
            generation,
            serial,
            issued: Instant::now(),
            reply: tx,
            timer,
        });
        Ok(PendingReply { id, rx })
    }

    /// Complete the request a reply answers.
    ///
    /// Returns `false` when no request with that identifier is pending, as
    /// happens for replies arriving after their deadline.
    pub(crate) fn resolve(&self, reply: Reply) -> bool {
        let Some((_, pending)) = self.pending.remove(&reply.id) else {
            tracing::debug!(id = reply.id, "reply for unknown request ignored");
            return false;
        };
        tracing::trace!(
            id = reply.id,
            method = %pending.method,
            elapsed_us = pending.issued.elapsed().as_micros(),
            "reply received"
        );
        pending.complete(reply.outcome.map_err(|err| ProtocolError::from(err).into()));
        true
    }

    /// Whether request `id` is pending and was issued for `method`.
    pub(crate) fn awaits(&self, id: u64, method: &str) -> bool {
        self.pending
            .get(&id)
            .is_some_and(|entry| entry.method == method)
    }

    /// Drop a request without completing it.
    pub(crate) fn cancel(&self, id: u64) {
        if let Some((_, pending)) = self.pending.remove(&id) {
            pending.timer.abort();
        }
    }

    /// Fail every request written on connection `generation`.
    pub(crate) fn reject_generation(&self, generation: u64, error: &ClientError) -> usize {
        self.reject_where(error, |pending| pending.generation == generation)
    }

    /// Fail every outstanding request.
    pub(crate) fn reject_all(&self, error: &ClientError) -> usize { self.reject_where(error, |_| true) }

    fn reject_where(&self, error: &ClientError, matches: impl Fn(&Pending) -> bool) -> usize {
        let ids: Vec<u64> = self
            .pending
            .iter()
            .filter(|entry| matches(entry.value()))
            .map(|entry| *entry.key())
            .collect();
        let mut rejected = 0;
        for id in ids {
            if let Some((_, pending)) = self.pending.remove_if(&id, |_, pending| matches(pending)) {
                pending.complete(Err(error.clone()));
                rejected += 1;
            }
        }
        rejected
    }
}

async fn expire(
    pending: Arc<DashMap<u64, Pending>>,
    id: u64,
    serial: u64,
    timeout: Duration,
    device: Arc<str>,
) {
    tokio::time::sleep(timeout).await;
    let Some((_, entry)) = pending.remove_if(&id, |_, entry| entry.serial == serial) else {
        return;
    };
    tracing::warn!(id, method = %entry.method, device = %device, "request timed out");
    metrics::inc_request_timeouts();
    let error = ClientError::RequestTimeout {
        id,
        method: entry.method.clone(),
        device: device.to_string(),
        elapsed: timeout,
    };
    let _ = entry.reply.send(Err(error));
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tracing_test::traced_test;

    use super::*;
    use crate::{client::TransportError, message::RpcError};

    fn correlator(timeout: Duration) -> RequestCorrelator {
        RequestCorrelator::new(Arc::from("core:1710"), timeout)
    }

    #[test]
    fn identifiers_are_unique_and_increasing() {
        let correlator = correlator(Duration::from_secs(1));
        let first = correlator.next_id();
        let second = correlator.next_id();
        assert_eq!(first, 1);
        assert!(second > first);
    }

    #[tokio::test]
    async fn reply_completes_matching_request() {
        let correlator = correlator(Duration::from_secs(10));
        let pending = correlator.register(4, "StatusGet", 1).expect("register");
        assert_eq!(pending.id(), 4);
        assert!(correlator.resolve(Reply {
            id: 4,
            outcome: Ok(json!({"State": "Active"})),
        }));
        assert_eq!(pending.await.expect("reply"), json!({"State": "Active"}));
        assert_eq!(correlator.len(), 0);
    }

    #[tokio::test]
    async fn error_reply_becomes_protocol_error() {
        let correlator = correlator(Duration::from_secs(10));
        let pending = correlator.register(1, "Component.Get", 1).expect("register");
        correlator.resolve(Reply {
            id: 1,
            outcome: Err(RpcError {
                code: 7,
                message: "Unknown component".into(),
                data: None,
            }),
        });
        let err = pending.await.expect_err("protocol error");
        assert_eq!(err.protocol().map(ProtocolError::code), Some(7));
    }

    #[tokio::test]
    async fn pending_requests_are_matched_by_method() {
        let correlator = correlator(Duration::from_secs(10));
        let _pending = correlator.register(3, "ChangeGroup.Poll", 1).expect("register");
        assert!(correlator.awaits(3, "ChangeGroup.Poll"));
        assert!(!correlator.awaits(3, "StatusGet"));
        assert!(!correlator.awaits(4, "ChangeGroup.Poll"));
    }

    #[tokio::test]
    async fn duplicate_identifier_is_rejected() {
        let correlator = correlator(Duration::from_secs(10));
        let _first = correlator.register(9, "NoOp", 1).expect("register");
        let err = correlator.register(9, "NoOp", 1).err().expect("duplicate");
        assert!(matches!(err, ClientError::DuplicateRequestId(9)));
        assert_eq!(correlator.len(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn unknown_reply_is_ignored() {
        let correlator = correlator(Duration::from_secs(10));
        assert!(!correlator.resolve(Reply {
            id: 77,
            outcome: Ok(Value::Null),
        }));
        assert!(logs_contain("reply for unknown request ignored"));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fails_request_and_late_reply_is_dropped() {
        let correlator = correlator(Duration::from_millis(250));
        let pending = correlator.register(2, "Component.Set", 1).expect("register");
        let err = pending.await.expect_err("timeout");
        assert!(matches!(
            err,
            ClientError::RequestTimeout { id: 2, ref method, .. } if method == "Component.Set"
        ));
        assert_eq!(correlator.len(), 0);
        assert!(!correlator.resolve(Reply {
            id: 2,
            outcome: Ok(Value::Null),
        }));
    }

    #[tokio::test]
    async fn rejection_is_scoped_to_generation() {
        let correlator = correlator(Duration::from_secs(10));
        let old = correlator.register(1, "NoOp", 1).expect("register");
        let current = correlator.register(2, "NoOp", 2).expect("register");
        let error = ClientError::Transport(TransportError::Ended {
            device: "core:1710".into(),
        });
        assert_eq!(correlator.reject_generation(1, &error), 1);
        assert!(matches!(old.await, Err(ClientError::Transport(_))));
        assert_eq!(correlator.len(), 1);
        assert_eq!(correlator.reject_all(&ClientError::Shutdown), 1);
        assert!(matches!(current.await, Err(ClientError::Shutdown)));
    }

    #[tokio::test]
    async fn cancelled_request_frees_its_identifier() {
        let correlator = correlator(Duration::from_secs(10));
        let pending = correlator.register(5, "NoOp", 1).expect("register");
        correlator.cancel(5);
        assert_eq!(correlator.len(), 0);
        assert!(matches!(pending.await, Err(ClientError::Shutdown)));
        correlator.register(5, "NoOp", 1).expect("identifier reusable");
    }
}
