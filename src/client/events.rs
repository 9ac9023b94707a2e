//! Fan-out of unsolicited traffic from the Core.

use tokio::sync::{broadcast, watch};

use crate::message::{Change, ChangeGroupPoll, EngineStatus, Notification};

/// Buffered events per subscriber before the slowest one starts lagging.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

pub(crate) struct EventHub {
    changes: broadcast::Sender<Change>,
    notifications: broadcast::Sender<Notification>,
    engine: watch::Sender<Option<EngineStatus>>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self {
            changes: broadcast::channel(EVENT_CHANNEL_CAPACITY).0,
            notifications: broadcast::channel(EVENT_CHANNEL_CAPACITY).0,
            engine: watch::channel(None).0,
        }
    }
}

impl EventHub {
    /// Publish each change of a poll, in the order the Core listed them.
    pub(crate) fn publish_changes(&self, poll: ChangeGroupPoll) -> usize {
        let count = poll.changes.len();
        for change in poll.changes {
            // No subscribers is not an error.
            let _ = self.changes.send(change);
        }
        count
    }

    pub(crate) fn publish_notification(&self, notification: Notification) {
        let _ = self.notifications.send(notification);
    }

    pub(crate) fn set_engine(&self, status: Option<EngineStatus>) { self.engine.send_replace(status); }

    pub(crate) fn subscribe_changes(&self) -> broadcast::Receiver<Change> { self.changes.subscribe() }

    pub(crate) fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub(crate) fn engine(&self) -> watch::Receiver<Option<EngineStatus>> { self.engine.subscribe() }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::message::{EngineState, Inbound};

    #[tokio::test]
    async fn changes_are_delivered_individually_in_order() {
        let hub = EventHub::default();
        let mut rx = hub.subscribe_changes();
        let frame = json!({
            "jsonrpc": "2.0",
            "method": "ChangeGroup.Poll",
            "params": {"Id": "grp", "Changes": [
                {"Name": "gain1", "Value": -3, "String": "-3dB"},
                {"Name": "gain2", "Value": 0, "String": "0dB"}
            ]}
        });
        let Ok(Inbound::ChangeGroupPoll(poll)) = Inbound::from_value(frame) else {
            panic!("expected change group poll");
        };
        assert_eq!(hub.publish_changes(poll), 2);
        assert_eq!(rx.recv().await.expect("first").name, "gain1");
        assert_eq!(rx.recv().await.expect("second").name, "gain2");
    }

    #[test]
    fn engine_status_is_observable() {
        let hub = EventHub::default();
        let rx = hub.engine();
        assert!(rx.borrow().is_none());
        let Ok(Inbound::EngineStatus(status)) = Inbound::from_value(json!({
            "jsonrpc": "2.0",
            "method": "EngineStatus",
            "params": {"State": "Active", "DesignName": "Lobby"}
        })) else {
            panic!("expected engine status");
        };
        hub.set_engine(Some(status));
        assert_eq!(
            rx.borrow().as_ref().map(|status| status.state),
            Some(EngineState::Active)
        );
    }
}
