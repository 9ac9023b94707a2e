//! Handling of unsolicited frames from the Core.

use std::time::Duration;

use qrc::{
    ClientError,
    ConnectionState,
    QrcClient,
    Request,
    TransportError,
    message::EngineState,
};
use qrc_testing::{LoggerHandle, MockCore, frames, logger};
use rstest::rstest;
use serde_json::{Value, json};
use tokio::sync::broadcast;

/// Receive the next event, failing the test instead of hanging.
async fn next_event<T: Clone>(rx: &mut broadcast::Receiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event within deadline")
        .expect("channel open")
}

#[tokio::test]
async fn active_engine_status_signals_readiness() {
    let core = MockCore::start_with_greeting(vec![frames::engine_status("Active")], frames::ack)
        .await
        .expect("start core");
    let client = QrcClient::builder(core.core_address()).build();

    client.get_connection().await.expect("connect");
    let status = tokio::time::timeout(Duration::from_secs(5), client.wait_until_active())
        .await
        .expect("engine became active");

    assert_eq!(status.state, EngineState::Active);
    assert_eq!(status.design_name.as_deref(), Some("Test Design"));
    assert_eq!(status.is_emulator, Some(true));
}

#[tokio::test]
async fn standby_core_is_disconnected() {
    let core = MockCore::start(frames::silent).await.expect("start core");
    let client = QrcClient::builder(core.core_address()).build();

    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.send(Request::new("StatusGet")).await }
    });
    assert!(core.wait_for_requests(1).await);
    core.push(&frames::engine_status("Standby"));

    let err = pending
        .await
        .expect("join request")
        .expect_err("standby closes connection");
    assert!(
        matches!(err, ClientError::Transport(TransportError::Standby { .. })),
        "{err:?}"
    );
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(client.engine_status().borrow().is_none());
}

#[tokio::test]
async fn change_poll_emits_one_event_per_change_in_order() {
    let core = MockCore::start(frames::ack).await.expect("start core");
    let client = QrcClient::builder(core.core_address()).build();
    let mut changes = client.subscribe_changes();

    client.get_connection().await.expect("connect");
    assert!(core.wait_for_connections(1).await);
    core.push(&frames::change_poll(
        "grp",
        &[("gain1", json!(-3.0)), ("gain2", json!(0.0))],
    ));

    let first = next_event(&mut changes).await;
    let second = next_event(&mut changes).await;
    assert_eq!(first.name, "gain1");
    assert_eq!(first.value, json!(-3.0));
    assert_eq!(second.name, "gain2");
}

#[tokio::test]
async fn change_poll_result_form_emits_changes_in_order() {
    let core = MockCore::start(frames::ack).await.expect("start core");
    let client = QrcClient::builder(core.core_address()).build();
    let mut changes = client.subscribe_changes();

    client.get_connection().await.expect("connect");
    assert!(core.wait_for_connections(1).await);
    core.push(&frames::change_poll_result(
        "grp",
        &[("gain1", json!(-6), "-6dB"), ("gain2", json!(0), "0dB")],
    ));

    let first = next_event(&mut changes).await;
    let second = next_event(&mut changes).await;
    assert_eq!((first.name.as_str(), first.string.as_str()), ("gain1", "-6dB"));
    assert_eq!(first.value, json!(-6));
    assert_eq!((second.name.as_str(), second.string.as_str()), ("gain2", "0dB"));
    assert!(changes.try_recv().is_err());
}

#[tokio::test]
async fn solicited_poll_answers_request_and_publishes_changes() {
    let core = MockCore::start(|request: &Value| match frames::method_of(request) {
        "ChangeGroup.Poll" => vec![frames::result_for(
            request,
            json!({"Id": "grp", "Changes": [{"Name": "mute", "Value": true, "String": "muted"}]}),
        )],
        _ => frames::ack(request),
    })
    .await
    .expect("start core");
    let client = QrcClient::builder(core.core_address()).build();
    let mut changes = client.subscribe_changes();

    let result = client
        .send(Request::new("ChangeGroup.Poll").with_params(json!({"Id": "grp"})))
        .await
        .expect("poll result");

    assert_eq!(result["Id"], "grp");
    let change = next_event(&mut changes).await;
    assert_eq!(change.name, "mute");
    assert_eq!(change.string, "muted");
}

#[tokio::test]
async fn unknown_notifications_are_forwarded() {
    let core = MockCore::start(frames::ack).await.expect("start core");
    let client = QrcClient::builder(core.core_address()).build();
    let mut notifications = client.subscribe_notifications();

    client.get_connection().await.expect("connect");
    assert!(core.wait_for_connections(1).await);
    core.push(&json!({"jsonrpc": "2.0", "method": "LoopPlayer.Status", "params": {"Playing": true}}));

    let notification = next_event(&mut notifications).await;
    assert_eq!(notification.method, "LoopPlayer.Status");
    assert_eq!(notification.params["Playing"], json!(true));
}

#[tokio::test]
async fn reply_carrying_a_method_resolves_its_request() {
    let core = MockCore::start(|request: &Value| {
        vec![json!({"jsonrpc": "2.0", "method": "StatusGet", "id": request["id"], "result": {"ok": true}})]
    })
    .await
    .expect("start core");
    let client = QrcClient::builder(core.core_address())
        .request_timeout(Duration::from_secs(2))
        .build();
    let mut notifications = client.subscribe_notifications();

    let result = client.send(Request::new("StatusGet")).await.expect("reply");

    assert_eq!(result, json!({"ok": true}));
    let notification = next_event(&mut notifications).await;
    assert_eq!(notification.method, "StatusGet");
    assert_eq!(notification.id, Some(1));
    assert_eq!(client.pending_requests(), 0);
}

#[rstest]
#[tokio::test]
async fn malformed_frame_is_logged_and_skipped(mut logger: LoggerHandle) {
    let core = MockCore::start(frames::silent).await.expect("start core");
    let client = QrcClient::builder(core.core_address()).build();

    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.send(Request::new("NoOp")).await }
    });
    assert!(core.wait_for_requests(1).await);
    let request = core.received()[0].clone();
    core.push_raw(b"{not json}\0");
    core.push(&frames::result_for(&request, json!("ok")));

    let result = pending.await.expect("join request").expect("reply");
    assert_eq!(result, json!("ok"));
    assert_eq!(client.state(), ConnectionState::Ready);
    let warnings = logger.messages_at("warn");
    assert!(
        warnings.iter().any(|message| message.contains("dropping malformed frame")),
        "{warnings:?}"
    );
}
