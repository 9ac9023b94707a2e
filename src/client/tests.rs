//! Unit tests for the QRC client runtime.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use tokio_util::codec::Framed;

use super::*;
use crate::{
    codec::{FRAME_DELIMITER, NulDelimitedCodec, encode_frame},
    message::Request,
};

type PeerStream = Framed<TcpStream, NulDelimitedCodec>;

async fn listener() -> (TcpListener, CoreAddress) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let port = listener.local_addr().expect("listener addr").port();
    (listener, CoreAddress::new("127.0.0.1", port))
}

async fn accept(listener: &TcpListener) -> PeerStream {
    let (stream, _) = listener.accept().await.expect("accept client");
    Framed::new(stream, NulDelimitedCodec::default())
}

async fn read_request(peer: &mut PeerStream) -> Value {
    let frame = peer
        .next()
        .await
        .expect("request frame")
        .expect("read frame");
    serde_json::from_slice(&frame).expect("request is JSON")
}

async fn reply(peer: &mut PeerStream, body: Value) {
    let bytes = serde_json::to_vec(&body).expect("serialize reply");
    peer.send(bytes.into()).await.expect("write reply");
}

#[tokio::test]
async fn request_is_written_as_jsonrpc_envelope() {
    let (listener, address) = listener().await;
    let client = QrcClient::builder(address).build();

    let server = tokio::spawn(async move {
        let mut peer = accept(&listener).await;
        let request = read_request(&mut peer).await;
        reply(&mut peer, json!({"jsonrpc": "2.0", "id": request["id"], "result": true})).await;
        (request, peer)
    });

    let result = client.send(Request::new("NoOp")).await.expect("reply");
    let (request, _peer) = server.await.expect("join server");
    assert_eq!(result, json!(true));
    assert_eq!(
        request,
        json!({"jsonrpc": "2.0", "method": "NoOp", "id": 1, "params": 0})
    );
    assert_eq!(client.state(), ConnectionState::Ready);
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn request_occupies_exactly_one_frame_on_the_wire() {
    let (listener, address) = listener().await;
    let client = QrcClient::builder(address).build();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept client");
        let mut wire = Vec::new();
        loop {
            let byte = stream.read_u8().await.expect("read request byte");
            wire.push(byte);
            if byte == FRAME_DELIMITER {
                break;
            }
        }
        let request: Value =
            serde_json::from_slice(&wire[..wire.len() - 1]).expect("request is JSON");
        let answer = encode_frame(&json!({"jsonrpc": "2.0", "id": request["id"], "result": "ok"}))
            .expect("encode reply");
        stream.write_all(&answer).await.expect("write reply");
        (wire, stream)
    });

    let result = client
        .send(Request::new("StatusGet"))
        .await
        .expect("reply");
    let (wire, _stream) = server.await.expect("join server");
    assert_eq!(result, json!("ok"));
    assert_eq!(wire.iter().filter(|b| **b == FRAME_DELIMITER).count(), 1);
    assert_eq!(wire.last(), Some(&FRAME_DELIMITER));
}

#[tokio::test]
async fn stalled_write_gives_up_when_connection_closes() {
    let (listener, address) = listener().await;
    let client = QrcClient::builder(address)
        .idle_timeout(Some(Duration::from_millis(300)))
        .socket_options(SocketOptions::default().send_buffer_size(4096))
        .build();
    // The peer accepts but never reads.
    let server = tokio::spawn(async move { listener.accept().await.expect("accept client") });

    let params = json!({"Blob": "x".repeat(8 * 1024 * 1024)});
    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        client.send(Request::new("Upload").with_params(params)),
    )
    .await
    .expect("send returns once the connection closes");

    let err = outcome.expect_err("write cannot complete");
    assert!(err.is_connection_level(), "unexpected error: {err:?}");
    assert_eq!(client.pending_requests(), 0);
    assert_eq!(client.state(), ConnectionState::Disconnected);
    let _peer = server.await.expect("join server");
}

#[tokio::test]
async fn peer_close_fails_outstanding_request() {
    let (listener, address) = listener().await;
    let client = QrcClient::builder(address).build();

    let server = tokio::spawn(async move {
        let mut peer = accept(&listener).await;
        let _ = read_request(&mut peer).await;
        drop(peer);
    });

    let err = client
        .send(Request::new("StatusGet"))
        .await
        .expect_err("connection dropped");
    server.await.expect("join server");
    assert!(
        matches!(err, ClientError::Transport(TransportError::Ended { .. })),
        "unexpected error: {err:?}"
    );
    assert_eq!(client.pending_requests(), 0);
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(client.current_connection().is_none());
}

#[tokio::test]
async fn stale_teardown_leaves_newer_connection_alone() {
    let (listener, address) = listener().await;
    let client = QrcClient::builder(address).build();

    let server = tokio::spawn(async move {
        let first = accept(&listener).await;
        let second = accept(&listener).await;
        (first, second)
    });

    let old = client.get_connection().await.expect("first connection");
    client.shutdown().await;
    assert!(!old.is_open());
    let new = client.get_connection().await.expect("second connection");
    assert!(new.generation() > old.generation());

    client.inner.teardown(
        old.link(),
        runtime::Teardown::Failed(TransportError::Ended {
            device: old.device().to_owned(),
        }),
    );
    assert!(new.is_open());
    assert_eq!(client.current_connection(), Some(new));
    let _streams = server.await.expect("join server");
}

#[tokio::test]
async fn forced_send_on_closed_connection_fails_fast() {
    let (listener, address) = listener().await;
    let client = QrcClient::builder(address).build();
    let server = tokio::spawn(async move { accept(&listener).await });

    let connection = client.get_connection().await.expect("connect");
    client.shutdown().await;

    let err = client
        .send_on(Request::new("NoOp"), &connection)
        .await
        .expect_err("closed connection");
    assert!(matches!(
        err,
        ClientError::Transport(TransportError::Closed { .. })
    ));
    assert_eq!(client.pending_requests(), 0);
    let _peer = server.await.expect("join server");
}

#[tokio::test]
async fn refused_connection_is_reported_without_registering() {
    let (listener, address) = listener().await;
    drop(listener);
    let client = QrcClient::builder(address)
        .connect_timeout(Duration::from_secs(5))
        .build();

    let err = client
        .send(Request::new("NoOp"))
        .await
        .expect_err("nothing listening");
    assert!(err.is_connection_level());
    assert_eq!(client.pending_requests(), 0);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}
