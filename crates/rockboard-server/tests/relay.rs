//! End-to-end relay tests over real WebSocket connections.

use futures_util::{SinkExt, StreamExt};
use kurbo::{Point, Size};
use rockboard_core::codec::{self, WireMessage};
use rockboard_core::relay::{ClientMessage, ServerMessage};
use rockboard_core::{AnnotationEvent, MarkerKind, ResetEvent, SignalEvent};
use rockboard_server::{AppState, router};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_relay() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(Arc::new(AppState::new())))
            .await
            .unwrap();
    });
    format!("ws://{}/ws", addr)
}

async fn send(client: &mut Client, msg: &ClientMessage) {
    let json = serde_json::to_string(msg).unwrap();
    client.send(Message::text(json)).await.unwrap();
}

async fn recv(client: &mut Client) -> ServerMessage {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for relay")
            .unwrap()
            .unwrap();
        if let Message::Text(txt) = msg {
            return serde_json::from_str(txt.as_str()).unwrap();
        }
    }
}

/// Next signal, skipping presence notices.
async fn recv_signal(client: &mut Client) -> (String, WireMessage) {
    loop {
        match recv(client).await {
            ServerMessage::Signal { from, signal } => return (from, signal),
            ServerMessage::Error { message } => panic!("relay error: {message}"),
            _ => {}
        }
    }
}

async fn join(url: &str, session: &str) -> (Client, String) {
    let (mut client, _) = connect_async(url).await.unwrap();
    send(
        &mut client,
        &ClientMessage::Join {
            session: session.to_string(),
        },
    )
    .await;
    match recv(&mut client).await {
        ServerMessage::Joined { connection_id, .. } => (client, connection_id),
        other => panic!("expected joined, got {other:?}"),
    }
}

#[tokio::test]
async fn test_broadcast_signal_reaches_everyone_including_sender() {
    let url = start_relay().await;
    let (mut a, a_id) = join(&url, "wall-3").await;
    let (mut b, _) = join(&url, "wall-3").await;

    let event = SignalEvent::Annotation(AnnotationEvent::new(
        Point::new(150.0, 100.0),
        Size::new(300.0, 200.0),
        "#8ED6FF",
        MarkerKind::Hand,
    ));
    send(
        &mut a,
        &ClientMessage::Signal {
            signal: codec::encode(&event, &[]),
        },
    )
    .await;

    for client in [&mut a, &mut b] {
        let (from, signal) = recv_signal(client).await;
        assert_eq!(from, a_id);
        assert_eq!(codec::decode(&signal).unwrap(), event);
    }
}

#[tokio::test]
async fn test_targeted_signal_reaches_only_recipient() {
    let url = start_relay().await;
    let (mut a, _) = join(&url, "wall-3").await;
    let (mut b, _) = join(&url, "wall-3").await;
    let (mut c, c_id) = join(&url, "wall-3").await;

    let targeted = codec::encode(&SignalEvent::Reset(ResetEvent), &[c_id.clone()]);
    send(&mut a, &ClientMessage::Signal { signal: targeted }).await;
    let (_, signal) = recv_signal(&mut c).await;
    assert_eq!(signal.to, vec![c_id]);

    // A broadcast after the targeted one is the first signal b sees.
    let broadcast = codec::encode(&SignalEvent::Reset(ResetEvent), &[]);
    send(&mut a, &ClientMessage::Signal { signal: broadcast }).await;
    let (_, signal) = recv_signal(&mut b).await;
    assert!(signal.is_broadcast());
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let url = start_relay().await;
    let (mut a, a_id) = join(&url, "wall-1").await;
    let (mut b, b_id) = join(&url, "wall-2").await;

    let reset = codec::encode(&SignalEvent::Reset(ResetEvent), &[]);
    send(&mut a, &ClientMessage::Signal { signal: reset.clone() }).await;
    send(&mut b, &ClientMessage::Signal { signal: reset }).await;

    // Each sees only its own echo.
    let (from_a, _) = recv_signal(&mut a).await;
    let (from_b, _) = recv_signal(&mut b).await;
    assert_eq!(from_a, a_id);
    assert_eq!(from_b, b_id);
}

#[tokio::test]
async fn test_signal_without_session_is_rejected() {
    let url = start_relay().await;
    let (mut client, _) = connect_async(url.as_str()).await.unwrap();
    send(
        &mut client,
        &ClientMessage::Signal {
            signal: codec::encode(&SignalEvent::Reset(ResetEvent), &[]),
        },
    )
    .await;
    assert!(matches!(recv(&mut client).await, ServerMessage::Error { .. }));
}

#[tokio::test]
async fn test_invalid_json_keeps_connection_open() {
    let url = start_relay().await;
    let (mut client, _) = connect_async(url.as_str()).await.unwrap();
    client.send(Message::text("{not json")).await.unwrap();
    assert!(matches!(recv(&mut client).await, ServerMessage::Error { .. }));

    send(
        &mut client,
        &ClientMessage::Join {
            session: "wall-3".to_string(),
        },
    )
    .await;
    assert!(matches!(recv(&mut client).await, ServerMessage::Joined { .. }));
}
