//! End-to-end WebSocket tests: real listener, real tungstenite clients.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use chat_hub::{handle_connection, HubConfig, HubHandle};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hub = HubHandle::spawn(HubConfig::default(), 64);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(handle_connection(stream, hub.sender()));
        }
    });
    addr
}

async fn connect(addr: SocketAddr) -> (Ws, String) {
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
        .await
        .unwrap();
    let hello = next_of(&mut ws, "connected").await;
    let id = hello["connectionId"].as_str().unwrap().to_string();
    (ws, id)
}

async fn emit(ws: &mut Ws, frame: Value) {
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();
}

/// Wait for the next notification of the given type, skipping others
async fn next_of(ws: &mut Ws, kind: &str) -> Value {
    timeout(Duration::from_secs(5), async {
        loop {
            let frame = ws.next().await.expect("stream ended").expect("ws error");
            if let Message::Text(text) = frame {
                let value: Value = serde_json::from_str(&text).unwrap();
                if value["type"] == kind {
                    return value;
                }
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {}", kind))
}

#[tokio::test]
async fn test_room_history_and_private_read_flow() {
    let addr = start_server().await;

    let (mut alice, alice_id) = connect(addr).await;
    emit(&mut alice, json!({"type": "identify", "username": "alice"})).await;
    let snapshot = next_of(&mut alice, "room_user_list").await;
    assert_eq!(snapshot["users"][0]["username"], "alice");

    emit(
        &mut alice,
        json!({"type": "send_message", "room": "general", "text": "hi", "clientId": "local-1"}),
    )
    .await;
    let confirm = next_of(&mut alice, "message_confirm").await;
    assert_eq!(confirm["clientId"], "local-1");
    assert_eq!(confirm["room"], "general");

    // Greeting carries general's history
    let (mut bob, bob_id) = connect(addr).await;
    let history = next_of(&mut bob, "message_history").await;
    assert_eq!(history["history"][0]["text"], "hi");
    assert_eq!(history["history"][0]["id"], confirm["id"]);

    emit(&mut bob, json!({"type": "identify", "username": "bob"})).await;
    let joined = next_of(&mut alice, "user_joined").await;
    assert_eq!(joined["username"], "bob");
    assert_eq!(joined["id"], bob_id.as_str());

    emit(
        &mut alice,
        json!({"type": "private_message", "toConnectionId": bob_id, "text": "psst"}),
    )
    .await;
    let to_bob = next_of(&mut bob, "private_message").await;
    let to_alice = next_of(&mut alice, "private_message").await;
    assert_eq!(to_bob, to_alice);
    assert_eq!(to_bob["isPrivate"], true);
    assert_eq!(to_bob["to"], bob_id.as_str());
    assert_eq!(to_bob["senderId"], alice_id.as_str());

    emit(
        &mut bob,
        json!({"type": "message_read", "messageId": to_bob["id"], "room": "general"}),
    )
    .await;
    let read = next_of(&mut alice, "message_read").await;
    assert_eq!(read["messageId"], to_bob["id"]);
    assert_eq!(read["by"], "bob");

    bob.close(None).await.unwrap();
    let left = next_of(&mut alice, "user_left").await;
    assert_eq!(left["username"], "bob");
    assert_eq!(left["id"], bob_id.as_str());
}

#[tokio::test]
async fn test_room_fan_out_and_reactions() {
    let addr = start_server().await;

    let (mut alice, _) = connect(addr).await;
    emit(&mut alice, json!({"type": "identify", "username": "alice"})).await;
    next_of(&mut alice, "room_user_list").await;
    let (mut bob, _) = connect(addr).await;
    emit(&mut bob, json!({"type": "identify", "username": "bob"})).await;
    next_of(&mut bob, "room_user_list").await;

    emit(&mut alice, json!({"type": "join_room", "roomName": "rust"})).await;
    next_of(&mut alice, "message_history").await;
    emit(&mut bob, json!({"type": "join_room", "roomName": "rust"})).await;
    let joined = next_of(&mut alice, "room_joined").await;
    assert_eq!(joined["username"], "bob");
    let rooms = next_of(&mut bob, "rooms_list").await;
    assert_eq!(rooms["rooms"], json!(["general", "rust"]));

    emit(
        &mut bob,
        json!({"type": "typing", "room": "rust", "isTyping": true}),
    )
    .await;
    let typing = next_of(&mut alice, "typing_users").await;
    assert_eq!(typing, json!({"type": "typing_users", "room": "rust", "users": ["bob"]}));

    emit(
        &mut bob,
        json!({"type": "send_message", "room": "rust", "text": "fearless"}),
    )
    .await;
    let received = next_of(&mut alice, "receive_message").await;
    assert_eq!(received["text"], "fearless");
    assert_eq!(received["sender"], "bob");
    let confirm = next_of(&mut bob, "message_confirm").await;
    assert_eq!(confirm["id"], received["id"]);

    emit(
        &mut alice,
        json!({"type": "message_reaction", "messageId": received["id"], "emoji": "🦀"}),
    )
    .await;
    let reaction = next_of(&mut bob, "message_reaction").await;
    assert_eq!(reaction["users"], json!(["alice"]));
    assert_eq!(reaction["emoji"], "🦀");
}

#[tokio::test]
async fn test_malformed_frames_do_not_close_connection() {
    let addr = start_server().await;
    let (mut ws, _) = connect(addr).await;

    ws.send(Message::Text("garbage".to_string().into())).await.unwrap();
    emit(&mut ws, json!({"type": "no_such_event"})).await;
    emit(&mut ws, json!({"type": "identify", "username": "carol"})).await;

    let joined = next_of(&mut ws, "user_joined").await;
    assert_eq!(joined["username"], "carol");
}

#[tokio::test]
async fn test_client_close_tears_down_connection() {
    let addr = start_server().await;

    let (mut alice, _) = connect(addr).await;
    emit(&mut alice, json!({"type": "identify", "username": "alice"})).await;
    next_of(&mut alice, "room_user_list").await;
    let (mut bob, bob_id) = connect(addr).await;
    emit(&mut bob, json!({"type": "identify", "username": "bob"})).await;
    next_of(&mut bob, "room_user_list").await;

    bob.send(Message::Close(None)).await.unwrap();

    // Both server tasks stop, so bob's stream ends instead of hanging
    timeout(Duration::from_secs(5), async {
        while let Some(Ok(_)) = bob.next().await {}
    })
    .await
    .expect("connection stayed open after close");

    let left = next_of(&mut alice, "user_left").await;
    assert_eq!(left["id"], bob_id.as_str());
    let users = next_of(&mut alice, "user_list").await;
    assert_eq!(users["users"].as_array().unwrap().len(), 1);
    assert_eq!(users["users"][0]["username"], "alice");
}
