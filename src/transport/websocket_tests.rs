use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tempfile::{TempDir, tempdir};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::auth::Authenticator;
use crate::broker::DeliveryEngine;
use crate::bus::{FanoutBus, LocalBus};
use crate::config::Settings;
use crate::persistence::{MessageStore, UserDirectory, open_db};
use crate::transport::message::ServerFrame;
use crate::transport::serve;

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

struct TestServer {
    _dir: TempDir,
    url: String,
    users: UserDirectory,
    store: MessageStore,
    auth: Arc<Authenticator>,
}

async fn setup_server(settings: Settings) -> TestServer {
    let dir = tempdir().expect("Failed to create temp dir");
    let db = open_db(dir.path().to_str().unwrap()).unwrap();
    let users = UserDirectory::open(&db).unwrap();
    let store = MessageStore::open(&db, Arc::new(users.clone())).unwrap();

    let engine = Arc::new(DeliveryEngine::new(
        store.clone(),
        FanoutBus::Local(LocalBus::default()),
    ));
    engine.start();
    let auth = Arc::new(Authenticator::new(
        &settings.server.jwt_secret,
        Arc::new(users.clone()),
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    tokio::spawn(serve(listener, engine, auth.clone(), settings));

    TestServer {
        _dir: dir,
        url,
        users,
        store,
        auth,
    }
}

async fn connect(server: &TestServer) -> Client {
    let (ws, _) = connect_async(server.url.as_str())
        .await
        .expect("WebSocket handshake failed");
    ws
}

async fn send(ws: &mut Client, value: serde_json::Value) {
    ws.send(WsMessage::Text(value.to_string().into()))
        .await
        .expect("Failed to send frame");
}

async fn recv(ws: &mut Client) -> ServerFrame {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for server frame")
            .expect("stream ended")
            .expect("read error");
        if msg.is_text() {
            let raw = msg.into_data();
            return serde_json::from_slice(&raw).unwrap_or_else(|e| {
                panic!("Failed to deserialize ServerFrame from '{raw:?}': {e}")
            });
        }
    }
}

/// Authenticate and consume the auth + backlog frames.
async fn login(server: &TestServer, ws: &mut Client, user_id: &str) -> ServerFrame {
    let token = server.auth.issue(user_id, chrono::Duration::hours(1)).unwrap();
    send(ws, json!({"type": "auth", "token": token})).await;
    assert_eq!(recv(ws).await, ServerFrame::auth_ok());
    recv(ws).await
}

#[tokio::test]
async fn test_offline_message_arrives_in_backlog() {
    let server = setup_server(Settings::default()).await;
    let alice = server.users.create("alice", "h").unwrap().id;
    let bob = server.users.create("bob", "h").unwrap().id;

    let mut ws_a = connect(&server).await;
    login(&server, &mut ws_a, &alice).await;
    send(&mut ws_a, json!({"type": "chat", "recipient": bob, "content": "hi"})).await;

    let ServerFrame::Sent { message } = recv(&mut ws_a).await else {
        panic!("expected sent ack");
    };
    assert!(!message.read);
    let unread = server.store.unread_for(&bob).unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].content, "hi");
    assert_eq!(unread[0].sender, alice);

    let mut ws_b = connect(&server).await;
    match login(&server, &mut ws_b, &bob).await {
        ServerFrame::Backlog { messages } => {
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].sender, alice);
            assert_eq!(messages[0].content, "hi");
        }
        other => panic!("expected backlog, got {other:?}"),
    }
    assert!(server.store.unread_for(&bob).unwrap().is_empty());
    assert!(server.store.get(&message.id).unwrap().unwrap().read);
}

#[tokio::test]
async fn test_online_message_is_forwarded_live() {
    let server = setup_server(Settings::default()).await;
    let alice = server.users.create("alice", "h").unwrap().id;
    let bob = server.users.create("bob", "h").unwrap().id;

    let mut ws_b = connect(&server).await;
    assert_eq!(
        login(&server, &mut ws_b, &bob).await,
        ServerFrame::Backlog { messages: vec![] }
    );

    let mut ws_a = connect(&server).await;
    login(&server, &mut ws_a, &alice).await;
    send(&mut ws_a, json!({"type": "chat", "recipient": bob, "content": "live"})).await;
    assert!(matches!(recv(&mut ws_a).await, ServerFrame::Sent { .. }));

    let ServerFrame::Chat { message } = recv(&mut ws_b).await else {
        panic!("expected live chat");
    };
    assert_eq!(message.content, "live");
    assert_eq!(message.sender, alice);

    for _ in 0..100 {
        if !server.store.is_unread(&message.id).unwrap() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!server.store.is_unread(&message.id).unwrap());
}

#[tokio::test]
async fn test_chat_before_auth_fails_but_connection_stays_open() {
    let server = setup_server(Settings::default()).await;
    let bob = server.users.create("bob", "h").unwrap().id;

    let mut ws = connect(&server).await;
    send(&mut ws, json!({"type": "chat", "recipient": bob, "content": "x"})).await;

    match recv(&mut ws).await {
        ServerFrame::Error { message, .. } => assert_eq!(message, "unauthenticated"),
        other => panic!("expected error, got {other:?}"),
    }
    assert!(server.store.is_empty());

    // still open: the handshake can follow
    let alice = server.users.create("alice", "h").unwrap().id;
    login(&server, &mut ws, &alice).await;
}

#[tokio::test]
async fn test_idle_unauthenticated_connection_is_closed() {
    let mut settings = Settings::default();
    settings.server.handshake_timeout_secs = 1;
    let server = setup_server(settings).await;

    let mut ws = connect(&server).await;
    match recv(&mut ws).await {
        ServerFrame::Error { message, .. } => assert_eq!(message, "handshake-timeout"),
        other => panic!("expected handshake-timeout, got {other:?}"),
    }

    // the server then closes the socket
    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match ws.next().await {
                Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}

#[tokio::test]
async fn test_silent_tcp_peer_releases_its_connection_slot() {
    let mut settings = Settings::default();
    settings.server.handshake_timeout_secs = 1;
    settings.server.max_connections = 1;
    let server = setup_server(settings).await;

    // occupies the only slot without ever sending the upgrade request
    let addr = server.url.trim_start_matches("ws://");
    let _silent = tokio::net::TcpStream::connect(addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2500)).await;

    let result = tokio::time::timeout(Duration::from_secs(2), connect_async(server.url.as_str())).await;
    assert!(matches!(result, Ok(Ok(_))), "slot was not released");
}

#[tokio::test]
async fn test_reconnect_supersedes_and_stale_close_keeps_new_socket() {
    let server = setup_server(Settings::default()).await;
    let alice = server.users.create("alice", "h").unwrap().id;
    let bob = server.users.create("bob", "h").unwrap().id;

    let mut old = connect(&server).await;
    login(&server, &mut old, &bob).await;
    let mut new = connect(&server).await;
    login(&server, &mut new, &bob).await;

    old.close(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut ws_a = connect(&server).await;
    login(&server, &mut ws_a, &alice).await;
    send(&mut ws_a, json!({"type": "chat", "recipient": bob, "content": "to new"})).await;

    let ServerFrame::Chat { message } = recv(&mut new).await else {
        panic!("expected live chat on the newer socket");
    };
    assert_eq!(message.content, "to new");
}
