//! Harness for tests that talk to a real node over WebSockets.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tungstenite::protocol::Message as WsMessage;

use crate::auth::TokenValidator;
use crate::broker::{Broker, FleetTransport, LocalFleet, Publications};
use crate::config::SessionSettings;
use crate::hub::{Hub, HubHandle};
use crate::persistence::{AppInfo, Queue, SledStore, Store};
use crate::session::SessionContext;
use crate::transport::serve;
use crate::utils::{RelayError, Result};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const APP_KEY: &str = "app-key-1";
pub const PROJECT: &str = "p1";

/// Accepts every token except `"bad"` and records each call.
#[derive(Debug, Default)]
pub struct StubValidator {
    pub calls: Mutex<Vec<(String, String, String)>>,
}

impl StubValidator {
    pub fn calls(&self) -> Vec<(String, String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenValidator for StubValidator {
    async fn validate(&self, api: &str, username: &str, token: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((api.to_string(), username.to_string(), token.to_string()));
        if token == "bad" {
            return Err(RelayError::TokenRejected {
                username: username.to_string(),
                code: "401".to_string(),
            });
        }
        Ok(())
    }
}

/// Transport whose publishes always fail; subscriptions never yield.
#[derive(Debug, Default)]
pub struct FailingFleet;

#[async_trait]
impl FleetTransport for FailingFleet {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn publish(&self, _topic: &str, _payload: &[u8]) -> Result<()> {
        Err(RelayError::Publish("fleet is down".to_string()))
    }

    async fn subscribe(&self, _topic: &str) -> Result<Publications> {
        Ok(futures::stream::pending().boxed())
    }
}

pub fn test_settings() -> SessionSettings {
    SessionSettings::default()
}

pub fn test_queue(store: Arc<dyn Store>) -> Queue {
    Queue::new(
        store,
        "relaychat:test:".to_string(),
        "relaychat:test:app:".to_string(),
    )
}

pub fn temporary_store() -> Arc<dyn Store> {
    Arc::new(SledStore::temporary().unwrap())
}

/// One running node: hub, broker subscription and accept loop.
pub struct TestNode {
    pub addr: SocketAddr,
    pub hub: HubHandle,
    pub queue: Queue,
    pub validator: Arc<StubValidator>,
}

impl TestNode {
    /// A single node on its own store and in-process fleet.
    pub async fn start(settings: SessionSettings) -> Self {
        Self::start_with(
            temporary_store(),
            Arc::new(LocalFleet::default()),
            settings,
        )
        .await
    }

    pub async fn start_with(
        store: Arc<dyn Store>,
        fleet: Arc<dyn FleetTransport>,
        settings: SessionSettings,
    ) -> Self {
        let queue = test_queue(store);
        queue
            .provision_app(
                APP_KEY,
                &AppInfo {
                    api: "http://auth.local/check".to_string(),
                    project_id: PROJECT.to_string(),
                },
            )
            .await
            .unwrap();

        let broker = Arc::new(Broker::new("relaychat.test", queue.clone(), fleet));
        broker.init().await.unwrap();

        let (hub, handle) = Hub::new(settings.auth_grace());
        tokio::spawn(hub.run());
        broker.subscribe(handle.clone()).await.unwrap();

        let validator = Arc::new(StubValidator::default());
        let ctx = SessionContext {
            broker,
            hub: handle.clone(),
            validator: validator.clone(),
            settings,
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, ctx));

        Self {
            addr,
            hub: handle,
            queue,
            validator,
        }
    }

    pub async fn connect(&self) -> Client {
        let (client, _) = connect_async(format!("ws://{}", self.addr))
            .await
            .expect("WebSocket handshake failed");
        client
    }

    /// Connects and logs in as `username`, returning the `logged` receipt.
    pub async fn login(&self, username: &str) -> (Client, Value) {
        let mut client = self.connect().await;
        send_json(
            &mut client,
            serde_json::json!({
                "id": format!("login-{username}"),
                "appKey": APP_KEY,
                "username": username,
                "token": "secret",
            }),
        )
        .await;
        let logged = next_json(&mut client).await;
        assert_eq!(logged["type"], "logged", "unexpected login reply {logged}");
        (client, logged)
    }

    pub async fn pending(&self, recipient: &str) -> Vec<Value> {
        self.queue
            .list_pending(PROJECT, recipient)
            .await
            .unwrap()
            .iter()
            .map(|entry| serde_json::from_str(entry).unwrap())
            .collect()
    }

    /// Polls until `recipient`'s backlog has exactly `len` entries.
    pub async fn wait_for_pending(&self, recipient: &str, len: usize) {
        for _ in 0..100 {
            if self.pending(recipient).await.len() == len {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!(
            "backlog of {recipient} never reached {len}: {:?}",
            self.pending(recipient).await
        );
    }
}

pub async fn send_json(client: &mut Client, value: Value) {
    send_text(client, &value.to_string()).await;
}

pub async fn send_text(client: &mut Client, text: &str) {
    client
        .send(WsMessage::text(text.to_string()))
        .await
        .expect("failed to send frame");
}

/// Next text frame as JSON, skipping control frames.
pub async fn next_json(client: &mut Client) -> Value {
    let read = async {
        loop {
            match client.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    return serde_json::from_str::<Value>(text.as_str()).unwrap();
                }
                Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => continue,
                other => panic!("expected a text frame, got {other:?}"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), read)
        .await
        .expect("timed out waiting for a frame")
}

/// Asserts no text frame arrives within `wait`.
pub async fn expect_silence(client: &mut Client, wait: Duration) {
    let read = async {
        loop {
            match client.next().await {
                Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => continue,
                other => return other,
            }
        }
    };
    if let Ok(frame) = tokio::time::timeout(wait, read).await {
        panic!("expected silence, got {frame:?}");
    }
}

/// Reads until the server closes the connection. Text frames seen on the
/// way are returned.
pub async fn expect_closed(client: &mut Client) -> Vec<Value> {
    let mut seen = Vec::new();
    let read = async {
        loop {
            match client.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    seen.push(serde_json::from_str::<Value>(text.as_str()).unwrap())
                }
                Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => continue,
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), read)
        .await
        .expect("connection was not closed");
    seen
}
