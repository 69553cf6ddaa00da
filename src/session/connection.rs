//! Per-connection read and write loops
//!
//! Each connection gets a read loop (runs on the connection's own task) and a
//! write loop (spawned). They share nothing but a [`SessionHandle`]:
//! - the read loop owns the [`SessionState`], performs the login handshake
//!   and dispatches chat traffic to the fleet broker
//! - the write loop owns the outbound buffer and a keepalive timer, writes to
//!   the wire and clears delivered entries from the queue
//!
//! Either loop ending closes the handle, which stops the other one.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message as WsMessage;

use super::handle::{Outbound, SessionHandle};
use super::state::{Identity, SessionState, StateKind};
use crate::auth::TokenValidator;
use crate::broker::Broker;
use crate::broker::message::{Message, MessageKind};
use crate::config::SessionSettings;
use crate::hub::HubHandle;
use crate::transport::message::AuthRequest;
use crate::utils::{RelayError, Result};

/// Everything a session needs from the rest of the node.
#[derive(Clone)]
pub struct SessionContext {
    pub broker: Arc<Broker>,
    pub hub: HubHandle,
    pub validator: Arc<dyn TokenValidator>,
    pub settings: SessionSettings,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("broker", &self.broker)
            .field("settings", &self.settings)
            .finish()
    }
}

/// Drives one connection from registration to teardown.
pub async fn run_session<S>(ws: S, ctx: SessionContext)
where
    S: Stream<Item = std::result::Result<WsMessage, tungstenite::Error>>
        + Sink<WsMessage, Error = tungstenite::Error>
        + Send
        + Unpin
        + 'static,
{
    let (sink, stream) = ws.split();
    let (tx, rx) = mpsc::channel(ctx.settings.outbound_capacity);
    let handle = SessionHandle::new(tx);
    let id = handle.id();

    if ctx.hub.register(handle.clone()).is_err() {
        error!(session = %id, "Hub is not running, refusing connection");
        return;
    }
    info!(session = %id, "Session opened");

    let writer = tokio::spawn(write_loop(sink, rx, handle.clone(), ctx.clone()));

    let mut session = Session {
        handle: handle.clone(),
        state: SessionState::Unauthenticated,
        ctx: ctx.clone(),
    };
    match session.read_loop(stream).await {
        Ok(()) => debug!(session = %id, "Read loop finished"),
        Err(e) if e.is_auth() => warn!(session = %id, error = %e, "Login failed"),
        Err(e) => warn!(session = %id, error = %e, "Read loop failed"),
    }

    let _ = session.state.transition(SessionState::Closed);
    let _ = ctx.hub.unregister(id);
    handle.close();
    let _ = writer.await;
    info!(session = %id, "Session closed");
}

/// Collapses newlines to spaces and trims, as clients tend to send
/// pretty-printed JSON.
pub fn normalize_frame(text: &str) -> String {
    text.replace('\n', " ").trim().to_string()
}

struct Session {
    handle: SessionHandle,
    state: SessionState,
    ctx: SessionContext,
}

impl Session {
    async fn read_loop<St>(&mut self, mut stream: St) -> Result<()>
    where
        St: Stream<Item = std::result::Result<WsMessage, tungstenite::Error>> + Unpin,
    {
        let pong_wait = self.ctx.settings.pong_wait();
        let max_bytes = self.ctx.settings.max_message_bytes;
        let mut deadline = Instant::now() + pong_wait;

        loop {
            let frame = tokio::select! {
                _ = self.handle.closed() => return Ok(()),
                next = timeout_at(deadline, stream.next()) => match next {
                    Err(_) => return Err(RelayError::ReadTimeout),
                    Ok(None) => return Ok(()),
                    Ok(Some(frame)) => frame?,
                },
            };

            let text = match frame {
                WsMessage::Text(text) => text.as_str().to_owned(),
                WsMessage::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => text,
                    // the login frame must parse; later garbage is dropped
                    Err(_) if self.state.kind() == StateKind::Unauthenticated => {
                        return Err(RelayError::NotUtf8);
                    }
                    Err(_) => {
                        debug!(session = %self.handle.id(), "Ignoring non-UTF-8 binary frame");
                        continue;
                    }
                },
                WsMessage::Pong(_) => {
                    deadline = Instant::now() + pong_wait;
                    continue;
                }
                WsMessage::Close(_) => return Ok(()),
                _ => continue,
            };

            if text.len() > max_bytes {
                return Err(RelayError::FrameTooLarge {
                    size: text.len(),
                    limit: max_bytes,
                });
            }

            let text = normalize_frame(&text);
            debug!(session = %self.handle.id(), frame = %text, "Received frame");
            self.handle_frame(&text).await?;
        }
    }

    async fn handle_frame(&mut self, text: &str) -> Result<()> {
        match self.state.kind() {
            StateKind::Unauthenticated => {
                let request: AuthRequest = serde_json::from_str(text)?;
                self.login(request).await
            }
            StateKind::Authenticated => {
                if let Some(identity) = self.state.identity().cloned() {
                    self.dispatch(&identity, text).await;
                }
                Ok(())
            }
            StateKind::Closed => Ok(()),
        }
    }

    /// App lookup, token check, identity, `logged` receipt, then backlog
    /// replay. Any failure ends the session.
    async fn login(&mut self, request: AuthRequest) -> Result<()> {
        let queue = self.ctx.broker.queue();
        let app = queue.lookup_app(&request.app_key).await?;
        self.ctx
            .validator
            .validate(&app.api, &request.username, &request.token)
            .await?;

        let identity = Identity {
            username: request.username,
            project: app.project_id,
        };
        self.state
            .transition(SessionState::Authenticated(identity.clone()))?;
        self.handle.authenticate(identity.clone())?;
        info!(
            session = %self.handle.id(),
            username = %identity.username,
            project = %identity.project,
            "Login succeeded"
        );

        let logged = Message::receipt(
            &request.id,
            MessageKind::Logged,
            &identity.username,
            &identity.username,
            &identity.project,
        );
        send_receipt(&self.ctx, &self.handle, &identity, &logged).await?;

        let backlog = queue
            .list_pending(&identity.project, &identity.username)
            .await?;
        let pending = backlog.len();
        for entry in backlog {
            if let Err(e) = self.handle.offer(Outbound::Routed(entry)) {
                warn!(
                    session = %self.handle.id(),
                    pending,
                    error = %e,
                    "Backlog does not fit the outbound buffer, closing session"
                );
                self.handle.close();
                return Err(e);
            }
        }
        debug!(session = %self.handle.id(), pending, "Replayed backlog");
        Ok(())
    }

    /// Handles one authenticated frame. Nothing here ends the session.
    async fn dispatch(&self, identity: &Identity, text: &str) {
        let mut message: Message = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                debug!(session = %self.handle.id(), error = %e, "Dropping malformed frame");
                return;
            }
        };

        if !message.is_routable() {
            self.write_error(identity, &message.id, "unsupported message type");
            return;
        }
        if message.to.is_empty() {
            let reason = RelayError::MissingField("to").to_string();
            self.write_error(identity, &message.id, &reason);
            return;
        }

        message.from = identity.username.clone();
        message.project = identity.project.clone();

        if let Err(e) = self.ctx.broker.publish(&identity.project, &message).await {
            error!(
                session = %self.handle.id(),
                id = %message.id,
                to = %message.to,
                error = %e,
                "Failed to send message"
            );
            self.write_error(identity, &message.id, "message send failed");
            return;
        }

        if message.kind == MessageKind::Message {
            let received = Message::receipt(
                &message.id,
                MessageKind::Received,
                &message.from,
                &identity.username,
                &identity.project,
            );
            if let Err(e) = send_receipt(&self.ctx, &self.handle, identity, &received).await {
                warn!(session = %self.handle.id(), id = %message.id, error = %e, "Failed to send received receipt");
            }
        }
    }

    /// Error frames go straight into this session's own buffer.
    fn write_error(&self, identity: &Identity, id: &str, reason: &str) {
        let error = Message::error(id, &identity.username, reason);
        let result = serde_json::to_string(&error)
            .map_err(RelayError::from)
            .and_then(|text| self.handle.offer(Outbound::Local(text)));
        if let Err(e) = result {
            warn!(session = %self.handle.id(), %id, error = %e, "Failed to write error frame");
        }
    }
}

/// A receipt for this session's own user is written directly; any other
/// addressee goes through the fleet like a normal message.
async fn send_receipt(
    ctx: &SessionContext,
    handle: &SessionHandle,
    identity: &Identity,
    receipt: &Message,
) -> Result<()> {
    if receipt.to == identity.username {
        handle.offer(Outbound::Local(serde_json::to_string(receipt)?))
    } else {
        ctx.broker.publish(&identity.project, receipt).await.map(|_| ())
    }
}

pub(super) async fn write_loop<Si>(
    mut sink: Si,
    mut outbound: mpsc::Receiver<Outbound>,
    handle: SessionHandle,
    ctx: SessionContext,
) where
    Si: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
{
    let write_wait = ctx.settings.write_wait();
    let ping_period = ctx.settings.ping_period();
    let mut keepalive = tokio::time::interval_at(Instant::now() + ping_period, ping_period);

    let result: Result<()> = loop {
        tokio::select! {
            biased;
            item = outbound.recv() => {
                let Some(item) = item else { break Ok(()) };
                let mut batch = vec![item];
                while let Ok(more) = outbound.try_recv() {
                    batch.push(more);
                }
                if let Err(e) = write_batch(&mut sink, &batch, write_wait).await {
                    break Err(e);
                }
                acknowledge(&ctx, &handle, batch);
            }
            _ = keepalive.tick() => {
                let ping = sink.send(WsMessage::Ping(Vec::new().into()));
                match timeout(write_wait, ping).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => break Err(e.into()),
                    Err(_) => break Err(RelayError::WriteTimeout),
                }
            }
            _ = handle.closed() => {
                let mut batch = Vec::new();
                while let Ok(item) = outbound.try_recv() {
                    batch.push(item);
                }
                if !batch.is_empty() && write_batch(&mut sink, &batch, write_wait).await.is_ok() {
                    acknowledge(&ctx, &handle, batch);
                }
                let _ = timeout(write_wait, sink.send(WsMessage::Close(None))).await;
                break Ok(());
            }
        }
    };

    if let Err(e) = result {
        warn!(session = %handle.id(), error = %e, "Write loop failed");
    }
    handle.close();
}

/// Feeds every item as its own text frame and flushes once, so everything
/// queued at flush time leaves in a single transmission.
async fn write_batch<Si>(sink: &mut Si, batch: &[Outbound], write_wait: Duration) -> Result<()>
where
    Si: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
{
    let write = async {
        for item in batch {
            sink.feed(WsMessage::text(item.text().to_owned())).await?;
        }
        sink.flush().await
    };
    timeout(write_wait, write)
        .await
        .map_err(|_| RelayError::WriteTimeout)??;
    Ok(())
}

/// Clears written routed items from the queue and, for chat messages, tells
/// the sender they were delivered. Runs off the write loop; failures are
/// logged only and a failed receipt never restores the entry.
fn acknowledge(ctx: &SessionContext, handle: &SessionHandle, batch: Vec<Outbound>) {
    let Some(identity) = handle.identity().cloned() else {
        return;
    };
    let routed: Vec<String> = batch
        .into_iter()
        .filter_map(|item| match item {
            Outbound::Routed(text) => Some(text),
            Outbound::Local(_) => None,
        })
        .collect();
    if routed.is_empty() {
        return;
    }

    let ctx = ctx.clone();
    let handle = handle.clone();
    tokio::spawn(async move {
        for text in routed {
            if let Err(e) = ctx
                .broker
                .queue()
                .remove(&identity.project, &identity.username, &text)
                .await
            {
                error!(session = %handle.id(), error = %e, "Failed to remove delivered message from queue");
            }

            let message: Message = match serde_json::from_str(&text) {
                Ok(message) => message,
                Err(_) => continue,
            };
            if message.kind != MessageKind::Message {
                continue;
            }
            let delivered = Message::receipt(
                &message.id,
                MessageKind::Delivered,
                &message.from,
                &message.from,
                &identity.project,
            );
            if let Err(e) = send_receipt(&ctx, &handle, &identity, &delivered).await {
                warn!(session = %handle.id(), id = %message.id, error = %e, "Failed to send delivered receipt");
            }
        }
    });
}
