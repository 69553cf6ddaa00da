use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broker::message::Message;
use crate::session::handle::{Outbound, SessionHandle, SessionId};
use crate::utils::{RelayError, Result};

/// Requests processed by the hub loop, strictly one at a time and in
/// arrival order.
#[derive(Debug)]
pub enum HubEvent {
    Register(SessionHandle),
    Unregister(SessionId),
    /// Raw publication body heard on the fleet topic.
    Route(Vec<u8>),
    /// Close sessions that stayed unauthenticated past the grace period.
    Sweep(DateTime<Utc>),
    SessionCount(oneshot::Sender<usize>),
}

/// Sending side of the hub loop.
#[derive(Debug, Clone)]
pub struct HubHandle {
    events: mpsc::UnboundedSender<HubEvent>,
}

impl HubHandle {
    fn send(&self, event: HubEvent) -> Result<()> {
        self.events.send(event).map_err(|_| RelayError::HubStopped)
    }

    pub fn register(&self, session: SessionHandle) -> Result<()> {
        self.send(HubEvent::Register(session))
    }

    pub fn unregister(&self, id: SessionId) -> Result<()> {
        self.send(HubEvent::Unregister(id))
    }

    pub fn route(&self, body: Vec<u8>) -> Result<()> {
        self.send(HubEvent::Route(body))
    }

    pub fn sweep(&self) -> Result<()> {
        self.send(HubEvent::Sweep(Utc::now()))
    }

    pub async fn session_count(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.send(HubEvent::SessionCount(tx))?;
        rx.await.map_err(|_| RelayError::HubStopped)
    }

    /// Emits a sweep every `interval` for as long as the hub runs.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if hub.sweep().is_err() {
                    break;
                }
            }
        })
    }
}

/// Single authority over the sessions connected to this node.
#[derive(Debug)]
pub struct Hub {
    sessions: HashMap<SessionId, SessionHandle>,
    events: mpsc::UnboundedReceiver<HubEvent>,
    auth_grace: chrono::Duration,
}

impl Hub {
    pub fn new(auth_grace: Duration) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = Self {
            sessions: HashMap::new(),
            events: rx,
            auth_grace: chrono::Duration::from_std(auth_grace)
                .unwrap_or(chrono::Duration::MAX),
        };
        (hub, HubHandle { events: tx })
    }

    /// Runs until every [`HubHandle`] is dropped.
    pub async fn run(mut self) {
        info!("Hub started");
        while let Some(event) = self.events.recv().await {
            self.handle(event);
        }
        info!("Hub stopped");
    }

    pub fn handle(&mut self, event: HubEvent) {
        match event {
            HubEvent::Register(session) => self.register(session),
            HubEvent::Unregister(id) => self.unregister(&id),
            HubEvent::Route(body) => self.route(&body),
            HubEvent::Sweep(now) => self.sweep(now),
            HubEvent::SessionCount(reply) => {
                let _ = reply.send(self.sessions.len());
            }
        }
    }

    pub fn register(&mut self, session: SessionHandle) {
        let id = session.id();
        if self.sessions.contains_key(&id) {
            return;
        }
        self.sessions.insert(id, session);
        debug!(session = %id, total = self.sessions.len(), "Registered session");
    }

    pub fn unregister(&mut self, id: &SessionId) {
        if let Some(session) = self.sessions.remove(id) {
            session.close();
            debug!(session = %id, total = self.sessions.len(), "Unregistered session");
        }
    }

    /// Hands a routed message to every local session of its recipient. A
    /// session whose buffer is full is closed and evicted on the spot rather
    /// than stalling the loop.
    pub fn route(&mut self, body: &[u8]) {
        let message: Message = match serde_json::from_slice(body) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping malformed routed message");
                return;
            }
        };
        let Ok(text) = std::str::from_utf8(body) else {
            warn!("Dropping routed message that is not valid UTF-8");
            return;
        };

        let mut evicted = Vec::new();
        for (id, session) in &self.sessions {
            if !session.is_recipient(&message.project, &message.to) {
                continue;
            }
            match session.offer(Outbound::Routed(text.to_string())) {
                Ok(()) => debug!(session = %id, to = %message.to, "Routed message to session"),
                Err(e) => {
                    warn!(session = %id, to = %message.to, error = %e, "Evicting session that cannot keep up");
                    session.close();
                    evicted.push(*id);
                }
            }
        }
        for id in evicted {
            self.sessions.remove(&id);
        }
    }

    /// Closes and forgets sessions that connected more than the grace period
    /// before `now` without logging in. Authenticated sessions are exempt.
    pub fn sweep(&mut self, now: DateTime<Utc>) {
        let grace = self.auth_grace;
        let stale: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|s| !s.is_authenticated() && now - s.connected_at() > grace)
            .map(|s| s.id())
            .collect();

        for id in stale {
            if let Some(session) = self.sessions.remove(&id) {
                info!(session = %id, "Closing session that never authenticated");
                session.close();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }
}
