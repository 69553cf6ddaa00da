//! Fleet broker
//!
//! Bridges outgoing messages to the shared fleet topic and feeds everything
//! heard on that topic into the local hub:
//! - `publish` persists to the queue first and only then publishes, so a
//!   message is never observable by subscribers before it is durable
//! - `subscribe` forwards raw publication bodies to the hub untouched; the hub
//!   decides which local session, if any, owns the recipient
//!
//! Every node receives every publication. There is no directory of which node
//! holds which user's socket.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::fleet::FleetTransport;
use super::message::Message;
use crate::hub::HubHandle;
use crate::persistence::Queue;
use crate::utils::Result;

pub struct Broker {
    topic: String,
    queue: Queue,
    transport: Arc<dyn FleetTransport>,
}

impl Broker {
    pub fn new(topic: impl Into<String>, queue: Queue, transport: Arc<dyn FleetTransport>) -> Self {
        Self {
            topic: topic.into(),
            queue,
            transport,
        }
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Connects the underlying transport. Failure here is fatal at startup.
    pub async fn init(&self) -> Result<()> {
        self.transport.init().await?;
        info!(topic = %self.topic, "Fleet broker ready");
        Ok(())
    }

    /// Serializes `message`, saves it under `project:message.to`, then
    /// publishes it to the fleet. Returns the serialized form.
    pub async fn publish(&self, project: &str, message: &Message) -> Result<String> {
        let payload = serde_json::to_string(message)?;
        self.queue.save(project, &message.to, &payload).await?;
        self.transport
            .publish(&self.topic, payload.as_bytes())
            .await?;
        debug!(
            topic = %self.topic,
            %project,
            to = %message.to,
            id = %message.id,
            "Published message to fleet"
        );
        Ok(payload)
    }

    /// Installs the fleet subscription and forwards every publication to the
    /// hub. Item errors are logged and the subscription carries on; if the
    /// underlying stream ends, this node stops hearing the fleet.
    pub async fn subscribe(&self, hub: HubHandle) -> Result<JoinHandle<()>> {
        let mut publications = self.transport.subscribe(&self.topic).await?;
        let topic = self.topic.clone();
        info!(%topic, "Subscribed to fleet topic");

        Ok(tokio::spawn(async move {
            while let Some(item) = publications.next().await {
                match item {
                    Ok(body) => {
                        debug!(%topic, body = %String::from_utf8_lossy(&body), "Received fleet publication");
                        if hub.route(body).is_err() {
                            warn!(%topic, "Hub stopped, dropping fleet subscription");
                            return;
                        }
                    }
                    Err(e) => error!(%topic, error = %e, "Fleet subscription error"),
                }
            }
            error!(%topic, "Fleet subscription ended; this node no longer receives fleet messages");
        }))
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("topic", &self.topic)
            .field("queue", &self.queue)
            .finish()
    }
}
